use super::CliError;
use anyhow::Context;
use dssat_core::config::{InstallationConfig, load_installation_config};
use dssat_core::domain::{CropType, DssatError, RunMode, TextEncoding};
use dssat_core::orchestrator::BatchReport;
use dssat_core::summary::CompileReport;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(super) enum EncodingArg {
    #[value(name = "utf-8", alias = "utf8")]
    Utf8,
    Gbk,
}

impl From<EncodingArg> for TextEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Gbk => TextEncoding::Gbk,
        }
    }
}

pub(super) fn parse_crop(value: &str) -> Result<CropType, String> {
    value.parse::<CropType>().map_err(|error| error.message().to_string())
}

pub(super) fn parse_run_mode(value: &str) -> Result<RunMode, String> {
    value.parse::<RunMode>().map_err(|error| error.message().to_string())
}

/// Installation settings from `--config`, or the default layout.
pub(super) fn load_config(path: Option<&Path>) -> Result<InstallationConfig, CliError> {
    let Some(path) = path else {
        return Ok(InstallationConfig::default());
    };
    load_installation_config(path).map_err(|error| {
        CliError::Compute(
            DssatError::input_validation("INPUT.CLI_CONFIG", error.to_string()).with_path(path),
        )
    })
}

pub(super) fn write_json_report<T: Serialize>(path: &Path, report: &T) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(path, json + "\n")
        .with_context(|| format!("failed to write report '{}'", path.display()))?;
    Ok(())
}

pub(super) fn render_compile_summary(report: &CompileReport) -> String {
    let mut lines: Vec<String> = report
        .written
        .iter()
        .map(|path| format!("wrote {}", path.display()))
        .collect();
    lines.extend(report.rejected.iter().map(|rejected| {
        format!(
            "rejected {}/{}: {}",
            rejected.crop_type, rejected.file_name, rejected.reason
        )
    }));
    lines.push(format!(
        "Compiled {} experiment file(s), rejected {}.",
        report.written.len(),
        report.rejected.len()
    ));
    lines.join("\n")
}

pub(super) fn render_batch_summary(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for run in &report.completed {
        lines.push(format!(
            "{} ({}): calibrated {} cultivar(s), simulated {} treatment(s) into {}",
            run.experiment,
            run.crop,
            run.cultivars.len(),
            run.treatment_count,
            run.output_dir.display()
        ));
    }
    for skipped in &report.skipped {
        lines.push(format!(
            "skipped {}: {}",
            skipped.experiment_file.display(),
            skipped.reason
        ));
    }
    lines.push(format!(
        "Completed {} experiment(s), skipped {}.",
        report.completed.len(),
        report.skipped.len()
    ));
    lines.join("\n")
}
