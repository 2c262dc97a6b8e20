use super::CliError;
use super::helpers::*;
use anyhow::Context;
use dssat_core::collaborator::{DssatExecutable, GlueProcess};
use dssat_core::config::{
    CalibrationControl, DEFAULT_CALIBRATION_ITERATIONS, DEFAULT_CALIBRATION_MODE_FLAG,
    InstallationConfig,
};
use dssat_core::domain::{CropType, RunMode, TextEncoding};
use dssat_core::experiment::parse_file;
use dssat_core::genotype::{GENOTYPE_MATCH_PREFIX_LEN, GenotypeDatabase, MatchKey, UpsertOutcome};
use dssat_core::orchestrator::{RunOptions, RunOrchestrator};
use dssat_core::summary::{CompileOptions, compile_summary, read_summary_file};
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct CompileArgs {
    /// CSV export of the treatment summary sheet
    #[arg(long)]
    summary: PathBuf,

    /// Directory that receives the experiment files
    #[arg(long)]
    out_dir: PathBuf,

    #[command(flatten)]
    selection: SelectionFlags,
}

#[derive(clap::Args)]
pub(super) struct SelectionFlags {
    /// Only compile experiments of this crop
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropType>,

    /// Only compile this experiment identifier (repeatable)
    #[arg(long = "file", value_name = "IDENTIFIER")]
    files: Vec<String>,

    /// Year used to pivot two-digit experiment years (defaults to this year)
    #[arg(long)]
    reference_year: Option<i32>,
}

impl SelectionFlags {
    fn into_options(self, out_dir: PathBuf) -> CompileOptions {
        let mut options = CompileOptions::new(out_dir);
        options.crop = self.crop;
        options.files = self.files;
        if let Some(year) = self.reference_year {
            options.reference_year = year;
        }
        options
    }
}

#[derive(clap::Args)]
pub(super) struct InspectArgs {
    /// Experiment file (.MZX or .RIX)
    #[arg(value_name = "XFILE")]
    xfile: PathBuf,

    /// Text encoding of the experiment file
    #[arg(long, value_enum, default_value = "utf-8")]
    encoding: EncodingArg,
}

#[derive(clap::Args)]
pub(super) struct ReconcileArgs {
    /// Genotype database file (.CUL)
    #[arg(long)]
    database: PathBuf,

    /// Fixed-width genotype record line to merge
    #[arg(long)]
    record: String,

    /// Crop whose default file encoding applies
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropType>,

    /// Number of leading characters that identify an existing record
    #[arg(long, default_value_t = GENOTYPE_MATCH_PREFIX_LEN)]
    prefix_len: usize,

    /// Overrides the crop's default file encoding
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,
}

impl ReconcileArgs {
    fn text_encoding(&self) -> TextEncoding {
        match (self.encoding, self.crop) {
            (Some(encoding), _) => encoding.into(),
            (None, Some(crop)) => crop.profile().genotype_encoding,
            (None, None) => TextEncoding::Utf8,
        }
    }
}

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// CSV export of the treatment summary sheet
    #[arg(long)]
    summary: PathBuf,

    /// Directory that receives the compiled experiment files
    #[arg(long)]
    crop_dir: PathBuf,

    /// Root of the simulation output tree
    #[arg(long)]
    result: PathBuf,

    /// Calibration iterations
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_ITERATIONS)]
    epochs: u32,

    /// Calibration mode flag written to the control file
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_MODE_FLAG)]
    glue_flag: u32,

    /// Simulation run mode: B, N, Q or S
    #[arg(long, value_parser = parse_run_mode, default_value = "B")]
    mode: RunMode,

    /// Installation config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Installation root; overrides the config file
    #[arg(long)]
    root: Option<PathBuf>,

    /// JSON report output path
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    selection: SelectionFlags,
}

struct RunSettings {
    summary: PathBuf,
    installation: InstallationConfig,
    compile: CompileOptions,
    run: RunOptions,
    report: Option<PathBuf>,
}

impl RunArgs {
    fn into_settings(self) -> Result<RunSettings, CliError> {
        let mut installation = load_config(self.config.as_deref())?;
        if let Some(root) = self.root {
            installation.root = root;
        }
        Ok(RunSettings {
            summary: self.summary,
            installation,
            compile: self.selection.into_options(self.crop_dir),
            run: RunOptions {
                control: CalibrationControl {
                    iterations: self.epochs,
                    mode_flag: self.glue_flag,
                },
                run_mode: self.mode,
                result_root: self.result,
            },
            report: self.report,
        })
    }
}

pub(super) fn run_compile_command(args: CompileArgs) -> Result<i32, CliError> {
    let options = args.selection.into_options(args.out_dir);
    let rows = read_summary_file(&args.summary)?;
    let report = compile_summary(&rows, &options)?;
    println!("{}", render_compile_summary(&report));

    if report.rejected.is_empty() { Ok(0) } else { Ok(1) }
}

pub(super) fn run_inspect_command(args: InspectArgs) -> Result<i32, CliError> {
    let parsed = parse_file(&args.xfile, args.encoding.into())?;
    let json = serde_json::to_string_pretty(&parsed)
        .with_context(|| format!("failed to serialize '{}'", args.xfile.display()))?;
    println!("{}", json);
    Ok(0)
}

pub(super) fn run_reconcile_command(args: ReconcileArgs) -> Result<i32, CliError> {
    let encoding = args.text_encoding();
    // A missing database starts empty and is created on save.
    let mut database = if args.database.exists() {
        GenotypeDatabase::load(&args.database, encoding)?
    } else {
        GenotypeDatabase::parse("")
    };
    let outcome = database
        .upsert_line(&args.record, MatchKey::Prefix(args.prefix_len))
        .map_err(|error| error.with_path(&args.database))?;
    database.save(&args.database, encoding)?;

    match outcome {
        UpsertOutcome::Inserted => {
            println!("Inserted record into {}.", args.database.display());
        }
        UpsertOutcome::Replaced { removed_duplicates } => {
            println!(
                "Replaced record in {} (removed {} duplicate(s)).",
                args.database.display(),
                removed_duplicates
            );
        }
    }
    Ok(0)
}

pub(super) fn run_run_command(args: RunArgs) -> Result<i32, CliError> {
    let settings = args.into_settings()?;
    let rows = read_summary_file(&settings.summary)?;
    let compiled = compile_summary(&rows, &settings.compile)?;
    println!("{}", render_compile_summary(&compiled));

    let calibration = GlueProcess::from_config(&settings.installation);
    let simulation = DssatExecutable::from_config(&settings.installation);
    info!(
        experiments = compiled.written.len(),
        root = %settings.installation.root.display(),
        "running compiled experiments"
    );
    let orchestrator = RunOrchestrator::new(
        &settings.installation,
        &calibration,
        &simulation,
        settings.run,
    );
    let report = orchestrator.run_all(&compiled.written)?;
    println!("{}", render_batch_summary(&report));
    if let Some(path) = &settings.report {
        write_json_report(path, &report)?;
        println!("JSON report: {}", path.display());
    }

    let clean = compiled.rejected.is_empty() && report.skipped.is_empty();
    if clean { Ok(0) } else { Ok(1) }
}
