//! Tabular summary ingestion: one CSV row per treatment, grouped into one
//! experiment per `(crop_type, file_name)` pair.

use crate::domain::{CropType, DssatError, DssatResult};
use crate::experiment::{TreatmentRow, build_with_reference_year, write_experiment};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SummaryRow {
    #[serde(default)]
    pub crop_type: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub ingeno: String,
    #[serde(default)]
    pub cname: String,
    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub soil: String,
    #[serde(rename = "PDATE", default)]
    pub pdate: String,
    #[serde(rename = "EDATE", default)]
    pub edate: String,
    #[serde(rename = "FERTILIZERS", default)]
    pub fertilizers: String,
}

impl SummaryRow {
    pub fn treatment_row(&self) -> TreatmentRow {
        TreatmentRow {
            genotype_code: self.ingeno.clone(),
            cultivar_name: self.cname.clone(),
            weather: self.weather.clone(),
            soil: self.soil.clone(),
            planting_date: self.pdate.clone(),
            ending_date: self.edate.clone(),
            fertilizers: self.fertilizers.clone(),
        }
    }
}

/// Grouping key. Crop names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExperimentKey {
    pub crop_type: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub out_dir: PathBuf,
    pub crop: Option<CropType>,
    /// Restricts compilation to these identifiers; empty means all.
    pub files: Vec<String>,
    pub reference_year: i32,
}

impl CompileOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            crop: None,
            files: Vec::new(),
            reference_year: chrono::Local::now().year(),
        }
    }

    fn selects(&self, key: &ExperimentKey) -> bool {
        let crop_selected = self
            .crop
            .is_none_or(|crop| crop.as_str().eq_ignore_ascii_case(&key.crop_type));
        let file_selected = self.files.is_empty()
            || self
                .files
                .iter()
                .any(|file| file.trim() == key.file_name);
        crop_selected && file_selected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedExperiment {
    pub crop_type: String,
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileReport {
    pub written: Vec<PathBuf>,
    pub rejected: Vec<RejectedExperiment>,
}

pub fn read_summary_file(path: &Path) -> DssatResult<Vec<SummaryRow>> {
    let file = std::fs::File::open(path).map_err(|source| {
        DssatError::io_system(
            "IO.SUMMARY_READ",
            format!("failed to open summary '{}': {}", path.display(), source),
        )
        .with_path(path)
    })?;
    read_summary(file).map_err(|error| error.with_path(path))
}

pub fn read_summary<R: Read>(reader: R) -> DssatResult<Vec<SummaryRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (position, record) in reader.deserialize::<SummaryRow>().enumerate() {
        let row = record.map_err(|error| {
            DssatError::input_validation(
                "INPUT.SUMMARY_ROW",
                format!("summary row {} is malformed: {}", position + 1, error),
            )
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Groups rows per experiment, keeping input order inside each group.
pub fn group_rows(rows: &[SummaryRow]) -> BTreeMap<ExperimentKey, Vec<TreatmentRow>> {
    let mut groups: BTreeMap<ExperimentKey, Vec<TreatmentRow>> = BTreeMap::new();
    for row in rows {
        let key = ExperimentKey {
            crop_type: row.crop_type.trim().to_ascii_lowercase(),
            file_name: row.file_name.trim().to_string(),
        };
        groups.entry(key).or_default().push(row.treatment_row());
    }
    groups
}

/// Builds and writes one experiment file per selected group. A group that
/// fails to build is reported and skipped; write failures abort.
pub fn compile_summary(rows: &[SummaryRow], options: &CompileOptions) -> DssatResult<CompileReport> {
    let mut report = CompileReport::default();
    for (key, treatment_rows) in group_rows(rows) {
        if !options.selects(&key) {
            continue;
        }
        let document = match build_with_reference_year(
            &key.crop_type,
            &key.file_name,
            &treatment_rows,
            options.reference_year,
        ) {
            Ok(document) => document,
            Err(error) if error.category().is_experiment_local() => {
                warn!(
                    crop = %key.crop_type,
                    experiment = %key.file_name,
                    error = %error.diagnostic_line(),
                    "skipping experiment"
                );
                report.rejected.push(RejectedExperiment {
                    crop_type: key.crop_type,
                    file_name: key.file_name,
                    reason: error.diagnostic_line(),
                });
                continue;
            }
            Err(error) => return Err(error),
        };
        report
            .written
            .push(write_experiment(&document, &options.out_dir)?);
    }
    info!(
        written = report.written.len(),
        rejected = report.rejected.len(),
        out_dir = %options.out_dir.display(),
        "compiled summary"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{CompileOptions, ExperimentKey, compile_summary, group_rows, read_summary};
    use crate::domain::CropType;
    use tempfile::TempDir;

    const SUMMARY: &str = "\
crop_type,file_name,ingeno,cname,weather,soil,PDATE,EDATE,FERTILIZERS,notes
maize,IBWA8301,IB0063,PIO X304C,WST1,IBMZ910014,83110,83111,83110 FE001 AP001 5 60 0 0,first
Maize,IBWA8301,IB0064,PIO 3382,WST1,IBMZ910014,83110,83111,83110 FE001 AP001 5 60 0 0,
rice,CNHZ0401,IB0001,IR 58,CNHZ,CN00000001,04150,04151,04150 FE001 AP001 5 30 0 0,
wheat,BAD00001,IB0001,X,W,S,01001,01002,01001 FE001 AP001 5 30 0 0,
";

    #[test]
    fn rows_group_per_crop_and_file_in_input_order() {
        let rows = read_summary(SUMMARY.as_bytes()).expect("summary parses");
        assert_eq!(rows.len(), 4);
        let groups = group_rows(&rows);
        let maize = groups
            .get(&ExperimentKey {
                crop_type: "maize".to_string(),
                file_name: "IBWA8301".to_string(),
            })
            .expect("maize group");
        let codes: Vec<&str> = maize.iter().map(|row| row.genotype_code.as_str()).collect();
        assert_eq!(codes, vec!["IB0063", "IB0064"]);
        assert_eq!(maize[0].planting_date, "83110");
    }

    #[test]
    fn compile_writes_valid_groups_and_reports_rejected_ones() {
        let temp = TempDir::new().expect("tempdir should be created");
        let rows = read_summary(SUMMARY.as_bytes()).expect("summary parses");
        let mut options = CompileOptions::new(temp.path());
        options.reference_year = 2024;

        let report = compile_summary(&rows, &options).expect("compile runs");
        assert_eq!(report.written.len(), 2);
        assert!(temp.path().join("IBWA8301.MZX").is_file());
        assert!(temp.path().join("CNHZ0401.RIX").is_file());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].crop_type, "wheat");
        assert!(report.rejected[0].reason.contains("INPUT.UNSUPPORTED_CROP"));
    }

    #[test]
    fn filters_select_crop_and_file() {
        let temp = TempDir::new().expect("tempdir should be created");
        let rows = read_summary(SUMMARY.as_bytes()).expect("summary parses");
        let mut options = CompileOptions::new(temp.path());
        options.reference_year = 2024;
        options.crop = Some(CropType::Rice);

        let report = compile_summary(&rows, &options).expect("compile runs");
        assert_eq!(report.written, vec![temp.path().join("CNHZ0401.RIX")]);
        assert!(report.rejected.is_empty());

        options.crop = None;
        options.files = vec!["IBWA8301".to_string()];
        let report = compile_summary(&rows, &options).expect("compile runs");
        assert_eq!(report.written, vec![temp.path().join("IBWA8301.MZX")]);
    }

    #[test]
    fn overlong_cultivar_name_rejects_only_its_experiment() {
        let temp = TempDir::new().expect("tempdir should be created");
        let summary = format!(
            "crop_type,file_name,ingeno,cname,weather,soil,PDATE,EDATE,FERTILIZERS\n\
             maize,AAAA8301,IB0063,{},WST1,IBMZ910014,83110,83111,83110 FE001 AP001 5 60 0 0\n\
             maize,CCCC8301,IB0064,{},WST1,IBMZ910014,83110,83111,83110 FE001 AP001 5 60 0 0\n\
             maize,BBBB8301,IB0063,PIO X304C,WST1,IBMZ910014,83110,83111,83110 FE001 AP001 5 60 0 0\n",
            "N".repeat(26),
            "N".repeat(23),
        );
        let rows = read_summary(summary.as_bytes()).expect("summary parses");
        let mut options = CompileOptions::new(temp.path());
        options.reference_year = 2024;

        let report = compile_summary(&rows, &options).expect("compile keeps going");
        assert_eq!(report.written, vec![temp.path().join("BBBB8301.MZX")]);
        let rejected: Vec<&str> = report
            .rejected
            .iter()
            .map(|rejected| rejected.file_name.as_str())
            .collect();
        assert_eq!(rejected, vec!["AAAA8301", "CCCC8301"]);
        assert!(
            report
                .rejected
                .iter()
                .all(|rejected| rejected.reason.contains("INPUT.BUILD_CULTIVAR_NAME"))
        );
    }
}
