//! Per-experiment sequencing: calibrate every cultivar, reconcile the
//! genotype database, then simulate all treatments once.

use crate::batch::{
    SIMULATION_BATCH_FILE, SimulationBatchEntry, calibration_batch_file_name, point_glue_script,
    render_calibration_batch, render_simulation_batch,
};
use crate::codec::GenotypeRecord;
use crate::collaborator::{
    CalibrationCollaborator, CalibrationRequest, SimulationCollaborator, SimulationRequest,
};
use crate::config::{CalibrationControl, InstallationConfig};
use crate::domain::{
    CropType, DssatError, DssatResult, ErrorContextExt, RunMode, TextEncoding, TreatmentGroup,
};
use crate::experiment::{ParsedExperiment, parse_file};
use crate::genotype::GenotypeDatabase;
use crate::lock::InstallationLock;
use crate::serialization::{read_text, write_text_artifact, write_text_atomic};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub control: CalibrationControl,
    pub run_mode: RunMode,
    /// Simulation output lands in `<result_root>/<crop>/<experiment>/`.
    pub result_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibratedCultivar {
    pub genotype_code: String,
    pub cultivar_name: String,
    pub seeded: bool,
    pub result_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub experiment: String,
    pub crop: CropType,
    pub experiment_file: PathBuf,
    pub cultivars: Vec<CalibratedCultivar>,
    pub treatment_count: usize,
    pub output_dir: PathBuf,
    pub simulation_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedExperiment {
    pub experiment_file: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub completed: Vec<RunReport>,
    pub skipped: Vec<SkippedExperiment>,
}

pub struct RunOrchestrator<'a> {
    config: &'a InstallationConfig,
    calibration: &'a dyn CalibrationCollaborator,
    simulation: &'a dyn SimulationCollaborator,
    options: RunOptions,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        config: &'a InstallationConfig,
        calibration: &'a dyn CalibrationCollaborator,
        simulation: &'a dyn SimulationCollaborator,
        options: RunOptions,
    ) -> Self {
        Self {
            config,
            calibration,
            simulation,
            options,
        }
    }

    /// Runs every experiment in order. Input and parse problems skip the
    /// offending experiment; anything touching the genotype database or a
    /// collaborator stops the batch.
    pub fn run_all(&self, experiment_files: &[PathBuf]) -> DssatResult<BatchReport> {
        let mut report = BatchReport::default();
        for experiment_file in experiment_files {
            match self.run_experiment(experiment_file) {
                Ok(run) => report.completed.push(run),
                Err(error) if error.category().is_experiment_local() => {
                    warn!(
                        path = %experiment_file.display(),
                        error = %error.diagnostic_line(),
                        "skipping experiment"
                    );
                    report.skipped.push(SkippedExperiment {
                        experiment_file: experiment_file.clone(),
                        reason: error.diagnostic_line(),
                    });
                }
                Err(error) => return Err(error),
            }
        }
        Ok(report)
    }

    pub fn run_experiment(&self, experiment_file: &Path) -> DssatResult<RunReport> {
        let (identifier, crop) = identify_experiment(experiment_file)?;
        self.run_identified(experiment_file, &identifier, crop)
            .in_experiment(&identifier)
    }

    fn run_identified(
        &self,
        experiment_file: &Path,
        identifier: &str,
        crop: CropType,
    ) -> DssatResult<RunReport> {
        let _lock = InstallationLock::acquire(&self.config.root)?;
        info!(experiment = identifier, crop = %crop, "starting experiment run");

        let staged = stage_experiment(experiment_file, &self.config.crop_dir(crop))?;
        let parsed = parse_file(&staged, TextEncoding::Utf8)?;

        let mut cultivars = Vec::with_capacity(parsed.groups.len());
        for group in &parsed.groups {
            if group.treatment_numbers.is_empty() {
                warn!(
                    experiment = identifier,
                    cultivar = %group.genotype_code,
                    "cultivar has no treatments; skipping calibration"
                );
                continue;
            }
            let calibrated = self
                .calibrate_group(crop, group, &staged)
                .for_cultivar(&group.genotype_code)?;
            cultivars.push(calibrated);
        }

        let (output_dir, simulation_log) = self.simulate(crop, identifier, &staged, &parsed)?;
        info!(
            experiment = identifier,
            output = %output_dir.display(),
            "experiment run finished"
        );
        Ok(RunReport {
            experiment: identifier.to_string(),
            crop,
            experiment_file: staged,
            cultivars,
            treatment_count: parsed.treatment_count(),
            output_dir,
            simulation_log,
        })
    }

    fn calibrate_group(
        &self,
        crop: CropType,
        group: &TreatmentGroup,
        experiment_file: &Path,
    ) -> DssatResult<CalibratedCultivar> {
        let genotype_path = self.config.genotype_file(crop);
        let encoding = self.config.genotype_encoding(crop);

        let mut database = GenotypeDatabase::load(&genotype_path, encoding)?;
        let seeded = database.seed_missing(crop, &group.genotype_code, &group.cultivar_name)?;
        if seeded {
            database.save(&genotype_path, encoding)?;
            info!(cultivar = %group.genotype_code, "seeded genotype database");
        }

        let work_dir = self.config.glue_work_path();
        clear_work_dir(&work_dir)?;
        let batch_name = calibration_batch_file_name(crop, &group.cultivar_name);
        let batch = render_calibration_batch(crop, group, &experiment_file.display().to_string())?;
        write_text_artifact(&work_dir.join(&batch_name), &batch)?;

        let script_path = self.config.glue_script_path();
        let script = read_text(&script_path, TextEncoding::Utf8)?;
        let script = point_glue_script(&script, &batch_name).at_path(&script_path)?;
        write_text_atomic(&script_path, &script, TextEncoding::Utf8)?;

        let result_file = self.calibration.calibrate(&CalibrationRequest {
            crop,
            genotype_code: group.genotype_code.clone(),
            cultivar_name: group.cultivar_name.clone(),
            control: self.options.control,
        })?;
        let (calibrated_line, calibrated) = read_calibrated_line(&result_file, encoding)?;
        if calibrated.genotype_code != group.genotype_code {
            return Err(DssatError::reconcile(
                "GENOTYPE.CANDIDATE_MISMATCH",
                format!(
                    "calibration returned a record for {} instead of {}",
                    calibrated.genotype_code, group.genotype_code
                ),
            )
            .with_path(&result_file));
        }

        // Re-read: the file on disk is the only source of truth.
        let mut database = GenotypeDatabase::load(&genotype_path, encoding)?;
        database
            .install_calibrated_line(&calibrated_line)
            .at_path(&genotype_path)?;
        database.save(&genotype_path, encoding)?;
        info!(
            cultivar = %group.genotype_code,
            path = %genotype_path.display(),
            "installed calibrated genotype record"
        );

        Ok(CalibratedCultivar {
            genotype_code: group.genotype_code.clone(),
            cultivar_name: group.cultivar_name.clone(),
            seeded,
            result_file,
        })
    }

    fn simulate(
        &self,
        crop: CropType,
        identifier: &str,
        experiment_file: &Path,
        parsed: &ParsedExperiment,
    ) -> DssatResult<(PathBuf, PathBuf)> {
        let batch_file = self.config.crop_dir(crop).join(SIMULATION_BATCH_FILE);
        let batch = render_simulation_batch(
            crop,
            &[SimulationBatchEntry {
                experiment_path: experiment_file.display().to_string(),
                treatment_numbers: parsed.treatment_numbers(),
            }],
        )?;
        write_text_artifact(&batch_file, &batch)?;

        let output_dir = self
            .options
            .result_root
            .join(crop.as_str())
            .join(identifier);
        let simulation_log = self.simulation.simulate(&SimulationRequest {
            genotype_file: crop.profile().genotype_file.to_string(),
            run_mode: self.options.run_mode,
            batch_file,
            output_dir: output_dir.clone(),
        })?;
        Ok((output_dir, simulation_log))
    }
}

/// Experiment files directly inside `dir` with a known crop suffix, sorted
/// by name.
pub fn experiment_files_in(dir: &Path) -> DssatResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| {
        DssatError::io_system(
            "IO.EXPERIMENT_DIRECTORY",
            format!("failed to list '{}': {}", dir.display(), source),
        )
        .with_path(dir)
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| {
                DssatError::io_system(
                    "IO.EXPERIMENT_DIRECTORY",
                    format!("failed to list '{}': {}", dir.display(), source),
                )
                .with_path(dir)
            })?
            .path();
        if path.is_file() && identify_experiment(&path).is_ok() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn identify_experiment(path: &Path) -> DssatResult<(String, CropType)> {
    let identifier = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let crop = path
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy()))
        .and_then(|suffix| CropType::from_experiment_suffix(&suffix));
    match crop {
        Some(crop) if !identifier.is_empty() => Ok((identifier, crop)),
        _ => Err(DssatError::input_validation(
            "INPUT.EXPERIMENT_SUFFIX",
            format!(
                "'{}' is not an experiment file (.MZX or .RIX)",
                path.display()
            ),
        )
        .with_path(path)),
    }
}

/// The simulator only finds experiments inside the crop directory.
fn stage_experiment(source: &Path, crop_dir: &Path) -> DssatResult<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        DssatError::input_validation(
            "INPUT.EXPERIMENT_PATH",
            format!("'{}' does not name a file", source.display()),
        )
    })?;
    let staged = crop_dir.join(file_name);
    let same_file = match (fs::canonicalize(source), fs::canonicalize(&staged)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    };
    if same_file {
        return Ok(staged);
    }

    fs::create_dir_all(crop_dir)
        .and_then(|()| fs::copy(source, &staged))
        .map_err(|source_error| {
            DssatError::io_system(
                "IO.EXPERIMENT_STAGE",
                format!(
                    "failed to copy '{}' into '{}': {}",
                    source.display(),
                    crop_dir.display(),
                    source_error
                ),
            )
            .with_path(source)
        })?;
    Ok(staged)
}

/// Removes the files a previous calibration left behind; subdirectories stay.
fn clear_work_dir(work_dir: &Path) -> DssatResult<()> {
    let io_error = |source: std::io::Error| {
        DssatError::io_system(
            "IO.GLUE_WORK_DIRECTORY",
            format!("failed to clear '{}': {}", work_dir.display(), source),
        )
        .with_path(work_dir)
    };
    fs::create_dir_all(work_dir).map_err(io_error)?;
    for entry in fs::read_dir(work_dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() {
            fs::remove_file(&path).map_err(io_error)?;
        }
    }
    Ok(())
}

/// First line of a calibration result, kept verbatim next to its decoded form.
fn read_calibrated_line(
    path: &Path,
    encoding: TextEncoding,
) -> DssatResult<(String, GenotypeRecord)> {
    let text = read_text(path, encoding)?;
    let first_line = text.lines().next().unwrap_or_default();
    let record = GenotypeRecord::decode(first_line).ok_or_else(|| {
        DssatError::collaborator(
            "RUN.CALIBRATION_RECORD",
            format!(
                "first line of '{}' is not a genotype record: '{}'",
                path.display(),
                first_line
            ),
        )
        .with_path(path)
    })?;
    Ok((first_line.to_string(), record))
}

#[cfg(test)]
mod tests {
    use super::{clear_work_dir, experiment_files_in, identify_experiment};
    use crate::domain::CropType;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn experiments_are_identified_by_suffix() {
        let (identifier, crop) =
            identify_experiment(Path::new("/data/IBWA8301.RIX")).expect("rice experiment");
        assert_eq!(identifier, "IBWA8301");
        assert_eq!(crop, CropType::Rice);
        assert!(identify_experiment(Path::new("/data/IBWA8301.WHX")).is_err());
    }

    #[test]
    fn experiment_listing_skips_other_files() {
        let temp = TempDir::new().expect("tempdir should be created");
        for name in ["B.MZX", "A.RIX", "notes.txt", "DSSBatch.v47"] {
            fs::write(temp.path().join(name), "").expect("fixture written");
        }
        let files = experiment_files_in(temp.path()).expect("lists");
        let names: Vec<String> = files
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.RIX", "B.MZX"]);
    }

    #[test]
    fn clearing_the_work_dir_keeps_subdirectories() {
        let temp = TempDir::new().expect("tempdir should be created");
        let work = temp.path().join("GLWork");
        fs::create_dir_all(work.join("keep")).expect("subdir");
        fs::write(work.join("old.MZC"), "x").expect("stale file");
        clear_work_dir(&work).expect("clears");
        assert!(!work.join("old.MZC").exists());
        assert!(work.join("keep").is_dir());
    }
}
