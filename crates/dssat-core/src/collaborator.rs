//! The two external programs the orchestrator drives: the calibration script
//! and the simulation executable. Both take every path explicitly; nothing
//! depends on this process's working directory.

use crate::batch::calibration_result_file_name;
use crate::config::{CalibrationControl, InstallationConfig};
use crate::domain::{CropType, DssatError, DssatResult, RunMode};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const CALIBRATION_LOG_FILE: &str = "stdout.txt";
pub const SIMULATION_LOG_FILE: &str = "out.txt";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationRequest {
    pub crop: CropType,
    pub genotype_code: String,
    pub cultivar_name: String,
    pub control: CalibrationControl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    /// Base name of the genotype file, e.g. `MZCER047.CUL`.
    pub genotype_file: String,
    pub run_mode: RunMode,
    pub batch_file: PathBuf,
    pub output_dir: PathBuf,
}

pub trait CalibrationCollaborator {
    /// Runs one calibration and returns the path of its result file.
    fn calibrate(&self, request: &CalibrationRequest) -> DssatResult<PathBuf>;
}

pub trait SimulationCollaborator {
    /// Runs the simulator and returns the path of its captured output log.
    fn simulate(&self, request: &SimulationRequest) -> DssatResult<PathBuf>;
}

/// GLUE driven through `R --slave < Glue.r` from the installation root.
#[derive(Debug, Clone)]
pub struct GlueProcess {
    pub root: PathBuf,
    pub r_executable: PathBuf,
    pub r_args: Vec<String>,
    pub script: PathBuf,
    pub control_file: PathBuf,
    pub work_dir: PathBuf,
    pub timeout: Option<Duration>,
}

impl GlueProcess {
    pub fn from_config(config: &InstallationConfig) -> Self {
        Self {
            root: config.root.clone(),
            r_executable: config.r_executable.clone(),
            r_args: config.r_args.clone(),
            script: config.glue_script_path(),
            control_file: config.glue_control_path(),
            work_dir: config.glue_work_path(),
            timeout: config.calibration_timeout(),
        }
    }
}

impl CalibrationCollaborator for GlueProcess {
    fn calibrate(&self, request: &CalibrationRequest) -> DssatResult<PathBuf> {
        write_control_file(&self.control_file, request.control)?;

        let script = File::open(&self.script).map_err(|source| {
            DssatError::collaborator(
                "RUN.GLUE_SCRIPT",
                format!(
                    "failed to open calibration script '{}': {}",
                    self.script.display(),
                    source
                ),
            )
            .with_path(&self.script)
        })?;
        let log_path = self.work_dir.join(CALIBRATION_LOG_FILE);
        let log = create_log(&log_path)?;

        let mut command = Command::new(&self.r_executable);
        command
            .current_dir(&self.root)
            .args(&self.r_args)
            .stdin(Stdio::from(script))
            .stdout(Stdio::from(log));

        info!(
            cultivar = %request.genotype_code,
            iterations = request.control.iterations,
            "running calibration"
        );
        let status = run_with_timeout(&mut command, self.timeout, "calibration")?;
        ensure_success(status, "calibration", &log_path)?;

        let result = self.work_dir.join(calibration_result_file_name(
            request.crop,
            &request.genotype_code,
            &request.cultivar_name,
        ));
        if !result.is_file() {
            return Err(DssatError::collaborator(
                "RUN.CALIBRATION_OUTPUT",
                format!(
                    "calibration finished without writing '{}'",
                    result.display()
                ),
            )
            .with_path(&result));
        }
        Ok(result)
    }
}

/// The simulation executable, run with the output directory as its
/// working directory.
#[derive(Debug, Clone)]
pub struct DssatExecutable {
    pub executable: PathBuf,
    pub timeout: Option<Duration>,
}

impl DssatExecutable {
    pub fn from_config(config: &InstallationConfig) -> Self {
        Self {
            executable: config.simulation_executable_path(),
            timeout: config.simulation_timeout(),
        }
    }
}

impl SimulationCollaborator for DssatExecutable {
    fn simulate(&self, request: &SimulationRequest) -> DssatResult<PathBuf> {
        fs::create_dir_all(&request.output_dir).map_err(|source| {
            DssatError::io_system(
                "IO.OUTPUT_DIRECTORY",
                format!(
                    "failed to create output directory '{}': {}",
                    request.output_dir.display(),
                    source
                ),
            )
            .with_path(&request.output_dir)
        })?;
        let log_path = request.output_dir.join(SIMULATION_LOG_FILE);
        let log = create_log(&log_path)?;

        let mut command = Command::new(&self.executable);
        command
            .current_dir(&request.output_dir)
            .arg(&request.genotype_file)
            .arg(request.run_mode.flag().to_string())
            .arg(&request.batch_file)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log));

        info!(
            batch = %request.batch_file.display(),
            output = %request.output_dir.display(),
            mode = %request.run_mode,
            "running simulation"
        );
        let status = run_with_timeout(&mut command, self.timeout, "simulation")?;
        ensure_success(status, "simulation", &log_path)?;
        Ok(log_path)
    }
}

/// Overwrites the first two data rows of the control table: iterations,
/// then the mode flag, each in the second column.
pub fn write_control_file(path: &Path, control: CalibrationControl) -> DssatResult<()> {
    let control_error = |stage: &str, detail: String| {
        DssatError::collaborator(
            "RUN.GLUE_CONTROL",
            format!("failed to {} '{}': {}", stage, path.display(), detail),
        )
        .with_path(path)
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|error| control_error("open control file", error.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|error| control_error("read control header", error.to_string()))?
        .clone();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|error| control_error("read control row", error.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    drop(reader);

    let values = [control.iterations, control.mode_flag];
    if rows.len() < values.len() || rows.iter().take(values.len()).any(|row| row.len() < 2) {
        return Err(control_error(
            "update",
            "expected at least two rows with two columns".to_string(),
        ));
    }
    for (row, value) in rows.iter_mut().zip(values) {
        row[1] = value.to_string();
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|error| control_error("write control file", error.to_string()))?;
    writer
        .write_record(&headers)
        .map_err(|error| control_error("write control header", error.to_string()))?;
    for row in &rows {
        writer
            .write_record(row)
            .map_err(|error| control_error("write control row", error.to_string()))?;
    }
    writer
        .flush()
        .map_err(|error| control_error("flush control file", error.to_string()))?;
    debug!(
        path = %path.display(),
        iterations = control.iterations,
        mode_flag = control.mode_flag,
        "updated calibration control file"
    );
    Ok(())
}

/// Waits for the child, killing it once `timeout` elapses.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
    what: &str,
) -> DssatResult<ExitStatus> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command.spawn().map_err(|source| {
        DssatError::collaborator(
            "RUN.SPAWN",
            format!("failed to start {} program '{}': {}", what, program, source),
        )
        .with_path(&program)
    })?;

    let wait_error = |source: std::io::Error| {
        DssatError::collaborator(
            "RUN.WAIT",
            format!("failed to wait for {} program '{}': {}", what, program, source),
        )
    };

    let Some(timeout) = timeout else {
        return child.wait().map_err(wait_error);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(wait_error)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            // Kill can race with a natural exit; either way the child is reaped below.
            let _ = child.kill();
            let _ = child.wait();
            return Err(DssatError::collaborator_timeout(
                "RUN.TIMEOUT",
                format!(
                    "{} program '{}' did not finish within {}s",
                    what,
                    program,
                    timeout.as_secs_f64()
                ),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn ensure_success(status: ExitStatus, what: &str, log_path: &Path) -> DssatResult<()> {
    if status.success() {
        return Ok(());
    }
    let status_text = status.code().map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {}", code),
    );
    Err(DssatError::collaborator(
        "RUN.COLLABORATOR_EXIT",
        format!(
            "{} failed with {}; see '{}'",
            what,
            status_text,
            log_path.display()
        ),
    )
    .with_path(log_path))
}

fn create_log(path: &Path) -> DssatResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| {
            DssatError::io_system(
                "IO.OUTPUT_DIRECTORY",
                format!("failed to create '{}': {}", parent.display(), source),
            )
            .with_path(parent)
        })?;
    }
    File::create(path).map_err(|source| {
        DssatError::io_system(
            "IO.COLLABORATOR_LOG",
            format!("failed to create log '{}': {}", path.display(), source),
        )
        .with_path(path)
    })
}
