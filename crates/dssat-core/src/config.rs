//! Installation layout and calibration control settings.

use crate::domain::{CropType, TextEncoding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INSTALLATION_ROOT: &str = "C:\\DSSAT47";
pub const DEFAULT_CALIBRATION_ITERATIONS: u32 = 5000;
pub const DEFAULT_CALIBRATION_MODE_FLAG: u32 = 1;

/// Where the simulator, the calibration script and their shared files live.
/// Relative paths resolve against `root`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallationConfig {
    pub root: PathBuf,
    pub simulation_executable: PathBuf,
    pub genotype_dir: PathBuf,
    pub r_executable: PathBuf,
    pub r_args: Vec<String>,
    pub glue_dir: PathBuf,
    pub glue_script: String,
    pub glue_control_file: String,
    pub glue_work_dir: PathBuf,
    pub calibration_timeout_secs: Option<u64>,
    pub simulation_timeout_secs: Option<u64>,
    pub genotype_encodings: BTreeMap<CropType, TextEncoding>,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_INSTALLATION_ROOT),
            simulation_executable: PathBuf::from("DSCSM047.EXE"),
            genotype_dir: PathBuf::from("Genotype"),
            r_executable: PathBuf::from("R"),
            r_args: vec!["--slave".to_string()],
            glue_dir: PathBuf::from("Tools").join("GLUE"),
            glue_script: "Glue.r".to_string(),
            glue_control_file: "SimulationControl.csv".to_string(),
            glue_work_dir: PathBuf::from("GLWork"),
            calibration_timeout_secs: Some(6 * 60 * 60),
            simulation_timeout_secs: Some(60 * 60),
            genotype_encodings: BTreeMap::new(),
        }
    }
}

impl InstallationConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// `<root>/Maize`, where experiment files and the simulation batch live.
    pub fn crop_dir(&self, crop: CropType) -> PathBuf {
        self.root.join(crop.profile().display_name)
    }

    pub fn genotype_file(&self, crop: CropType) -> PathBuf {
        self.resolve(&self.genotype_dir)
            .join(crop.profile().genotype_file)
    }

    pub fn genotype_encoding(&self, crop: CropType) -> TextEncoding {
        self.genotype_encodings
            .get(&crop)
            .copied()
            .unwrap_or(crop.profile().genotype_encoding)
    }

    pub fn simulation_executable_path(&self) -> PathBuf {
        self.resolve(&self.simulation_executable)
    }

    pub fn glue_dir_path(&self) -> PathBuf {
        self.resolve(&self.glue_dir)
    }

    pub fn glue_script_path(&self) -> PathBuf {
        self.glue_dir_path().join(&self.glue_script)
    }

    pub fn glue_control_path(&self) -> PathBuf {
        self.glue_dir_path().join(&self.glue_control_file)
    }

    pub fn glue_work_path(&self) -> PathBuf {
        self.resolve(&self.glue_work_dir)
    }

    pub fn calibration_timeout(&self) -> Option<Duration> {
        self.calibration_timeout_secs.map(Duration::from_secs)
    }

    pub fn simulation_timeout(&self) -> Option<Duration> {
        self.simulation_timeout_secs.map(Duration::from_secs)
    }
}

/// Settings the calibration script reads from its control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CalibrationControl {
    pub iterations: u32,
    pub mode_flag: u32,
}

impl Default for CalibrationControl {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_CALIBRATION_ITERATIONS,
            mode_flag: DEFAULT_CALIBRATION_MODE_FLAG,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstallationConfigError {
    #[error("failed to read installation config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse installation config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub fn load_installation_config(
    config_path: impl AsRef<Path>,
) -> Result<InstallationConfig, InstallationConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| InstallationConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| InstallationConfigError::Parse {
        path: config_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{InstallationConfig, InstallationConfigError, load_installation_config};
    use crate::domain::{CropType, TextEncoding};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn defaults_follow_the_standard_installation_layout() {
        let config = InstallationConfig::with_root("/opt/dssat");
        assert_eq!(config.crop_dir(CropType::Rice), PathBuf::from("/opt/dssat/Rice"));
        assert_eq!(
            config.genotype_file(CropType::Maize),
            PathBuf::from("/opt/dssat/Genotype/MZCER047.CUL")
        );
        assert_eq!(
            config.glue_script_path(),
            PathBuf::from("/opt/dssat/Tools/GLUE/Glue.r")
        );
        assert_eq!(config.genotype_encoding(CropType::Rice), TextEncoding::Gbk);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("installation.json");
        fs::write(
            &path,
            r#"{"root": "/srv/dssat", "r_executable": "/usr/bin/R", "genotype_encodings": {"rice": "utf-8"}}"#,
        )
        .expect("config written");

        let config = load_installation_config(&path).expect("config loads");
        assert_eq!(config.root, PathBuf::from("/srv/dssat"));
        assert_eq!(config.r_executable, PathBuf::from("/usr/bin/R"));
        assert_eq!(config.r_args, vec!["--slave".to_string()]);
        assert_eq!(config.genotype_encoding(CropType::Rice), TextEncoding::Utf8);
    }

    #[test]
    fn unknown_fields_and_missing_files_are_reported() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("installation.json");
        fs::write(&path, r#"{"rooot": "/srv"}"#).expect("config written");
        assert!(matches!(
            load_installation_config(&path),
            Err(InstallationConfigError::Parse { .. })
        ));
        assert!(matches!(
            load_installation_config(temp.path().join("missing.json")),
            Err(InstallationConfigError::Read { .. })
        ));
    }
}
