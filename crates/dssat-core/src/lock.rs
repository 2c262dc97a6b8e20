use crate::domain::{DssatError, DssatResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const INSTALLATION_LOCK_FILE: &str = ".dssat-glue.lock";

/// Exclusive claim on one simulator installation. The collaborators share
/// fixed files under the root, so only one run may drive them at a time.
/// Released when dropped.
#[derive(Debug)]
pub struct InstallationLock {
    path: PathBuf,
}

impl InstallationLock {
    pub fn acquire(root: &Path) -> DssatResult<Self> {
        let path = root.join(INSTALLATION_LOCK_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                let error = if source.kind() == ErrorKind::AlreadyExists {
                    DssatError::collaborator(
                        "RUN.INSTALLATION_LOCKED",
                        format!(
                            "installation '{}' is in use by another run; remove '{}' if that run is gone",
                            root.display(),
                            path.display()
                        ),
                    )
                } else {
                    DssatError::io_system(
                        "IO.INSTALLATION_LOCK",
                        format!("failed to create lock file '{}': {}", path.display(), source),
                    )
                };
                error.with_path(&path)
            })?;

        // Owner pid only helps whoever inspects a stale lock.
        if let Err(source) = writeln!(file, "{}", std::process::id()) {
            warn!(path = %path.display(), error = %source, "failed to record lock owner");
        }
        debug!(path = %path.display(), "acquired installation lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallationLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "released installation lock"),
            Err(error) => warn!(
                path = %self.path.display(),
                error = %error,
                "failed to remove installation lock"
            ),
        }
    }
}
