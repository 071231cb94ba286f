//! Execution of installer payloads.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use xscript::{run, Run};

/// Error running an installer payload.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("installer {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("installer {path:?} failed: {message}")]
    Failed { path: PathBuf, message: String },
}

/// Run the self-extracting installer at the given path.
///
/// The installer writes the image into a free slot and updates the environment on its
/// own. Its output is passed through to the user.
pub fn install_image(path: impl AsRef<Path>) -> Result<(), InstallError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(InstallError::NotFound(path.to_owned()));
    }
    info!("running installer {path:?}");
    run!(["bash", path]).map_err(|error| InstallError::Failed {
        path: path.to_owned(),
        message: error.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_installer() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sonic.bin");
        assert!(matches!(install_image(&path), Err(InstallError::NotFound(p)) if p == path));
    }
}
