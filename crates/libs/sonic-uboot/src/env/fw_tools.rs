//! Environment access through U-Boot's userspace tools.

use std::path::{Path, PathBuf};

use tracing::debug;
use xscript::{read_str, run, Run};

use super::{EnvError, EnvStore};

/// Default path of `fw_printenv`.
pub const FW_PRINTENV: &str = "/usr/bin/fw_printenv";

/// Default path of `fw_setenv`.
pub const FW_SETENV: &str = "/usr/bin/fw_setenv";

/// Environment store using `fw_printenv` and `fw_setenv`.
#[derive(Debug, Clone)]
pub struct FwEnv {
    printenv: PathBuf,
    setenv: PathBuf,
}

impl FwEnv {
    /// Create a store using the tools at the given paths.
    pub fn new(printenv: impl Into<PathBuf>, setenv: impl Into<PathBuf>) -> Self {
        Self {
            printenv: printenv.into(),
            setenv: setenv.into(),
        }
    }

    /// Path of `fw_printenv`.
    pub fn printenv(&self) -> &Path {
        &self.printenv
    }

    /// Path of `fw_setenv`.
    pub fn setenv(&self) -> &Path {
        &self.setenv
    }
}

impl Default for FwEnv {
    fn default() -> Self {
        Self::new(FW_PRINTENV, FW_SETENV)
    }
}

impl EnvStore for FwEnv {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        // `fw_printenv` complains on stderr about undefined variables.
        let value = read_str!([&self.printenv, "-n", key].with_stderr(xscript::Out::Capture))
            .map_err(|error| EnvError::Command {
                command: format!("{} -n {key}", self.printenv.display()),
                message: error.to_string(),
            })?;
        Ok(Some(value.trim_end().to_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        debug!("setting {key}={value:?}");
        run!([&self.setenv, key, value].with_stderr(xscript::Out::Capture)).map_err(|error| {
            EnvError::Command {
                command: format!("{} {key} {value:?}", self.setenv.display()),
                message: error.to_string(),
            }
        })?;
        Ok(())
    }
}
