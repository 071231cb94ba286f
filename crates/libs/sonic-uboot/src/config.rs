//! Installer configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::env::fw_tools::{FW_PRINTENV, FW_SETENV};
use crate::env::FwEnv;

/// Path of the configuration file.
pub const CONFIG_PATH: &str = "/etc/sonic/uboot.toml";

/// Default number of image slots.
pub const DEFAULT_MAX_IMAGES: usize = 2;

/// Default prefix of image labels.
pub const DEFAULT_IMAGE_PREFIX: &str = "SONiC-OS-";

/// Default prefix of image directories.
pub const DEFAULT_IMAGE_DIR_PREFIX: &str = "image-";

/// Default mount point of the host filesystem holding the image directories.
pub const DEFAULT_HOST_PATH: &str = "/host";

/// Structure of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Number of image slots in the environment.
    pub max_images: Option<usize>,
    /// Prefix distinguishing image labels from other values.
    pub image_prefix: Option<String>,
    /// Prefix of image directory names.
    pub image_dir_prefix: Option<String>,
    /// Directory containing the image directories.
    pub host_path: Option<PathBuf>,
    /// Path of `fw_printenv`.
    pub fw_printenv: Option<PathBuf>,
    /// Path of `fw_setenv`.
    pub fw_setenv: Option<PathBuf>,
}

impl Config {
    /// Number of image slots (defaults to `2`).
    pub fn max_images(&self) -> usize {
        self.max_images.unwrap_or(DEFAULT_MAX_IMAGES)
    }

    /// Prefix of image labels (defaults to `SONiC-OS-`).
    pub fn image_prefix(&self) -> &str {
        self.image_prefix.as_deref().unwrap_or(DEFAULT_IMAGE_PREFIX)
    }

    /// Prefix of image directories (defaults to `image-`).
    pub fn image_dir_prefix(&self) -> &str {
        self.image_dir_prefix
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_DIR_PREFIX)
    }

    /// Directory containing the image directories (defaults to `/host`).
    pub fn host_path(&self) -> &Path {
        self.host_path
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_HOST_PATH))
    }

    /// Store using the configured U-Boot tools.
    pub fn fw_env(&self) -> FwEnv {
        FwEnv::new(
            self.fw_printenv
                .as_deref()
                .unwrap_or(Path::new(FW_PRINTENV)),
            self.fw_setenv.as_deref().unwrap_or(Path::new(FW_SETENV)),
        )
    }

    /// Check the configuration for values the registry cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_images() == 0 {
            return Err(ConfigError::Invalid("`max-images` must be at least 1"));
        }
        if self.image_prefix().is_empty() {
            return Err(ConfigError::Invalid("`image-prefix` must not be empty"));
        }
        Ok(())
    }
}

/// Error loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("unable to parse configuration file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Load the configuration, falling back to the defaults if the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let config = if path.exists() {
        let source = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_owned(),
            error,
        })?;
        toml::from_str(&source).map_err(|error| ConfigError::Parse {
            path: path.to_owned(),
            error,
        })?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_from_toml() {
        let config = toml::from_str::<Config>(indoc! {r#"
            max-images = 3
            image-prefix = "SONiC-OS-"
            image-dir-prefix = "image-"
            host-path = "/mnt/host"
            fw-printenv = "/sbin/fw_printenv"
        "#})
        .unwrap();
        assert_eq!(config.max_images(), 3);
        assert_eq!(config.host_path(), Path::new("/mnt/host"));
        assert_eq!(config.fw_env().printenv(), Path::new("/sbin/fw_printenv"));
        assert_eq!(config.fw_env().setenv(), Path::new(FW_SETENV));
    }

    #[test]
    fn test_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = load_config(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.max_images(), DEFAULT_MAX_IMAGES);
        assert_eq!(config.image_prefix(), "SONiC-OS-");
        assert_eq!(config.image_dir_prefix(), "image-");
        assert_eq!(config.host_path(), Path::new("/host"));
    }

    #[test]
    fn test_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("uboot.toml");
        fs::write(&path, "max-images = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
        fs::write(&path, "max-slots = 2\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
