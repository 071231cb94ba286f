//! Stores for the bootloader environment.
//!
//! The registry only ever talks to the environment through [`EnvStore`]. On a device,
//! this is [`FwEnv`] which drives U-Boot's `fw_printenv` and `fw_setenv` tools. For
//! offline images there is [`FileEnv`] and for tests there is [`MemoryEnv`].

use std::fmt::Debug;
use std::io;

use thiserror::Error;

pub mod fw_tools;
pub mod memory;
pub mod uboot;

pub use fw_tools::FwEnv;
pub use memory::MemoryEnv;
pub use uboot::{EnvImage, FileEnv};

/// Persistent key/value store holding the bootloader environment.
pub trait EnvStore: Debug {
    /// Get the value of a variable, `None` if it is not defined.
    fn get(&self, key: &str) -> Result<Option<String>, EnvError>;

    /// Set a variable to the given value.
    fn set(&self, key: &str, value: &str) -> Result<(), EnvError>;
}

impl<S: EnvStore + ?Sized> EnvStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        (**self).set(key, value)
    }
}

impl<S: EnvStore + ?Sized> EnvStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        (**self).set(key, value)
    }
}

/// Error accessing the bootloader environment.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid size of environment ({0} bytes)")]
    InvalidSize(usize),
    #[error("invalid CRC32 checksum (found: {found:?}, expected: {expected:?})")]
    InvalidChecksum { found: [u8; 4], expected: [u8; 4] },
    #[error("invalid UTF-8 encoding in entry")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("invalid entry without `=`")]
    InvalidEntry,
    #[error("environment does not fit into {size} bytes ({required} bytes required)")]
    TooLarge { size: usize, required: usize },
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },
}
