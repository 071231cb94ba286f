//! Management of SONiC images on devices booting through U-Boot.
//!
//! The installed images live in numbered slots described by U-Boot environment
//! variables (`sonic_version_<n>`, `sonic_dir_<n>`, and `sonic_image_<n>`). The
//! variables `boot_next` and `boot_once` select the slot to boot by default and on the
//! next boot only, respectively. [`SlotRegistry`] implements the operations on these
//! slots on top of an [`EnvStore`](env::EnvStore).

pub mod arch;
pub mod config;
pub mod env;
pub mod install;
pub mod registry;
pub mod slots;

pub use arch::detect;
pub use install::install_image;
pub use registry::{
    RegistryError, RegistryResult, Removal, RemovalFailure, RemovalStep, SlotRegistry,
};
pub use slots::{SlotEntry, SlotIdx, SlotTable};
