//! Registry of the images installed in the environment's slots.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_HOST_PATH, DEFAULT_IMAGE_DIR_PREFIX, DEFAULT_IMAGE_PREFIX};
use crate::env::{EnvError, EnvStore};
use crate::slots::{
    resolve_boot_selector, SlotEntry, SlotIdx, SlotTable, BOOT_NEXT, BOOT_ONCE, NONE,
};

/// Error of a registry operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("image {0:?} is not installed")]
    NotInstalled(String),
    #[error("image {0:?} is the last installed image and cannot be removed")]
    LastImage(String),
    #[error("unable to update bootloader environment")]
    Store(#[from] EnvError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Image registry on top of a bootloader environment.
///
/// The environment is the only source of truth. Every operation reads the slots anew,
/// so changes made by other tools between two calls are always picked up.
#[derive(Debug)]
pub struct SlotRegistry<S> {
    store: S,
    max_images: usize,
    image_prefix: String,
    image_dir_prefix: String,
    host_path: PathBuf,
}

impl<S: EnvStore> SlotRegistry<S> {
    /// Create a registry with `max_images` slots and the default naming conventions.
    pub fn new(store: S, max_images: usize) -> Self {
        Self {
            store,
            max_images,
            image_prefix: DEFAULT_IMAGE_PREFIX.to_owned(),
            image_dir_prefix: DEFAULT_IMAGE_DIR_PREFIX.to_owned(),
            host_path: PathBuf::from(DEFAULT_HOST_PATH),
        }
    }

    /// Create a registry as described by the configuration.
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.max_images())
            .with_prefixes(config.image_prefix(), config.image_dir_prefix())
            .with_host_path(config.host_path())
    }

    /// Use the given prefixes for image labels and image directories.
    pub fn with_prefixes(mut self, image_prefix: &str, image_dir_prefix: &str) -> Self {
        self.image_prefix = image_prefix.to_owned();
        self.image_dir_prefix = image_dir_prefix.to_owned();
        self
    }

    /// Use the given directory as the location of the image directories.
    pub fn with_host_path(mut self, host_path: impl Into<PathBuf>) -> Self {
        self.host_path = host_path.into();
        self
    }

    /// The underlying environment store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of slots.
    pub fn max_images(&self) -> usize {
        self.max_images
    }

    /// Name of the directory of an image.
    pub fn image_dir(&self, image: &str) -> String {
        image.replace(&self.image_prefix, &self.image_dir_prefix)
    }

    /// Path of the directory holding the root filesystem of an image.
    ///
    /// Returns `None` if the directory name is not a single plain path component, as
    /// the path would then not be inside the host directory.
    pub fn image_path(&self, image: &str) -> Option<PathBuf> {
        let image_dir = self.image_dir(image);
        let mut components = Path::new(&image_dir).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.host_path.join(image_dir)),
            _ => None,
        }
    }

    /// Read a variable, treating read errors like undefined variables.
    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|error| {
            debug!("unable to read {key}: {error}");
            None
        })
    }

    /// Snapshot of the images installed in the slots.
    pub fn installed_images(&self) -> SlotTable {
        let entries = SlotIdx::all(self.max_images)
            .map(|idx| match self.read(&idx.version_key()) {
                Some(label) if label.contains(&self.image_prefix) => SlotEntry::Image(label),
                _ => SlotEntry::Empty,
            })
            .collect();
        SlotTable::new(entries)
    }

    /// Slot booted by default.
    ///
    /// Falls back to the first slot if `boot_next` does not point at any slot.
    pub fn next_slot(&self) -> SlotIdx {
        let boot_next = self.read(BOOT_NEXT).unwrap_or_default();
        resolve_boot_selector(&boot_next, self.max_images).unwrap_or_else(|| {
            debug!("`{BOOT_NEXT}` ({boot_next:?}) does not reference a slot");
            SlotIdx::FIRST
        })
    }

    /// Image booted by default, which may be an empty slot.
    pub fn next_image(&self) -> SlotEntry {
        let images = self.installed_images();
        images
            .get(self.next_slot())
            .cloned()
            .unwrap_or(SlotEntry::Empty)
    }

    /// Make the given image the default for all following boots.
    ///
    /// The image must be installed under exactly this label. The slot to boot is then
    /// the first one whose label contains the given one.
    pub fn set_default_image(&self, image: &str) -> RegistryResult<SlotIdx> {
        let images = self.installed_images();
        if !images.contains(image) {
            return Err(RegistryError::NotInstalled(image.to_owned()));
        }
        let Some(idx) = images.find_containing(&[image]) else {
            return Err(RegistryError::NotInstalled(image.to_owned()));
        };
        info!("setting default image to {image} (slot {idx})");
        self.store.set(BOOT_NEXT, &idx.boot_command())?;
        Ok(idx)
    }

    /// Boot the given image once on the next boot.
    ///
    /// The image may also be given by its directory name. Returns `None` without
    /// changing anything if no slot matches. Afterwards, the bootloader falls back to
    /// the default image on its own.
    pub fn set_next_image(&self, image: &str) -> RegistryResult<Option<SlotIdx>> {
        let images = self.installed_images();
        let image_dir = self.image_dir(image);
        let idx = images
            .find_containing(&[image, &image_dir])
            .or_else(|| {
                images
                    .images()
                    .find(|(_, label)| self.image_dir(label).contains(image))
                    .map(|(idx, _)| idx)
            });
        let Some(idx) = idx else {
            warn!("no slot matches {image:?}, next boot is unchanged");
            return Ok(None);
        };
        info!("setting next boot to {} (slot {idx})", images[idx]);
        self.store.set(BOOT_ONCE, &idx.boot_command())?;
        Ok(Some(idx))
    }

    /// Remove an installed image.
    ///
    /// The first other installed image becomes the default. Removing the last image is
    /// refused. Once the default has been moved, all steps are carried out even if some
    /// of them fail; the failures are part of the returned [`Removal`].
    pub fn remove_image(&self, image: &str) -> RegistryResult<Removal> {
        let images = self.installed_images();
        let Some(slot) = images.find(image) else {
            return Err(RegistryError::NotInstalled(image.to_owned()));
        };
        let Some(fallback) = images.first_other_image(slot) else {
            return Err(RegistryError::LastImage(image.to_owned()));
        };
        let mut removal = Removal {
            slot,
            fallback,
            failures: Vec::new(),
        };

        info!("updating next boot to slot {fallback}");
        let writes = [
            (BOOT_NEXT.to_owned(), fallback.boot_command()),
            (slot.image_key(), NONE.to_owned()),
            (slot.version_key(), NONE.to_owned()),
            (slot.dir_key(), NONE.to_owned()),
        ];
        for (key, value) in writes {
            if let Err(error) = self.store.set(&key, &value) {
                let step = if key == BOOT_NEXT {
                    RemovalStep::SetDefault
                } else {
                    RemovalStep::ClearVar(key)
                };
                warn!("unable to {step}: {error}");
                removal.failures.push(RemovalFailure {
                    step,
                    error: Box::new(error),
                });
            }
        }

        let result = match self.image_path(image) {
            Some(path) => {
                info!("removing image root filesystem {path:?}");
                remove_dir(&path).map_err(|error| (path, error))
            }
            None => Err((
                PathBuf::from(self.image_dir(image)),
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "image directory is not a plain name inside the host directory",
                ),
            )),
        };
        if let Err((path, error)) = result {
            let step = RemovalStep::DeleteDirectory(path);
            warn!("unable to {step}: {error}");
            removal.failures.push(RemovalFailure {
                step,
                error: Box::new(error),
            });
        }
        Ok(removal)
    }
}

/// Recursively remove a directory, succeeding if it does not exist.
fn remove_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("image directory {path:?} does not exist");
            Ok(())
        }
        result => result,
    }
}

/// Outcome of removing an image.
#[derive(Debug)]
pub struct Removal {
    /// Slot the image has been removed from.
    pub slot: SlotIdx,
    /// Slot which is now booted by default.
    pub fallback: SlotIdx,
    /// Steps which failed.
    pub failures: Vec<RemovalFailure>,
}

impl Removal {
    /// Indicates whether all steps succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Best-effort step of removing an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalStep {
    /// Point `boot_next` at the fallback slot.
    SetDefault,
    /// Reset a variable of the removed slot to `NONE`.
    ClearVar(String),
    /// Delete the image directory.
    DeleteDirectory(PathBuf),
}

impl fmt::Display for RemovalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalStep::SetDefault => write!(f, "set `{BOOT_NEXT}`"),
            RemovalStep::ClearVar(key) => write!(f, "clear `{key}`"),
            RemovalStep::DeleteDirectory(path) => write!(f, "delete {path:?}"),
        }
    }
}

/// Failed step of removing an image.
#[derive(Debug)]
pub struct RemovalFailure {
    pub step: RemovalStep,
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnv;

    const IMAGE_A: &str = "SONiC-OS-202311.1";
    const IMAGE_B: &str = "SONiC-OS-202405.0";

    fn registry(vars: &[(&str, &str)]) -> SlotRegistry<MemoryEnv> {
        SlotRegistry::new(MemoryEnv::with_vars(vars.iter().copied()), 2)
    }

    #[test]
    fn test_installed_images_normalizes() {
        let registry = registry(&[
            ("sonic_version_1", IMAGE_A),
            ("sonic_version_2", "garbage"),
        ]);
        let images = registry.installed_images();
        assert_eq!(images.len(), 2);
        assert_eq!(images.labels(), [IMAGE_A, NONE]);

        let empty = SlotRegistry::new(MemoryEnv::new(), 4).installed_images();
        assert_eq!(empty.labels(), [NONE; 4]);
    }

    #[test]
    fn test_next_image() {
        let registry = registry(&[
            ("sonic_version_1", IMAGE_A),
            ("sonic_version_2", IMAGE_B),
            ("boot_next", "run sonic_image_2"),
        ]);
        assert_eq!(registry.next_image(), SlotEntry::Image(IMAGE_B.to_owned()));
        registry.store().set("boot_next", "run sonic_image_7").unwrap();
        assert_eq!(registry.next_image(), SlotEntry::Image(IMAGE_A.to_owned()));
        registry.store().set("sonic_version_1", NONE).unwrap();
        assert_eq!(registry.next_image(), SlotEntry::Empty);
    }

    #[test]
    fn test_set_default_image() {
        let registry = registry(&[
            ("sonic_version_1", IMAGE_A),
            ("sonic_version_2", IMAGE_B),
        ]);
        assert_eq!(
            registry.set_default_image(IMAGE_B).unwrap(),
            SlotIdx::new(2).unwrap()
        );
        assert_eq!(
            registry.store().var("boot_next").as_deref(),
            Some("run sonic_image_2")
        );
        assert_eq!(registry.next_image().image(), Some(IMAGE_B));
    }

    #[test]
    fn test_set_default_image_not_installed() {
        let registry = registry(&[
            ("sonic_version_1", IMAGE_A),
            ("boot_next", "run sonic_image_1"),
        ]);
        for image in [IMAGE_B, NONE, "SONiC-OS-"] {
            assert!(matches!(
                registry.set_default_image(image),
                Err(RegistryError::NotInstalled(_))
            ));
        }
        assert!(registry.store().writes().is_empty());
    }

    #[test]
    fn test_set_next_image() {
        let registry = registry(&[
            ("sonic_version_1", IMAGE_A),
            ("sonic_version_2", IMAGE_B),
        ]);
        assert_eq!(
            registry.set_next_image(IMAGE_A).unwrap(),
            Some(SlotIdx::FIRST)
        );
        assert_eq!(
            registry.store().var("boot_once").as_deref(),
            Some("run sonic_image_1")
        );
        assert_eq!(registry.set_next_image("SONiC-OS-missing").unwrap(), None);
        assert_eq!(registry.store().writes().len(), 1);
    }

    #[test]
    fn test_remove_refuses() {
        let registry = registry(&[
            ("sonic_version_1", IMAGE_A),
            ("boot_next", "run sonic_image_1"),
        ]);
        assert!(matches!(
            registry.remove_image(IMAGE_B),
            Err(RegistryError::NotInstalled(_))
        ));
        assert!(matches!(
            registry.remove_image(IMAGE_A),
            Err(RegistryError::LastImage(_))
        ));
        assert!(registry.store().writes().is_empty());
    }

    #[test]
    fn test_image_path() {
        let registry = registry(&[]).with_host_path("/host");
        assert_eq!(
            registry.image_path(IMAGE_A),
            Some(PathBuf::from("/host/image-202311.1"))
        );
        for image in ["/SONiC-OS-x", "../SONiC-OS-x", "a/SONiC-OS-x", "SONiC-OS-x/.."] {
            assert_eq!(registry.image_path(image), None, "{image:?}");
        }
    }
}
