//! U-Boot's binary environment format.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{EnvError, EnvStore};

/// Size of the CRC32 header preceding the variables.
const HEADER_SIZE: usize = 4;

/// A decoded U-Boot environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvImage {
    environ: BTreeMap<String, String>,
}

impl EnvImage {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an environment from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Decode an environment from U-Boot's binary representation.
    ///
    /// The variables end at the first empty entry, anything after it is padding.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvError> {
        if data.len() <= HEADER_SIZE {
            return Err(EnvError::InvalidSize(data.len()));
        }
        let (header, body) = data.split_at(HEADER_SIZE);
        let checksum = crc32(body);
        if header != checksum {
            let mut found = [0; HEADER_SIZE];
            found.copy_from_slice(header);
            return Err(EnvError::InvalidChecksum {
                found,
                expected: checksum,
            });
        }
        let environ = body
            .split(|byte| *byte == 0)
            .take_while(|entry| !entry.is_empty())
            .map(|entry| -> Result<_, EnvError> {
                let entry = std::str::from_utf8(entry)?;
                let (key, value) = entry.split_once('=').ok_or(EnvError::InvalidEntry)?;
                Ok((key.to_owned(), value.to_owned()))
            })
            .collect::<Result<BTreeMap<_, _>, EnvError>>()?;
        Ok(Self { environ })
    }

    /// Set a value of the environment.
    pub fn set(&mut self, key: &str, value: impl AsRef<str>) {
        self.environ
            .insert(key.to_owned(), value.as_ref().to_owned());
    }

    /// Get a value from the environment.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.environ.get(key).map(String::as_str)
    }

    /// Remove a value from the environment.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.environ.remove(key)
    }

    /// Iterator over the variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.environ
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Encode the environment in U-Boot's binary representation.
    ///
    /// With a `size`, the result is zero-padded to exactly that many bytes.
    pub fn to_bytes(&self, size: Option<usize>) -> Result<Vec<u8>, EnvError> {
        let mut data = vec![0; HEADER_SIZE];
        for (key, value) in &self.environ {
            data.extend(key.as_bytes());
            data.push(b'=');
            data.extend(value.as_bytes());
            data.push(0);
        }
        // Terminating empty entry.
        data.push(0);
        if let Some(size) = size {
            if data.len() > size {
                return Err(EnvError::TooLarge {
                    size,
                    required: data.len(),
                });
            }
            data.resize(size, 0);
        }
        let checksum = crc32(&data[HEADER_SIZE..]);
        data[..HEADER_SIZE].copy_from_slice(&checksum);
        Ok(data)
    }

    /// Save the environment to a file.
    pub fn save(&self, path: impl AsRef<Path>, size: Option<usize>) -> Result<(), EnvError> {
        fs::write(path, self.to_bytes(size)?)?;
        Ok(())
    }
}

/// Compute the CRC32 checksum of the given data.
fn crc32(data: &[u8]) -> [u8; 4] {
    crc32fast::hash(data).to_le_bytes()
}

/// Environment store backed by an environment image file.
#[derive(Debug, Clone)]
pub struct FileEnv {
    path: PathBuf,
    size: Option<usize>,
}

impl FileEnv {
    /// Create a store for the given file.
    ///
    /// With a `size`, images are written padded to that size.
    pub fn new(path: impl Into<PathBuf>, size: Option<usize>) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Path of the environment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<EnvImage, EnvError> {
        match EnvImage::load(&self.path) {
            Err(EnvError::Io(error)) if error.kind() == io::ErrorKind::NotFound => {
                debug!("environment file {:?} does not exist", self.path);
                Ok(EnvImage::new())
            }
            result => result,
        }
    }
}

impl EnvStore for FileEnv {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        Ok(self.load()?.get(key).map(str::to_owned))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        let mut image = self.load()?;
        image.set(key, value);
        let mut new_path = self.path.clone().into_os_string();
        new_path.push(".new");
        let new_path = PathBuf::from(new_path);
        image.save(&new_path, self.size)?;
        File::open(&new_path)?.sync_all()?;
        fs::rename(&new_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut image = EnvImage::new();
        image.set("boot_next", "run sonic_image_1");
        let data = image.to_bytes(None).unwrap();
        assert_eq!(&data[4..], b"boot_next=run sonic_image_1\0\0");
        assert_eq!(data[..4], crc32fast::hash(&data[4..]).to_le_bytes());
    }

    #[test]
    fn test_decode_padded() {
        let mut image = EnvImage::new();
        image.set("sonic_version_1", "SONiC-OS-202311.1");
        image.set("sonic_version_2", "NONE");
        let data = image.to_bytes(Some(0x2000)).unwrap();
        assert_eq!(data.len(), 0x2000);
        assert_eq!(EnvImage::from_bytes(&data).unwrap(), image);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut image = EnvImage::new();
        image.set("boot_once", "run sonic_image_2");
        let mut data = image.to_bytes(None).unwrap();
        data[6] ^= 0xff;
        assert!(matches!(
            EnvImage::from_bytes(&data),
            Err(EnvError::InvalidChecksum { .. })
        ));
        assert!(matches!(
            EnvImage::from_bytes(&data[..3]),
            Err(EnvError::InvalidSize(3))
        ));
    }

    #[test]
    fn test_encode_too_large() {
        let mut image = EnvImage::new();
        image.set("sonic_dir_1", "image-202311.1");
        assert!(matches!(
            image.to_bytes(Some(8)),
            Err(EnvError::TooLarge { size: 8, .. })
        ));
    }

    #[test]
    fn test_file_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let env = FileEnv::new(temp_dir.path().join("uboot.env"), Some(0x1000));
        assert_eq!(env.get("boot_next").unwrap(), None);
        env.set("boot_next", "run sonic_image_2").unwrap();
        env.set("sonic_version_2", "SONiC-OS-202405.0").unwrap();
        assert_eq!(
            env.get("boot_next").unwrap().as_deref(),
            Some("run sonic_image_2")
        );
        assert_eq!(fs::metadata(env.path()).unwrap().len(), 0x1000);
        let image = EnvImage::load(env.path()).unwrap();
        assert_eq!(image.get("sonic_version_2"), Some("SONiC-OS-202405.0"));
    }
}
