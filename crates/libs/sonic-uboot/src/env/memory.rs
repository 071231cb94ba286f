//! In-memory environment.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EnvError, EnvStore};

/// Environment store kept in memory.
///
/// Every successful write is recorded, which allows checking exactly which mutations
/// an operation performed.
#[derive(Debug, Default)]
pub struct MemoryEnv {
    environ: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an environment with the given variables.
    pub fn with_vars<'v>(vars: impl IntoIterator<Item = (&'v str, &'v str)>) -> Self {
        let environ = vars
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();
        Self {
            environ: Mutex::new(environ),
            writes: Mutex::default(),
        }
    }

    /// Current value of a variable.
    pub fn var(&self, key: &str) -> Option<String> {
        lock(&self.environ).get(key).cloned()
    }

    /// Writes performed so far, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        lock(&self.writes).clone()
    }
}

/// Lock a mutex, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EnvStore for MemoryEnv {
    fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
        Ok(self.var(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        lock(&self.environ).insert(key.to_owned(), value.to_owned());
        lock(&self.writes).push((key.to_owned(), value.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use super::*;

    #[test]
    fn test_usable_after_panic() {
        let env = MemoryEnv::with_vars([("boot_next", "run sonic_image_1")]);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _guard = env.environ.lock().unwrap();
            panic!("panic while holding the lock");
        }));
        assert!(result.is_err());
        assert!(env.environ.is_poisoned());
        env.set("boot_next", "run sonic_image_2").unwrap();
        assert_eq!(env.var("boot_next").as_deref(), Some("run sonic_image_2"));
        assert_eq!(
            env.writes(),
            [("boot_next".to_owned(), "run sonic_image_2".to_owned())]
        );
    }
}
