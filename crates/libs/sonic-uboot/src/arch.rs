//! Detection of platforms booting through U-Boot.

use tracing::{debug, warn};

/// Indicates whether the machine architecture is from the ARM family.
pub fn is_arm_machine(machine: &str) -> bool {
    machine.contains("arm") || machine.contains("aarch64")
}

/// Machine architecture of the running kernel as reported by `uname -m`.
pub fn machine() -> Option<String> {
    match nix::sys::utsname::uname() {
        Ok(info) => Some(info.machine().to_string_lossy().into_owned()),
        Err(error) => {
            warn!("unable to determine machine architecture: {error}");
            None
        }
    }
}

/// Indicates whether the images on this device are managed through U-Boot.
pub fn detect() -> bool {
    let Some(machine) = machine() else {
        return false;
    };
    debug!("machine architecture is {machine:?}");
    is_arm_machine(&machine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_arm_machine() {
        for machine in ["armv7l", "aarch64", "arm64", "armhf"] {
            assert!(is_arm_machine(machine), "{machine}");
        }
        for machine in ["x86_64", "i686", "riscv64", ""] {
            assert!(!is_arm_machine(machine), "{machine}");
        }
    }
}
