//! Effective privilege checks
//!
//! The gate only checks. It never re-executes the build under another
//! identity; running with `sudo` is the caller's decision.

use crate::error::{UbiqError, UbiqResult};
use crate::stage::Stage;
use nix::unistd::Uid;

/// Effective uid of this process
pub fn effective_uid() -> u32 {
    Uid::effective().as_raw()
}

/// Rejects privileged stages when not running as root
#[derive(Debug, Clone, Copy)]
pub struct PrivilegeGate {
    euid: u32,
}

impl PrivilegeGate {
    /// Gate for the current process
    pub fn detect() -> Self {
        Self::with_euid(effective_uid())
    }

    /// Gate with an explicit effective uid
    pub fn with_euid(euid: u32) -> Self {
        Self { euid }
    }

    pub fn euid(&self) -> u32 {
        self.euid
    }

    pub fn is_elevated(&self) -> bool {
        self.euid == 0
    }

    /// Fail with `InsufficientPrivilege` if `stage` needs root and we lack it
    pub fn check(&self, stage: &Stage) -> UbiqResult<()> {
        if stage.privileged && !self.is_elevated() {
            return Err(UbiqError::InsufficientPrivilege {
                stage: stage.id.clone(),
                euid: self.euid,
            });
        }
        Ok(())
    }
}

impl Default for PrivilegeGate {
    fn default() -> Self {
        Self::detect()
    }
}
