//! Stack of acquired block-device resources
//!
//! Every loop attachment, partition activation and mount is pushed after it
//! succeeds and released strictly last-in first-out. [`MountSession::unwind`]
//! always empties the stack, even when a release fails.

use super::DiskOps;
use crate::error::{UbiqError, UbiqResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One acquired resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Loop(String),
    Partition { loop_device: String, number: usize },
    Mount(PathBuf),
}

pub struct MountSession<'a> {
    ops: &'a dyn DiskOps,
    stack: Vec<Resource>,
}

impl<'a> MountSession<'a> {
    pub fn new(ops: &'a dyn DiskOps) -> Self {
        Self {
            ops,
            stack: Vec::new(),
        }
    }

    /// Attach `image` to a free loop device
    pub async fn attach_loop(&mut self, image: &Path) -> UbiqResult<String> {
        let device = self.ops.attach_loop(image).await?;
        debug!("Attached {} to {}", image.display(), device);
        self.stack.push(Resource::Loop(device.clone()));
        Ok(device)
    }

    /// Expose partition `number` of `loop_device` as a block device
    pub async fn activate(&mut self, loop_device: &str, number: usize) -> UbiqResult<String> {
        let device = self.ops.activate_partition(loop_device, number).await?;
        self.stack.push(Resource::Partition {
            loop_device: loop_device.to_string(),
            number,
        });
        Ok(device)
    }

    pub async fn mount(&mut self, device: &str, mount_point: &Path) -> UbiqResult<()> {
        self.ops.mount(device, mount_point).await?;
        self.stack.push(Resource::Mount(mount_point.to_path_buf()));
        Ok(())
    }

    /// Release the most recent resource. It stays on the stack if the
    /// release fails, so a later [`unwind`](Self::unwind) retries it.
    pub async fn release_top(&mut self) -> UbiqResult<()> {
        let Some(resource) = self.stack.last().cloned() else {
            return Ok(());
        };
        self.release(&resource).await?;
        self.stack.pop();
        Ok(())
    }

    /// Release everything in reverse acquisition order.
    ///
    /// Keeps going after a failed release; returns every failure.
    pub async fn unwind(&mut self) -> Vec<UbiqError> {
        let mut errors = Vec::new();
        while let Some(resource) = self.stack.pop() {
            if let Err(e) = self.release(&resource).await {
                warn!("Failed to release {:?}: {}", resource, e);
                errors.push(e);
            }
        }
        errors
    }

    async fn release(&self, resource: &Resource) -> UbiqResult<()> {
        debug!("Releasing {:?}", resource);
        match resource {
            Resource::Mount(mount_point) => self.ops.unmount(mount_point).await,
            Resource::Partition {
                loop_device,
                number,
            } => self.ops.deactivate_partition(loop_device, *number).await,
            Resource::Loop(device) => self.ops.detach_loop(device).await,
        }
    }

    /// Held resources, oldest first
    pub fn resources(&self) -> &[Resource] {
        &self.stack
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl Drop for MountSession<'_> {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            warn!(
                "Mount session dropped while holding {:?}; release them manually",
                self.stack
            );
        }
    }
}
