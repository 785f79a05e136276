//! SD card image assembly
//!
//! The assembler drives a [`DiskOps`] implementation through a fixed
//! sequence: create the file, write the partition table, attach a loop
//! device, then activate, format, mount and populate each partition. All
//! block-device state lives on a [`MountSession`] so it is released in
//! reverse order whatever step fails.

mod assembler;
mod host;
pub mod layout;
pub mod session;

pub use assembler::{ImageAssembler, ImageLock};
pub use host::HostDiskOps;
pub use layout::{Filesystem, ImageSpec, PartitionContent, PartitionSpec};
pub use session::{MountSession, Resource};

use crate::error::UbiqResult;
use async_trait::async_trait;
use std::path::Path;

/// Host operations needed to build a partitioned image
#[async_trait]
pub trait DiskOps: Send + Sync {
    /// Create (or replace) a sparse file of `bytes`
    async fn create_image(&self, path: &Path, bytes: u64) -> UbiqResult<()>;

    /// Write a DOS partition table from an `sfdisk` script
    async fn write_partition_table(&self, image: &Path, script: &str) -> UbiqResult<()>;

    /// Attach the image to a loop device and return the device path
    async fn attach_loop(&self, image: &Path) -> UbiqResult<String>;

    /// Create the device node for one partition and return its path
    async fn activate_partition(&self, loop_device: &str, number: usize) -> UbiqResult<String>;

    async fn format(&self, device: &str, filesystem: Filesystem, label: &str) -> UbiqResult<()>;

    async fn mount(&self, device: &str, mount_point: &Path) -> UbiqResult<()>;

    /// Copy content onto a mounted partition
    async fn populate(&self, content: &PartitionContent, mount_point: &Path) -> UbiqResult<()>;

    async fn unmount(&self, mount_point: &Path) -> UbiqResult<()>;

    async fn deactivate_partition(&self, loop_device: &str, number: usize) -> UbiqResult<()>;

    async fn detach_loop(&self, loop_device: &str) -> UbiqResult<()>;
}
