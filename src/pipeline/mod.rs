//! The UbiQ-480 build pipeline
//!
//! Six stages produce the SD card image:
//!
//! ```text
//! bootloader ─────────────────────┐
//! kernel ──> dtb ─────────────────┤
//! bootscript ─────────────────────┼──> image
//! rootfs ─────────────────────────┘
//! ```
//!
//! `rootfs` and `image` need root; the rest build as a normal user.

pub mod context;
mod firmware;
mod image;
mod rootfs;
pub mod source;

pub use context::{BuildContext, OutputLayout, ProgressReporter, SilentReporter};
pub use firmware::{BootScript, Bootloader, DeviceTree, Kernel};
pub use image::{image_spec, DiskImage};
pub use rootfs::{board_files, RootFs};

use crate::error::UbiqResult;
use crate::stage::{Artifact, Stage, StageRegistry};
use std::sync::Arc;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Every stage of the board build, in dependency order
pub fn default_registry(ctx: &BuildContext) -> UbiqResult<StageRegistry> {
    let layout = &ctx.layout;
    let config = &ctx.config;
    let dtb_name = config.kernel.dtb_name();
    let mut registry = StageRegistry::new();

    registry.register(
        Stage::new(Bootloader::ID, "Build U-Boot", Arc::new(Bootloader))
            .output(Artifact::new(
                Bootloader::OUTPUT,
                layout.artifact(Bootloader::OUTPUT),
                512 * KIB,
            ))
            .tools(&["git", "make", "flex", "bison", "arm-linux-gnueabi-gcc"]),
    )?;

    registry.register(
        Stage::new(Kernel::ID, "Build the kernel zImage", Arc::new(Kernel))
            .output(Artifact::new(
                Kernel::OUTPUT,
                layout.artifact(Kernel::OUTPUT),
                6 * MIB,
            ))
            .tools(&[
                "git",
                "make",
                "flex",
                "bison",
                "arm-linux-gnueabi-gcc",
                "arm-linux-gnueabi-ld",
            ]),
    )?;

    registry.register(
        Stage::new(DeviceTree::ID, "Compile the board device tree", Arc::new(DeviceTree))
            .requires([Kernel::ID])
            .output(Artifact::new(
                dtb_name.as_str(),
                layout.artifact(&dtb_name),
                64 * KIB,
            ))
            .tools(&["git", "make", "arm-linux-gnueabi-gcc"]),
    )?;

    registry.register(
        Stage::new(BootScript::ID, "Compile the U-Boot boot script", Arc::new(BootScript))
            .output(Artifact::new(
                BootScript::OUTPUT,
                layout.artifact(BootScript::OUTPUT),
                4 * KIB,
            ))
            .tools(&["mkimage"]),
    )?;

    registry.register(
        Stage::new(RootFs::ID, "Bootstrap the Debian root filesystem", Arc::new(RootFs))
            .output(Artifact::new(
                RootFs::OUTPUT,
                layout.artifact(RootFs::OUTPUT),
                350 * MIB,
            ))
            .privileged()
            .tools(&["debootstrap"]),
    )?;

    registry.register(
        Stage::new(DiskImage::ID, "Assemble the SD card image", Arc::new(DiskImage))
            .requires([
                Bootloader::ID,
                Kernel::ID,
                DeviceTree::ID,
                BootScript::ID,
                RootFs::ID,
            ])
            .output(Artifact::new(
                config.image.file_name.as_str(),
                layout.artifact(&config.image.file_name),
                config.image.size_mb * MIB,
            ))
            .privileged()
            .tools(&[
                "sfdisk",
                "losetup",
                "partx",
                "mkfs.vfat",
                "mkfs.ext4",
                "mount",
                "umount",
                "cp",
            ]),
    )?;

    Ok(registry)
}

#[cfg(test)]
pub(crate) use context::testing;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::requirements::requirement;
    use tempfile::TempDir;

    #[test]
    fn all_resolves_in_declared_order() {
        let dir = TempDir::new().unwrap();
        let registry = default_registry(&testing::context(dir.path())).unwrap();

        let plan = registry.resolve(&["all"]).unwrap();
        assert_eq!(
            plan.stages(),
            &["bootloader", "kernel", "dtb", "bootscript", "rootfs", "image"]
        );
    }

    #[test]
    fn image_pulls_in_every_stage() {
        let dir = TempDir::new().unwrap();
        let registry = default_registry(&testing::context(dir.path())).unwrap();
        assert_eq!(registry.resolve(&["image"]).unwrap().len(), 6);
        assert_eq!(
            registry.resolve(&["dtb"]).unwrap().stages(),
            &["kernel", "dtb"]
        );
    }

    #[test]
    fn only_rootfs_and_image_are_privileged() {
        let dir = TempDir::new().unwrap();
        let registry = default_registry(&testing::context(dir.path())).unwrap();
        let privileged: Vec<&str> = registry
            .stages()
            .iter()
            .filter(|s| s.privileged)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(privileged, vec!["rootfs", "image"]);
    }

    #[test]
    fn every_stage_tool_has_install_hint() {
        let dir = TempDir::new().unwrap();
        let registry = default_registry(&testing::context(dir.path())).unwrap();
        for stage in registry.stages() {
            for tool in &stage.tools {
                assert!(requirement(tool).is_some(), "{} has no requirement", tool);
            }
        }
    }
}
