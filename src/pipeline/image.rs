//! Final SD card image stage

use super::firmware::{BootScript, Bootloader, Kernel};
use super::rootfs::RootFs;
use super::BuildContext;
use crate::cache::Fingerprint;
use crate::error::UbiqResult;
use crate::image::{Filesystem, ImageAssembler, ImageSpec, PartitionContent, PartitionSpec};
use crate::stage::StageAction;
use async_trait::async_trait;

/// Disk identifier written into the DOS label
pub const LABEL_ID: u32 = 0xfeed_cafe;

/// Two partitions: FAT32 boot files, ext4 root filling the rest
pub fn image_spec(ctx: &BuildContext) -> ImageSpec {
    let cfg = &ctx.config.image;
    let dtb = ctx.config.kernel.dtb_name();

    let boot_files = [Bootloader::OUTPUT, Kernel::OUTPUT, dtb.as_str(), BootScript::OUTPUT]
        .into_iter()
        .map(|name| (ctx.layout.artifact(name), name.to_string()))
        .collect();

    ImageSpec {
        path: ctx.layout.artifact(&cfg.file_name),
        size_mb: cfg.size_mb,
        label_id: LABEL_ID,
        partitions: vec![
            PartitionSpec {
                name: "boot".to_string(),
                filesystem: Filesystem::Vfat,
                size_mb: Some(cfg.boot_size_mb),
                label: cfg.boot_label.clone(),
                bootable: true,
                content: PartitionContent::Files(boot_files),
            },
            PartitionSpec {
                name: "root".to_string(),
                filesystem: Filesystem::Ext4,
                size_mb: None,
                label: cfg.root_label.clone(),
                bootable: false,
                content: PartitionContent::Tree(ctx.layout.artifact(RootFs::OUTPUT)),
            },
        ],
    }
}

pub struct DiskImage;

impl DiskImage {
    pub const ID: &'static str = "image";
}

#[async_trait]
impl StageAction for DiskImage {
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String> {
        let cfg = &ctx.config.image;
        Ok(Fingerprint::new(Self::ID)
            .field("layout", image_spec(ctx).sfdisk_script())
            .field("size_mb", cfg.size_mb.to_string())
            .field("boot_label", &cfg.boot_label)
            .field("root_label", &cfg.root_label)
            .finish())
    }

    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()> {
        ImageAssembler::new(ctx.disk()).assemble(&image_spec(ctx)).await
    }
}
