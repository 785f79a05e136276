//! Image assembly with guaranteed teardown

use super::layout::ImageSpec;
use super::session::MountSession;
use super::DiskOps;
use crate::error::{UbiqError, UbiqResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Exclusive advisory lock on `<image>.lock`, released on drop
#[derive(Debug)]
pub struct ImageLock {
    _file: File,
    path: PathBuf,
}

impl ImageLock {
    /// Take the lock or fail with `ImageBusy` without waiting
    pub fn acquire(image: &Path) -> UbiqResult<Self> {
        let mut name = image.as_os_str().to_os_string();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| UbiqError::io(format!("creating {}", parent.display()), e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| UbiqError::io(format!("opening lock {}", path.display()), e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(UbiqError::ImageBusy(image.to_path_buf()));
        }
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds a partitioned image through [`DiskOps`]
#[derive(Clone)]
pub struct ImageAssembler {
    ops: Arc<dyn DiskOps>,
}

impl ImageAssembler {
    pub fn new(ops: Arc<dyn DiskOps>) -> Self {
        Self { ops }
    }

    /// Build `spec.path` from scratch.
    ///
    /// Resources acquired along the way are released before this returns,
    /// on success and on every failure path. A primary failure takes
    /// precedence over release failures, which are only logged; if the
    /// build itself succeeded, a release failure is reported as `Teardown`.
    pub async fn assemble(&self, spec: &ImageSpec) -> UbiqResult<()> {
        spec.validate()?;
        let _lock = ImageLock::acquire(&spec.path)?;

        for part in &spec.partitions {
            for source in part.content.sources() {
                if !source.exists() {
                    return Err(UbiqError::MissingArtifact {
                        stage: "image".to_string(),
                        path: source.clone(),
                    });
                }
            }
        }

        info!(
            "Creating {} ({} MiB)",
            spec.path.display(),
            spec.total_bytes() >> 20
        );
        self.ops
            .create_image(&spec.path, spec.total_bytes())
            .await?;
        self.ops
            .write_partition_table(&spec.path, &spec.sfdisk_script())
            .await?;

        let mount_root = tempfile::Builder::new()
            .prefix("ubiq480-mnt-")
            .tempdir()
            .map_err(|e| UbiqError::io("creating mount directory", e))?;

        let mut session = MountSession::new(self.ops.as_ref());
        let result = self.fill(&mut session, spec, mount_root.path()).await;
        let release_errors = session.unwind().await;

        if release_errors.is_empty() {
            // Only empty directories remain
            let _ = mount_root.close();
        } else {
            // Something may still be mounted below; never delete recursively
            warn!(
                "Leaving {} in place after failed teardown",
                mount_root.path().display()
            );
            std::mem::forget(mount_root);
        }

        match (result, release_errors.is_empty()) {
            (Err(e), _) => Err(e),
            (Ok(()), true) => {
                info!("Image ready at {}", spec.path.display());
                Ok(())
            }
            (Ok(()), false) => Err(UbiqError::Teardown(
                release_errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }

    async fn fill(
        &self,
        session: &mut MountSession<'_>,
        spec: &ImageSpec,
        mount_root: &Path,
    ) -> UbiqResult<()> {
        let loop_device = session.attach_loop(&spec.path).await?;

        for (index, part) in spec.partitions.iter().enumerate() {
            let number = index + 1;
            let device = session.activate(&loop_device, number).await?;

            info!(
                "Formatting {} ({:?}, label {})",
                device, part.filesystem, part.label
            );
            self.ops
                .format(&device, part.filesystem, &part.label)
                .await?;

            let mount_point = mount_root.join(&part.name);
            tokio::fs::create_dir_all(&mount_point)
                .await
                .map_err(|e| UbiqError::io(format!("creating {}", mount_point.display()), e))?;

            session.mount(&device, &mount_point).await?;
            self.ops.populate(&part.content, &mount_point).await?;
            session.release_top().await?;
            let _ = tokio::fs::remove_dir(&mount_point).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::layout::{Filesystem, PartitionContent, PartitionSpec};
    use crate::image::testing::{FakeDisk, Step};
    use tempfile::TempDir;

    fn spec(dir: &TempDir) -> ImageSpec {
        let boot_file = dir.path().join("zImage");
        std::fs::write(&boot_file, b"kernel").unwrap();
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(rootfs.join("etc")).unwrap();

        ImageSpec {
            path: dir.path().join("ubiq480.img"),
            size_mb: 8,
            label_id: 0xfeedcafe,
            partitions: vec![
                PartitionSpec {
                    name: "boot".into(),
                    filesystem: Filesystem::Vfat,
                    size_mb: Some(2),
                    label: "UBIQBOOT".into(),
                    bootable: true,
                    content: PartitionContent::Files(vec![(boot_file, "zImage".into())]),
                },
                PartitionSpec {
                    name: "root".into(),
                    filesystem: Filesystem::Ext4,
                    size_mb: None,
                    label: "ubiq480-root".into(),
                    bootable: false,
                    content: PartitionContent::Tree(rootfs),
                },
            ],
        }
    }

    #[tokio::test]
    async fn successful_assembly_releases_everything() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir);
        let disk = Arc::new(FakeDisk::default());
        let assembler = ImageAssembler::new(disk.clone());

        assembler.assemble(&spec).await.unwrap();

        assert!(disk.is_clean());
        assert_eq!(
            std::fs::metadata(&spec.path).unwrap().len(),
            8 * 1024 * 1024
        );

        // Strict reverse order: partitions deactivated 2 then 1, loop last
        let calls = disk.calls();
        let tail: Vec<&str> = calls[calls.len() - 3..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "partx --delete 2 /dev/loop7",
                "partx --delete 1 /dev/loop7",
                "losetup -d /dev/loop7"
            ]
        );
    }

    #[tokio::test]
    async fn every_injected_failure_leaves_nothing_attached() {
        let cases = [
            (Step::CreateImage, 1),
            (Step::PartitionTable, 1),
            (Step::AttachLoop, 1),
            (Step::Activate, 1),
            (Step::Activate, 2),
            (Step::Format, 1),
            (Step::Format, 2),
            (Step::Mount, 1),
            (Step::Mount, 2),
            (Step::Populate, 1),
            (Step::Populate, 2),
        ];

        for (step, nth) in cases {
            let dir = TempDir::new().unwrap();
            let spec = spec(&dir);
            let disk = Arc::new(FakeDisk::failing(step, nth));
            let assembler = ImageAssembler::new(disk.clone());

            let err = assembler.assemble(&spec).await.unwrap_err();
            assert!(
                matches!(err, UbiqError::CommandFailed { .. }),
                "{step:?}#{nth}: {err}"
            );
            assert!(disk.is_clean(), "{step:?}#{nth} leaked resources");
        }
    }

    #[tokio::test]
    async fn release_failure_after_success_is_teardown_error() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir);
        let disk = Arc::new(FakeDisk::failing(Step::Detach, 1));
        let assembler = ImageAssembler::new(disk.clone());

        let err = assembler.assemble(&spec).await.unwrap_err();
        assert!(matches!(err, UbiqError::Teardown(_)));
    }

    #[tokio::test]
    async fn primary_failure_wins_over_release_failure() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir);
        // The first unmount fails the build; unwind retries it, then
        // deactivates and detaches.
        let disk = Arc::new(FakeDisk::failing(Step::Unmount, 1));
        let assembler = ImageAssembler::new(disk.clone());

        let err = assembler.assemble(&spec).await.unwrap_err();
        assert!(matches!(err, UbiqError::CommandFailed { .. }));
        assert!(disk.is_clean());
        let calls = disk.calls();
        assert_eq!(calls.last().map(String::as_str), Some("losetup -d /dev/loop7"));
    }

    #[tokio::test]
    async fn held_lock_fails_with_image_busy_before_any_change() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir);
        let _held = ImageLock::acquire(&spec.path).unwrap();

        let disk = Arc::new(FakeDisk::default());
        let err = ImageAssembler::new(disk.clone())
            .assemble(&spec)
            .await
            .unwrap_err();

        assert!(matches!(err, UbiqError::ImageBusy(_)));
        assert!(disk.calls().is_empty());
        assert!(!spec.path.exists());
    }

    #[tokio::test]
    async fn missing_content_is_reported_before_creating_image() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir);
        std::fs::remove_file(dir.path().join("zImage")).unwrap();

        let disk = Arc::new(FakeDisk::default());
        let err = ImageAssembler::new(disk.clone())
            .assemble(&spec)
            .await
            .unwrap_err();

        assert!(matches!(err, UbiqError::MissingArtifact { .. }));
        assert!(disk.calls().is_empty());
    }
}
