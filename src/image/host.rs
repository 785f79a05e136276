//! [`DiskOps`] backed by the host's util-linux and e2fsprogs tools

use super::layout::{Filesystem, PartitionContent};
use super::DiskOps;
use crate::error::{UbiqError, UbiqResult};
use crate::process::{CommandSpec, ProcessRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long to wait for udev to create a partition node
const NODE_TIMEOUT: Duration = Duration::from_secs(5);
const NODE_POLL: Duration = Duration::from_millis(100);

/// Runs real commands; requires root for everything past the partition table
#[derive(Debug, Clone)]
pub struct HostDiskOps {
    runner: ProcessRunner,
}

impl HostDiskOps {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    fn command(program: &str) -> CommandSpec {
        CommandSpec::new(program).stage("image")
    }

    /// Attach `image` to a free loop device and let the kernel scan its table
    fn attach_command(image: &Path) -> CommandSpec {
        Self::command("losetup")
            .args(["--find", "--show", "--partscan"])
            .arg_path(image)
    }

    async fn run(&self, spec: CommandSpec) -> UbiqResult<String> {
        Ok(self.runner.run_checked(&spec).await?.output)
    }
}

/// Node name for partition `number` of a loop device
fn partition_node(loop_device: &str, number: usize) -> String {
    format!("{}p{}", loop_device, number)
}

/// `losetup --show` prints the device on its last line
fn parse_loop_device(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("/dev/"))
        .last()
        .map(str::to_string)
}

#[async_trait]
impl DiskOps for HostDiskOps {
    async fn create_image(&self, path: &Path, bytes: u64) -> UbiqResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UbiqError::io(format!("creating {}", parent.display()), e))?;
        }
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| UbiqError::io(format!("creating {}", path.display()), e))?;
        file.set_len(bytes)
            .await
            .map_err(|e| UbiqError::io(format!("sizing {}", path.display()), e))?;
        debug!("Created sparse image {} ({} bytes)", path.display(), bytes);
        Ok(())
    }

    async fn write_partition_table(&self, image: &Path, script: &str) -> UbiqResult<()> {
        self.run(Self::command("sfdisk").arg_path(image).stdin(script))
            .await
            .map(|_| ())
    }

    async fn attach_loop(&self, image: &Path) -> UbiqResult<String> {
        let spec = Self::attach_command(image);
        let output = self.run(spec.clone()).await?;
        parse_loop_device(&output).ok_or_else(|| UbiqError::CommandFailed {
            command: spec.display(),
            code: 0,
            tail: format!("no loop device in output: {}", output.trim()),
        })
    }

    async fn activate_partition(&self, loop_device: &str, number: usize) -> UbiqResult<String> {
        let node = partition_node(loop_device, number);
        if Path::new(&node).exists() {
            debug!("{} already registered by the loop driver", node);
            return Ok(node);
        }

        // Fails when the partscan registered the partition first
        let added = self
            .run(
                Self::command("partx")
                    .args(["--add", "--nr", number.to_string().as_str()])
                    .arg(loop_device),
            )
            .await;

        let deadline = tokio::time::Instant::now() + NODE_TIMEOUT;
        while !Path::new(&node).exists() {
            if tokio::time::Instant::now() >= deadline {
                return Err(match added {
                    Err(e) => e,
                    Ok(_) => {
                        // Roll back our own activation before reporting
                        let _ = self.deactivate_partition(loop_device, number).await;
                        UbiqError::io(
                            format!("waiting for {}", node),
                            std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "device node did not appear",
                            ),
                        )
                    }
                });
            }
            tokio::time::sleep(NODE_POLL).await;
        }
        if let Err(e) = added {
            debug!("partx --add failed but {} appeared: {}", node, e);
        }
        Ok(node)
    }

    async fn format(&self, device: &str, filesystem: Filesystem, label: &str) -> UbiqResult<()> {
        let (program, args) = filesystem.mkfs_command(label);
        self.run(Self::command(program).args(args).arg(device))
            .await
            .map(|_| ())
    }

    async fn mount(&self, device: &str, mount_point: &Path) -> UbiqResult<()> {
        self.run(Self::command("mount").arg(device).arg_path(mount_point))
            .await
            .map(|_| ())
    }

    async fn populate(&self, content: &PartitionContent, mount_point: &Path) -> UbiqResult<()> {
        match content {
            PartitionContent::Files(files) => {
                for (source, name) in files {
                    let dest = mount_point.join(name);
                    self.run(Self::command("cp").arg_path(source).arg_path(&dest))
                        .await?;
                }
            }
            PartitionContent::Tree(dir) => {
                // Trailing "/." copies the contents, not the directory itself
                let source: PathBuf = dir.join(".");
                self.run(
                    Self::command("cp")
                        .arg("-a")
                        .arg_path(&source)
                        .arg_path(mount_point),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn unmount(&self, mount_point: &Path) -> UbiqResult<()> {
        self.run(Self::command("umount").arg_path(mount_point))
            .await
            .map(|_| ())
    }

    async fn deactivate_partition(&self, loop_device: &str, number: usize) -> UbiqResult<()> {
        self.run(
            Self::command("partx")
                .args(["--delete", "--nr", number.to_string().as_str()])
                .arg(loop_device),
        )
        .await
        .map(|_| ())
    }

    async fn detach_loop(&self, loop_device: &str) -> UbiqResult<()> {
        self.run(Self::command("losetup").arg("-d").arg(loop_device))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogSink;
    use tempfile::TempDir;

    #[test]
    fn loop_device_is_last_device_line() {
        assert_eq!(
            parse_loop_device("/dev/loop3\n").as_deref(),
            Some("/dev/loop3")
        );
        assert_eq!(
            parse_loop_device("losetup: warning: something\n/dev/loop12\n").as_deref(),
            Some("/dev/loop12")
        );
        assert_eq!(parse_loop_device("nothing useful"), None);
    }

    #[test]
    fn attach_asks_for_partition_scan() {
        let spec = HostDiskOps::attach_command(Path::new("/tmp/ubiq480.img"));
        assert_eq!(
            spec.display(),
            "losetup --find --show --partscan /tmp/ubiq480.img"
        );
    }

    #[tokio::test]
    async fn activation_accepts_partition_registered_by_scan() {
        let dir = TempDir::new().unwrap();
        let loop_device = dir.path().join("loop7").display().to_string();
        std::fs::write(partition_node(&loop_device, 2), b"").unwrap();

        // partx would fail on a regular file; it must not be needed
        let ops = HostDiskOps::new(ProcessRunner::new(LogSink::disabled()));
        let node = ops.activate_partition(&loop_device, 2).await.unwrap();
        assert_eq!(node, format!("{}p2", loop_device));
    }

    #[test]
    fn partition_nodes() {
        assert_eq!(partition_node("/dev/loop0", 1), "/dev/loop0p1");
        assert_eq!(partition_node("/dev/loop10", 2), "/dev/loop10p2");
    }

    #[tokio::test]
    async fn create_image_is_sparse_file_of_requested_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/disk.img");
        let ops = HostDiskOps::new(ProcessRunner::new(LogSink::disabled()));

        ops.create_image(&path, 4 * 1024 * 1024).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * 1024 * 1024);

        // Recreating replaces the old contents
        std::fs::write(&path, b"old").unwrap();
        ops.create_image(&path, 1024).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
    }
}
