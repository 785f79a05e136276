//! Debian root filesystem bootstrap

use super::BuildContext;
use crate::cache::Fingerprint;
use crate::error::{UbiqError, UbiqResult};
use crate::process::CommandSpec;
use crate::stage::StageAction;
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

const FSTAB: &str = "\
# <file system> <mount point> <type> <options> <dump> <pass>
proc /proc proc defaults 0 0
/dev/mmcblk0p1 /boot vfat defaults 0 2
/dev/mmcblk0p2 / ext4 defaults,noatime 0 1
";

const ETH0: &str = "\
auto eth0
allow-hotplug eth0
iface eth0 inet dhcp
";

const SERIAL_GETTY: &str = "\
[Service]
ExecStart=
ExecStart=-/sbin/agetty --keep-baud 115200,38400,9600 ttyAMA0 $TERM
";

/// Files written into the tree after debootstrap, relative to its root
pub fn board_files(hostname: &str) -> Vec<(&'static str, String)> {
    vec![
        ("etc/fstab", FSTAB.to_string()),
        ("etc/hostname", format!("{}\n", hostname)),
        ("etc/network/interfaces.d/eth0", ETH0.to_string()),
        (
            "etc/systemd/system/serial-getty@ttyAMA0.service.d/override.conf",
            SERIAL_GETTY.to_string(),
        ),
    ]
}

async fn write_board_files(root: &Path, hostname: &str) -> UbiqResult<()> {
    for (relative, content) in board_files(hostname) {
        let dest = root.join(relative);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UbiqError::io(format!("creating {}", parent.display()), e))?;
        }
        tokio::fs::write(&dest, content)
            .await
            .map_err(|e| UbiqError::io(format!("writing {}", dest.display()), e))?;
        info!("Wrote {}", relative);
    }
    Ok(())
}

/// First-stage (`--foreign`) debootstrap plus board configuration
pub struct RootFs;

impl RootFs {
    pub const ID: &'static str = "rootfs";
    pub const OUTPUT: &'static str = "rootfs";
}

#[async_trait]
impl StageAction for RootFs {
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String> {
        let cfg = &ctx.config.rootfs;
        let mut fp = Fingerprint::new(Self::ID)
            .field("suite", &cfg.suite)
            .field("arch", &cfg.arch)
            .field("mirror", &cfg.mirror)
            .field("variant", &cfg.variant);
        for (path, content) in board_files(&cfg.hostname) {
            fp = fp.field(path, content);
        }
        Ok(fp.finish())
    }

    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()> {
        let cfg = &ctx.config.rootfs;
        let root = ctx.layout.artifact(Self::OUTPUT);

        if root.exists() {
            info!("Removing previous tree {}", root.display());
            tokio::fs::remove_dir_all(&root)
                .await
                .map_err(|e| UbiqError::io(format!("removing {}", root.display()), e))?;
        }
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| UbiqError::io(format!("creating {}", root.display()), e))?;

        ctx.run(
            CommandSpec::new("debootstrap")
                .args(["--arch", cfg.arch.as_str()])
                .args(["--variant", cfg.variant.as_str()])
                .arg("--foreign")
                .arg(cfg.suite.as_str())
                .arg_path(&root)
                .arg(cfg.mirror.as_str())
                .env("DEBIAN_FRONTEND", "noninteractive")
                .stage(Self::ID),
        )
        .await?;

        match which::which("qemu-arm-static") {
            Ok(qemu) => {
                let dest = root.join("usr/bin/qemu-arm-static");
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| UbiqError::io(format!("creating {}", parent.display()), e))?;
                }
                tokio::fs::copy(&qemu, &dest)
                    .await
                    .map_err(|e| UbiqError::io(format!("copying {}", qemu.display()), e))?;
                info!("Installed emulator at usr/bin/qemu-arm-static");
            }
            Err(_) => warn!("qemu-arm-static not found; skipping emulator copy"),
        }

        write_board_files(&root, &cfg.hostname).await?;
        info!(
            "Root filesystem for Debian {} ({}) created at {}",
            cfg.suite,
            cfg.arch,
            root.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::context;
    use tempfile::TempDir;

    #[tokio::test]
    async fn board_files_land_in_tree() {
        let dir = TempDir::new().unwrap();
        write_board_files(dir.path(), "kiosk-7").await.unwrap();

        let hostname = std::fs::read_to_string(dir.path().join("etc/hostname")).unwrap();
        assert_eq!(hostname, "kiosk-7\n");

        let fstab = std::fs::read_to_string(dir.path().join("etc/fstab")).unwrap();
        assert!(fstab.contains("/dev/mmcblk0p2 / ext4 defaults,noatime 0 1"));

        let getty = dir
            .path()
            .join("etc/systemd/system/serial-getty@ttyAMA0.service.d/override.conf");
        assert!(std::fs::read_to_string(getty)
            .unwrap()
            .contains("ttyAMA0 $TERM"));
    }

    #[tokio::test]
    async fn hostname_is_part_of_fingerprint() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let before = RootFs.fingerprint(&ctx).await.unwrap();

        let mut config = (*ctx.config).clone();
        config.rootfs.hostname = "other".into();
        let mut changed = ctx.clone();
        changed.config = std::sync::Arc::new(config);
        assert_ne!(before, RootFs.fingerprint(&changed).await.unwrap());
    }
}
