//! Bootloader, kernel, device tree and boot script stages

use super::source::{jobs_flag, make, toolchain_env, SourceTree};
use super::BuildContext;
use crate::cache::Fingerprint;
use crate::config::Config;
use crate::error::{UbiqError, UbiqResult};
use crate::process::CommandSpec;
use crate::stage::StageAction;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Copy a build product out of its tree into the output directory
pub(crate) async fn install_artifact(stage: &str, source: &Path, dest: &Path) -> UbiqResult<()> {
    if !source.exists() {
        return Err(UbiqError::MissingArtifact {
            stage: stage.to_string(),
            path: source.to_path_buf(),
        });
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| UbiqError::io(format!("creating {}", parent.display()), e))?;
    }
    tokio::fs::copy(source, dest)
        .await
        .map_err(|e| UbiqError::io(format!("copying {} to {}", source.display(), dest.display()), e))?;
    info!("Copied {}", dest.display());
    Ok(())
}

fn toolchain_fields(fp: Fingerprint, config: &Config) -> Fingerprint {
    fp.field("arch", &config.toolchain.arch)
        .field("cross_compile", &config.toolchain.cross_compile)
}

fn kernel_tree(config: &Config) -> SourceTree {
    SourceTree::new("linux", &config.kernel.repo, &config.kernel.git_ref)
}

/// U-Boot for the mx31ads-derived board
pub struct Bootloader;

impl Bootloader {
    pub const ID: &'static str = "bootloader";
    pub const OUTPUT: &'static str = "u-boot.bin";
}

#[async_trait]
impl StageAction for Bootloader {
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String> {
        let cfg = &ctx.config.bootloader;
        let fp = Fingerprint::new(Self::ID)
            .field("repo", &cfg.repo)
            .field("ref", &cfg.git_ref)
            .field("defconfig", &cfg.defconfig)
            .field("kcflags", &cfg.kcflags);
        Ok(toolchain_fields(fp, &ctx.config).finish())
    }

    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()> {
        let cfg = &ctx.config.bootloader;
        let tree = SourceTree::new("u-boot", &cfg.repo, &cfg.git_ref);
        let dir = tree.prepare(ctx, Self::ID).await?;
        let env = toolchain_env(&ctx.config.toolchain, &cfg.kcflags);

        ctx.run(make(&dir, &env, Self::ID).arg("distclean")).await?;
        ctx.run(make(&dir, &env, Self::ID).arg(cfg.defconfig.as_str()))
            .await?;
        ctx.run(make(&dir, &env, Self::ID).arg(jobs_flag(&ctx.config.toolchain)))
            .await?;

        install_artifact(
            Self::ID,
            &dir.join("u-boot.bin"),
            &ctx.layout.artifact(Self::OUTPUT),
        )
        .await
    }
}

/// Kernel zImage
pub struct Kernel;

impl Kernel {
    pub const ID: &'static str = "kernel";
    pub const OUTPUT: &'static str = "zImage";
}

#[async_trait]
impl StageAction for Kernel {
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String> {
        let cfg = &ctx.config.kernel;
        let fp = Fingerprint::new(Self::ID)
            .field("repo", &cfg.repo)
            .field("ref", &cfg.git_ref)
            .field("defconfig", &cfg.defconfig)
            .field("kcflags", &cfg.kcflags);
        Ok(toolchain_fields(fp, &ctx.config).finish())
    }

    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()> {
        let cfg = &ctx.config.kernel;
        let dir = kernel_tree(&ctx.config).prepare(ctx, Self::ID).await?;
        let env = toolchain_env(&ctx.config.toolchain, &cfg.kcflags);

        ctx.run(make(&dir, &env, Self::ID).arg("mrproper")).await?;
        ctx.run(make(&dir, &env, Self::ID).arg(cfg.defconfig.as_str()))
            .await?;
        ctx.run(
            make(&dir, &env, Self::ID)
                .arg(jobs_flag(&ctx.config.toolchain))
                .arg("zImage"),
        )
        .await?;

        install_artifact(
            Self::ID,
            &dir.join("arch/arm/boot/zImage"),
            &ctx.layout.artifact(Self::OUTPUT),
        )
        .await
    }
}

/// Board device tree blob, built from the kernel tree
pub struct DeviceTree;

impl DeviceTree {
    pub const ID: &'static str = "dtb";
}

#[async_trait]
impl StageAction for DeviceTree {
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String> {
        let cfg = &ctx.config.kernel;
        let fp = Fingerprint::new(Self::ID)
            .field("repo", &cfg.repo)
            .field("ref", &cfg.git_ref)
            .field("defconfig", &cfg.defconfig)
            .field("kcflags", &cfg.kcflags)
            .field("target", &cfg.dtb_target);
        Ok(toolchain_fields(fp, &ctx.config).finish())
    }

    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()> {
        let cfg = &ctx.config.kernel;
        let dir = kernel_tree(&ctx.config).prepare(ctx, Self::ID).await?;
        let env = toolchain_env(&ctx.config.toolchain, &cfg.kcflags);

        ctx.run(make(&dir, &env, Self::ID).arg(cfg.defconfig.as_str()))
            .await?;
        ctx.run(
            make(&dir, &env, Self::ID)
                .arg(jobs_flag(&ctx.config.toolchain))
                .arg(cfg.dtb_target.as_str()),
        )
        .await?;

        install_artifact(
            Self::ID,
            &dir.join(&cfg.dtb_target),
            &ctx.layout.artifact(&cfg.dtb_name()),
        )
        .await
    }
}

/// `boot.cmd` compiled into a U-Boot script image
pub struct BootScript;

impl BootScript {
    pub const ID: &'static str = "bootscript";
    pub const OUTPUT: &'static str = "boot.scr";
}

#[async_trait]
impl StageAction for BootScript {
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String> {
        let cfg = &ctx.config.bootscript;
        Ok(Fingerprint::new(Self::ID)
            .field("name", &cfg.name)
            .file("source", &cfg.source)
            .finish())
    }

    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()> {
        let cfg = &ctx.config.bootscript;
        if !cfg.source.exists() {
            return Err(UbiqError::io(
                format!("reading boot script {}", cfg.source.display()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            ));
        }

        let output = ctx.layout.artifact(Self::OUTPUT);
        tokio::fs::create_dir_all(ctx.layout.root())
            .await
            .map_err(|e| UbiqError::io(format!("creating {}", ctx.layout.root().display()), e))?;

        ctx.run(
            CommandSpec::new("mkimage")
                .args(["-A", "arm", "-T", "script", "-C", "none"])
                .args(["-n", cfg.name.as_str()])
                .arg("-d")
                .arg_path(&cfg.source)
                .arg_path(&output)
                .stage(Self::ID),
        )
        .await?;
        info!("Generated {}", output.display());
        Ok(())
    }
}
