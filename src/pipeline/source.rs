//! Shallow git checkouts of the bootloader and kernel trees

use super::BuildContext;
use crate::config::schema::ToolchainConfig;
use crate::error::{UbiqError, UbiqResult};
use crate::process::CommandSpec;
use std::path::{Path, PathBuf};
use tracing::info;

/// A pinned upstream tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    /// Directory name under the sources cache
    pub name: &'static str,
    pub repo: String,
    pub git_ref: String,
}

impl SourceTree {
    pub fn new(name: &'static str, repo: &str, git_ref: &str) -> Self {
        Self {
            name,
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
        }
    }

    pub fn dir(&self, ctx: &BuildContext) -> PathBuf {
        ctx.layout.sources_dir().join(self.name)
    }

    /// Make sure a checkout containing `git_ref` exists, then force it clean
    /// onto that ref. Returns the tree's path.
    pub async fn prepare(&self, ctx: &BuildContext, stage: &str) -> UbiqResult<PathBuf> {
        let dir = self.ensure(ctx, stage).await?;
        self.checkout(ctx, stage, &dir).await?;
        Ok(dir)
    }

    async fn ensure(&self, ctx: &BuildContext, stage: &str) -> UbiqResult<PathBuf> {
        let dir = self.dir(ctx);
        let depth = ctx.config.sources.shallow_depth.to_string();
        let min_free = ctx.config.sources.min_free_bytes;

        if !dir.exists() {
            let parent = ctx.layout.sources_dir();
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| UbiqError::io(format!("creating {}", parent.display()), e))?;
            check_free_space(&parent, min_free)?;

            info!("Cloning {} ({}) into {}", self.repo, self.git_ref, dir.display());
            ctx.run(
                CommandSpec::new("git")
                    .args(["clone", "--depth", depth.as_str()])
                    .args(["--branch", self.git_ref.as_str(), "--single-branch"])
                    .arg(self.repo.as_str())
                    .arg_path(&dir)
                    .stage(stage),
            )
            .await?;
            return Ok(dir);
        }

        let has_ref = ctx
            .probe(
                CommandSpec::new("git")
                    .args(["rev-parse", "--verify", "--quiet", self.git_ref.as_str()])
                    .cwd(&dir)
                    .stage(stage),
            )
            .await?;
        if has_ref {
            info!("Reusing {} at {}", dir.display(), self.git_ref);
            return Ok(dir);
        }

        check_free_space(&dir, min_free)?;
        info!("Fetching {} (depth {})", self.repo, depth);
        ctx.run(
            CommandSpec::new("git")
                .args(["fetch", "--prune", "--tags", "--depth", depth.as_str(), "origin"])
                .cwd(&dir)
                .stage(stage),
        )
        .await?;
        Ok(dir)
    }

    async fn checkout(&self, ctx: &BuildContext, stage: &str, dir: &Path) -> UbiqResult<()> {
        let steps: [&[&str]; 3] = [
            &["checkout", "--force", self.git_ref.as_str()],
            &["reset", "--hard", self.git_ref.as_str()],
            &["clean", "-fdx"],
        ];
        for args in steps {
            ctx.run(
                CommandSpec::new("git")
                    .args(args.iter().copied())
                    .cwd(dir)
                    .stage(stage),
            )
            .await?;
        }
        Ok(())
    }
}

/// Fail with `InsufficientDiskSpace` if `path`'s filesystem has less than
/// `required` bytes free
pub fn check_free_space(path: &Path, required: u64) -> UbiqResult<()> {
    let available = fs2::available_space(path)
        .map_err(|e| UbiqError::io(format!("checking free space of {}", path.display()), e))?;
    if available < required {
        return Err(UbiqError::InsufficientDiskSpace {
            path: path.to_path_buf(),
            available,
            required,
        });
    }
    Ok(())
}

/// `ARCH`, `CROSS_COMPILE` and `KCFLAGS` for a cross build
pub fn toolchain_env(toolchain: &ToolchainConfig, kcflags: &str) -> Vec<(String, String)> {
    vec![
        ("ARCH".to_string(), toolchain.arch.clone()),
        ("CROSS_COMPILE".to_string(), toolchain.cross_compile.clone()),
        ("KCFLAGS".to_string(), kcflags.to_string()),
    ]
}

/// `make` in `dir` with the cross environment
pub fn make(dir: &Path, env: &[(String, String)], stage: &str) -> CommandSpec {
    CommandSpec::new("make")
        .cwd(dir)
        .envs(env.iter().cloned())
        .stage(stage)
}

pub fn jobs_flag(toolchain: &ToolchainConfig) -> String {
    format!("-j{}", toolchain.effective_jobs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn free_space_check() {
        let dir = TempDir::new().unwrap();
        assert!(check_free_space(dir.path(), 0).is_ok());

        let err = check_free_space(dir.path(), u64::MAX).unwrap_err();
        assert!(matches!(
            err,
            UbiqError::InsufficientDiskSpace { required: u64::MAX, .. }
        ));
    }

    #[test]
    fn cross_environment() {
        let toolchain = ToolchainConfig {
            jobs: Some(4),
            ..Default::default()
        };
        let env = toolchain_env(&toolchain, "-march=armv5te");
        assert!(env.contains(&("ARCH".to_string(), "arm".to_string())));
        assert!(env.contains(&("CROSS_COMPILE".to_string(), "arm-linux-gnueabi-".to_string())));
        assert!(env.contains(&("KCFLAGS".to_string(), "-march=armv5te".to_string())));
        assert_eq!(jobs_flag(&toolchain), "-j4");
    }

    #[test]
    fn make_command_carries_environment() {
        let env = toolchain_env(&ToolchainConfig::default(), "-O2");
        let spec = make(Path::new("/src/u-boot"), &env, "bootloader").arg("distclean");
        assert_eq!(spec.program(), "make");
        assert_eq!(spec.arguments(), &["distclean".to_string()]);
        assert_eq!(spec.working_dir(), Some(Path::new("/src/u-boot")));
        assert_eq!(spec.env_vars().len(), 3);
        assert_eq!(spec.stage_label(), "bootloader");
    }
}
