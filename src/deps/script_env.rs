//! Python virtual environment for helper scripts

use super::DependencyInstaller;
use crate::error::{UbiqError, UbiqResult};
use crate::process::CommandSpec;
use std::path::Path;
use tracing::{debug, info, warn};

/// Requirement lines that are neither blank nor comments
pub(crate) fn meaningful_lines(contents: &str) -> usize {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count()
}

impl DependencyInstaller {
    /// Provision `venv_dir` and install `requirements` into it.
    ///
    /// Returns `Ok(Some(instructions))` when the environment is unmet and
    /// installation is disabled, so the caller can report it.
    pub async fn ensure_script_env(
        &self,
        requirements: &Path,
        venv_dir: &Path,
    ) -> UbiqResult<Option<String>> {
        let contents = match tokio::fs::read_to_string(requirements).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(UbiqError::io(
                    format!("reading {}", requirements.display()),
                    e,
                ))
            }
        };
        if meaningful_lines(&contents) == 0 {
            return Ok(None);
        }

        let pip = venv_dir.join("bin").join("pip");
        if !self.auto_install {
            if venv_dir.exists() {
                return Ok(None);
            }
            return Ok(Some(format!(
                "python3 -m venv {venv}\n{pip} install -r {req}",
                venv = venv_dir.display(),
                pip = pip.display(),
                req = requirements.display()
            )));
        }

        info!("Ensuring Python virtual environment at {}", venv_dir.display());
        if !venv_dir.exists() {
            self.create_venv(venv_dir).await?;
        }

        if !pip.exists() {
            let python = venv_dir.join("bin").join("python");
            let ensurepip = CommandSpec::new(python.display().to_string())
                .args(["-m", "ensurepip", "--upgrade"])
                .stage("deps");
            if let Err(e) = self.runner.run_checked(&ensurepip).await {
                debug!("ensurepip failed: {}", e);
            }
            if !pip.exists() {
                return Err(UbiqError::UnmetDependency {
                    stage: "scripts".to_string(),
                    tool: "pip".to_string(),
                    hint: Some(format!(
                        "Virtual environment at {} is missing pip",
                        venv_dir.display()
                    )),
                });
            }
        }

        info!("Installing Python requirements from {}", requirements.display());
        let install = CommandSpec::new(pip.display().to_string())
            .arg("install")
            .arg("-r")
            .arg_path(requirements)
            .stage("deps");
        self.runner.run_checked(&install).await?;
        Ok(None)
    }

    async fn create_venv(&self, venv_dir: &Path) -> UbiqResult<()> {
        let venv = CommandSpec::new("python3")
            .args(["-m", "venv"])
            .arg_path(venv_dir)
            .stage("deps");

        match self.runner.run_checked(&venv).await {
            Ok(_) => return Ok(()),
            Err(e) => debug!("python3 -m venv failed: {}", e),
        }

        // Usually the distribution splits venv support into its own package
        let packages = self.manager.venv_packages();
        if packages.is_empty() {
            return Err(UbiqError::UnmetDependency {
                stage: "scripts".to_string(),
                tool: "python3-venv".to_string(),
                hint: None,
            });
        }
        if let Err(e) = self.install_packages(packages).await {
            warn!("Could not install Python venv support: {}", e);
        }

        if venv_dir.exists() {
            tokio::fs::remove_dir_all(venv_dir)
                .await
                .map_err(|e| UbiqError::io(format!("removing {}", venv_dir.display()), e))?;
        }
        self.runner.run_checked(&venv).await.map(|_| ())
    }
}
