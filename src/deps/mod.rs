//! Host dependency installation
//!
//! Checks that the tools each stage invokes are on `PATH`, installs the
//! missing ones through the host package manager when permitted, and
//! reports whatever is still unmet. Installation problems never abort the
//! run by themselves; a stage fails later only if it needs a tool that is
//! still missing.

pub mod manager;
pub mod requirements;
mod script_env;

pub use manager::PackageManager;
pub use requirements::{all_tools, requirement, Requirement, REQUIREMENTS};

use crate::error::{UbiqError, UbiqResult};
use crate::gate::privilege::effective_uid;
use crate::process::ProcessRunner;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Answers whether a command is available on the host
pub trait ToolProbe: Send + Sync {
    fn is_present(&self, tool: &str) -> bool;

    /// Path to run `tool` by; the bare name leaves lookup to `PATH`
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        self.is_present(tool).then(|| PathBuf::from(tool))
    }
}

/// Looks tools up on `PATH`
#[derive(Debug, Default, Clone, Copy)]
pub struct PathProbe;

impl ToolProbe for PathProbe {
    fn is_present(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }

    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// Installs missing host tools and reports what remains unmet
pub struct DependencyInstaller {
    runner: ProcessRunner,
    probe: Box<dyn ToolProbe>,
    manager: PackageManager,
    auto_install: bool,
    euid: u32,
    refreshed: AtomicBool,
}

impl DependencyInstaller {
    /// Installer for this host, probing `PATH` and the package manager
    pub fn new(runner: ProcessRunner, auto_install: bool) -> Self {
        Self::with_probe(runner, Box::new(PathProbe), auto_install)
    }

    pub fn with_probe(runner: ProcessRunner, probe: Box<dyn ToolProbe>, auto_install: bool) -> Self {
        let manager = PackageManager::detect(probe.as_ref());
        debug!("Package manager: {}", manager.name());
        Self {
            runner,
            probe,
            manager,
            auto_install,
            euid: effective_uid(),
            refreshed: AtomicBool::new(false),
        }
    }

    /// Override the effective uid used to decide on `sudo`
    pub fn with_euid(mut self, euid: u32) -> Self {
        self.euid = euid;
        self
    }

    pub fn manager(&self) -> PackageManager {
        self.manager
    }

    pub fn auto_install(&self) -> bool {
        self.auto_install
    }

    /// Tools from `tools` that are not on the host, de-duplicated in order
    pub fn missing<S: AsRef<str>>(&self, tools: &[S]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for tool in tools {
            let tool = tool.as_ref();
            if !self.probe.is_present(tool) && !missing.iter().any(|m| m == tool) {
                missing.push(tool.to_string());
            }
        }
        missing
    }

    /// Make `tools` available, returning the ones that remain unmet.
    ///
    /// Without permission to install, or without a package manager, this is
    /// a pure check.
    pub async fn ensure<S: AsRef<str>>(&self, tools: &[S]) -> Vec<String> {
        let missing = self.missing(tools);
        if missing.is_empty() || !self.auto_install {
            return missing;
        }
        self.install(&missing).await
    }

    /// Install packages providing `missing` and recompute the unmet list
    pub async fn install(&self, missing: &[String]) -> Vec<String> {
        let packages = self.manager.packages_for(missing);
        if packages.is_empty() {
            debug!(
                "No {} packages known for: {}",
                self.manager.name(),
                missing.join(", ")
            );
            return missing.to_vec();
        }

        if let Err(e) = self.install_packages(&packages).await {
            warn!("Automatic installation skipped: {}", e);
        }
        self.missing(missing)
    }

    /// Fail with `UnmetDependency` if `stage` needs a tool that is missing
    pub fn require<S: AsRef<str>>(&self, stage: &str, tools: &[S]) -> UbiqResult<()> {
        match self.missing(tools).into_iter().next() {
            Some(tool) => Err(UbiqError::UnmetDependency {
                stage: stage.to_string(),
                hint: requirement(&tool).map(|r| format!("Install it with: {}", r.hint)),
                tool,
            }),
            None => Ok(()),
        }
    }

    pub(crate) async fn install_packages(&self, packages: &[&str]) -> UbiqResult<()> {
        let sudo = self.sudo()?;
        let sudo = sudo.as_deref();
        let program = self
            .probe
            .locate(self.manager.name())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.manager.name().to_string());

        info!(
            "Installing missing packages via {}: {}",
            self.manager.name(),
            packages.join(", ")
        );

        if !self.refreshed.load(Ordering::SeqCst) {
            if let Some(spec) = self.manager.refresh_command(&program, sudo) {
                self.runner.run_checked(&spec).await?;
            }
            self.refreshed.store(true, Ordering::SeqCst);
        }

        match self.manager.install_command(&program, sudo, packages) {
            Some(spec) => self.runner.run_checked(&spec).await.map(|_| ()),
            None => Err(UbiqError::Internal(
                "no supported package manager found".to_string(),
            )),
        }
    }

    /// `sudo` prefix when not root; an error when elevation is unavailable
    fn sudo(&self) -> UbiqResult<Option<String>> {
        if self.euid == 0 {
            return Ok(None);
        }
        match self.probe.locate("sudo") {
            Some(path) => Ok(Some(path.display().to_string())),
            None => Err(UbiqError::InsufficientPrivilege {
                stage: "deps".to_string(),
                euid: self.euid,
            }),
        }
    }
}
