//! Host package manager detection
//!
//! Supports apt (Debian/Ubuntu) and dnf (Fedora). Probed once, in that
//! order; hosts with neither fall back to reporting missing tools.

use super::requirements::requirement;
use super::ToolProbe;
use crate::process::CommandSpec;
use std::collections::BTreeSet;

/// Detected package manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    /// No supported package manager on this host
    Unavailable,
}

impl PackageManager {
    /// Probe for known package managers in preference order
    pub fn detect(probe: &dyn ToolProbe) -> Self {
        if probe.is_present("apt-get") {
            PackageManager::Apt
        } else if probe.is_present("dnf") {
            PackageManager::Dnf
        } else {
            PackageManager::Unavailable
        }
    }

    /// Executable name
    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Unavailable => "none",
        }
    }

    /// Distribution packages providing `tools`, sorted and de-duplicated
    pub fn packages_for<S: AsRef<str>>(&self, tools: &[S]) -> Vec<&'static str> {
        let packages: BTreeSet<&'static str> = tools
            .iter()
            .filter_map(|tool| requirement(tool.as_ref()))
            .flat_map(|req| match self {
                PackageManager::Apt => req.apt,
                PackageManager::Dnf => req.dnf,
                PackageManager::Unavailable => &[],
            })
            .copied()
            .collect();
        packages.into_iter().collect()
    }

    /// Packages that provide `python3 -m venv`
    pub fn venv_packages(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Apt => &["python3-venv"],
            PackageManager::Dnf => &["python3-virtualenv"],
            PackageManager::Unavailable => &[],
        }
    }

    /// Index refresh command run once before the first install, if any.
    ///
    /// `program` is the manager's executable, `sudo` an elevation prefix.
    pub fn refresh_command(&self, program: &str, sudo: Option<&str>) -> Option<CommandSpec> {
        match self {
            PackageManager::Apt => Some(Self::base(program, sudo).arg("update")),
            _ => None,
        }
    }

    /// Non-interactive install command
    pub fn install_command(
        &self,
        program: &str,
        sudo: Option<&str>,
        packages: &[&str],
    ) -> Option<CommandSpec> {
        match self {
            PackageManager::Apt | PackageManager::Dnf => Some(
                Self::base(program, sudo)
                    .args(["install", "-y"])
                    .args(packages.iter().copied()),
            ),
            PackageManager::Unavailable => None,
        }
    }

    /// `sudo` may ask for a password, so it keeps the terminal
    fn base(program: &str, sudo: Option<&str>) -> CommandSpec {
        let spec = match sudo {
            Some(sudo) => CommandSpec::new(sudo).arg(program).foreground(),
            None => CommandSpec::new(program),
        };
        spec.stage("deps")
    }
}
