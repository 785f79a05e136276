//! Interactive vs CI detection

use std::io::IsTerminal;

/// Environment variables set by common CI systems
const CI_VARS: [&str; 9] = [
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Decides between cliclack/indicatif output and plain lines
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    assume_yes: bool,
}

impl UiContext {
    pub fn detect() -> Self {
        Self {
            interactive: Self::detect_interactive(),
            assume_yes: false,
        }
    }

    /// Plain output regardless of the terminal
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            assume_yes: false,
        }
    }

    pub fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn assume_yes(&self) -> bool {
        self.assume_yes
    }

    /// Spinners, progress bars and cliclack boxes
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    fn detect_interactive() -> bool {
        if !std::io::stdout().is_terminal() || !std::io::stdin().is_terminal() {
            return false;
        }
        !CI_VARS.iter().any(|var| std::env::var_os(var).is_some())
    }
}
