//! Error types for ubiq480
//!
//! All modules use `UbiqResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ubiq480 operations
pub type UbiqResult<T> = Result<T, UbiqError>;

/// Process exit code for a failed stage or subprocess
pub const EXIT_STAGE_FAILED: u8 = 1;
/// Process exit code for configuration-time errors
pub const EXIT_CONFIG: u8 = 2;
/// Process exit code for unmet host dependencies
pub const EXIT_UNMET_DEPENDENCY: u8 = 3;
/// Process exit code for insufficient privilege
pub const EXIT_PRIVILEGE: u8 = 4;
/// Process exit code when the image is locked by another build
pub const EXIT_IMAGE_BUSY: u8 = 5;
/// Process exit code after Ctrl-C stopped a build between stages
pub const EXIT_INTERRUPTED: u8 = 130;

/// All errors that can occur while building an image
#[derive(Error, Debug)]
pub enum UbiqError {
    // Stage graph errors
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Stage already registered: {0}")]
    DuplicateStage(String),

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    // Gate errors
    #[error("Stage '{stage}' requires root privileges (effective uid {euid})")]
    InsufficientPrivilege { stage: String, euid: u32 },

    #[error("Image {0} is being assembled by another process")]
    ImageBusy(PathBuf),

    // Host dependency errors
    #[error("Stage '{stage}' requires missing tool '{tool}'")]
    UnmetDependency {
        stage: String,
        tool: String,
        hint: Option<String>,
    },

    #[error("Insufficient disk space in {path}: {available} bytes available, {required} required")]
    InsufficientDiskSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    // Stage execution errors
    #[error("Stage '{stage}' did not produce {path}")]
    MissingArtifact { stage: String, path: PathBuf },

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<UbiqError>,
    },

    #[error("Teardown failed: {0}")]
    Teardown(String),

    // Process errors
    #[error("Command failed: {command}, exit code: {code}")]
    CommandFailed {
        command: String,
        code: i32,
        tail: String,
    },

    #[error("Failed to start command: {command}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command terminated by signal: {0}")]
    ProcessSignaled(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Prompt errors
    #[error("Prompt failed: {0}")]
    Prompt(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UbiqError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command spawn error
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandSpawn {
            command: command.into(),
            source,
        }
    }

    /// Wrap an error raised while executing a stage
    pub fn in_stage(stage: impl Into<String>, source: UbiqError) -> Self {
        match source {
            // Already classified with the stage name
            e @ (Self::StageFailed { .. }
            | Self::InsufficientPrivilege { .. }
            | Self::UnmetDependency { .. }
            | Self::ImageBusy(_)) => e,
            other => Self::StageFailed {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage wrappers
    pub fn root(&self) -> &UbiqError {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Single-line classification printed before the message
    pub fn classification(&self) -> &'static str {
        match self.root() {
            Self::UnknownStage(_)
            | Self::DuplicateStage(_)
            | Self::CyclicDependency { .. }
            | Self::ConfigInvalid { .. } => "configuration error",
            Self::InsufficientPrivilege { .. } => "insufficient privilege",
            Self::ImageBusy(_) => "image busy",
            Self::UnmetDependency { .. } => "unmet dependency",
            Self::InsufficientDiskSpace { .. } => "insufficient disk space",
            Self::Prompt(_) => "prompt error",
            _ => "stage failed",
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            Self::UnknownStage(_)
            | Self::DuplicateStage(_)
            | Self::CyclicDependency { .. }
            | Self::ConfigInvalid { .. } => EXIT_CONFIG,
            Self::UnmetDependency { .. } => EXIT_UNMET_DEPENDENCY,
            Self::InsufficientPrivilege { .. } => EXIT_PRIVILEGE,
            Self::ImageBusy(_) => EXIT_IMAGE_BUSY,
            _ => EXIT_STAGE_FAILED,
        }
    }

    /// Captured output tail for subprocess failures
    pub fn output_tail(&self) -> Option<&str> {
        match self.root() {
            Self::CommandFailed { tail, .. } if !tail.is_empty() => Some(tail),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<String> {
        match self.root() {
            Self::InsufficientPrivilege { .. } => {
                Some("Re-run with sudo, or build the unprivileged stages first".to_string())
            }
            Self::ImageBusy(_) => Some("Wait for the other build to finish".to_string()),
            Self::UnmetDependency { hint, tool, .. } => Some(
                hint.clone()
                    .unwrap_or_else(|| format!("Install '{}' and retry", tool)),
            ),
            Self::UnknownStage(_) => Some("Run: ubiq480 --list".to_string()),
            Self::InsufficientDiskSpace { .. } => {
                Some("Free disk space or move the output directory".to_string())
            }
            Self::CommandFailed { .. } => Some("Full output is in the build log".to_string()),
            _ => None,
        }
    }
}
