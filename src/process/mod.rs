//! External command execution
//!
//! Every subprocess the build starts (git, make, mkimage, debootstrap,
//! losetup, ...) goes through [`ProcessRunner`]. The call blocks the
//! awaiting stage until the child exits; stdout and stderr are merged in
//! arrival order, mirrored line by line into the build log, and handed to an
//! optional observer for live progress display.
//!
//! Children start in their own process group, so a terminal Ctrl-C reaches
//! only the orchestrator, which stops at the next stage boundary.

pub mod progress;

pub use progress::{format_bytes, format_progress_message, ProgressParser, ProgressUpdate};

use crate::error::{UbiqError, UbiqResult};
use crate::log::LogSink;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in command error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Callback invoked for every output line, with a parsed progress update
/// when the command has a progress parser.
pub type LineObserver<'a> = &'a (dyn Fn(&str, Option<&ProgressUpdate>) + Send + Sync);

/// A command to run
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    stdin: Option<String>,
    stage: String,
    foreground: bool,
}

impl CommandSpec {
    /// Start building a command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            stage: "host".to_string(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.display().to_string());
        self
    }

    /// Run inside `dir`
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable on top of the inherited environment
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Text written to the child's stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Keep the child in the terminal's process group so it can prompt
    /// on the tty (a `sudo` password, for instance)
    pub fn foreground(mut self) -> Self {
        self.foreground = true;
        self
    }

    /// Stage label used in the build log
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn stage_label(&self) -> &str {
        &self.stage
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Shell-like rendering for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code
    pub code: i32,
    /// Combined stdout and stderr
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external commands and mirrors their output into the build log
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    sink: LogSink,
}

impl ProcessRunner {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Run a command and report its exit status without failing on non-zero
    pub async fn run(&self, spec: &CommandSpec) -> UbiqResult<CommandOutput> {
        self.run_observed(spec, &|_, _| {}).await
    }

    /// Run a command, failing with the output tail on non-zero exit
    pub async fn run_checked(&self, spec: &CommandSpec) -> UbiqResult<CommandOutput> {
        self.run_checked_observed(spec, &|_, _| {}).await
    }

    pub async fn run_checked_observed(
        &self,
        spec: &CommandSpec,
        observer: LineObserver<'_>,
    ) -> UbiqResult<CommandOutput> {
        let output = self.run_observed(spec, observer).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(UbiqError::CommandFailed {
                command: spec.display(),
                code: output.code,
                tail: error_tail(&output.output),
            })
        }
    }

    /// Run a command, calling `observer` for every output line
    pub async fn run_observed(
        &self,
        spec: &CommandSpec,
        observer: LineObserver<'_>,
    ) -> UbiqResult<CommandOutput> {
        let (parser, args) = progress::prepare(&spec.program, &spec.args);
        let rendered = std::iter::once(spec.program.clone())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        debug!("Executing: {}", rendered);
        self.sink.record_command(&spec.stage, &rendered);

        let mut command = Command::new(&spec.program);
        command
            .args(&args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = spec.cwd {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        if !spec.foreground {
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| UbiqError::spawn(rendered.clone(), e))?;

        if let Some(ref input) = spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| UbiqError::io(format!("writing stdin of {}", rendered), e))?;
                // Dropping closes the pipe so the child sees EOF
            }
        }

        let on_line = |line: &str| {
            self.sink.record(&spec.stage, line);
            let update = parser.as_ref().and_then(|p| p.parse(line));
            observer(line, update.as_ref());
        };
        let lines = stream_child_output(&mut child, &on_line).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| UbiqError::io(format!("waiting for {}", rendered), e))?;

        let code = status
            .code()
            .ok_or_else(|| UbiqError::ProcessSignaled(rendered.clone()))?;
        self.sink.record_exit(&spec.stage, code);

        Ok(CommandOutput {
            code,
            output: lines.join("\n"),
        })
    }
}

/// Extract the useful tail of command output for error diagnostics.
pub(crate) fn error_tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let total = lines.len();
    let tail = if total > ERROR_TAIL_LINES {
        &lines[total - ERROR_TAIL_LINES..]
    } else {
        &lines[..]
    };
    tail.join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_line` for each line.
///
/// Carriage returns split lines too, so in-place progress updates (git,
/// debootstrap) arrive one by one. Returns all collected lines.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_line: &(dyn Fn(&str) + Send + Sync),
) -> UbiqResult<Vec<String>> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| UbiqError::Internal("child stderr was not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| UbiqError::Internal("child stdout was not piped".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    let emit = |raw: String, all_output: &mut Vec<String>| {
        for segment in raw.split('\r').filter(|s| !s.trim().is_empty()) {
            on_line(segment);
            all_output.push(segment.to_string());
        }
    };

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => emit(line, &mut all_output),
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => emit(line, &mut all_output),
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}
