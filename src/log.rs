//! Aggregated build log
//!
//! One file per invocation (`output/build.log`), truncated when the sink is
//! opened and append-only afterwards. Every write is flushed so a crash
//! keeps the history written so far. Subprocess output is written verbatim;
//! orchestrator messages arrive through the `tracing` layer installed in
//! `main` via the [`MakeWriter`] impl.
//!
//! A build sink starts deferred: lines are held in memory until the run is
//! approved and [`LogSink::open`] creates the file. A run that is rejected or
//! declined leaves no log behind.

use crate::error::{UbiqError, UbiqResult};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug)]
enum Target {
    Pending(Vec<u8>),
    Open(File),
}

impl Target {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Target::Pending(buffer) => {
                buffer.extend_from_slice(bytes);
                Ok(())
            }
            Target::Open(file) => {
                file.write_all(bytes)?;
                file.flush()
            }
        }
    }
}

/// Append-only log shared by every component of one invocation
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
    target: Option<Arc<Mutex<Target>>>,
}

impl LogSink {
    /// Sink for `path` that buffers until [`LogSink::open`]
    pub fn deferred(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target: Some(Arc::new(Mutex::new(Target::Pending(Vec::new())))),
        }
    }

    /// Create (truncating) the log file at `path` right away
    pub fn create(path: impl Into<PathBuf>) -> UbiqResult<Self> {
        let sink = Self::deferred(path);
        sink.open()?;
        Ok(sink)
    }

    /// A sink that discards everything (for queries and tests)
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            target: None,
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file and write out everything buffered so far.
    ///
    /// Opening an open or disabled sink does nothing.
    pub fn open(&self) -> UbiqResult<()> {
        let Some(ref target) = self.target else {
            return Ok(());
        };
        let mut target = target
            .lock()
            .map_err(|_| UbiqError::Internal("build log lock poisoned".to_string()))?;
        let Target::Pending(buffer) = &*target else {
            return Ok(());
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UbiqError::io(format!("creating log directory {}", parent.display()), e)
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| UbiqError::io(format!("opening build log {}", self.path.display()), e))?;
        file.write_all(buffer)
            .and_then(|_| file.flush())
            .map_err(|e| UbiqError::io(format!("writing build log {}", self.path.display()), e))?;

        *target = Target::Open(file);
        Ok(())
    }

    /// Record one subprocess output line, tagged with its stage
    pub fn record(&self, stage: &str, line: &str) {
        self.write_line(&format!("[{}] {}", stage, line));
    }

    /// Record a command line before it runs
    pub fn record_command(&self, stage: &str, command: &str) {
        self.write_line(&format!("[{}] $ {}", stage, command));
    }

    /// Record a command's exit status
    pub fn record_exit(&self, stage: &str, code: i32) {
        self.write_line(&format!("[{}] exit status {}", stage, code));
    }

    /// Record an orchestrator-level message with a timestamp
    pub fn note(&self, message: &str) {
        self.write_line(&format!(
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        ));
    }

    fn write_line(&self, line: &str) {
        let Some(ref target) = self.target else {
            return;
        };

        // A log write failure must never fail the build
        if let Ok(mut target) = target.lock() {
            let _ = target.append(format!("{}\n", line).as_bytes());
        }
    }
}

/// Writer handed to `tracing-subscriber` for each event
pub struct LogSinkWriter {
    target: Option<Arc<Mutex<Target>>>,
}

impl Write for LogSinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(ref target) = self.target else {
            return Ok(buf.len());
        };
        let mut target = target
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "build log lock poisoned"))?;
        target.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkWriter {
            target: self.target.clone(),
        }
    }
}
