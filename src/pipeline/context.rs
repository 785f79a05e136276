//! Shared state handed to every stage action

use crate::config::Config;
use crate::error::UbiqResult;
use crate::image::DiskOps;
use crate::log::LogSink;
use crate::process::{CommandOutput, CommandSpec, ProcessRunner, ProgressUpdate};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receives stage lifecycle events and subprocess output for display
pub trait ProgressReporter: Send + Sync {
    fn stage_started(&self, stage: &str, description: &str, index: usize, total: usize);

    fn stage_skipped(&self, stage: &str);

    /// One line of subprocess output, with parsed progress when available
    fn line(&self, line: &str, update: Option<&ProgressUpdate>);

    fn stage_finished(&self, stage: &str, success: bool);
}

/// Discards everything; used when output is not a terminal and in tests
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn stage_started(&self, _stage: &str, _description: &str, _index: usize, _total: usize) {}
    fn stage_skipped(&self, _stage: &str) {}
    fn line(&self, _line: &str, _update: Option<&ProgressUpdate>) {}
    fn stage_finished(&self, _stage: &str, _success: bool) {}
}

/// Where everything lives under the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    log_file: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, log_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            log_file: log_file.into(),
        }
    }

    /// Artifacts are written directly here
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Per-stage completion records
    pub fn records_dir(&self) -> PathBuf {
        self.cache_dir().join("stages")
    }

    /// Git checkouts of the bootloader and kernel
    pub fn sources_dir(&self) -> PathBuf {
        self.cache_dir().join("sources")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.log_file)
    }
}

/// Everything a stage needs to do its work
#[derive(Clone)]
pub struct BuildContext {
    pub config: Arc<Config>,
    pub layout: OutputLayout,
    runner: ProcessRunner,
    disk: Arc<dyn DiskOps>,
    reporter: Arc<dyn ProgressReporter>,
}

impl BuildContext {
    pub fn new(
        config: Config,
        runner: ProcessRunner,
        disk: Arc<dyn DiskOps>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let layout = OutputLayout::new(
            config.general.output_dir.clone(),
            config.general.log_file.clone(),
        );
        Self {
            config: Arc::new(config),
            layout,
            runner,
            disk,
            reporter,
        }
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn sink(&self) -> &LogSink {
        self.runner.sink()
    }

    pub fn disk(&self) -> Arc<dyn DiskOps> {
        Arc::clone(&self.disk)
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    /// Run a command, forwarding its output to the reporter
    pub async fn run(&self, spec: CommandSpec) -> UbiqResult<CommandOutput> {
        self.runner
            .run_checked_observed(&spec, &|line, update| self.reporter.line(line, update))
            .await
    }

    /// Run a command whose failure is an answer, not an error
    pub async fn probe(&self, spec: CommandSpec) -> UbiqResult<bool> {
        Ok(self.runner.run(&spec).await?.success())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_keeps_cache_apart_from_artifacts() {
        let layout = OutputLayout::new("output", "build.log");
        assert_eq!(layout.artifact("zImage"), PathBuf::from("output/zImage"));
        assert_eq!(layout.records_dir(), PathBuf::from("output/cache/stages"));
        assert_eq!(layout.sources_dir(), PathBuf::from("output/cache/sources"));
        assert_eq!(layout.log_path(), PathBuf::from("output/build.log"));
    }
}
