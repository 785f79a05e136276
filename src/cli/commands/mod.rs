//! CLI command implementations

pub mod build;
pub mod deps;
pub mod list;

pub use build::execute as build;
pub use deps::execute as deps;
pub use list::execute as list;

use crate::config::Config;
use crate::image::HostDiskOps;
use crate::log::LogSink;
use crate::pipeline::{BuildContext, ProgressReporter};
use crate::process::ProcessRunner;
use std::sync::Arc;

/// Build context wired to the real host
fn host_context(
    config: Config,
    sink: LogSink,
    reporter: Arc<dyn ProgressReporter>,
) -> BuildContext {
    let runner = ProcessRunner::new(sink);
    let disk = Arc::new(HostDiskOps::new(runner.clone()));
    BuildContext::new(config, runner, disk, reporter)
}
