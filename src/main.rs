//! ubiq480 - UbiQ-480 SD card image builder
//!
//! CLI entry point that dispatches to the build or a query mode.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use ubiq480::cli::{commands, Cli, Mode};
use ubiq480::config::{Config, ConfigManager};
use ubiq480::error::UbiqResult;
use ubiq480::log::LogSink;
use ubiq480::pipeline::OutputLayout;
use ubiq480::ui;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let hint = e.hint();
            ui::report_error(
                e.classification(),
                &e.to_string(),
                hint.as_deref(),
                e.output_tail(),
            );
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> UbiqResult<u8> {
    let manager = match cli.config.clone() {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    let mut config = manager.load().await?;
    if let Some(dir) = &cli.output_dir {
        config.general.output_dir = dir.clone();
    }

    // Only a build writes the aggregated log, and only once it is approved
    let sink = match cli.mode() {
        Mode::Build => LogSink::deferred(layout(&config).log_path()),
        Mode::List | Mode::CheckDeps => LogSink::disabled(),
    };
    init_tracing(cli.verbose, &sink);
    if let Some(path) = manager.path() {
        tracing::debug!("Configuration: {}", path.display());
    }
    let effective = ConfigManager::render(&config)?;
    tracing::debug!("Effective configuration:\n{}", effective);

    match cli.mode() {
        Mode::Build => commands::build(&cli, config, sink).await,
        Mode::List => commands::list(config).await,
        Mode::CheckDeps => commands::deps(config).await,
    }
}

fn layout(config: &Config) -> OutputLayout {
    OutputLayout::new(
        config.general.output_dir.clone(),
        config.general.log_file.clone(),
    )
}

/// Console: 0 = warn, 1 = info, 2+ = debug. The build log always gets info.
fn init_tracing(verbose: u8, sink: &LogSink) {
    let (console, file) = match verbose {
        0 => ("ubiq480=warn", "ubiq480=info"),
        1 => ("ubiq480=info", "ubiq480=info"),
        _ => ("ubiq480=debug", "ubiq480=debug"),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(console)),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(sink.clone())
                .with_filter(EnvFilter::new(file)),
        )
        .init();
}
