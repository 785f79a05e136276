//! Build command - resolve, confirm and run stages

use crate::cache::CacheManager;
use crate::cli::args::Cli;
use crate::config::Config;
use crate::deps::DependencyInstaller;
use crate::error::{UbiqResult, EXIT_INTERRUPTED};
use crate::gate::{ConfirmationGate, PrivilegeGate};
use crate::log::LogSink;
use crate::orchestrator::{Orchestrator, RunReport, RunState, StageSelection};
use crate::pipeline::default_registry;
use crate::stage::{StageRegistry, ALL_STAGES};
use crate::ui::{self, MenuOption, StageProgress, TerminalPrompter, UiContext};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Execute the build command
pub async fn execute(cli: &Cli, config: Config, sink: LogSink) -> UbiqResult<u8> {
    let ctx = UiContext::detect().with_assume_yes(cli.yes || config.general.assume_yes);

    let auto_install = config.general.auto_install && !cli.no_bootstrap;
    let log_path = sink.path().to_path_buf();
    let build = super::host_context(config, sink, Arc::new(StageProgress::new(&ctx)));
    let registry = default_registry(&build)?;

    ui::intro(&ctx, "UbiQ-480 image build");

    let selection = if cli.stages.is_empty() {
        match ui::select_stages(&ctx, "Select stages to build", menu_options(&registry)).await? {
            Some(stages) => StageSelection::Menu(stages),
            None => {
                ui::outro_warn(&ctx, "Nothing selected");
                return Ok(0);
            }
        }
    } else {
        StageSelection::Cli(cli.stages.clone())
    };

    let cache = CacheManager::open(build.layout.records_dir()).await?;
    if cache.is_degraded() {
        ui::step_warn_hint(
            &ctx,
            "Build cache was unreadable and has been reset",
            "every selected stage will rebuild",
        );
    }

    let installer = DependencyInstaller::new(build.runner().clone(), auto_install);
    let mut orchestrator = Orchestrator::new(
        registry,
        build,
        cache,
        ConfirmationGate::new(ctx.assume_yes()),
        PrivilegeGate::detect(),
        Arc::new(TerminalPrompter::new(&ctx)),
    )
    .with_installer(installer);

    // Honoured between stages only; a running stage finishes or fails first
    let stop = orchestrator.stop_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current stage");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let result = orchestrator.run(&selection).await;
    interrupt.abort();
    let report = result?;
    debug!("Run finished in state {}", orchestrator.state());

    Ok(finish(&ctx, &report, &log_path))
}

fn finish(ctx: &UiContext, report: &RunReport, log_path: &std::path::Path) -> u8 {
    match report.state {
        RunState::Aborted if report.interrupted => {
            ui::outro_warn(
                ctx,
                &format!(
                    "Interrupted after {} stage(s); completed artifacts were kept",
                    report.executed.len()
                ),
            );
            EXIT_INTERRUPTED
        }
        RunState::Aborted => {
            ui::outro_warn(ctx, "Build cancelled; nothing was changed");
            0
        }
        _ if report.executed.is_empty() => {
            ui::outro_success(ctx, "Everything is up to date");
            0
        }
        _ => {
            ui::key_value(ctx, "built", &report.executed.join(", "));
            if !report.skipped.is_empty() {
                ui::key_value(ctx, "up to date", &report.skipped.join(", "));
            }
            ui::key_value(ctx, "log", &log_path.display().to_string());
            ui::outro_success(ctx, "Build complete");
            0
        }
    }
}

/// Menu entries: every registered stage, then the meta-target
fn menu_options(registry: &StageRegistry) -> Vec<MenuOption> {
    registry
        .stages()
        .iter()
        .map(|s| MenuOption::new(s.id.as_str(), format!("{} - {}", s.id, s.description)))
        .chain(std::iter::once(MenuOption::new(
            ALL_STAGES,
            format!("{} - every stage", ALL_STAGES),
        )))
        .collect()
}
