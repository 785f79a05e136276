//! Check-deps command - report unmet host requirements without installing

use crate::config::Config;
use crate::deps::{requirement, DependencyInstaller};
use crate::error::{UbiqResult, EXIT_UNMET_DEPENDENCY};
use crate::log::LogSink;
use crate::pipeline::{default_registry, SilentReporter};
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// Execute the check-deps command
pub async fn execute(config: Config) -> UbiqResult<u8> {
    let ctx = UiContext::detect();
    let scripts = config.scripts.clone();
    let build = super::host_context(config, LogSink::disabled(), Arc::new(SilentReporter));
    let registry = default_registry(&build)?;

    let mut tools: Vec<&str> = Vec::new();
    for stage in registry.stages() {
        for tool in &stage.tools {
            if !tools.contains(tool) {
                tools.push(*tool);
            }
        }
    }

    ui::intro(&ctx, "Host requirements");

    let installer = DependencyInstaller::new(build.runner().clone(), false);
    ui::key_value(&ctx, "packages", installer.manager().name());
    let missing = installer.missing(&tools);

    for tool in &tools {
        if !missing.iter().any(|m| m == tool) {
            ui::step_ok(&ctx, tool);
            continue;
        }
        match requirement(tool) {
            Some(req) => ui::step_warn_hint(&ctx, &format!("{} not found", tool), req.hint),
            None => ui::step_error(&ctx, &format!("{} not found", tool)),
        }
    }

    let script_env = installer
        .ensure_script_env(&scripts.requirements, &scripts.venv_dir)
        .await?;
    if let Some(instructions) = &script_env {
        ui::note(&ctx, "Python helper environment missing", instructions);
    }

    if missing.is_empty() && script_env.is_none() {
        ui::outro_success(&ctx, "All host requirements are met");
        Ok(0)
    } else {
        ui::outro_warn(
            &ctx,
            &format!(
                "{} requirement(s) unmet; run a build without --no-bootstrap to install them",
                missing.len() + usize::from(script_env.is_some())
            ),
        );
        Ok(EXIT_UNMET_DEPENDENCY)
    }
}
