//! List command - show the stages and what they produce

use crate::config::Config;
use crate::error::UbiqResult;
use crate::log::LogSink;
use crate::pipeline::{default_registry, SilentReporter};
use crate::process::format_bytes;
use console::style;
use std::sync::Arc;

/// Execute the list command
pub async fn execute(config: Config) -> UbiqResult<u8> {
    let ctx = super::host_context(config, LogSink::disabled(), Arc::new(SilentReporter));
    let registry = default_registry(&ctx)?;

    println!(
        "{:<12} {:<22} {:<5} {}",
        style("STAGE").bold(),
        style("REQUIRES").bold(),
        style("ROOT").bold(),
        style("OUTPUT").bold()
    );
    println!("{}", "-".repeat(72));

    for stage in registry.stages() {
        let requires = if stage.prerequisites.is_empty() {
            "-".to_string()
        } else {
            stage.prerequisites.join(",")
        };
        let root = if stage.privileged { "yes" } else { "no" };
        let outputs: Vec<String> = stage
            .outputs
            .iter()
            .map(|a| format!("{} (~{})", a.path.display(), format_bytes(a.estimated_bytes as f64)))
            .collect();

        println!(
            "{:<12} {:<22} {:<5} {}",
            style(&stage.id).cyan(),
            requires,
            root,
            outputs.join(", ")
        );
        println!("{:<12} {}", "", style(&stage.description).dim());
    }

    println!();
    println!("{:<12} {}", style("all").cyan(), style("every stage above").dim());
    Ok(0)
}
