//! Per-stage progress display

use super::context::UiContext;
use super::output;
use crate::pipeline::ProgressReporter;
use crate::process::{format_progress_message, ProgressUpdate};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Longest output line shown next to the bar
const MAX_MESSAGE: usize = 60;

/// Shows one indicatif bar per running stage, or plain milestone lines in CI
pub struct StageProgress {
    ctx: UiContext,
    bar: Mutex<Option<ProgressBar>>,
    /// Last percentage printed in plain mode, in tens
    last_decile: Mutex<Option<u8>>,
}

impl StageProgress {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            ctx: ctx.clone(),
            bar: Mutex::new(None),
            last_decile: Mutex::new(None),
        }
    }

    fn new_bar(stage: &str) -> ProgressBar {
        let bar = ProgressBar::new(100);
        let template = ProgressStyle::default_bar()
            .template("  {spinner:.blue} {prefix:.bold}  {bar:20.blue/dim} {pos:>3}% {msg:.dim}  {elapsed:.dim}")
            .map(|s| s.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"));
        if let Ok(template) = template {
            bar.set_style(template);
        }
        bar.set_prefix(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

/// Shorten a line for the status message, on a char boundary
fn truncate(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() > MAX_MESSAGE {
        let head: String = trimmed.chars().take(MAX_MESSAGE - 3).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

impl ProgressReporter for StageProgress {
    fn stage_started(&self, stage: &str, description: &str, index: usize, total: usize) {
        if let Ok(mut last) = self.last_decile.lock() {
            *last = None;
        }
        if self.ctx.use_fancy_output() {
            if let Ok(mut slot) = self.bar.lock() {
                *slot = Some(Self::new_bar(stage));
            }
        } else {
            println!(
                "{} [{}/{}] {}: {}",
                style("==>").blue().bold(),
                index,
                total,
                stage,
                description
            );
        }
    }

    fn stage_skipped(&self, stage: &str) {
        output::step_skip(&self.ctx, &format!("{} is up to date", stage));
    }

    fn line(&self, line: &str, update: Option<&ProgressUpdate>) {
        if self.ctx.use_fancy_output() {
            let Ok(slot) = self.bar.lock() else { return };
            let Some(bar) = slot.as_ref() else { return };
            match update {
                Some(update) => {
                    if let Some(percent) = update.percent {
                        bar.set_position(percent.round().clamp(0.0, 100.0) as u64);
                    }
                    bar.set_message(truncate(&format_progress_message(update)));
                }
                None => bar.set_message(truncate(line)),
            }
            return;
        }

        // Plain mode: subprocess output goes to the build log only, with
        // one console line per ten percent of parsed progress
        let Some(update) = update else { return };
        let Some(percent) = update.percent else { return };
        let decile = (percent.clamp(0.0, 100.0) / 10.0) as u8;
        if let Ok(mut last) = self.last_decile.lock() {
            if *last != Some(decile) {
                *last = Some(decile);
                println!("    {}", format_progress_message(update));
            }
        }
    }

    fn stage_finished(&self, stage: &str, success: bool) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.disable_steady_tick();
                bar.finish_and_clear();
            }
        }
        if success {
            output::step_ok(&self.ctx, &format!("{} finished", stage));
        } else {
            output::step_error(&self.ctx, &format!("{} failed", stage));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("  CC  init/main.o  "), "CC  init/main.o");
        let long = "é".repeat(80);
        let short = truncate(&long);
        assert_eq!(short.chars().count(), MAX_MESSAGE);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn plain_reporter_does_not_panic() {
        let progress = StageProgress::new(&UiContext::non_interactive());
        progress.stage_started("kernel", "Build the kernel zImage", 1, 2);
        progress.line("  CC      init/main.o", None);
        let update = ProgressUpdate {
            label: "Receiving objects".into(),
            percent: Some(42.0),
            ..Default::default()
        };
        progress.line("Receiving objects: 42%", Some(&update));
        progress.line("Receiving objects: 43%", Some(&update));
        progress.stage_finished("kernel", true);
        progress.stage_skipped("dtb");
    }
}
