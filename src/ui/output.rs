//! Line output with a plain fallback for CI logs

use super::context::UiContext;
use console::style;

pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).blue().bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!("{} {}", style("[OK]").green(), message);
    }
}

pub fn outro_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).yellow().bold()).ok();
    } else {
        println!("{} {}", style("[WARN]").yellow(), message);
    }
}

/// Titled block; the body may span several lines
pub fn note(ctx: &UiContext, title: &str, body: &str) {
    if ctx.use_fancy_output() {
        cliclack::note(title, body).ok();
    } else {
        println!("{}:", style(title).bold());
        for line in body.lines() {
            println!("  {}", line);
        }
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(message).ok();
    } else {
        println!("  {} {}", style("[OK]").green(), message);
    }
}

pub fn step_skip(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(style(message).dim()).ok();
    } else {
        println!("  {} {}", style("[SKIP]").dim(), message);
    }
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

pub fn step_error(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::error(message).ok();
    } else {
        println!("  {} {}", style("[FAIL]").red(), message);
    }
}

/// Aligned key and value
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {:<12} {}", style(key).dim(), value);
    } else {
        println!("  {:<12} {}", key, value);
    }
}

/// Fatal error report on stderr: classification, message, hint and output tail
pub fn report_error(classification: &str, message: &str, hint: Option<&str>, tail: Option<&str>) {
    eprintln!("{} {}: {}", style("error").red().bold(), classification, message);
    if let Some(tail) = tail {
        eprintln!("{}", style("--- last output ---").dim());
        for line in tail.lines() {
            eprintln!("  {}", line);
        }
    }
    if let Some(hint) = hint {
        eprintln!("{} {}", style("hint:").cyan(), hint);
    }
}
