//! Progress line parsing for long-running host tools
//!
//! `git clone`, `debootstrap` and archive extraction print incremental
//! progress lines. The parsers here turn them into [`ProgressUpdate`]s for
//! the progress bar; lines that don't match are simply passed through.

use std::path::Path;

/// One incremental progress report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub label: String,
    pub percent: Option<f64>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub size_bytes: Option<f64>,
    pub total_size_bytes: Option<f64>,
    pub speed_bytes_per_sec: Option<f64>,
}

/// Parser selected from the command being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressParser {
    /// `Receiving objects:  42% (123/456), 12.34 MiB | 1.23 MiB/s`
    Git,
    /// `Progress: 47% (Configuring system)`
    Debootstrap,
    /// `Extracting: 55% (22/40), 120.0 MiB @ 10.0 MiB/s`
    Archive,
}

impl ProgressParser {
    /// Parse a single output line
    pub fn parse(&self, line: &str) -> Option<ProgressUpdate> {
        let line = line.trim();
        match self {
            Self::Git => parse_git(line),
            Self::Debootstrap => parse_debootstrap(line),
            Self::Archive => parse_archive(line),
        }
    }
}

/// Pick a parser for `program args...` and adjust the arguments so the tool
/// emits progress even when its output is not a terminal.
pub fn prepare(program: &str, args: &[String]) -> (Option<ProgressParser>, Vec<String>) {
    let name = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);

    match name {
        "git" if matches!(args.first().map(String::as_str), Some("clone" | "fetch")) => {
            let mut prepared = args.to_vec();
            if !prepared.iter().any(|a| a == "--progress") {
                prepared.insert(1, "--progress".to_string());
            }
            (Some(ProgressParser::Git), prepared)
        }
        "debootstrap" => (Some(ProgressParser::Debootstrap), args.to_vec()),
        "tar" | "bsdtar" if looks_like_extraction(args) => {
            (Some(ProgressParser::Archive), args.to_vec())
        }
        _ => (None, args.to_vec()),
    }
}

/// Render an update as `label 42% (123/456) 12 MiB @ 1.2 MiB/s`
pub fn format_progress_message(update: &ProgressUpdate) -> String {
    let mut parts = vec![update.label.clone()];

    if let Some(percent) = update.percent {
        parts.push(format!("{:.0}%", percent));
    }
    match (update.current, update.total) {
        (Some(current), Some(total)) => parts.push(format!("({}/{})", current, total)),
        (Some(current), None) => parts.push(format!("({})", current)),
        _ => {}
    }
    if let Some(size) = update.size_bytes {
        match update.total_size_bytes {
            Some(total) => parts.push(format!("{} / {}", format_bytes(size), format_bytes(total))),
            None => parts.push(format_bytes(size)),
        }
    }
    if let Some(speed) = update.speed_bytes_per_sec {
        parts.push(format!("@ {}/s", format_bytes(speed)));
    }

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_extraction(args: &[String]) -> bool {
    args.iter().any(|arg| {
        arg.starts_with("-x") || matches!(arg.as_str(), "--extract" | "--get" | "x" | "xf")
    })
}

fn parse_git(line: &str) -> Option<ProgressUpdate> {
    let line = line
        .strip_prefix("remote:")
        .map(str::trim_start)
        .unwrap_or(line);

    let (label, rest) = line.split_once(':')?;
    if !is_label(label) || !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let (percent, rest) = split_percent(rest.trim_start())?;
    let ((current, total), rest) = split_counts(rest.trim_start())?;

    let rest = rest.strip_suffix(", done.").unwrap_or(rest);
    let (size, speed) = match rest.split_once('|') {
        Some((size, speed)) => (size, Some(speed)),
        None => (rest, None),
    };
    let size = match size.trim() {
        "" => None,
        s => Some(s.strip_prefix(',')?.trim()),
    };

    Some(ProgressUpdate {
        label: label.trim().to_string(),
        percent: Some(percent),
        current: Some(current),
        total: Some(total),
        size_bytes: size.and_then(parse_size),
        speed_bytes_per_sec: speed.and_then(parse_rate),
        ..Default::default()
    })
}

fn parse_debootstrap(line: &str) -> Option<ProgressUpdate> {
    let rest = line.strip_prefix("Progress:")?.trim_start();
    let (percent, rest) = split_percent(rest)?;

    let label = rest
        .trim_start()
        .strip_prefix('(')
        .and_then(|r| r.split_once(')'))
        .map(|(label, _)| label.trim())
        .filter(|label| !label.is_empty())
        .unwrap_or("debootstrap");

    Some(ProgressUpdate {
        label: label.to_string(),
        percent: Some(percent),
        ..Default::default()
    })
}

fn parse_archive(line: &str) -> Option<ProgressUpdate> {
    let idx = line.find('%')?;
    let head = &line[..idx];
    let digits = head.len() - head.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let (label, number) = head.split_at(head.len() - digits);
    if !label.ends_with(char::is_whitespace) {
        return None;
    }
    let label = label.trim_end();
    let label = label.strip_suffix(':').unwrap_or(label);
    if !is_label(label) {
        return None;
    }
    let percent: f64 = number.parse().ok()?;

    let mut rest = line[idx + 1..].trim_start();
    let mut counts = (None, None);
    if rest.starts_with('(') {
        let ((current, total), after) = split_counts(rest)?;
        counts = (Some(current), Some(total));
        rest = after;
    }

    let (size, speed) = match rest.split_once('@') {
        Some((size, speed)) => (size, Some(speed)),
        None => (rest, None),
    };
    let size = match size.trim() {
        "" => None,
        s => Some(s.strip_prefix(',')?.trim()),
    };

    Some(ProgressUpdate {
        label: label.trim().to_string(),
        percent: Some(percent),
        current: counts.0,
        total: counts.1,
        size_bytes: size.and_then(parse_size),
        speed_bytes_per_sec: speed.and_then(parse_rate),
        ..Default::default()
    })
}

fn is_label(s: &str) -> bool {
    !s.trim().is_empty() && s.chars().all(|c| c.is_ascii_alphabetic() || c == ' ')
}

/// Split `42% rest` into the percentage and the remainder
fn split_percent(s: &str) -> Option<(f64, &str)> {
    let (number, rest) = s.split_once('%')?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((number.parse().ok()?, rest))
}

/// Split `(1,234/5,678)rest` into the two counts and the remainder
fn split_counts(s: &str) -> Option<((u64, u64), &str)> {
    let (inner, rest) = s.strip_prefix('(')?.split_once(')')?;
    let (current, total) = inner.split_once('/')?;
    Some(((parse_count(current)?, parse_count(total)?), rest))
}

fn parse_count(s: &str) -> Option<u64> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse `12.34 MiB` (decimal or binary units) into bytes
fn parse_size(s: &str) -> Option<f64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.replace(',', "").parse().ok()?;

    let unit = unit.trim();
    let unit = unit.strip_suffix("/s").unwrap_or(unit);
    let multiplier = match unit {
        "B" => 1.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "PB" => 1e15,
        "KiB" => 1024.0,
        "MiB" => 1024.0_f64.powi(2),
        "GiB" => 1024.0_f64.powi(3),
        "TiB" => 1024.0_f64.powi(4),
        "PiB" => 1024.0_f64.powi(5),
        _ => return None,
    };
    Some(number * multiplier)
}

fn parse_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    parse_size(s.strip_suffix("/s").unwrap_or(s).trim())
}

/// Human-readable size with binary units
pub fn format_bytes(value: f64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    let mut value = value;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value.abs() >= 10.0 || unit == 0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: f64 = 1024.0 * 1024.0;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn git_receiving_objects() {
        let update = ProgressParser::Git
            .parse("Receiving objects:  42% (123/456), 12.34 MiB | 1.23 MiB/s")
            .unwrap();
        assert_eq!(update.label, "Receiving objects");
        assert_eq!(update.percent, Some(42.0));
        assert_eq!(update.current, Some(123));
        assert_eq!(update.total, Some(456));
        assert!((update.size_bytes.unwrap() - 12.34 * MIB).abs() < 1.0);
        assert!((update.speed_bytes_per_sec.unwrap() - 1.23 * MIB).abs() < 1.0);
    }

    #[test]
    fn git_remote_counting_done() {
        let update = ProgressParser::Git
            .parse("remote: Counting objects: 100% (1,024/1,024), done.")
            .unwrap();
        assert_eq!(update.label, "Counting objects");
        assert_eq!(update.current, Some(1024));
        assert_eq!(update.size_bytes, None);
    }

    #[test]
    fn git_ignores_unrelated_lines() {
        assert!(ProgressParser::Git.parse("Cloning into 'linux'...").is_none());
        assert!(ProgressParser::Git.parse("warning: redirecting to https://x").is_none());
    }

    #[test]
    fn prepare_adds_progress_flag_for_git_clone() {
        let (parser, args) = prepare("git", &strings(&["clone", "repo", "dest"]));
        assert_eq!(parser, Some(ProgressParser::Git));
        assert_eq!(args, strings(&["clone", "--progress", "repo", "dest"]));

        let (_, args) = prepare("/usr/bin/git", &strings(&["fetch", "--progress", "origin"]));
        assert_eq!(args.iter().filter(|a| *a == "--progress").count(), 1);
    }

    #[test]
    fn prepare_leaves_other_commands_alone() {
        let (parser, args) = prepare("git", &strings(&["checkout", "-f", "v5.10"]));
        assert!(parser.is_none());
        assert_eq!(args, strings(&["checkout", "-f", "v5.10"]));

        let (parser, _) = prepare("tar", &strings(&["-czf", "out.tgz", "dir"]));
        assert!(parser.is_none());

        let (parser, _) = prepare("tar", &strings(&["-xf", "rootfs.tar"]));
        assert_eq!(parser, Some(ProgressParser::Archive));

        let (parser, _) = prepare("debootstrap", &strings(&["--foreign", "bookworm"]));
        assert_eq!(parser, Some(ProgressParser::Debootstrap));
    }

    #[test]
    fn debootstrap_progress_line() {
        let update = ProgressParser::Debootstrap
            .parse("Progress: 47% (Configuring system)")
            .unwrap();
        assert_eq!(update.label, "Configuring system");
        assert_eq!(update.percent, Some(47.0));

        let bare = ProgressParser::Debootstrap.parse("Progress: 5%").unwrap();
        assert_eq!(bare.label, "debootstrap");
        assert!(ProgressParser::Debootstrap
            .parse("I: Retrieving InRelease")
            .is_none());
    }

    #[test]
    fn archive_progress_line() {
        let update = ProgressParser::Archive
            .parse("Extracting: 55% (22/40), 120.0 MiB @ 10.0 MiB/s")
            .unwrap();
        assert_eq!(update.label, "Extracting");
        assert_eq!(update.percent, Some(55.0));
        assert_eq!(update.current, Some(22));
        assert_eq!(update.total, Some(40));
        assert!((update.size_bytes.unwrap() - 120.0 * MIB).abs() < 1.0);
        assert!((update.speed_bytes_per_sec.unwrap() - 10.0 * MIB).abs() < 1.0);

        let plain = ProgressParser::Archive.parse("Unpacking 10%").unwrap();
        assert_eq!(plain.label, "Unpacking");
        assert_eq!(plain.current, None);
    }

    #[test]
    fn format_message_uses_binary_units() {
        let update = ProgressUpdate {
            label: "Receiving objects".into(),
            percent: Some(42.0),
            current: Some(123),
            total: Some(456),
            size_bytes: Some(12.34 * MIB),
            speed_bytes_per_sec: Some(1.23 * MIB),
            ..Default::default()
        };
        assert_eq!(
            format_progress_message(&update),
            "Receiving objects 42% (123/456) 12 MiB @ 1.2 MiB/s"
        );
    }

    #[test]
    fn format_bytes_small_values() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KiB");
    }
}
