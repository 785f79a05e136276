//! Stage selection menu

use super::context::UiContext;
use crate::error::{UbiqError, UbiqResult};
use std::io::{self, BufRead, Write};

/// One menu entry: the value returned and the text shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub value: String,
    pub label: String,
}

impl MenuOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Parsed {
    /// Zero-based indices, de-duplicated in input order
    Selected(Vec<usize>),
    Cancel,
    Retry(&'static str),
}

fn parse_selection(line: &str, count: usize) -> Parsed {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Parsed::Retry("Please choose at least one option.");
    }
    if matches!(trimmed.to_ascii_lowercase().as_str(), "q" | "quit" | "exit") {
        return Parsed::Cancel;
    }

    let tokens: Vec<&str> = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Parsed::Retry("Please choose at least one option.");
    }

    // Every token must be numeric before any is range-checked
    let Ok(numbers) = tokens
        .iter()
        .map(|t| t.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
    else {
        return Parsed::Retry("Selections must be numeric.");
    };
    if numbers.iter().any(|n| *n == 0 || *n > count) {
        return Parsed::Retry("Selection out of range. Try again.");
    }

    let mut picked = Vec::new();
    for number in numbers {
        if !picked.contains(&(number - 1)) {
            picked.push(number - 1);
        }
    }
    Parsed::Selected(picked)
}

/// Numbered menu over arbitrary streams, shown again after every invalid
/// answer. `None` means the user cancelled or input ended.
pub fn prompt_numbered<R: BufRead, W: Write>(
    title: &str,
    options: &[MenuOption],
    input: &mut R,
    out: &mut W,
) -> io::Result<Option<Vec<String>>> {
    loop {
        writeln!(out, "{}", title)?;
        for (i, option) in options.iter().enumerate() {
            writeln!(out, "  {}) {}", i + 1, option.label)?;
        }
        write!(
            out,
            "Enter one or more numbers (comma or space separated), or 'q' to cancel: "
        )?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(None);
        }

        match parse_selection(&line, options.len()) {
            Parsed::Selected(indices) => {
                return Ok(Some(
                    indices.into_iter().map(|i| options[i].value.clone()).collect(),
                ))
            }
            Parsed::Cancel => return Ok(None),
            Parsed::Retry(message) => writeln!(out, "{}", message)?,
        }
    }
}

/// Ask which stages to build
pub async fn select_stages(
    ctx: &UiContext,
    title: &str,
    options: Vec<MenuOption>,
) -> UbiqResult<Option<Vec<String>>> {
    let interactive = ctx.is_interactive();
    let title = title.to_string();

    let result = tokio::task::spawn_blocking(move || {
        if interactive {
            let items: Vec<(String, String, String)> = options
                .iter()
                .map(|o| (o.value.clone(), o.value.clone(), o.label.clone()))
                .collect();
            match cliclack::multiselect(&title)
                .items(&items)
                .required(true)
                .interact()
            {
                Ok(values) => Ok(Some(values)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
                Err(e) => Err(e),
            }
        } else {
            prompt_numbered(&title, &options, &mut io::stdin().lock(), &mut io::stdout())
        }
    })
    .await
    .map_err(|e| UbiqError::Internal(format!("menu task failed: {}", e)))?;

    result.map_err(|e| UbiqError::Prompt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options() -> Vec<MenuOption> {
        vec![
            MenuOption::new("bootloader", "bootloader - Build U-Boot"),
            MenuOption::new("kernel", "kernel - Build the kernel"),
            MenuOption::new("all", "all - Every stage"),
        ]
    }

    fn run(input: &str) -> (Option<Vec<String>>, String) {
        let mut out = Vec::new();
        let picked =
            prompt_numbered("Select stages", &options(), &mut Cursor::new(input), &mut out).unwrap();
        (picked, String::from_utf8(out).unwrap())
    }

    #[test]
    fn lists_numbered_options() {
        let (_, out) = run("q\n");
        assert!(out.starts_with("Select stages\n  1) bootloader - Build U-Boot\n"));
        assert!(out.contains("  3) all - Every stage"));
    }

    #[test]
    fn comma_and_space_separated_with_duplicates() {
        let (picked, _) = run("2, 1 2\n");
        assert_eq!(picked, Some(vec!["kernel".to_string(), "bootloader".to_string()]));
    }

    #[test]
    fn retries_until_valid() {
        let (picked, out) = run("\nabc\n9\n0\n3\n");
        assert_eq!(picked, Some(vec!["all".to_string()]));
        assert!(out.contains("Please choose at least one option."));
        assert!(out.contains("Selections must be numeric."));
        assert_eq!(out.matches("Selection out of range. Try again.").count(), 2);
    }

    #[test]
    fn every_token_is_checked_before_range() {
        assert_eq!(
            parse_selection("9 abc", 3),
            Parsed::Retry("Selections must be numeric.")
        );
        assert_eq!(
            parse_selection("1, 4", 3),
            Parsed::Retry("Selection out of range. Try again.")
        );
        assert_eq!(
            parse_selection(" , ,", 3),
            Parsed::Retry("Please choose at least one option.")
        );
        assert_eq!(parse_selection("3,1", 3), Parsed::Selected(vec![2, 0]));
    }

    #[test]
    fn menu_is_shown_again_after_invalid_answer() {
        let (picked, out) = run("abc\n1\n");
        assert_eq!(picked, Some(vec!["bootloader".to_string()]));
        assert_eq!(out.matches("Select stages\n").count(), 2);
        assert_eq!(out.matches("  2) kernel - Build the kernel").count(), 2);
    }

    #[test]
    fn cancel_words_and_eof() {
        for input in ["q\n", "QUIT\n", "exit\n", ""] {
            let (picked, _) = run(input);
            assert_eq!(picked, None, "{input:?}");
        }
    }
}
