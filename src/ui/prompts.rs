//! Yes/no confirmation on the terminal

use super::context::UiContext;
use super::output;
use crate::error::{UbiqError, UbiqResult};
use crate::gate::Prompter;
use async_trait::async_trait;
use std::io::{self, BufRead, Write};

/// Prompter backed by cliclack on a TTY and by plain stdin otherwise
pub struct TerminalPrompter {
    ctx: UiContext,
}

impl TerminalPrompter {
    pub fn new(ctx: &UiContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

/// Read one answer line. Only "y" and "yes" approve; end of input declines.
pub fn read_answer<R: BufRead>(input: &mut R) -> io::Result<bool> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(false);
    }
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[async_trait]
impl Prompter for TerminalPrompter {
    fn disclose(&self, title: &str, body: &str) {
        output::note(&self.ctx, title, body);
    }

    async fn confirm(&self, question: &str) -> UbiqResult<bool> {
        let question = question.to_string();

        if self.ctx.is_interactive() {
            let result = tokio::task::spawn_blocking(move || {
                cliclack::confirm(&question).initial_value(false).interact()
            })
            .await
            .map_err(|e| UbiqError::Internal(format!("prompt task failed: {}", e)))?;

            return match result {
                Ok(answer) => Ok(answer),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
                Err(e) => Err(UbiqError::Prompt(e.to_string())),
            };
        }

        tokio::task::spawn_blocking(move || {
            print!("{} [y/N] ", question);
            io::stdout().flush().ok();
            read_answer(&mut io::stdin().lock())
        })
        .await
        .map_err(|e| UbiqError::Internal(format!("prompt task failed: {}", e)))?
        .map_err(|e| UbiqError::Prompt(e.to_string()))
    }
}
