//! Terminal output for the build
//!
//! Uses `cliclack` and `indicatif` on an interactive terminal and falls back
//! to plain, greppable lines in CI or when stdin/stdout are not a TTY.

mod context;
mod menu;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use menu::{prompt_numbered, select_stages, MenuOption};
pub use output::{
    intro, key_value, note, outro_success, outro_warn, report_error, step_error, step_ok,
    step_skip, step_warn_hint,
};
pub use progress::StageProgress;
pub use prompts::{read_answer, TerminalPrompter};
