//! Terminal output: the console status sink and styled release fields

use std::sync::Mutex;

use berth_core::StatusCode;
use berth_kube::{CommandState, StatusSink};
use console::{StyledObject, style};

/// Prints reconciliation progress to the terminal
#[derive(Debug, Default)]
pub struct ConsoleSink {
    state: Mutex<Option<CommandState>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// State set by the last reconciliation, if any
    pub fn command_state(&self) -> Option<CommandState> {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatusSink for ConsoleSink {
    fn log_status(&self, message: &str) {
        println!("{} {}", style("→").blue().bold(), message);
    }

    fn log_error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), style(message).red());
    }

    fn log_warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    fn set_command_state(&self, state: CommandState) {
        tracing::debug!(?state, "command state");
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(state);
    }
}

pub fn status_style(status: StatusCode) -> StyledObject<String> {
    let text = status.to_string();
    match status {
        StatusCode::Deployed => style(text).green(),
        StatusCode::Failed => style(text).red(),
        s if s.as_str().starts_with("pending") => style(text).yellow(),
        _ => style(text).dim(),
    }
}
