//! Status reporting to whoever runs the reconciliation

/// Terminal state of the surrounding command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Success,
    HasError,
}

/// Receives progress lines and the final command state
///
/// `set_command_state` is called exactly once per reconciliation.
pub trait StatusSink: Send + Sync {
    fn log_status(&self, message: &str);

    fn log_error(&self, message: &str);

    fn log_warning(&self, message: &str) {
        self.log_status(message);
    }

    fn set_command_state(&self, state: CommandState);
}

impl<S: StatusSink + ?Sized> StatusSink for &S {
    fn log_status(&self, message: &str) {
        (**self).log_status(message)
    }

    fn log_error(&self, message: &str) {
        (**self).log_error(message)
    }

    fn log_warning(&self, message: &str) {
        (**self).log_warning(message)
    }

    fn set_command_state(&self, state: CommandState) {
        (**self).set_command_state(state)
    }
}
