//! Process exit codes

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Invalid config file or command-line value
    ConfigError = 2,
    /// Cannot create, bind or secure the listening socket
    SocketError = 3,
    /// No agent reachable
    AgentUnavailable = 4,
    /// The agent answered FAILURE
    AgentRefused = 5,
}

impl ExitCode {
    /// Pick the exit code for an error bubbled up to `main`
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.chain().find_map(|cause| cause.downcast_ref::<Error>()) {
            Some(Error::Config(_) | Error::TomlParse(_)) => ExitCode::ConfigError,
            Some(Error::Socket(_)) => ExitCode::SocketError,
            Some(Error::AgentNotAvailable(_)) => ExitCode::AgentUnavailable,
            Some(Error::AgentFailure(_) | Error::ConstraintRejected(_)) => ExitCode::AgentRefused,
            _ => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
