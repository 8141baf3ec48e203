// Consistent exit codes for the tandem CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = relay not reachable
//   12 = conflict (document busy or not registered)
//   13 = network error

use std::process;

use crate::client::relay_error;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    RelayDown = 10,
    Conflict = 12,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(relay) = relay_error(err) {
            return relay
                .code
                .as_deref()
                .map(Self::from_relay_code)
                .unwrap_or(Self::Error);
        }

        for cause in err.chain() {
            if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
                return if http.is_connect() {
                    Self::RelayDown
                } else {
                    Self::Network
                };
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused => Self::RelayDown,
                    std::io::ErrorKind::TimedOut => Self::Network,
                    _ => Self::Error,
                };
            }
        }

        Self::Error
    }

    /// Map a relay error code to an exit code.
    pub fn from_relay_code(code: &str) -> Self {
        match code {
            "LOCK_UNAVAILABLE" | "NOT_REGISTERED" => Self::Conflict,

            "MISSING_PARAMETER" | "INVALID_PARAMETER" | "INVALID_ACTION" => Self::Usage,

            _ => Self::Error,
        }
    }

    /// Exit the process with this code.
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// Whether the error chain holds a refused or failed connection.
pub fn is_connect_failure(err: &anyhow::Error) -> bool {
    ExitCode::from_error(err) == ExitCode::RelayDown
}
