//! Error types for the consuming side.

use thiserror::Error;

/// Errors that can occur while relaying a stream.
///
/// None of these stop a relay: they are logged and kept as the relay's
/// [`last_error`](crate::Relay::last_error).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayError {
    /// The address is not `tcp://`, `http(s)://` or `host:port`.
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// The connection could not be opened.
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    /// The server answered an HTTP request with a non-success status.
    #[error("HTTP status {status} from {address}")]
    HttpStatus { address: String, status: u16 },

    /// Reading from an open connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer closed the connection.
    #[error("Connection closed")]
    Closed,

    /// A message could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl RelayError {
    pub(crate) fn connect(address: &str, err: impl std::fmt::Display) -> Self {
        RelayError::Connect {
            address: address.to_string(),
            message: err.to_string(),
        }
    }

    /// True for errors that end the current connection.
    pub fn is_transport(&self) -> bool {
        !matches!(self, RelayError::Parse(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_parse_errors_keep_the_connection() {
        assert!(!RelayError::Parse("bad".into()).is_transport());
        assert!(RelayError::Closed.is_transport());
        assert!(RelayError::Transport("reset".into()).is_transport());
        assert!(RelayError::connect("mem://x", "refused").is_transport());
    }
}
