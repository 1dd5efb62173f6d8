use std::io;

use thiserror::Error;

/// Why a connect attempt was rejected.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("No COM port selected")]
    InvalidPort,

    #[error("Invalid baud rate: {0:?}")]
    InvalidBaud(String),

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Failed to open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("Connect to {0} cancelled")]
    Cancelled(String),

    #[error("Failed to start reader for {port}: {source}")]
    ReaderSpawn {
        port: String,
        #[source]
        source: io::Error,
    },
}

/// Why a send was rejected.
///
/// A write failure leaves the session connected; only the read side decides
/// that the link is dead.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    Write(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_keeps_transport_text() {
        let err = ConnectError::Connection {
            port: "/dev/ttyUSB0".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"),
        };
        assert_eq!(err.to_string(), "Failed to open /dev/ttyUSB0: Permission denied");
    }

    #[test]
    fn test_write_error_keeps_transport_text() {
        let err = SendError::Write(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        assert_eq!(err.to_string(), "Write failed: device unplugged");
    }

    #[test]
    fn test_invalid_baud_quotes_input() {
        assert_eq!(
            ConnectError::InvalidBaud("96oo".into()).to_string(),
            "Invalid baud rate: \"96oo\""
        );
    }
}
