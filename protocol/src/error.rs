use serde::{self, Deserializer, Serializer};
use std::time::Duration;
use std::{io, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::ErrorRecord;

#[derive(Serialize, Deserialize)]
struct AnyHowError {
    description: String,
    backtrace: String,
}

#[derive(Serialize, Deserialize)]
struct IoError {
    description: String,
    kind: String,
}

fn serialize_io_error<S>(error: &Arc<io::Error>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let to_serialize = IoError {
        description: format!("{}", error),
        kind: format!("{:?}", error.kind()),
    };
    to_serialize.serialize(serializer)
}

fn deserialize_io_error<'de, D>(deserializer: D) -> Result<Arc<io::Error>, D::Error>
where
    D: Deserializer<'de>,
{
    let ret = IoError::deserialize(deserializer)?;
    Ok(Arc::new(io::Error::new(io_error_kind(&ret.kind), ret.description)))
}

fn io_error_kind(kind: &str) -> io::ErrorKind {
    match kind {
        "NotFound" => io::ErrorKind::NotFound,
        "PermissionDenied" => io::ErrorKind::PermissionDenied,
        "ConnectionRefused" => io::ErrorKind::ConnectionRefused,
        "ConnectionReset" => io::ErrorKind::ConnectionReset,
        "ConnectionAborted" => io::ErrorKind::ConnectionAborted,
        "NotConnected" => io::ErrorKind::NotConnected,
        "BrokenPipe" => io::ErrorKind::BrokenPipe,
        "TimedOut" => io::ErrorKind::TimedOut,
        "WriteZero" => io::ErrorKind::WriteZero,
        "UnexpectedEof" => io::ErrorKind::UnexpectedEof,
        _ => io::ErrorKind::Other,
    }
}

fn serialize_anyhow_error<S>(error: &Arc<anyhow::Error>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let to_serialize = AnyHowError {
        description: error.to_string(),
        backtrace: format!("{:?}", error.backtrace()),
    };
    to_serialize.serialize(serializer)
}

fn deserialize_anyhow_error<'de, D>(deserializer: D) -> Result<Arc<anyhow::Error>, D::Error>
where
    D: Deserializer<'de>,
{
    let ret = AnyHowError::deserialize(deserializer)?;
    let ret = anyhow::Error::msg(ret.description);
    Ok(Arc::new(ret))
}

/// The underlying cause of a failed transport operation.
#[derive(Error, Clone, Debug, Serialize, Deserialize)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(
        #[serde(
            serialize_with = "serialize_io_error",
            deserialize_with = "deserialize_io_error"
        )]
        Arc<io::Error>,
    ),
    #[error("{0}")]
    Other(
        #[serde(
            serialize_with = "serialize_anyhow_error",
            deserialize_with = "deserialize_anyhow_error"
        )]
        Arc<anyhow::Error>,
    ),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

impl From<anyhow::Error> for TransportError {
    fn from(x: anyhow::Error) -> Self {
        TransportError::Other(Arc::new(x))
    }
}

/// Every failure an instrument session can report.
///
/// Transport-level faults (`Io`, `Timeout`, `Framing`, ...) always surface from the
/// operation that triggered them. Errors reported by the instrument itself are only
/// raised as `Instrument` if the error policy is configured to escalate them.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum Error {
    #[error("Connection Error: {0}")]
    Connection(TransportError),
    #[error("Transport Error: {0}")]
    Io(TransportError),
    #[error("Timeout")]
    Timeout,
    #[error("Framing Error: {0}")]
    Framing(String),
    #[error("Format Error: {0}")]
    Format(String),
    #[error("Query response was not terminated")]
    QueryUnterminated,
    #[error("Session is busy")]
    SessionBusy,
    #[error("Session is closed")]
    SessionClosed,
    #[error("Session is not bound to a connection")]
    NotBound,
    #[error("Operation did not complete within {0:?}")]
    OperationTimeout(Duration),
    #[error("Operation aborted by device clear")]
    Cleared,
    #[error("Instrument Error {0}")]
    Instrument(ErrorRecord),
    #[error("Argument Error {0}")]
    Argument(
        #[serde(
            serialize_with = "serialize_anyhow_error",
            deserialize_with = "deserialize_anyhow_error"
        )]
        Arc<anyhow::Error>,
    ),
    #[error("Internal Error {0}")]
    Internal(
        #[serde(
            serialize_with = "serialize_anyhow_error",
            deserialize_with = "deserialize_anyhow_error"
        )]
        Arc<anyhow::Error>,
    ),
}

impl Error {
    pub fn connection<T: Into<TransportError>>(err: T) -> Self {
        Self::Connection(err.into())
    }

    pub fn io<T: Into<TransportError>>(err: T) -> Self {
        Self::Io(err.into())
    }

    pub fn framing<T: Into<String>>(msg: T) -> Self {
        Self::Framing(msg.into())
    }

    pub fn format<T: Into<String>>(msg: T) -> Self {
        Self::Format(msg.into())
    }

    pub fn internal<T: Into<anyhow::Error>>(err: T) -> Self {
        Self::Internal(Arc::new(err.into()))
    }

    pub fn argument<T: Into<anyhow::Error>>(err: T) -> Self {
        Self::Argument(Arc::new(err.into()))
    }

    /// Whether a driver may reconnect and repeat the operation which produced this error.
    pub fn should_retry(&self) -> bool {
        match self {
            Error::Io(TransportError::Io(err)) => {
                err.kind() == io::ErrorKind::ConnectionReset
                    || err.kind() == io::ErrorKind::ConnectionAborted
                    || err.kind() == io::ErrorKind::BrokenPipe
                    || err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::UnexpectedEof
            }
            _ => false,
        }
    }

    /// Faults of the connection itself, as opposed to session state or instrument errors.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Io(_)
                | Error::Timeout
                | Error::Framing(_)
                | Error::QueryUnterminated
        )
    }
}

impl From<io::Error> for Error {
    fn from(x: io::Error) -> Self {
        Error::Io(TransportError::Io(Arc::new(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_only_on_broken_connections() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(err.should_retry());
        let err = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!err.should_retry());
        assert!(!Error::Timeout.should_retry());
        assert!(!Error::connection(anyhow::anyhow!("refused")).should_retry());
    }

    #[test]
    fn serialize_roundtrip_keeps_kind() {
        let err = Error::from(io::Error::new(io::ErrorKind::TimedOut, "too slow"));
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        match back {
            Error::Io(TransportError::Io(err)) => {
                assert_eq!(err.kind(), io::ErrorKind::TimedOut);
                assert_eq!(err.to_string(), "too slow");
            }
            _ => panic!(),
        }
    }

    #[test]
    fn instrument_error_display() {
        let err = Error::Instrument(ErrorRecord::new(21, "Permission error"));
        assert_eq!(err.to_string(), "Instrument Error 21: Permission error");
        assert!(!err.is_transport_fault());
        assert!(Error::framing("bad").is_transport_fault());
    }
}
