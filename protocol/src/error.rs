use std::num::ParseFloatError;
use std::{io, sync::Arc};

use thiserror::Error;

/// Failure of the communication link itself: the instrument could not be
/// reached, the session is invalid or the connection dropped.
#[derive(Error, Clone, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(Arc<io::Error>),
    #[error("VISA Error ({code:#x}): {description}")]
    Visa { code: i32, description: String },
    #[error("Other Error: {0}")]
    Other(Arc<anyhow::Error>),
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

/// The link works but the instrument did not answer the way it should.
#[derive(Error, Clone, Debug)]
pub enum ProtocolError {
    #[error("Timeout")]
    Timeout,
    #[error("Unexpected Response: {0}")]
    UnexpectedResponse(String),
    #[error("Malformed identity string: {0:?}")]
    MalformedIdentity(String),
    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),
    #[error("Response is not valid UTF-8")]
    Decode,
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Transport Error {0}")]
    Transport(TransportError),
    #[error("Protocol Error {0}")]
    Protocol(ProtocolError),
    #[error("Cannot parse {input:?} as a number")]
    Format {
        input: String,
        #[source]
        source: Option<ParseFloatError>,
    },
    #[error("Argument Error {0}")]
    Argument(Arc<anyhow::Error>),
    #[error("Internal Error {0}")]
    Internal(Arc<anyhow::Error>),
    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport<T: Into<TransportError>>(err: T) -> Self {
        Self::Transport(err.into())
    }

    pub fn protocol<T: Into<ProtocolError>>(err: T) -> Self {
        Self::Protocol(err.into())
    }

    pub fn protocol_timeout() -> Self {
        Error::Protocol(ProtocolError::Timeout)
    }

    pub fn format<T: Into<String>>(input: T, source: Option<ParseFloatError>) -> Self {
        Error::Format {
            input: input.into(),
            source,
        }
    }

    pub fn internal<T: Into<anyhow::Error>>(err: T) -> Self {
        Self::Internal(Arc::new(err.into()))
    }

    pub fn argument<T: Into<anyhow::Error>>(err: T) -> Self {
        Self::Argument(Arc::new(err.into()))
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Protocol(ProtocolError::Timeout) => true,
            Error::Transport(TransportError::Io(err)) => err.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// True for failures of the link itself, as opposed to bad answers or bad input.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<io::Error> for Error {
    fn from(x: io::Error) -> Self {
        Error::Transport(TransportError::Io(Arc::new(x)))
    }
}

impl From<TransportError> for Error {
    fn from(x: TransportError) -> Self {
        Error::Transport(x)
    }
}

impl From<ProtocolError> for Error {
    fn from(x: ProtocolError) -> Self {
        Error::Protocol(x)
    }
}
