use cadencetrust::CadenceTrustError;
use thiserror::Error;

/// All errors produced by the CadenceStream session layer.
#[derive(Debug, Error)]
pub enum CadenceStreamError {
    #[error("server signature verification failed")]
    Authenticity,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("access point rejected the connection: error code {code}")]
    Connection { code: i32 },

    #[error("frame MAC mismatch")]
    Mac,

    #[error("no encrypted transport established")]
    NotConnected,

    #[error("login rejected: error code {code}")]
    Authentication { code: i32 },

    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("operation timed out")]
    Timeout,

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CadenceTrustError> for CadenceStreamError {
    fn from(err: CadenceTrustError) -> Self {
        match err {
            CadenceTrustError::Authenticity => CadenceStreamError::Authenticity,
            CadenceTrustError::Protocol(msg) => CadenceStreamError::Protocol(msg),
            CadenceTrustError::Connection { code } => CadenceStreamError::Connection { code },
            CadenceTrustError::InvalidStateTransition { from, to } => {
                CadenceStreamError::InvalidStateTransition { from, to }
            }
            other @ (CadenceTrustError::InvalidKey(_)
            | CadenceTrustError::Encode(_)
            | CadenceTrustError::Decode(_)) => CadenceStreamError::Protocol(other.to_string()),
        }
    }
}

impl From<prost::DecodeError> for CadenceStreamError {
    fn from(err: prost::DecodeError) -> Self {
        CadenceStreamError::Protocol(format!("malformed message: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CadenceStreamError>;
