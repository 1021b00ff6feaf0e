// CadenceTrust error types

use thiserror::Error;

/// Top-level error type for the CadenceTrust crate.
#[derive(Debug, Error)]
pub enum CadenceTrustError {
    // ── Crypto errors ───────────────────────────────────────────────────
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("server signature verification failed")]
    Authenticity,

    // ── Handshake errors ────────────────────────────────────────────────
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("access point rejected the connection: error code {code}")]
    Connection { code: i32 },

    #[error("invalid handshake state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // ── Serialization errors ────────────────────────────────────────────
    #[error("message encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("message decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, CadenceTrustError>;
