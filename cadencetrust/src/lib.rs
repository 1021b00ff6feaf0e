// CadenceTrust - access-point key exchange, server trust & handshake
//
// Crate root: module declarations and public re-exports.

pub mod error;
pub mod crypto;
pub mod handshake;
pub mod login;
pub mod version;

// Re-export key types at crate root for convenience.
pub use error::{CadenceTrustError, Result};
pub use crypto::challenge::{Challenge, SessionKeys};
pub use crypto::dh::DhKeyPair;
pub use crypto::signature::ServerTrust;
pub use handshake::protocol::Initiator;
pub use handshake::state::HandshakeState;
pub use login::{ApWelcome, AuthenticationType, LoginCredentials};
pub use version::ClientMetadata;
