//! CadenceStream -- encrypted session layer for Connect access points.
//!
//! Builds on the CadenceTrust handshake:
//! - **Transport**: byte-exact raw stream with read timeouts
//! - **Codec**: Shannon-encrypted, MAC-checked packet framing per direction
//! - **Dispatch**: receive loop routing packets to sub-protocol handlers
//! - **Watchdog**: keepalive timer forcing reconnection
//! - **Session**: connect, authenticate, run, reconnect, close

pub mod auth;
pub mod codec;
pub mod config;
pub mod connect;
pub mod dispatch;
pub mod error;
pub mod packet;
pub mod session;
pub mod time;
pub mod transport;
pub mod watchdog;

// Re-export key public types at crate root.
pub use codec::{EncryptedTransport, PacketReceiver, PacketSender};
pub use config::{ReconnectPolicy, SessionConfig};
pub use dispatch::{Discard, Handlers, PacketHandler};
pub use error::{CadenceStreamError, Result};
pub use packet::{Packet, PacketType};
pub use session::{Session, SessionState};
pub use time::TimeReference;
pub use transport::Transport;
pub use watchdog::Watchdog;
