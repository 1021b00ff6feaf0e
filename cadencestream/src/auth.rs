//! Login over an established encrypted transport.

use std::time::Duration;

use cadencetrust::handshake::messages::ApLoginFailed;
use cadencetrust::login::{encode_login_request, ClientResponseEncrypted};
use cadencetrust::{ApWelcome, ClientMetadata, LoginCredentials};
use prost::Message;

use crate::codec::EncryptedTransport;
use crate::error::{CadenceStreamError, Result};
use crate::packet::PacketType;

/// Send `credentials` and wait for the access point's verdict.
///
/// The credentials are only borrowed for serialization. Exactly one packet is
/// read: `APWelcome` succeeds, `AuthFailure` carries the rejection code, and
/// anything else is a protocol error. No reply within `reply_timeout` is
/// `Timeout`; the transport must then be dropped, as the reply may be half
/// read.
pub async fn authenticate(
    transport: Option<&mut EncryptedTransport>,
    credentials: &LoginCredentials,
    metadata: &ClientMetadata,
    reply_timeout: Duration,
) -> Result<ApWelcome> {
    let transport = transport.ok_or(CadenceStreamError::NotConnected)?;

    let request = ClientResponseEncrypted {
        login_credentials: None,
        system_info: metadata.system_info(),
        version_string: Some(metadata.version_string()),
    };
    let payload = encode_login_request(credentials, &request)?;
    transport.send(PacketType::Login, &payload).await?;

    let packet = tokio::time::timeout(reply_timeout, transport.receive())
        .await
        .map_err(|_| CadenceStreamError::Timeout)??;
    match packet.cmd {
        PacketType::APWelcome => {
            let welcome = ApWelcome::decode(packet.payload)?;
            tracing::info!(username = %welcome.canonical_username, "authenticated");
            Ok(welcome)
        }
        PacketType::AuthFailure => {
            let failed = ApLoginFailed::decode(packet.payload)?;
            tracing::warn!(code = failed.error_code, "authentication rejected");
            Err(CadenceStreamError::Authentication {
                code: failed.error_code,
            })
        }
        other => Err(CadenceStreamError::Protocol(format!(
            "unexpected {other} in reply to login"
        ))),
    }
}
