//! Drives the cleartext handshake over a raw transport.

use std::time::Duration;

use cadencetrust::handshake::protocol::{body_len, LENGTH_PREFIX_LEN};
use cadencetrust::{ClientMetadata, Initiator, ServerTrust, SessionKeys};

use crate::codec::EncryptedTransport;
use crate::error::{CadenceStreamError, Result};
use crate::transport::Transport;

/// Connect to `addr` and run the handshake.
///
/// `read_timeout` bounds every handshake read, so a silent access point fails
/// with `Timeout` instead of stalling the caller.
pub async fn connect(
    addr: &str,
    trust: ServerTrust,
    metadata: &ClientMetadata,
    connect_timeout: Duration,
    read_timeout: Duration,
    status_timeout: Duration,
) -> Result<EncryptedTransport> {
    let transport = Transport::connect(addr, connect_timeout)
        .await?
        .with_default_timeout(Some(read_timeout));
    handshake(transport, trust, metadata, status_timeout).await
}

/// Run the handshake over an open transport.
///
/// On success the transport is re-wrapped with the derived cipher keys. Any
/// failure aborts the handshake and drops the connection.
pub async fn handshake(
    mut transport: Transport,
    trust: ServerTrust,
    metadata: &ClientMetadata,
    status_timeout: Duration,
) -> Result<EncryptedTransport> {
    let mut initiator = Initiator::new(trust, metadata.clone());
    match drive(&mut initiator, &mut transport, status_timeout).await {
        Ok(keys) => {
            tracing::debug!("handshake complete, cipher established");
            Ok(EncryptedTransport::new(transport, &keys))
        }
        Err(e) => {
            initiator.abort();
            tracing::debug!(error = %e, "handshake aborted");
            Err(e)
        }
    }
}

async fn drive(
    initiator: &mut Initiator,
    transport: &mut Transport,
    status_timeout: Duration,
) -> Result<SessionKeys> {
    let hello = initiator.hello()?;
    transport.write(&hello).await?;

    let prefix = read_prefix(transport).await?;
    let body = transport.read_fully(body_len(prefix)?).await?;
    initiator.receive_ap_response(prefix, &body)?;
    initiator.verify_server()?;

    let response = initiator.challenge_response()?;
    transport.write(&response).await?;

    // Silence means the challenge was accepted.
    transport.set_timeout(status_timeout);
    let status = transport.read(LENGTH_PREFIX_LEN).await;
    transport.restore_timeout();
    let status = status?;
    match status.len() {
        0 => {}
        LENGTH_PREFIX_LEN => {
            let prefix = [status[0], status[1], status[2], status[3]];
            let body = transport.read_fully(body_len(prefix)?).await?;
            return Err(initiator.login_failed(&body).into());
        }
        n => {
            return Err(CadenceStreamError::Protocol(format!(
                "unexpected {n}-byte reply to challenge response"
            )))
        }
    }

    Ok(initiator.establish()?)
}

async fn read_prefix(transport: &mut Transport) -> Result<[u8; LENGTH_PREFIX_LEN]> {
    let bytes = transport.read_fully(LENGTH_PREFIX_LEN).await?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}
