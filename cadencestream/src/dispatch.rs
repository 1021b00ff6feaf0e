//! Packet dispatcher.
//!
//! Owns the receive side of the encrypted transport while the session runs,
//! handles keepalive and session-attribute packets itself, and forwards the
//! sub-protocol packets to their collaborators.

use std::sync::Arc;

use bytes::Buf;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::codec::{PacketReceiver, PacketSender};
use crate::error::CadenceStreamError;
use crate::packet::{Packet, PacketType};
use crate::time::TimeReference;
use crate::watchdog::WatchdogHandle;

/// Receiver of packets for one sub-protocol.
pub trait PacketHandler: Send + Sync {
    fn dispatch(&self, packet: Packet);
}

/// Drops every packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl PacketHandler for Discard {
    fn dispatch(&self, packet: Packet) {
        tracing::trace!(cmd = %packet.cmd, "no handler registered, dropping packet");
    }
}

/// Sub-protocol collaborators the dispatcher forwards to.
#[derive(Clone)]
pub struct Handlers {
    pub mercury: Arc<dyn PacketHandler>,
    pub audio_key: Arc<dyn PacketHandler>,
    pub channel: Arc<dyn PacketHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            mercury: Arc::new(Discard),
            audio_key: Arc::new(Discard),
            channel: Arc::new(Discard),
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers").finish_non_exhaustive()
    }
}

/// Session attributes announced by the access point.
#[derive(Debug, Default)]
pub struct Attributes {
    country_code: RwLock<Option<String>>,
    product_info: RwLock<Option<String>>,
}

impl Attributes {
    pub fn country_code(&self) -> Option<String> {
        self.country_code.read().clone()
    }

    pub fn product_info(&self) -> Option<String> {
        self.product_info.read().clone()
    }
}

/// Why the dispatch loop stopped.
#[derive(Debug)]
pub enum DispatchExit {
    /// The shutdown signal fired.
    Shutdown,
    /// Receiving failed; the connection is unusable.
    Failed(CadenceStreamError),
}

pub struct Dispatcher {
    receiver: PacketReceiver,
    sender: PacketSender,
    handlers: Handlers,
    time: TimeReference,
    watchdog: WatchdogHandle,
    attributes: Arc<Attributes>,
}

impl Dispatcher {
    pub fn new(
        receiver: PacketReceiver,
        sender: PacketSender,
        handlers: Handlers,
        time: TimeReference,
        watchdog: WatchdogHandle,
        attributes: Arc<Attributes>,
    ) -> Self {
        Self {
            receiver,
            sender,
            handlers,
            time,
            watchdog,
            attributes,
        }
    }

    /// Receive and handle packets until shutdown or a receive failure.
    ///
    /// Each packet is fully handled before the next one is read.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DispatchExit {
        loop {
            let packet = tokio::select! {
                biased;
                changed = shutdown.wait_for(|stop| *stop) => {
                    // A dropped sender also means nobody wants us running.
                    let _ = changed;
                    tracing::debug!("dispatcher shutting down");
                    return DispatchExit::Shutdown;
                }
                received = self.receiver.receive() => match received {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::warn!(error = %e, counter = self.receiver.counter(), "receive failed");
                        return DispatchExit::Failed(e);
                    }
                },
            };
            self.handle(packet).await;
        }
    }

    async fn handle(&self, packet: Packet) {
        let cmd = packet.cmd;
        match cmd {
            PacketType::Ping => self.handle_ping(packet).await,
            PacketType::PongAck => {
                tracing::trace!("pong acknowledged");
            }
            PacketType::CountryCode => {
                let code = String::from_utf8_lossy(&packet.payload).into_owned();
                tracing::debug!(country_code = %code, "received country code");
                *self.attributes.country_code.write() = Some(code);
            }
            PacketType::ProductInfo => {
                let info = String::from_utf8_lossy(&packet.payload).into_owned();
                tracing::debug!(len = info.len(), "received product info");
                *self.attributes.product_info.write() = Some(info);
            }
            PacketType::LicenseVersion | PacketType::Unknown0x10 => {}
            _ if cmd.is_mercury() => self.handlers.mercury.dispatch(packet),
            PacketType::AesKey | PacketType::AesKeyError => self.handlers.audio_key.dispatch(packet),
            PacketType::ChannelError | PacketType::StreamChunkRes => {
                self.handlers.channel.dispatch(packet)
            }
            _ => {
                tracing::debug!(%cmd, len = packet.payload.len(), "ignoring packet");
            }
        }
    }

    async fn handle_ping(&self, packet: Packet) {
        self.watchdog.reset();
        if packet.payload.len() < 4 {
            tracing::warn!(len = packet.payload.len(), "short ping payload, not answering");
            return;
        }
        let server_secs = (&packet.payload[..4]).get_u32();
        self.time.update(i64::from(server_secs) * 1000);
        tracing::debug!(server_secs, "ping");

        if let Err(e) = self.sender.send(PacketType::Pong, &packet.payload).await {
            tracing::warn!(error = %e, "failed to answer ping");
        }
    }
}

/// Run `dispatcher` on its own task, calling `on_failure` if receiving fails.
pub fn spawn<F>(
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,
    on_failure: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnOnce(CadenceStreamError) + Send + 'static,
{
    tokio::spawn(async move {
        if let DispatchExit::Failed(e) = dispatcher.run(shutdown).await {
            on_failure(e);
        }
    })
}
