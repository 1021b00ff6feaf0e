//! Shannon-encrypted packet codec.
//!
//! Wire layout of one frame, everything after the handshake:
//!
//! ```text
//! +------+-----------+-------------------+---------+
//! | cmd  | len (BE)  |  payload (len B)  |   MAC   |
//! | (1B) |   (2B)    |                   |  (4B)   |
//! +------+-----------+-------------------+---------+
//! |<-------- encrypted ------------------>|
//! ```
//!
//! Each direction has its own cipher keyed once from the handshake; the
//! frame counter of that direction is the per-frame nonce.
//!
//! The length field is only authenticated once the whole frame is read. A
//! corrupted length makes the receiver wait for that many bytes; the MAC
//! check fails once they arrive (or immediately, if the length shrank).

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use cadencetrust::SessionKeys;
use shannon::Shannon;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::error::{CadenceStreamError, Result};
use crate::packet::{Packet, PacketType};
use crate::transport::{map_read_error, BoxedStream, Transport};

/// Encrypted header: cmd + u16 length.
pub const HEADER_LEN: usize = 3;

/// Trailing MAC per frame.
pub const MAC_LEN: usize = 4;

/// Largest payload the u16 length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// One direction's keyed cipher and frame counter.
pub struct CipherDirection {
    cipher: Shannon,
    counter: u32,
}

impl CipherDirection {
    pub fn new(key: &[u8]) -> Self {
        Self {
            cipher: Shannon::new(key),
            counter: 0,
        }
    }

    /// Frames processed so far in this direction.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Encrypt one frame and append its MAC.
    pub fn seal(&mut self, cmd: u8, payload: &[u8]) -> Result<BytesMut> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(CadenceStreamError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let next = self.next_counter()?;

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len() + MAC_LEN);
        frame.put_u8(cmd);
        frame.put_u16(payload.len() as u16);
        frame.put_slice(payload);

        self.cipher.nonce_u32(self.counter);
        self.cipher.encrypt(&mut frame[..]);
        let mut mac = [0u8; MAC_LEN];
        self.cipher.finish(&mut mac);
        frame.put_slice(&mac);

        self.counter = next;
        Ok(frame)
    }

    /// Start a frame: decrypt the header, returning cmd and payload length.
    fn open_header(&mut self, header: &mut [u8; HEADER_LEN]) -> (u8, usize) {
        self.cipher.nonce_u32(self.counter);
        self.cipher.decrypt(header);
        (header[0], u16::from_be_bytes([header[1], header[2]]) as usize)
    }

    /// Finish a frame: decrypt the payload in place and check the MAC.
    ///
    /// The counter moves on whether or not the MAC matches.
    fn open_body(&mut self, payload: &mut [u8], mac: &[u8]) -> Result<()> {
        self.cipher.decrypt(payload);
        let checked = self.cipher.check_mac(mac);
        self.counter = self.next_counter()?;
        checked.map_err(|_| CadenceStreamError::Mac)
    }

    fn next_counter(&self) -> Result<u32> {
        self.counter
            .checked_add(1)
            .ok_or_else(|| CadenceStreamError::Protocol("frame counter exhausted".into()))
    }
}

impl fmt::Debug for CipherDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherDirection")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

struct SendHalf {
    writer: WriteHalf<BoxedStream>,
    cipher: CipherDirection,
}

/// Cloneable sending half. Frames from concurrent senders never interleave.
#[derive(Clone)]
pub struct PacketSender {
    inner: Arc<Mutex<SendHalf>>,
}

impl PacketSender {
    /// Encrypt and write one packet.
    ///
    /// Oversized payloads are rejected before anything is written.
    pub async fn send(&self, cmd: PacketType, payload: &[u8]) -> Result<()> {
        let mut half = self.inner.lock().await;
        let frame = half.cipher.seal(cmd.into(), payload)?;
        half.writer.write_all(&frame).await?;
        half.writer.flush().await?;
        tracing::trace!(%cmd, len = payload.len(), counter = half.cipher.counter(), "sent packet");
        Ok(())
    }

    /// Frames sent so far.
    pub async fn counter(&self) -> u32 {
        self.inner.lock().await.cipher.counter()
    }

    /// Close the write side of the connection.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.lock().await.writer.shutdown().await?;
        Ok(())
    }
}

impl fmt::Debug for PacketSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketSender").finish_non_exhaustive()
    }
}

/// Exclusive receiving half.
///
/// `receive` is not cancel-safe: abandoning it mid-frame desynchronises the
/// cipher, after which every frame fails its MAC.
pub struct PacketReceiver {
    reader: ReadHalf<BoxedStream>,
    cipher: CipherDirection,
    poisoned: bool,
}

impl PacketReceiver {
    /// Read, decrypt and authenticate the next packet.
    ///
    /// After a MAC failure the receiver is poisoned and keeps failing.
    pub async fn receive(&mut self) -> Result<Packet> {
        if self.poisoned {
            return Err(CadenceStreamError::Mac);
        }

        let mut header = [0u8; HEADER_LEN];
        self.reader.read_exact(&mut header).await.map_err(map_read_error)?;
        let (cmd, len) = self.cipher.open_header(&mut header);

        let mut body = vec![0u8; len + MAC_LEN];
        self.reader.read_exact(&mut body).await.map_err(map_read_error)?;
        let (payload, mac) = body.split_at_mut(len);
        if let Err(e) = self.cipher.open_body(payload, mac) {
            self.poisoned = true;
            tracing::warn!(counter = self.cipher.counter(), "rejected frame with bad MAC");
            return Err(e);
        }

        body.truncate(len);
        let packet = Packet::new(PacketType::from(cmd), Bytes::from(body));
        tracing::trace!(cmd = %packet.cmd, len, counter = self.cipher.counter(), "received packet");
        Ok(packet)
    }

    /// Frames received so far.
    pub fn counter(&self) -> u32 {
        self.cipher.counter()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl fmt::Debug for PacketReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketReceiver")
            .field("counter", &self.cipher.counter())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

/// An established, encrypted connection to an access point.
#[derive(Debug)]
pub struct EncryptedTransport {
    sender: PacketSender,
    receiver: PacketReceiver,
}

impl EncryptedTransport {
    pub fn new(transport: Transport, keys: &SessionKeys) -> Self {
        let (reader, writer) = tokio::io::split(transport.into_inner());
        Self {
            sender: PacketSender {
                inner: Arc::new(Mutex::new(SendHalf {
                    writer,
                    cipher: CipherDirection::new(&keys.send_key),
                })),
            },
            receiver: PacketReceiver {
                reader,
                cipher: CipherDirection::new(&keys.recv_key),
                poisoned: false,
            },
        }
    }

    pub async fn send(&self, cmd: PacketType, payload: &[u8]) -> Result<()> {
        self.sender.send(cmd, payload).await
    }

    pub async fn receive(&mut self) -> Result<Packet> {
        self.receiver.receive().await
    }

    /// A handle for sending that outlives the split.
    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    pub fn into_split(self) -> (PacketSender, PacketReceiver) {
        (self.sender, self.receiver)
    }
}
