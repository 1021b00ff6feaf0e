use std::fmt;

use bytes::Bytes;

/// Command byte of an encrypted packet.
///
/// The command space is one byte wide. Every value the access points are
/// known to use is named; anything else is carried as `Unknown` so that
/// conversion to and from `u8` never loses information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    SecretBlock,
    Ping,
    StreamChunk,
    StreamChunkRes,
    ChannelError,
    ChannelAbort,
    RequestKey,
    AesKey,
    AesKeyError,
    Unknown0x10,
    CountryCode,
    Pong,
    PongAck,
    ProductInfo,
    LegacyWelcome,
    PreferredLocale,
    LicenseVersion,
    Login,
    APWelcome,
    AuthFailure,
    MercuryReq,
    MercurySub,
    MercuryUnsub,
    MercuryEvent,
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0x02 => PacketType::SecretBlock,
            0x04 => PacketType::Ping,
            0x08 => PacketType::StreamChunk,
            0x09 => PacketType::StreamChunkRes,
            0x0a => PacketType::ChannelError,
            0x0b => PacketType::ChannelAbort,
            0x0c => PacketType::RequestKey,
            0x0d => PacketType::AesKey,
            0x0e => PacketType::AesKeyError,
            0x10 => PacketType::Unknown0x10,
            0x1b => PacketType::CountryCode,
            0x49 => PacketType::Pong,
            0x4a => PacketType::PongAck,
            0x50 => PacketType::ProductInfo,
            0x69 => PacketType::LegacyWelcome,
            0x74 => PacketType::PreferredLocale,
            0x76 => PacketType::LicenseVersion,
            0xab => PacketType::Login,
            0xac => PacketType::APWelcome,
            0xad => PacketType::AuthFailure,
            0xb2 => PacketType::MercuryReq,
            0xb3 => PacketType::MercurySub,
            0xb4 => PacketType::MercuryUnsub,
            0xb5 => PacketType::MercuryEvent,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(cmd: PacketType) -> u8 {
        match cmd {
            PacketType::SecretBlock => 0x02,
            PacketType::Ping => 0x04,
            PacketType::StreamChunk => 0x08,
            PacketType::StreamChunkRes => 0x09,
            PacketType::ChannelError => 0x0a,
            PacketType::ChannelAbort => 0x0b,
            PacketType::RequestKey => 0x0c,
            PacketType::AesKey => 0x0d,
            PacketType::AesKeyError => 0x0e,
            PacketType::Unknown0x10 => 0x10,
            PacketType::CountryCode => 0x1b,
            PacketType::Pong => 0x49,
            PacketType::PongAck => 0x4a,
            PacketType::ProductInfo => 0x50,
            PacketType::LegacyWelcome => 0x69,
            PacketType::PreferredLocale => 0x74,
            PacketType::LicenseVersion => 0x76,
            PacketType::Login => 0xab,
            PacketType::APWelcome => 0xac,
            PacketType::AuthFailure => 0xad,
            PacketType::MercuryReq => 0xb2,
            PacketType::MercurySub => 0xb3,
            PacketType::MercuryUnsub => 0xb4,
            PacketType::MercuryEvent => 0xb5,
            PacketType::Unknown(other) => other,
        }
    }
}

impl PacketType {
    /// Whether this command belongs to the Mercury pub-sub sub-protocol.
    pub fn is_mercury(self) -> bool {
        matches!(
            self,
            PacketType::MercuryReq
                | PacketType::MercurySub
                | PacketType::MercuryUnsub
                | PacketType::MercuryEvent
        )
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Unknown(v) => write!(f, "Unknown(0x{v:02x})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A decoded packet: command plus cleartext payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: PacketType,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(cmd: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            cmd,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_byte_converts_losslessly() {
        for b in 0u8..=255 {
            let cmd = PacketType::from(b);
            assert_eq!(u8::from(cmd), b);
        }
    }

    #[test]
    fn named_commands() {
        assert_eq!(PacketType::from(0x04), PacketType::Ping);
        assert_eq!(PacketType::from(0x49), PacketType::Pong);
        assert_eq!(PacketType::from(0xab), PacketType::Login);
        assert_eq!(PacketType::from(0x11), PacketType::Unknown(0x11));
    }

    #[test]
    fn unknown_is_never_a_named_value() {
        // Named values must not round-trip through Unknown.
        assert_ne!(PacketType::from(0x10), PacketType::Unknown(0x10));
        assert!(PacketType::MercuryEvent.is_mercury());
        assert!(!PacketType::Ping.is_mercury());
    }

    #[test]
    fn display_unknown_as_hex() {
        assert_eq!(PacketType::Unknown(0x7f).to_string(), "Unknown(0x7f)");
        assert_eq!(PacketType::AesKey.to_string(), "AesKey");
    }
}
