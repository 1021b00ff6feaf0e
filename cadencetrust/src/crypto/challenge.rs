// Challenge solving: HMAC-SHA1 keystream over the handshake transcript.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CadenceTrustError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Output width of one HMAC-SHA1 block.
pub const HMAC_BLOCK_LEN: usize = 20;

/// Number of HMAC blocks chained into the keystream.
const KEYSTREAM_BLOCKS: u8 = 5;

/// Total keystream length (5 x 20 bytes).
pub const KEYSTREAM_LEN: usize = HMAC_BLOCK_LEN * KEYSTREAM_BLOCKS as usize;

/// Directional cipher keys for the encrypted transport.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for frames received from the access point.
    pub recv_key: [u8; 32],
    /// Key for frames sent to the access point.
    pub send_key: [u8; 32],
}

impl SessionKeys {
    /// Keys as seen from the other end of the connection.
    pub fn reversed(&self) -> Self {
        Self {
            recv_key: self.send_key,
            send_key: self.recv_key,
        }
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Result of solving the access-point challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Proof of the shared secret sent back to the access point.
    pub challenge_mac: [u8; HMAC_BLOCK_LEN],
    /// Transport keys.
    pub keys: SessionKeys,
}

/// Derive the challenge MAC and transport keys.
///
/// ```text
/// keystream     = HMAC(shared, transcript || 1) || ... || HMAC(shared, transcript || 5)
/// challenge_mac = HMAC(keystream[0..20], transcript)
/// recv_key      = keystream[20..52]
/// send_key      = keystream[52..84]
/// ```
///
/// Pure function of its inputs.
pub fn derive(shared_secret: &[u8], transcript: &[u8]) -> Result<Challenge> {
    let mut keystream = [0u8; KEYSTREAM_LEN];
    for i in 1..=KEYSTREAM_BLOCKS {
        let mut mac = new_hmac(shared_secret)?;
        mac.update(transcript);
        mac.update(&[i]);
        let start = (i as usize - 1) * HMAC_BLOCK_LEN;
        keystream[start..start + HMAC_BLOCK_LEN].copy_from_slice(&mac.finalize().into_bytes());
    }

    let mut mac = new_hmac(&keystream[..HMAC_BLOCK_LEN])?;
    mac.update(transcript);
    let mut challenge_mac = [0u8; HMAC_BLOCK_LEN];
    challenge_mac.copy_from_slice(&mac.finalize().into_bytes());

    let mut recv_key = [0u8; 32];
    recv_key.copy_from_slice(&keystream[20..52]);
    let mut send_key = [0u8; 32];
    send_key.copy_from_slice(&keystream[52..84]);
    keystream.zeroize();

    Ok(Challenge {
        challenge_mac,
        keys: SessionKeys { recv_key, send_key },
    })
}

fn new_hmac(key: &[u8]) -> Result<HmacSha1> {
    <HmacSha1 as Mac>::new_from_slice(key)
        .map_err(|e| CadenceTrustError::InvalidKey(format!("HMAC init: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_deterministic() {
        let shared = [0x5Au8; 96];
        let transcript = b"client hello || ap response";
        let c1 = derive(&shared, transcript).unwrap();
        let c2 = derive(&shared, transcript).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_keys_are_distinct() {
        let c = derive(&[0x01u8; 96], b"transcript").unwrap();
        assert_ne!(c.keys.recv_key, c.keys.send_key);
        assert_ne!(&c.challenge_mac[..], &c.keys.recv_key[..20]);
    }

    #[test]
    fn test_transcript_sensitivity() {
        let shared = [0x33u8; 96];
        let a = derive(&shared, b"transcript-a").unwrap();
        let b = derive(&shared, b"transcript-b").unwrap();
        assert_ne!(a.challenge_mac, b.challenge_mac);
        assert_ne!(a.keys, b.keys);
    }

    #[test]
    fn test_reversed_keys() {
        let c = derive(&[0x07u8; 96], b"t").unwrap();
        let peer = c.keys.reversed();
        assert_eq!(peer.send_key, c.keys.recv_key);
        assert_eq!(peer.recv_key, c.keys.send_key);
    }
}
