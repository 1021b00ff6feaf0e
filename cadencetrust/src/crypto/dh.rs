// Finite-field Diffie-Hellman over the fixed access-point group.

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::BigUint;
use zeroize::Zeroizing;

use crate::error::{CadenceTrustError, Result};

/// Width in bytes of public values and shared secrets (768-bit group).
pub const DH_VALUE_LEN: usize = 96;

/// Width in bytes of the private exponent.
pub const DH_PRIVATE_LEN: usize = 95;

/// Group generator.
const DH_GENERATOR: u32 = 2;

/// RFC 2409 first Oakley group (768-bit MODP prime).
const DH_PRIME: [u8; DH_VALUE_LEN] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2,
    0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1, 0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67,
    0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e,
    0x34, 0x04, 0xdd, 0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
    0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45, 0xe4, 0x85, 0xb5,
    0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x3a, 0x36, 0x20, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// An ephemeral Diffie-Hellman keypair for one handshake attempt.
///
/// The private exponent is zeroized when the pair is dropped and is never
/// exposed through `Debug`.
pub struct DhKeyPair {
    private: Zeroizing<Vec<u8>>,
    public: [u8; DH_VALUE_LEN],
}

impl DhKeyPair {
    /// Generate a new random ephemeral keypair.
    pub fn generate() -> Self {
        let mut private = Zeroizing::new(vec![0u8; DH_PRIVATE_LEN]);
        OsRng.fill_bytes(&mut private);
        Self::from_private_bytes(&private)
    }

    /// Create from an existing private exponent (used in deterministic tests).
    pub fn from_private_bytes(private: &[u8]) -> Self {
        let prime = BigUint::from_bytes_be(&DH_PRIME);
        let exponent = BigUint::from_bytes_be(private);
        let public = BigUint::from(DH_GENERATOR).modpow(&exponent, &prime);
        Self {
            private: Zeroizing::new(private.to_vec()),
            public: to_fixed_width(&public),
        }
    }

    /// The 96-byte big-endian public value.
    pub fn public_key_bytes(&self) -> [u8; DH_VALUE_LEN] {
        self.public
    }

    /// Compute the shared secret from the peer's public value.
    ///
    /// The peer value must be exactly [`DH_VALUE_LEN`] bytes and lie strictly
    /// between 1 and p-1.
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; DH_VALUE_LEN]>> {
        if peer_public.len() != DH_VALUE_LEN {
            return Err(CadenceTrustError::Protocol(format!(
                "peer public value must be {DH_VALUE_LEN} bytes, got {}",
                peer_public.len()
            )));
        }

        let prime = BigUint::from_bytes_be(&DH_PRIME);
        let one = BigUint::from(1u32);
        let peer = BigUint::from_bytes_be(peer_public);
        if peer <= one || peer >= &prime - &one {
            return Err(CadenceTrustError::Protocol(
                "peer public value outside of the group".into(),
            ));
        }

        let exponent = BigUint::from_bytes_be(&self.private);
        let shared = peer.modpow(&exponent, &prime);
        Ok(Zeroizing::new(to_fixed_width(&shared)))
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair").finish_non_exhaustive()
    }
}

/// Left-pad a group element to the fixed wire width.
fn to_fixed_width(value: &BigUint) -> [u8; DH_VALUE_LEN] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_VALUE_LEN];
    out[DH_VALUE_LEN - bytes.len()..].copy_from_slice(&bytes);
    out
}
