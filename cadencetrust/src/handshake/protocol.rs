// Access-point handshake, client side, without I/O.
//
//   Client                                Access point
//     |--- 00 04 | len | ClientHello ------->|
//     |<-- len | APResponseMessage ----------|
//     |--- len | ClientResponsePlaintext --->|
//     |<-- (silence) | len | APLoginFailed --|
//     |==== Shannon encrypted packets =======|
//
// The caller moves bytes; the Initiator owns the DH key pair, the transcript
// and the state.

use prost::Message;
use rand::RngCore;

use crate::crypto::challenge::{self, Challenge, SessionKeys};
use crate::crypto::dh::DhKeyPair;
use crate::crypto::signature::ServerTrust;
use crate::error::{CadenceTrustError, Result};
use crate::handshake::messages::{
    ApResponseMessage, ClientHello, ClientResponsePlaintext, CryptoResponseUnion, Cryptosuite,
    LoginCryptoDiffieHellmanHello, LoginCryptoDiffieHellmanResponse, LoginCryptoHelloUnion,
    LoginCryptoResponseUnion, PoWResponseUnion,
};
use crate::handshake::state::HandshakeState;
use crate::version::ClientMetadata;

/// Protocol version marker preceding the hello's length prefix.
pub const HELLO_MARKER: [u8; 2] = [0x00, 0x04];

/// Width of the big-endian length prefix on every cleartext message.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Upper bound on a cleartext handshake message, prefix included.
pub const MAX_MESSAGE_LEN: usize = 1 << 20;

const CLIENT_NONCE_LEN: usize = 16;
const HELLO_PADDING: u8 = 0x1e;

/// Body length announced by a cleartext length prefix.
///
/// The prefix counts itself, so anything below 4 is malformed.
pub fn body_len(prefix: [u8; LENGTH_PREFIX_LEN]) -> Result<usize> {
    let total = u32::from_be_bytes(prefix) as usize;
    if !(LENGTH_PREFIX_LEN..=MAX_MESSAGE_LEN).contains(&total) {
        return Err(CadenceTrustError::Protocol(format!(
            "invalid handshake message length {total}"
        )));
    }
    Ok(total - LENGTH_PREFIX_LEN)
}

/// Server values taken from the AP challenge, pending verification.
struct ServerChallenge {
    gs: Vec<u8>,
    gs_signature: Vec<u8>,
}

/// Client side of the access-point handshake.
pub struct Initiator {
    trust: ServerTrust,
    metadata: ClientMetadata,
    state: HandshakeState,
    keypair: Option<DhKeyPair>,
    transcript: Vec<u8>,
    server: Option<ServerChallenge>,
    challenge: Option<Challenge>,
}

impl Initiator {
    pub fn new(trust: ServerTrust, metadata: ClientMetadata) -> Self {
        Self {
            trust,
            metadata,
            state: HandshakeState::Idle,
            keypair: None,
            transcript: Vec::new(),
            server: None,
            challenge: None,
        }
    }

    /// Use a fixed key pair instead of a fresh one. Test vectors only.
    pub fn with_keypair(mut self, keypair: DhKeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Every cleartext byte exchanged so far, in order.
    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Idle -> SentHello: the framed ClientHello to write.
    pub fn hello(&mut self) -> Result<Vec<u8>> {
        self.expect(HandshakeState::Idle, HandshakeState::SentHello)?;

        let keypair = self.keypair.take().unwrap_or_else(DhKeyPair::generate);
        let mut client_nonce = vec![0u8; CLIENT_NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut client_nonce);

        let hello = ClientHello {
            build_info: self.metadata.build_info(),
            cryptosuites_supported: Cryptosuite::SUPPORTED.iter().map(|&s| s as i32).collect(),
            login_crypto_hello: LoginCryptoHelloUnion {
                diffie_hellman: Some(LoginCryptoDiffieHellmanHello {
                    gc: keypair.public_key_bytes().to_vec(),
                    server_keys_known: 1,
                }),
            },
            client_nonce,
            padding: Some(vec![HELLO_PADDING]),
        };
        self.keypair = Some(keypair);

        let body = hello.encode_to_vec();
        let total = HELLO_MARKER.len() + LENGTH_PREFIX_LEN + body.len();
        let mut framed = Vec::with_capacity(total);
        framed.extend_from_slice(&HELLO_MARKER);
        framed.extend_from_slice(&(total as u32).to_be_bytes());
        framed.extend_from_slice(&body);

        self.transcript.extend_from_slice(&framed);
        self.advance(HandshakeState::SentHello);
        Ok(framed)
    }

    /// SentHello -> ReceivedApResponse: absorb the AP response.
    ///
    /// `prefix` is the 4-byte length prefix exactly as read, `body` the rest.
    pub fn receive_ap_response(&mut self, prefix: [u8; LENGTH_PREFIX_LEN], body: &[u8]) -> Result<()> {
        self.expect(HandshakeState::SentHello, HandshakeState::ReceivedApResponse)?;
        self.transcript.extend_from_slice(&prefix);
        self.transcript.extend_from_slice(body);

        let response = match ApResponseMessage::decode(body) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.into())),
        };
        if let Some(failed) = response.login_failed {
            return Err(self.fail(CadenceTrustError::Connection { code: failed.error_code }));
        }
        let dh = response
            .challenge
            .and_then(|c| c.login_crypto_challenge)
            .and_then(|c| c.diffie_hellman);
        let Some(dh) = dh else {
            return Err(self.fail(CadenceTrustError::Protocol(
                "AP response carries no DH challenge".into(),
            )));
        };

        tracing::debug!(
            gs_len = dh.gs.len(),
            signature_key = dh.server_signature_key,
            "received AP challenge"
        );
        self.server = Some(ServerChallenge {
            gs: dh.gs,
            gs_signature: dh.gs_signature,
        });
        self.advance(HandshakeState::ReceivedApResponse);
        Ok(())
    }

    /// ReceivedApResponse -> VerifiedSignature: check `gs` against the pinned key.
    pub fn verify_server(&mut self) -> Result<()> {
        self.expect(HandshakeState::ReceivedApResponse, HandshakeState::VerifiedSignature)?;
        let verified = match &self.server {
            Some(server) => self.trust.verify(&server.gs, &server.gs_signature),
            None => Err(CadenceTrustError::Protocol("no server challenge recorded".into())),
        };
        if let Err(e) = verified {
            tracing::warn!("access point signature rejected");
            return Err(self.fail(e));
        }
        self.advance(HandshakeState::VerifiedSignature);
        Ok(())
    }

    /// VerifiedSignature -> SentChallengeResponse: the framed challenge response.
    ///
    /// Not part of the transcript.
    pub fn challenge_response(&mut self) -> Result<Vec<u8>> {
        self.expect(HandshakeState::VerifiedSignature, HandshakeState::SentChallengeResponse)?;

        let derived = match self.solve() {
            Ok(c) => c,
            Err(e) => return Err(self.fail(e)),
        };
        let response = ClientResponsePlaintext {
            login_crypto_response: LoginCryptoResponseUnion {
                diffie_hellman: Some(LoginCryptoDiffieHellmanResponse {
                    hmac: derived.challenge_mac.to_vec(),
                }),
            },
            pow_response: PoWResponseUnion {},
            crypto_response: CryptoResponseUnion {},
        };
        self.challenge = Some(derived);

        let body = response.encode_to_vec();
        let total = LENGTH_PREFIX_LEN + body.len();
        let mut framed = Vec::with_capacity(total);
        framed.extend_from_slice(&(total as u32).to_be_bytes());
        framed.extend_from_slice(&body);

        self.advance(HandshakeState::SentChallengeResponse);
        Ok(framed)
    }

    /// SentChallengeResponse -> EstablishedCipher: hand out the transport keys.
    pub fn establish(&mut self) -> Result<SessionKeys> {
        self.expect(HandshakeState::SentChallengeResponse, HandshakeState::EstablishedCipher)?;
        let Some(challenge) = self.challenge.take() else {
            return Err(self.fail(CadenceTrustError::Protocol("no challenge derived".into())));
        };
        self.transcript.clear();
        self.advance(HandshakeState::EstablishedCipher);
        Ok(challenge.keys)
    }

    /// The AP answered the challenge response with a rejection.
    ///
    /// Always moves to `Failed`; returns the error to surface.
    pub fn login_failed(&mut self, body: &[u8]) -> CadenceTrustError {
        let err = match ApResponseMessage::decode(body) {
            Ok(ApResponseMessage { login_failed: Some(failed), .. }) => {
                CadenceTrustError::Connection { code: failed.error_code }
            }
            Ok(_) => CadenceTrustError::Protocol("unexpected message after challenge response".into()),
            Err(e) => e.into(),
        };
        self.fail(err)
    }

    /// Abandon the handshake, discarding all key material.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.state = HandshakeState::Failed;
        }
        self.discard();
    }

    fn solve(&mut self) -> Result<Challenge> {
        let keypair = self
            .keypair
            .take()
            .ok_or_else(|| CadenceTrustError::Protocol("no key pair".into()))?;
        let server = self
            .server
            .as_ref()
            .ok_or_else(|| CadenceTrustError::Protocol("no server challenge recorded".into()))?;
        let shared = keypair.compute_shared_secret(&server.gs)?;
        challenge::derive(&shared[..], &self.transcript)
    }

    fn expect(&mut self, from: HandshakeState, to: HandshakeState) -> Result<()> {
        if self.state == from {
            return Ok(());
        }
        let err = CadenceTrustError::InvalidStateTransition {
            from: self.state.label().into(),
            to: to.label().into(),
        };
        Err(self.fail(err))
    }

    fn advance(&mut self, to: HandshakeState) {
        tracing::debug!(from = %self.state, to = %to, "handshake transition");
        self.state = to;
    }

    fn fail(&mut self, err: CadenceTrustError) -> CadenceTrustError {
        tracing::debug!(from = %self.state, error = %err, "handshake failed");
        self.state = HandshakeState::Failed;
        self.discard();
        err
    }

    fn discard(&mut self) {
        self.keypair = None;
        self.server = None;
        self.challenge = None;
        self.transcript.clear();
    }
}

impl std::fmt::Debug for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("state", &self.state)
            .field("transcript_len", &self.transcript.len())
            .finish_non_exhaustive()
    }
}
