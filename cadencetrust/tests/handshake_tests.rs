// Integration tests for the access-point handshake state machine.

use cadencetrust::crypto::challenge::derive;
use cadencetrust::handshake::messages::{
    ApChallenge, ApLoginFailed, ApResponseMessage, ClientHello, ClientResponsePlaintext,
    ErrorCode, LoginCryptoChallengeUnion, LoginCryptoDiffieHellmanChallenge,
};
use cadencetrust::handshake::protocol::{body_len, HELLO_MARKER};
use cadencetrust::{CadenceTrustError, ClientMetadata, DhKeyPair, HandshakeState, Initiator, ServerTrust};
use prost::Message;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

/// Server side of the handshake, enough to drive an Initiator.
struct AccessPoint {
    signing_key: RsaPrivateKey,
    keypair: DhKeyPair,
    transcript: Vec<u8>,
    gc: Vec<u8>,
}

impl AccessPoint {
    fn new(signing_key: RsaPrivateKey) -> Self {
        Self {
            signing_key,
            keypair: DhKeyPair::generate(),
            transcript: Vec::new(),
            gc: Vec::new(),
        }
    }

    fn receive_hello(&mut self, framed: &[u8]) {
        assert_eq!(&framed[..2], &HELLO_MARKER);
        self.transcript.extend_from_slice(framed);
        let hello = ClientHello::decode(&framed[6..]).unwrap();
        self.gc = hello.login_crypto_hello.diffie_hellman.unwrap().gc;
    }

    /// Signs with `signer`, which may differ from the pinned key.
    fn challenge(&mut self, signer: &RsaPrivateKey) -> ([u8; 4], Vec<u8>) {
        let gs = self.keypair.public_key_bytes().to_vec();
        let gs_signature = signer
            .sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(&gs))
            .unwrap();
        let body = ApResponseMessage {
            challenge: Some(ApChallenge {
                login_crypto_challenge: Some(LoginCryptoChallengeUnion {
                    diffie_hellman: Some(LoginCryptoDiffieHellmanChallenge {
                        gs,
                        server_signature_key: 1,
                        gs_signature,
                    }),
                }),
                server_nonce: Some(vec![0xAB; 16]),
                padding: None,
            }),
            login_failed: None,
        }
        .encode_to_vec();
        let prefix = ((body.len() + 4) as u32).to_be_bytes();
        self.transcript.extend_from_slice(&prefix);
        self.transcript.extend_from_slice(&body);
        (prefix, body)
    }

    fn signed_challenge(&mut self) -> ([u8; 4], Vec<u8>) {
        let key = self.signing_key.clone();
        self.challenge(&key)
    }

    fn expected_mac(&self) -> [u8; 20] {
        let shared = self.keypair.compute_shared_secret(&self.gc).unwrap();
        derive(&shared[..], &self.transcript).unwrap().challenge_mac
    }
}

fn test_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

fn initiator_for(key: &RsaPrivateKey) -> Initiator {
    Initiator::new(
        ServerTrust::new(RsaPublicKey::from(key)),
        ClientMetadata::new("handshake test"),
    )
}

// ── Full handshake ───────────────────────────────────────────────────────

#[test]
fn full_handshake_succeeds() {
    let key = test_key();
    let mut client = initiator_for(&key);
    let mut server = AccessPoint::new(key);

    let hello = client.hello().unwrap();
    server.receive_hello(&hello);

    let (prefix, body) = server.signed_challenge();
    client.receive_ap_response(prefix, &body).unwrap();
    assert_eq!(client.transcript(), &server.transcript[..]);

    client.verify_server().unwrap();
    assert_eq!(client.state(), HandshakeState::VerifiedSignature);

    let response = client.challenge_response().unwrap();
    let len = body_len([response[0], response[1], response[2], response[3]]).unwrap();
    assert_eq!(len, response.len() - 4);
    let plaintext = ClientResponsePlaintext::decode(&response[4..]).unwrap();
    let mac = plaintext.login_crypto_response.diffie_hellman.unwrap().hmac;
    assert_eq!(mac, server.expected_mac().to_vec());

    let keys = client.establish().unwrap();
    assert_eq!(client.state(), HandshakeState::EstablishedCipher);
    assert_ne!(keys.recv_key, keys.send_key);
    assert!(client.transcript().is_empty());
}

#[test]
fn hello_frames_are_fresh_per_attempt() {
    let key = test_key();
    let a = initiator_for(&key).hello().unwrap();
    let b = initiator_for(&key).hello().unwrap();
    assert_ne!(a, b);
}

// ── Error cases ──────────────────────────────────────────────────────────

#[test]
fn signature_rejection_aborts_without_keys() {
    let pinned = test_key();
    let rogue = test_key();
    let mut client = initiator_for(&pinned);
    let mut server = AccessPoint::new(pinned);

    server.receive_hello(&client.hello().unwrap());
    let (prefix, body) = server.challenge(&rogue);
    client.receive_ap_response(prefix, &body).unwrap();

    let err = client.verify_server().unwrap_err();
    assert!(matches!(err, CadenceTrustError::Authenticity));
    assert_eq!(client.state(), HandshakeState::Failed);
    assert!(client.challenge_response().is_err());
    assert!(client.establish().is_err());
}

#[test]
fn hello_twice_fails() {
    let mut client = initiator_for(&test_key());
    client.hello().unwrap();
    let err = client.hello().unwrap_err();
    assert!(matches!(err, CadenceTrustError::InvalidStateTransition { .. }));
    assert_eq!(client.state(), HandshakeState::Failed);
}

#[test]
fn malformed_ap_response_is_decode_error() {
    let mut client = initiator_for(&test_key());
    client.hello().unwrap();
    let body = [0xFFu8, 0xFF, 0xFF];
    let err = client.receive_ap_response(7u32.to_be_bytes(), &body).unwrap_err();
    assert!(matches!(err, CadenceTrustError::Decode(_)));
    assert_eq!(client.state(), HandshakeState::Failed);
}

#[test]
fn response_without_challenge_is_protocol_error() {
    let mut client = initiator_for(&test_key());
    client.hello().unwrap();
    let body = ApResponseMessage::default().encode_to_vec();
    let prefix = ((body.len() + 4) as u32).to_be_bytes();
    let err = client.receive_ap_response(prefix, &body).unwrap_err();
    assert!(matches!(err, CadenceTrustError::Protocol(_)));
}

#[test]
fn login_failed_after_challenge_response() {
    let key = test_key();
    let mut client = initiator_for(&key);
    let mut server = AccessPoint::new(key);
    server.receive_hello(&client.hello().unwrap());
    let (prefix, body) = server.signed_challenge();
    client.receive_ap_response(prefix, &body).unwrap();
    client.verify_server().unwrap();
    client.challenge_response().unwrap();

    let rejection = ApResponseMessage {
        challenge: None,
        login_failed: Some(ApLoginFailed {
            error_code: ErrorCode::BadCredentials as i32,
            retry_delay: None,
            expiry: None,
            error_description: Some("nope".into()),
        }),
    }
    .encode_to_vec();
    let err = client.login_failed(&rejection);
    assert!(matches!(err, CadenceTrustError::Connection { code: 12 }));
    assert_eq!(client.state(), HandshakeState::Failed);
}

#[test]
fn abort_discards_state() {
    let mut client = initiator_for(&test_key());
    client.hello().unwrap();
    client.abort();
    assert_eq!(client.state(), HandshakeState::Failed);
    assert!(client.transcript().is_empty());
}
