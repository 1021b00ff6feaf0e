//! Mock access point shared by the integration suites.

#![allow(dead_code)]

use bytes::Bytes;
use cadencestream::transport::{AsyncStream, Transport};
use cadencestream::{EncryptedTransport, PacketType};
use cadencetrust::crypto::challenge::derive;
use cadencetrust::handshake::messages::{
    ApChallenge, ApLoginFailed, ApResponseMessage, ClientHello, ClientResponsePlaintext,
    LoginCryptoChallengeUnion, LoginCryptoDiffieHellmanChallenge,
};
use cadencetrust::handshake::protocol::HELLO_MARKER;
use cadencetrust::login::{AccountType, ClientResponseEncrypted};
use cadencetrust::{ApWelcome, AuthenticationType, DhKeyPair, LoginCredentials, ServerTrust};
use prost::Message;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

pub fn test_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

pub fn trust_for(key: &RsaPrivateKey) -> ServerTrust {
    ServerTrust::new(RsaPublicKey::from(key))
}

/// How the access point answers a correct challenge response.
#[derive(Debug, Clone, Copy)]
pub enum Verdict {
    /// Stay silent and switch to the encrypted transport.
    Accept,
    /// Send an `APLoginFailed` with this code.
    Reject(i32),
    /// Close the connection.
    Hangup,
    /// Write these raw bytes, then wait for the client to hang up.
    Stray(&'static [u8]),
}

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut framed = ((body.len() + 4) as u32).to_be_bytes().to_vec();
    framed.extend_from_slice(&body);
    framed
}

/// Server side of the handshake. `signer` signs the DH value; pass a key other
/// than the trusted one to simulate an impostor.
///
/// Returns `None` if the client gave up or the verdict ends the connection.
pub async fn serve_handshake(
    stream: impl AsyncStream,
    signer: &RsaPrivateKey,
    verdict: Verdict,
) -> Option<EncryptedTransport> {
    let mut t = Transport::new(stream);
    let mut transcript = Vec::new();

    let head = t.read_fully(6).await.ok()?;
    assert_eq!(&head[..2], &HELLO_MARKER);
    let total = u32::from_be_bytes([head[2], head[3], head[4], head[5]]) as usize;
    let body = t.read_fully(total - 6).await.ok()?;
    transcript.extend_from_slice(&head);
    transcript.extend_from_slice(&body);
    let hello = ClientHello::decode(body).unwrap();
    let gc = hello.login_crypto_hello.diffie_hellman.unwrap().gc;

    let dh = DhKeyPair::generate();
    let gs = dh.public_key_bytes().to_vec();
    let gs_signature = signer
        .sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(&gs))
        .unwrap();
    let response = frame(
        ApResponseMessage {
            challenge: Some(ApChallenge {
                login_crypto_challenge: Some(LoginCryptoChallengeUnion {
                    diffie_hellman: Some(LoginCryptoDiffieHellmanChallenge {
                        gs,
                        server_signature_key: 1,
                        gs_signature,
                    }),
                }),
                server_nonce: Some(vec![0x5A; 16]),
                padding: None,
            }),
            login_failed: None,
        }
        .encode_to_vec(),
    );
    t.write(&response).await.ok()?;
    transcript.extend_from_slice(&response);

    let prefix = t.read_fully(4).await.ok()?;
    let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let plaintext = ClientResponsePlaintext::decode(t.read_fully(len - 4).await.ok()?).unwrap();
    let shared = dh.compute_shared_secret(&gc).unwrap();
    let challenge = derive(&shared[..], &transcript).unwrap();
    assert_eq!(
        plaintext.login_crypto_response.diffie_hellman.unwrap().hmac,
        challenge.challenge_mac.to_vec()
    );

    match verdict {
        Verdict::Accept => Some(EncryptedTransport::new(t, &challenge.keys.reversed())),
        Verdict::Reject(code) => {
            let rejection = frame(
                ApResponseMessage {
                    challenge: None,
                    login_failed: Some(ApLoginFailed {
                        error_code: code,
                        retry_delay: None,
                        expiry: None,
                        error_description: None,
                    }),
                }
                .encode_to_vec(),
            );
            t.write(&rejection).await.ok()?;
            None
        }
        Verdict::Hangup => None,
        Verdict::Stray(bytes) => {
            t.write(bytes).await.ok()?;
            let _ = t.read_fully(1).await;
            None
        }
    }
}

pub fn welcome_for(username: &str) -> ApWelcome {
    ApWelcome {
        canonical_username: username.to_string(),
        account_type_logged_in: AccountType::Spotify as i32,
        credentials_type_logged_in: AccountType::Spotify as i32,
        reusable_auth_credentials_type: AuthenticationType::StoredSpotifyCredentials as i32,
        reusable_auth_credentials: b"reusable-token".to_vec(),
        lfs_secret: None,
    }
}

/// Read the login packet and answer it.
///
/// `reject` sends `AuthFailure` with that code instead of a welcome.
pub async fn serve_login(
    server: &mut EncryptedTransport,
    reject: Option<i32>,
) -> Option<LoginCredentials> {
    let packet = server.receive().await.ok()?;
    assert_eq!(packet.cmd, PacketType::Login);
    let request = ClientResponseEncrypted::decode(packet.payload).unwrap();
    let credentials = request.login_credentials.unwrap();

    match reject {
        None => {
            let username = credentials.username.clone().unwrap_or_default();
            let welcome = welcome_for(&username).encode_to_vec();
            server.send(PacketType::APWelcome, &welcome).await.ok()?;
        }
        Some(code) => {
            let failed = ApLoginFailed {
                error_code: code,
                retry_delay: None,
                expiry: None,
                error_description: None,
            }
            .encode_to_vec();
            server.send(PacketType::AuthFailure, &failed).await.ok()?;
        }
    }
    Some(credentials)
}

pub fn ping_payload(server_secs: u32) -> Bytes {
    Bytes::copy_from_slice(&server_secs.to_be_bytes())
}
