// Login messages sent over the encrypted transport once the handshake is done.

use prost::Message;

use crate::error::Result;

/// Field number of `login_credentials` inside [`ClientResponseEncrypted`].
const LOGIN_CREDENTIALS_TAG: u32 = 10;

/// Credentials supplied by the caller. The client only borrows them.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginCredentials {
    #[prost(string, optional, tag = "10")]
    pub username: Option<String>,
    #[prost(enumeration = "AuthenticationType", required, tag = "20")]
    pub typ: i32,
    #[prost(bytes = "vec", optional, tag = "30")]
    pub auth_data: Option<Vec<u8>>,
}

impl LoginCredentials {
    /// Username/password credentials.
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            typ: AuthenticationType::UserPass as i32,
            auth_data: Some(password.into().into_bytes()),
        }
    }

    /// Reusable credentials handed out in a previous welcome.
    pub fn from_welcome(welcome: &ApWelcome) -> Self {
        Self {
            username: Some(welcome.canonical_username.clone()),
            typ: welcome.reusable_auth_credentials_type,
            auth_data: Some(welcome.reusable_auth_credentials.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AuthenticationType {
    UserPass = 0,
    StoredSpotifyCredentials = 1,
    StoredFacebookCredentials = 2,
    SpotifyToken = 3,
    FacebookToken = 4,
}

/// Login request, sent with the `Login` command.
///
/// `login_credentials` is left empty here: [`encode_login_request`] writes
/// the borrowed credentials directly into the output buffer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientResponseEncrypted {
    #[prost(message, optional, tag = "10")]
    pub login_credentials: Option<LoginCredentials>,
    #[prost(message, required, tag = "50")]
    pub system_info: SystemInfo,
    #[prost(string, optional, tag = "70")]
    pub version_string: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SystemInfo {
    #[prost(enumeration = "CpuFamily", required, tag = "10")]
    pub cpu_family: i32,
    #[prost(enumeration = "Os", required, tag = "60")]
    pub os: i32,
    #[prost(string, optional, tag = "90")]
    pub system_information_string: Option<String>,
    #[prost(string, optional, tag = "100")]
    pub device_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CpuFamily {
    Unknown = 0,
    X86 = 1,
    X8664 = 2,
    Ppc = 3,
    Ppc64 = 4,
    Arm = 5,
    Ia64 = 6,
    Sh = 7,
    Mips = 8,
    Blackfin = 9,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Os {
    Unknown = 0,
    Windows = 1,
    Osx = 2,
    Iphone = 3,
    S60 = 4,
    Linux = 5,
    WindowsCe = 6,
    Android = 7,
    Palm = 8,
    Freebsd = 9,
}

/// Server welcome, payload of the `APWelcome` command.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApWelcome {
    #[prost(string, required, tag = "10")]
    pub canonical_username: String,
    #[prost(enumeration = "AccountType", required, tag = "20")]
    pub account_type_logged_in: i32,
    #[prost(enumeration = "AccountType", required, tag = "30")]
    pub credentials_type_logged_in: i32,
    #[prost(enumeration = "AuthenticationType", required, tag = "40")]
    pub reusable_auth_credentials_type: i32,
    #[prost(bytes = "vec", required, tag = "50")]
    pub reusable_auth_credentials: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "60")]
    pub lfs_secret: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AccountType {
    Spotify = 0,
    Facebook = 1,
}

/// Serialize a login request around borrowed credentials.
///
/// Protobuf fields may appear in any order, so the credentials are encoded
/// first straight from the borrow and the remaining fields appended after.
pub fn encode_login_request(
    credentials: &LoginCredentials,
    rest: &ClientResponseEncrypted,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(credentials.encoded_len() + rest.encoded_len() + 8);
    prost::encoding::message::encode(LOGIN_CREDENTIALS_TAG, credentials, &mut buf);
    rest.encode(&mut buf)?;
    Ok(buf)
}
