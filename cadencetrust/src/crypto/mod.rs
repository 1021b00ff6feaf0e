// Crypto module declarations

pub mod dh;
pub mod signature;
pub mod challenge;
