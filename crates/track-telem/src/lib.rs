/// Vehicle track telemetry simulation library.
///
/// A recorded track ([`track`]) is *densified* into time-uniform samples ([`model`]) using
/// spherical-earth navigation ([`coord`]). Each sample becomes a fixed-width binary record which is
/// encrypted and tagged ([`protocol`]) and sent over UDP by a [`channel::SecureChannel`]. The
/// [`sim`] module drives the whole thing.
use std::sync::Once;

use thiserror::Error;

pub mod channel;
pub mod coord;
pub mod keys;
pub mod model;
pub mod protocol;
pub mod sim;
pub mod track;

/// Result type for this library
pub type TTResult<T> = std::result::Result<T, Error>;

/// Error type for this library
#[derive(Debug, Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid coordinate: {0}")]
    InvalidCoord(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Malformed track: {0}")]
    Track(String),
    #[error("Port is not specified in address '{0}'")]
    MissingPort(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Crypto error: {0}")]
    Crypto(#[from] rsa::Error),
    #[error("Key store error: {0}")]
    KeyStore(String),
    #[error("Integrity tag mismatch")]
    IntegrityMismatch,
    #[error("Invalid message length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl From<nom::error::Error<&[u8]>> for Error {
    fn from(err: nom::error::Error<&[u8]>) -> Self {
        Error::ParseError(format!("{:?}", err))
    }
}

/// Test binary helper to init tracing. This is usually the responsibility of the consumer of the
/// library crate.
pub fn lazy_init_tracing() {
    {
        static INIT: Once = Once::new();
        &INIT
    }
    .call_once(|| {
        tracing_subscriber::fmt::init();
    });
}
