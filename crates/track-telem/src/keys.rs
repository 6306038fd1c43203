/// Session RSA key pairs and where they come from.
///
/// [`KeyStore`] hides key acquisition from the channel. [`PemKeyStore`] reuses key material
/// persisted by a previous run and creates it on first use. [`EphemeralKeyStore`] makes a
/// throwaway pair and never touches the file system.
use std::{
    fs,
    path::{Path, PathBuf},
};

use rsa::{
    pkcs1::{
        DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
        LineEnding,
    },
    RsaPrivateKey, RsaPublicKey,
};
use tracing::{debug, info};

use crate::{protocol::record::RECORD_LEN, Error, TTResult};

/// Default modulus size. Fits one record under PKCS#1 v1.5 padding (at most 117 bytes).
pub const DEFAULT_KEY_BITS: usize = 1024;

/// PKCS#1 v1.5 encryption padding overhead, bytes.
const PKCS1_OVERHEAD: usize = 11;

pub const PUBLIC_KEY_FILE: &str = "public.pem";
pub const PRIVATE_KEY_FILE: &str = "private.pem";

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: RsaPublicKey,
    pub private: RsaPrivateKey,
}

impl KeyPair {
    /// Generate a fresh pair with a `bits` sized modulus.
    pub fn generate(bits: usize) -> TTResult<Self> {
        if bits / 8 < RECORD_LEN + PKCS1_OVERHEAD {
            return Err(Error::InvalidParameter(format!(
                "{bits} bit key cannot carry a {RECORD_LEN} byte record"
            )));
        }
        debug!("generating {bits} bit RSA key pair");
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)?;
        Ok(Self {
            public: RsaPublicKey::from(&private),
            private,
        })
    }
}

/// Capability to acquire the session key pair.
pub trait KeyStore {
    fn load_or_create_key_pair(&self) -> TTResult<KeyPair>;
}

/// Fresh key pair per call, nothing persisted.
#[derive(Debug, Clone, Copy)]
pub struct EphemeralKeyStore {
    pub bits: usize,
}

impl Default for EphemeralKeyStore {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
        }
    }
}

impl KeyStore for EphemeralKeyStore {
    fn load_or_create_key_pair(&self) -> TTResult<KeyPair> {
        KeyPair::generate(self.bits)
    }
}

/// PKCS#1 PEM files `public.pem` / `private.pem` in a directory.
#[derive(Debug, Clone)]
pub struct PemKeyStore {
    dir: PathBuf,
    bits: usize,
}

impl PemKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bits: DEFAULT_KEY_BITS,
        }
    }

    pub fn with_bits(mut self, bits: usize) -> Self {
        self.bits = bits;
        self
    }

    pub fn public_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    pub fn private_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    fn load(&self) -> TTResult<KeyPair> {
        let public_pem = fs::read_to_string(self.public_path())?;
        let private_pem = fs::read_to_string(self.private_path())?;
        let public = RsaPublicKey::from_pkcs1_pem(&public_pem)
            .map_err(|e| key_err(&self.public_path(), e))?;
        let private = RsaPrivateKey::from_pkcs1_pem(&private_pem)
            .map_err(|e| key_err(&self.private_path(), e))?;
        if RsaPublicKey::from(&private) != public {
            return Err(Error::KeyStore(format!(
                "{} does not match {}",
                self.public_path().display(),
                self.private_path().display()
            )));
        }
        Ok(KeyPair { public, private })
    }

    fn store(&self, keys: &KeyPair) -> TTResult<()> {
        fs::create_dir_all(&self.dir)?;
        let public_pem = keys
            .public
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| key_err(&self.public_path(), e))?;
        let private_pem = keys
            .private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| key_err(&self.private_path(), e))?;
        fs::write(self.public_path(), public_pem)?;
        write_private(&self.private_path(), private_pem.as_bytes())?;
        Ok(())
    }
}

fn key_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::KeyStore(format!("{}: {e}", path.display()))
}

#[cfg(unix)]
fn write_private(path: &Path, pem: &[u8]) -> std::io::Result<()> {
    use std::{io::Write, os::unix::fs::OpenOptionsExt};
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?
        .write_all(pem)
}

#[cfg(not(unix))]
fn write_private(path: &Path, pem: &[u8]) -> std::io::Result<()> {
    fs::write(path, pem)
}

impl KeyStore for PemKeyStore {
    fn load_or_create_key_pair(&self) -> TTResult<KeyPair> {
        match (self.public_path().exists(), self.private_path().exists()) {
            (true, true) => {
                let keys = self.load()?;
                info!("Loaded key pair from {}", self.dir.display());
                Ok(keys)
            }
            (false, false) => {
                let keys = KeyPair::generate(self.bits)?;
                self.store(&keys)?;
                info!("Created new key pair in {}", self.dir.display());
                Ok(keys)
            }
            // Never overwrite half a key pair; that is for a human to sort out.
            _ => Err(Error::KeyStore(format!(
                "incomplete key pair in {}",
                self.dir.display()
            ))),
        }
    }
}

/// One shared pair for tests, key generation is slow.
#[cfg(test)]
pub(crate) fn test_key_pair() -> KeyPair {
    use std::sync::OnceLock;
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| KeyPair::generate(DEFAULT_KEY_BITS).unwrap())
        .clone()
}

/// Hands out the shared test pair.
#[cfg(test)]
pub(crate) struct FixedKeyStore;

#[cfg(test)]
impl KeyStore for FixedKeyStore {
    fn load_or_create_key_pair(&self) -> TTResult<KeyPair> {
        Ok(test_key_pair())
    }
}
