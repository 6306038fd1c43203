/// Encrypted, authenticated datagram framing.
///
/// ```text
/// +----------------------------------+-------------------------+
/// | RSA PKCS#1 v1.5 ciphertext (k B) | HMAC-SHA-256 tag (32 B) |
/// +----------------------------------+-------------------------+
/// ```
///
/// `k` is the byte length of the RSA modulus. The HMAC key is the modulus itself, big-endian,
/// left padded to `k` bytes, and the MAC covers the ciphertext only.
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use rsa::{traits::PublicKeyParts, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::record::TelemetryRecord;
use crate::{Error, TTResult};

type HmacSha256 = Hmac<Sha256>;

/// Length of the integrity tag appended to every datagram.
pub const TAG_LEN: usize = 32;

/// One sealed record, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl WireMessage {
    pub fn byte_len(&self) -> usize {
        self.ciphertext.len() + TAG_LEN
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        [self.ciphertext.as_slice(), &self.tag].concat()
    }
}

/// Big-endian modulus bytes, padded to the modulus size.
pub fn mac_key(key: &RsaPublicKey) -> Vec<u8> {
    let k = key.size();
    let n = key.n().to_bytes_be();
    let mut out = vec![0u8; k.saturating_sub(n.len())];
    out.extend_from_slice(&n);
    out
}

/// Seals and verifies datagrams for a single public key.
#[derive(Debug, Clone)]
pub struct WireSealer {
    public: RsaPublicKey,
    mac_key: Vec<u8>,
}

impl WireSealer {
    pub fn new(public: RsaPublicKey) -> Self {
        let mac_key = mac_key(&public);
        Self { public, mac_key }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Ciphertext length, equal to the modulus byte length.
    pub fn ciphertext_len(&self) -> usize {
        self.public.size()
    }

    /// Datagram length, constant for the lifetime of the key.
    pub fn wire_len(&self) -> usize {
        self.ciphertext_len() + TAG_LEN
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.mac_key).expect("HMAC takes keys of any size")
    }

    /// Encrypt `plaintext` under the public key and tag the ciphertext. Padding is randomized, so
    /// sealing the same plaintext twice gives different ciphertexts.
    pub fn seal<R>(&self, rng: &mut R, plaintext: &[u8]) -> TTResult<WireMessage>
    where
        R: CryptoRng + RngCore,
    {
        let ciphertext = self.public.encrypt(rng, Pkcs1v15Encrypt, plaintext)?;
        let mut mac = self.mac();
        mac.update(&ciphertext);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(WireMessage { ciphertext, tag })
    }

    /// Check length and tag of a received datagram and return the ciphertext part.
    pub fn verify<'a>(&self, datagram: &'a [u8]) -> TTResult<&'a [u8]> {
        if datagram.len() != self.wire_len() {
            return Err(Error::InvalidLength {
                expected: self.wire_len(),
                actual: datagram.len(),
            });
        }
        let (ciphertext, tag) = datagram.split_at(self.ciphertext_len());
        let mut mac = self.mac();
        mac.update(ciphertext);
        mac.verify_slice(tag).map_err(|_| Error::IntegrityMismatch)?;
        Ok(ciphertext)
    }

    /// Collector side: verify, decrypt and decode a datagram.
    pub fn open(&self, private: &RsaPrivateKey, datagram: &[u8]) -> TTResult<TelemetryRecord> {
        let ciphertext = self.verify(datagram)?;
        let plaintext = private.decrypt(Pkcs1v15Encrypt, ciphertext)?;
        TelemetryRecord::parse(&plaintext)
    }
}
