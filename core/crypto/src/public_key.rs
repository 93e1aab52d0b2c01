//! SSH-formatted RSA public keys.
//!
//! The textual form is `<algorithm> <base64 blob> [comment]`. The blob holds
//! three fields, each prefixed by a 4-byte big-endian length: the algorithm
//! identifier, the public exponent and the modulus (both big-endian
//! unsigned integers).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use std::fmt;

use credvault_common::{Error, Result};

/// The only algorithm whose blob carries an exponent and a modulus.
pub const SSH_RSA: &str = "ssh-rsa";

/// Public half of the vault key pair, used for encryption only.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Decode a public key from its SSH textual form.
    ///
    /// # Errors
    /// - `Parse` if there are fewer than two whitespace-separated tokens
    /// - `Parse` if the blob is not valid base64
    /// - `Parse` if a length-prefixed field is truncated
    /// - `Parse` if the algorithm token and the blob's identifier disagree
    /// - `Parse` if the key is not RSA or RSA rejects its parameters
    pub fn from_ssh_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::Parse("public key file is not valid UTF-8".to_string()))?;

        let mut tokens = text.split_ascii_whitespace();
        let (declared, encoded) = match (tokens.next(), tokens.next()) {
            (Some(declared), Some(encoded)) => (declared, encoded),
            _ => {
                return Err(Error::Parse(
                    "invalid key format; must contain at least two fields (keytype data [comment])"
                        .to_string(),
                ))
            }
        };

        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| Error::Parse(format!("public key blob is not valid base64: {}", e)))?;

        let mut reader = WireReader::new(&blob);
        let identifier = reader.read_field("key type")?;
        let exponent = reader.read_field("public exponent")?;
        let modulus = reader.read_field("modulus")?;

        if identifier != declared.as_bytes() {
            return Err(Error::Parse(format!(
                "key type said {}, but encoded format said {}; these should match",
                declared,
                String::from_utf8_lossy(identifier)
            )));
        }

        if declared != SSH_RSA {
            return Err(Error::Parse(format!(
                "unsupported key type {}, only {} keys can encrypt",
                declared, SSH_RSA
            )));
        }

        let inner = RsaPublicKey::new(
            BigUint::from_bytes_be(modulus),
            BigUint::from_bytes_be(exponent),
        )
        .map_err(|e| Error::Parse(format!("invalid RSA public key: {}", e)))?;

        Ok(Self { inner })
    }

    /// Modulus size in bytes; also the size of every ciphertext.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.inner.n().bits()
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(inner: RsaPublicKey) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} {} bits)", SSH_RSA, self.bits())
    }
}

/// Cursor over an SSH wire-format blob.
struct WireReader<'a> {
    data: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn read_field(&mut self, what: &str) -> Result<&'a [u8]> {
        if self.data.len() < 4 {
            return Err(Error::Parse(format!(
                "public key blob truncated before the {} length",
                what
            )));
        }
        let (prefix, rest) = self.data.split_at(4);
        let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if rest.len() < length {
            return Err(Error::Parse(format!(
                "public key blob truncated inside the {} ({} of {} bytes)",
                what,
                rest.len(),
                length
            )));
        }
        let (field, rest) = rest.split_at(length);
        self.data = rest;
        Ok(field)
    }
}
