//! Record envelope: RSA-OAEP (SHA-256) under a fixed label.
//!
//! The label binds every ciphertext to this tool, so a blob encrypted with
//! the same key pair for another purpose never decrypts as a record.

use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use tracing::debug;

use crate::container::PrivateContainer;
use crate::public_key::PublicKey;
use credvault_common::{DecryptFailure, Error, Result, SensitiveBytes};

/// OAEP label for record payloads.
pub const OAEP_LABEL: &str = "credvault record";

/// Output size of the OAEP hash in bytes.
const HASH_SIZE: usize = 32;

fn padding() -> Oaep {
    Oaep::new_with_label::<Sha256, _>(OAEP_LABEL)
}

/// Largest plaintext the key can carry in one envelope.
pub fn max_plaintext_len(public_key: &PublicKey) -> usize {
    public_key.size().saturating_sub(2 * HASH_SIZE + 2)
}

/// Encrypt a record payload.
///
/// # Postconditions
/// - Ciphertext length equals the modulus size
/// - Output is randomized; equal plaintexts give different ciphertexts
///
/// # Errors
/// - `PayloadTooLarge` if `plaintext` exceeds [`max_plaintext_len`]
pub fn encrypt(public_key: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let max = max_plaintext_len(public_key);
    if plaintext.len() > max {
        return Err(Error::PayloadTooLarge {
            len: plaintext.len(),
            max,
        });
    }

    let ciphertext = public_key
        .as_rsa()
        .encrypt(&mut OsRng, padding(), plaintext)
        .map_err(|e| match e {
            rsa::Error::MessageTooLong => Error::PayloadTooLarge {
                len: plaintext.len(),
                max,
            },
            other => Error::Crypto(format!("Encryption failed: {}", other)),
        })?;

    debug!(size = ciphertext.len(), "Payload encrypted");
    Ok(ciphertext)
}

/// Decrypt a record payload.
///
/// The container is unlocked for this call only; the private key is
/// zeroized before returning.
///
/// # Errors
/// - `Decrypt(BadPassphrase)` if the container cannot be unlocked
/// - `Decrypt(BadCiphertext)` on a length, padding or label mismatch
pub fn decrypt(
    container: &PrivateContainer,
    passphrase: &[u8],
    ciphertext: &[u8],
) -> Result<SensitiveBytes> {
    let private_key = container.unlock(passphrase)?;

    if ciphertext.len() != rsa::traits::PublicKeyParts::size(&private_key) {
        return Err(Error::Decrypt(DecryptFailure::BadCiphertext));
    }

    let plaintext = private_key
        .decrypt(padding(), ciphertext)
        .map_err(|_| Error::Decrypt(DecryptFailure::BadCiphertext))?;

    Ok(SensitiveBytes::new(plaintext))
}

/// The vault key pair: encrypt with the public half, decrypt with the
/// container and a passphrase.
#[derive(Debug)]
pub struct Envelope {
    public_key: PublicKey,
    container: PrivateContainer,
}

impl Envelope {
    /// Pair a decoded public key with a private container.
    pub fn new(public_key: PublicKey, container: PrivateContainer) -> Self {
        Self {
            public_key,
            container,
        }
    }

    /// Decode both halves from their file contents.
    ///
    /// # Errors
    /// - `Parse` if either half cannot be decoded
    pub fn from_bytes(public_key: &[u8], private_key: &[u8]) -> Result<Self> {
        Ok(Self::new(
            PublicKey::from_ssh_bytes(public_key)?,
            PrivateContainer::from_pem(private_key)?,
        ))
    }

    /// The public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The private container.
    pub fn container(&self) -> &PrivateContainer {
        &self.container
    }

    /// Encrypt a record payload.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt(&self.public_key, plaintext)
    }

    /// Decrypt a record payload.
    pub fn decrypt(&self, passphrase: &[u8], ciphertext: &[u8]) -> Result<SensitiveBytes> {
        decrypt(&self.container, passphrase, ciphertext)
    }

    /// Unlock the container once and discard the key.
    ///
    /// Lets a caller reprompt on a wrong passphrase before reading records.
    pub fn check_passphrase(&self, passphrase: &[u8]) -> Result<()> {
        self.container.unlock(passphrase).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys::{encrypted_pkcs8_pem, pkcs1_pem, ssh_public_key_text, test_key, PASSPHRASE};
    use proptest::prelude::*;
    use std::sync::OnceLock;

    fn protected_envelope() -> &'static Envelope {
        static ENVELOPE: OnceLock<Envelope> = OnceLock::new();
        ENVELOPE.get_or_init(|| {
            let key = test_key();
            Envelope::from_bytes(
                ssh_public_key_text(&key.to_public_key()).as_bytes(),
                encrypted_pkcs8_pem(key, PASSPHRASE).as_bytes(),
            )
            .unwrap()
        })
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let envelope = protected_envelope();
        let plaintext = br#"{"profile":"prod","aws_access_key_id":"AKIA"}"#;

        let ciphertext = envelope.encrypt(plaintext).unwrap();
        let decrypted = envelope.decrypt(PASSPHRASE, &ciphertext).unwrap();

        assert_eq!(decrypted.as_bytes(), plaintext);
    }

    #[test]
    fn test_unprotected_container_roundtrip() {
        let key = test_key();
        let envelope = Envelope::from_bytes(
            ssh_public_key_text(&key.to_public_key()).as_bytes(),
            pkcs1_pem(key).as_bytes(),
        )
        .unwrap();

        let ciphertext = envelope.encrypt(b"hello").unwrap();
        assert_eq!(envelope.decrypt(b"", &ciphertext).unwrap().as_bytes(), b"hello");
    }

    #[test]
    fn test_ciphertext_size_is_modulus_size() {
        let envelope = protected_envelope();
        let short = envelope.encrypt(b"a").unwrap();
        let long = envelope.encrypt(&[0x41; 40]).unwrap();

        assert_eq!(short.len(), 128);
        assert_eq!(long.len(), 128);
    }

    #[test]
    fn test_randomized_output() {
        let envelope = protected_envelope();
        let ct1 = envelope.encrypt(b"same").unwrap();
        let ct2 = envelope.encrypt(b"same").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_payload_ceiling() {
        let envelope = protected_envelope();
        let max = max_plaintext_len(envelope.public_key());
        assert_eq!(max, 128 - 66);

        assert!(envelope.encrypt(&vec![1u8; max]).is_ok());
        let err = envelope.encrypt(&vec![1u8; max + 1]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { len, max: m } if len == max + 1 && m == max));
    }

    #[test]
    fn test_wrong_passphrase_never_yields_plaintext() {
        let envelope = protected_envelope();
        let ciphertext = envelope.encrypt(b"secret").unwrap();

        let err = envelope.decrypt(b"not it", &ciphertext).unwrap_err();
        assert!(matches!(err, Error::Decrypt(DecryptFailure::BadPassphrase)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_tampered_ciphertext_is_bad_ciphertext() {
        let envelope = protected_envelope();
        let mut ciphertext = envelope.encrypt(b"secret").unwrap();
        ciphertext[5] ^= 0xFF;

        let err = envelope.decrypt(PASSPHRASE, &ciphertext).unwrap_err();
        assert!(matches!(err, Error::Decrypt(DecryptFailure::BadCiphertext)));
    }

    #[test]
    fn test_truncated_ciphertext_is_bad_ciphertext() {
        let envelope = protected_envelope();
        let ciphertext = envelope.encrypt(b"secret").unwrap();

        let err = envelope
            .decrypt(PASSPHRASE, &ciphertext[..ciphertext.len() - 1])
            .unwrap_err();
        assert!(matches!(err, Error::Decrypt(DecryptFailure::BadCiphertext)));
    }

    #[test]
    fn test_foreign_label_is_bad_ciphertext() {
        let envelope = protected_envelope();
        let foreign = test_key()
            .to_public_key()
            .encrypt(&mut OsRng, Oaep::new_with_label::<Sha256, _>("other use"), b"x")
            .unwrap();

        let err = envelope.decrypt(PASSPHRASE, &foreign).unwrap_err();
        assert!(matches!(err, Error::Decrypt(DecryptFailure::BadCiphertext)));
    }

    #[test]
    fn test_check_passphrase() {
        let envelope = protected_envelope();
        assert!(envelope.check_passphrase(PASSPHRASE).is_ok());
        assert!(envelope.check_passphrase(b"nope").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_roundtrip_under_ceiling(plaintext in proptest::collection::vec(any::<u8>(), 0..=62)) {
            let envelope = protected_envelope();
            let ciphertext = envelope.encrypt(&plaintext).unwrap();
            let decrypted = envelope.decrypt(PASSPHRASE, &ciphertext).unwrap();
            prop_assert_eq!(decrypted.as_bytes(), plaintext.as_slice());
        }
    }
}
