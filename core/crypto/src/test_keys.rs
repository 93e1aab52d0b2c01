//! Shared key material for the crypto tests.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pkcs8::pkcs5::pbes2;
use pkcs8::{EncodePrivateKey, LineEnding, PrivateKeyInfo};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::OnceLock;

pub const PASSPHRASE: &[u8] = b"correct horse battery staple";

/// One 1024-bit key per test binary; generation is slow in debug builds.
pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).unwrap())
}

pub fn ssh_blob(identifier: &str, key: &RsaPublicKey) -> Vec<u8> {
    let mut blob = Vec::new();
    for field in [
        identifier.as_bytes().to_vec(),
        key.e().to_bytes_be(),
        key.n().to_bytes_be(),
    ] {
        blob.extend_from_slice(&(field.len() as u32).to_be_bytes());
        blob.extend_from_slice(&field);
    }
    blob
}

pub fn ssh_public_key_text(key: &RsaPublicKey) -> String {
    format!("ssh-rsa {}", STANDARD.encode(ssh_blob("ssh-rsa", key)))
}

pub fn pkcs1_pem(key: &RsaPrivateKey) -> String {
    key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string()
}

pub fn pkcs8_pem(key: &RsaPrivateKey) -> String {
    key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
}

/// PBES2 with a small PBKDF2 iteration count so tests stay fast.
pub fn encrypted_pkcs8_pem(key: &RsaPrivateKey, passphrase: &[u8]) -> String {
    let der = key.to_pkcs8_der().unwrap();
    let info = PrivateKeyInfo::try_from(der.as_bytes()).unwrap();
    let salt = [7u8; 16];
    let iv = [9u8; 16];
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &salt, &iv).unwrap();
    let encrypted = info.encrypt_with_params(params, passphrase).unwrap();
    encrypted
        .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
        .unwrap()
        .to_string()
}
