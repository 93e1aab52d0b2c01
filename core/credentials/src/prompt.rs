//! Interactive input collaborator.

use zeroize::Zeroizing;

use credvault_common::Result;

/// Source of interactively entered values.
///
/// The terminal implementation lives in the binary; tests script the
/// answers.
pub trait Prompter {
    /// Ask for a plain field value. Surrounding whitespace is trimmed.
    fn field(&mut self, label: &str) -> Result<String>;

    /// Ask for a secret field value without echoing it.
    fn secret(&mut self, label: &str) -> Result<Zeroizing<String>>;

    /// Ask for the passphrase of the private key at `key_path`.
    fn passphrase(&mut self, key_path: &str) -> Result<Zeroizing<Vec<u8>>>;
}
