//! The credential type contract.
//!
//! `Credential` is a closed set of variants; each operation dispatches with a
//! `match`. Operations a variant's [`CapabilityDescriptor`] denies return an
//! error here, and callers are expected to check the descriptor first and
//! skip the record instead.

use zeroize::Zeroizing;

use crate::aws::{self, AwsProfile};
use crate::capability::{Capability, CapabilityDescriptor};
use crate::prompt::Prompter;
use crate::provider::Upstream;
use crate::token::{self, Token};
use credvault_common::{Error, Result, SensitiveBytes};

/// Bytes a credential contributes to a mount, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountView {
    /// Flat file name inside the mount.
    pub path: String,
    pub contents: SensitiveBytes,
}

/// Outcome of a read-only upstream liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub ok: bool,
    pub message: String,
}

/// One decrypted credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Aws(AwsProfile),
    Token(Token),
}

impl Credential {
    /// The registered type name; constant per variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Credential::Aws(_) => aws::TYPE_NAME,
            Credential::Token(_) => token::TYPE_NAME,
        }
    }

    /// Static human-readable description of the type.
    pub fn describe(&self) -> &'static str {
        match self {
            Credential::Aws(_) => aws::DESCRIPTION,
            Credential::Token(_) => token::DESCRIPTION,
        }
    }

    /// Operations valid for this type.
    pub fn capabilities(&self) -> CapabilityDescriptor {
        match self {
            Credential::Aws(_) => aws::CAPABILITIES,
            Credential::Token(_) => token::CAPABILITIES,
        }
    }

    /// Fill the fields interactively.
    pub fn prompt_fields(&mut self, prompter: &mut dyn Prompter) -> Result<()> {
        match self {
            Credential::Aws(p) => p.prompt_fields(prompter),
            Credential::Token(t) => t.prompt_fields(prompter),
        }
    }

    /// Encode the fields for encryption.
    pub fn serialize(&self) -> Result<SensitiveBytes> {
        let encoded = match self {
            Credential::Aws(p) => serde_json::to_vec(p),
            Credential::Token(t) => serde_json::to_vec(t),
        };
        encoded
            .map(SensitiveBytes::new)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Replace the fields with the decoded `bytes`.
    ///
    /// The variant never changes; bytes of another type's schema are
    /// rejected.
    ///
    /// # Errors
    /// - `MalformedRecord` if `bytes` do not match this type's schema; the
    ///   fields are left unchanged
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        let type_name = self.type_name();
        let malformed =
            |e: serde_json::Error| Error::MalformedRecord(format!("{} record: {}", type_name, e));
        match self {
            Credential::Aws(p) => *p = serde_json::from_slice(bytes).map_err(malformed)?,
            Credential::Token(t) => *t = serde_json::from_slice(bytes).map_err(malformed)?,
        }
        Ok(())
    }

    /// The label the record is stored under.
    pub fn name(&self) -> &str {
        match self {
            Credential::Aws(p) => &p.profile,
            Credential::Token(t) => &t.name,
        }
    }

    /// Change the label.
    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            Credential::Aws(p) => p.profile = name.into(),
            Credential::Token(t) => t.name = name.into(),
        }
    }

    /// Human display form, secrets included.
    pub fn render_text(&self) -> Zeroizing<String> {
        Zeroizing::new(match self {
            Credential::Aws(p) => p.render_text(),
            Credential::Token(t) => t.render_text(),
        })
    }

    /// The file this credential contributes to a mount.
    ///
    /// # Errors
    /// - `InvalidInput` if the type does not support mounting
    pub fn mount_view(&self) -> Result<MountView> {
        self.require(Capability::Mount)?;
        match self {
            Credential::Aws(p) => Ok(p.mount_view()),
            Credential::Token(_) => Err(self.unsupported(Capability::Mount)),
        }
    }

    /// Environment variables this credential exports.
    ///
    /// # Errors
    /// - `InvalidInput` if the type does not support env export
    pub fn env_vars(&self) -> Result<Vec<(String, Zeroizing<String>)>> {
        self.require(Capability::Env)?;
        Ok(match self {
            Credential::Aws(p) => p.env_vars(),
            Credential::Token(t) => t.env_vars(),
        })
    }

    /// Mint a replacement secret upstream and return the new serialization.
    ///
    /// On success the previous secret is no longer valid upstream, so the
    /// caller must persist the returned bytes.
    ///
    /// # Errors
    /// - `InvalidInput` if the type does not support rotation
    /// - `Rotate` with the provider's message if the upstream call fails
    pub async fn rotate_credentials(&mut self, upstream: &Upstream) -> Result<SensitiveBytes> {
        self.require(Capability::Rotate)?;
        match self {
            Credential::Aws(p) => p.rotate(upstream.aws.as_ref()).await?,
            Credential::Token(_) => return Err(self.unsupported(Capability::Rotate)),
        }
        self.serialize()
    }

    /// Read-only liveness check against the system of record.
    ///
    /// # Errors
    /// - `InvalidInput` if the type does not support verification
    pub async fn verify_credentials(&self, upstream: &Upstream) -> Result<Verification> {
        self.require(Capability::Verify)?;
        match self {
            Credential::Aws(p) => Ok(p.verify(upstream.aws.as_ref()).await),
            Credential::Token(_) => Err(self.unsupported(Capability::Verify)),
        }
    }

    /// Parse an external credentials file into instances of this type.
    ///
    /// # Errors
    /// - `InvalidInput` if the type does not support import or the file is
    ///   malformed
    pub fn import(&self, data: &[u8]) -> Result<Vec<Credential>> {
        self.require(Capability::Import)?;
        match self {
            Credential::Aws(_) => Ok(AwsProfile::import(data)?
                .into_iter()
                .map(Credential::Aws)
                .collect()),
            Credential::Token(_) => Err(self.unsupported(Capability::Import)),
        }
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities().allows(capability) {
            Ok(())
        } else {
            Err(self.unsupported(capability))
        }
    }

    fn unsupported(&self, capability: Capability) -> Error {
        Error::InvalidInput(format!(
            "Credential type '{}' does not support {}",
            self.type_name(),
            capability
        ))
    }
}
