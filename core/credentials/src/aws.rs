//! AWS access key credentials.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::capability::CapabilityDescriptor;
use crate::credential::{MountView, Verification};
use crate::prompt::Prompter;
use crate::provider::{AwsAccessKeys, SigningKey};
use credvault_common::{Error, Result, SensitiveBytes};

/// Registered type name.
pub const TYPE_NAME: &str = "aws";

/// Virtual file the profile contributes to a mount.
pub const MOUNT_PATH: &str = "aws-credentials";

pub(crate) const DESCRIPTION: &str = "This profile handles your AWS Access Keys. For details about AWS Access Keys see:\n\
(see https://docs.aws.amazon.com/general/latest/gr/aws-sec-cred-types.html#access-keys-and-secret-access-keys)";

pub(crate) const CAPABILITIES: CapabilityDescriptor = CapabilityDescriptor {
    mount: true,
    env: true,
    rotate: true,
    import: true,
    verify: true,
};

/// One named AWS access key pair.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct AwsProfile {
    pub profile: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl std::fmt::Debug for AwsProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsProfile")
            .field("profile", &self.profile)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl AwsProfile {
    /// Ask for every field.
    pub fn prompt_fields(&mut self, prompter: &mut dyn Prompter) -> Result<()> {
        self.profile = prompter.field("Profile name")?;
        self.aws_access_key_id = prompter.field("AWS access key ID")?;
        self.aws_secret_access_key = prompter.secret("AWS secret access key")?.to_string();
        Ok(())
    }

    /// The profile as a section of an AWS shared credentials file.
    pub fn render_text(&self) -> String {
        format!(
            "[{}]\naws_access_key_id={}\naws_secret_access_key={}\n\n",
            self.profile, self.aws_access_key_id, self.aws_secret_access_key
        )
    }

    /// The credentials file section, so several profiles mounted together
    /// form one valid credentials file.
    pub fn mount_view(&self) -> MountView {
        MountView {
            path: MOUNT_PATH.to_string(),
            contents: SensitiveBytes::from(self.render_text()),
        }
    }

    /// Variables understood by the AWS SDKs and CLI.
    pub fn env_vars(&self) -> Vec<(String, Zeroizing<String>)> {
        vec![
            (
                "AWS_ACCESS_KEY_ID".to_string(),
                Zeroizing::new(self.aws_access_key_id.clone()),
            ),
            (
                "AWS_SECRET_ACCESS_KEY".to_string(),
                Zeroizing::new(self.aws_secret_access_key.clone()),
            ),
        ]
    }

    /// The key pair that authenticates upstream calls.
    pub fn signing_key(&self) -> SigningKey {
        SigningKey {
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
        }
    }

    /// Replace the access key with a freshly minted one.
    ///
    /// If the user already holds two keys, the one that is not ours is
    /// deleted first to make room. The previous key is deleted before the
    /// fields are updated, so on success it is no longer valid upstream.
    ///
    /// # Errors
    /// - `Rotate` if any upstream call fails; the fields are left unchanged
    pub async fn rotate(&mut self, aws: &dyn AwsAccessKeys) -> Result<()> {
        let current = self.signing_key();
        let rotate_err = |step: &str, e: Error| Error::Rotate(format!("{}: {}", step, e));

        let keys = aws
            .list_access_keys(&current)
            .await
            .map_err(|e| rotate_err("listing access keys", e))?;

        if keys.len() >= 2 {
            if let Some(spare) = keys
                .iter()
                .find(|k| k.access_key_id != current.access_key_id)
            {
                info!(
                    profile = %self.profile,
                    access_key_id = %spare.access_key_id,
                    "Deleting second access key to make room for rotation"
                );
                aws.delete_access_key(&current, &spare.access_key_id)
                    .await
                    .map_err(|e| rotate_err("deleting the second access key", e))?;
            }
        }

        let created = aws
            .create_access_key(&current)
            .await
            .map_err(|e| rotate_err("creating a new access key", e))?;

        if let Err(e) = aws
            .delete_access_key(&current, &current.access_key_id)
            .await
        {
            warn!(
                profile = %self.profile,
                access_key_id = %created.access_key_id,
                "New access key was created but the old one could not be deleted; the new key is discarded"
            );
            return Err(rotate_err("deleting the old access key", e));
        }

        self.aws_access_key_id = created.access_key_id.clone();
        self.aws_secret_access_key = created.secret_access_key.clone();
        info!(profile = %self.profile, access_key_id = %self.aws_access_key_id, "Access key rotated");
        Ok(())
    }

    /// Check that the key still authenticates.
    pub async fn verify(&self, aws: &dyn AwsAccessKeys) -> Verification {
        match aws.caller_identity(&self.signing_key()).await {
            Ok(identity) => Verification {
                ok: true,
                message: format!("Your user ARN is: {}", identity.arn),
            },
            Err(e) => Verification {
                ok: false,
                message: format!("Error getting caller identity: {}. Is the key disabled?", e),
            },
        }
    }

    /// Parse an AWS shared credentials file into one profile per section.
    ///
    /// `[profile name]` headers (config file style) are accepted as well.
    /// Keys other than the access key pair are ignored.
    ///
    /// # Errors
    /// - `InvalidInput` on a line outside any section, a line without `=`,
    ///   or a section missing either key
    pub fn import(data: &[u8]) -> Result<Vec<AwsProfile>> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidInput("Credentials file is not valid UTF-8".to_string()))?;

        let mut profiles = Vec::new();
        let mut current: Option<AwsProfile> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if let Some(done) = current.take() {
                    profiles.push(finish_section(done)?);
                }
                let name = header.trim();
                let name = name.strip_prefix("profile ").unwrap_or(name).trim();
                current = Some(AwsProfile {
                    profile: name.to_string(),
                    aws_access_key_id: String::new(),
                    aws_secret_access_key: String::new(),
                });
                continue;
            }

            let section = current.as_mut().ok_or_else(|| {
                Error::InvalidInput(format!("Line {} is outside of any profile section", index + 1))
            })?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::InvalidInput(format!("Line {} is not a 'key = value' pair", index + 1))
            })?;
            match key.trim() {
                "aws_access_key_id" => section.aws_access_key_id = value.trim().to_string(),
                "aws_secret_access_key" => section.aws_secret_access_key = value.trim().to_string(),
                _ => {}
            }
        }

        if let Some(done) = current.take() {
            profiles.push(finish_section(done)?);
        }
        Ok(profiles)
    }
}

fn finish_section(profile: AwsProfile) -> Result<AwsProfile> {
    let mut missing = String::new();
    if profile.aws_access_key_id.is_empty() {
        missing.push_str("aws_access_key_id");
    }
    if profile.aws_secret_access_key.is_empty() {
        if !missing.is_empty() {
            missing.push_str(" and ");
        }
        missing.push_str("aws_secret_access_key");
    }
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Profile '{}' lacks {}",
            profile.profile, missing
        )));
    }
    Ok(profile)
}
