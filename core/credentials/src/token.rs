//! Opaque secret tokens.
//!
//! A token is a named secret with no upstream system of record, so it can
//! only be exported to the environment or shown.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::capability::CapabilityDescriptor;
use crate::prompt::Prompter;
use credvault_common::{Error, Result};

/// Registered type name.
pub const TYPE_NAME: &str = "token";

pub(crate) const DESCRIPTION: &str = "This profile stores an opaque secret such as an API token or a password.\n\
It can be shown or exported as an environment variable.";

pub(crate) const CAPABILITIES: CapabilityDescriptor = CapabilityDescriptor {
    mount: false,
    env: true,
    rotate: false,
    import: false,
    verify: false,
};

/// A named secret string.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct Token {
    pub name: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Variable name used by `env`; derived from `name` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("name", &self.name)
            .field("secret", &"[REDACTED]")
            .field("description", &self.description)
            .field("env_var", &self.env_var)
            .finish()
    }
}

impl Token {
    /// Ask for every field; empty optional answers stay unset.
    ///
    /// # Errors
    /// - `InvalidInput` if the variable name is not a valid identifier
    pub fn prompt_fields(&mut self, prompter: &mut dyn Prompter) -> Result<()> {
        self.name = prompter.field("Token name")?;
        self.description = non_empty(prompter.field("Description (optional)")?);
        let env_var = non_empty(prompter.field("Environment variable (optional)")?);
        if let Some(var) = &env_var {
            validate_env_var(var)?;
        }
        self.env_var = env_var;
        self.secret = prompter.secret("Secret")?.to_string();
        Ok(())
    }

    /// Human display form.
    pub fn render_text(&self) -> String {
        let mut out = format!("name: {}\n", self.name);
        if let Some(description) = &self.description {
            out.push_str(&format!("description: {}\n", description));
        }
        out.push_str(&format!("env: {}\n", self.env_var_name()));
        out.push_str(&format!("secret: {}\n", self.secret));
        out
    }

    /// The variable name `env` exports, e.g. `ci-deploy` becomes `CI_DEPLOY`.
    pub fn env_var_name(&self) -> String {
        if let Some(var) = &self.env_var {
            return var.clone();
        }
        let mut derived: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        if derived.chars().next().map_or(true, |c| c.is_ascii_digit()) {
            derived.insert(0, '_');
        }
        derived
    }

    /// The single exported variable.
    pub fn env_vars(&self) -> Vec<(String, Zeroizing<String>)> {
        vec![(self.env_var_name(), Zeroizing::new(self.secret.clone()))]
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn validate_env_var(var: &str) -> Result<()> {
    let mut chars = var.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "'{}' is not a valid environment variable name",
            var
        )))
    }
}
