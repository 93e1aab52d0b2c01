//! Credential type registry.
//!
//! The registry is an explicit value built once at startup and passed to the
//! vault; there is no process-global table.

use std::collections::BTreeMap;

use crate::aws::AwsProfile;
use crate::credential::Credential;
use crate::token::Token;
use credvault_common::{Error, Result};

/// Factory function type for creating empty credentials.
pub type CredentialFactory = Box<dyn Fn() -> Credential + Send + Sync>;

/// Registry of credential type constructors, keyed by type name.
pub struct CredentialRegistry {
    factories: BTreeMap<String, CredentialFactory>,
}

impl CredentialRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a credential type.
    ///
    /// # Preconditions
    /// - `type_name` must be unique within the registry
    /// - `factory` must build credentials whose `type_name()` is `type_name`
    ///
    /// # Postconditions
    /// - The type can be constructed by name
    ///
    /// # Errors
    /// - `AlreadyExists` if the name is already registered
    /// - `InvalidInput` if the factory builds a different type
    pub fn register(&mut self, type_name: impl Into<String>, factory: CredentialFactory) -> Result<()> {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(Error::AlreadyExists(format!(
                "Credential type '{}' is already registered",
                type_name
            )));
        }
        let built = factory().type_name();
        if built != type_name {
            return Err(Error::InvalidInput(format!(
                "Factory registered as '{}' builds '{}' credentials",
                type_name, built
            )));
        }
        self.factories.insert(type_name, factory);
        Ok(())
    }

    /// Build an empty credential of the named type.
    ///
    /// # Errors
    /// - `UnknownType` listing every registered type
    pub fn construct(&self, type_name: &str) -> Result<Credential> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| Error::UnknownType {
                type_name: type_name.to_string(),
                known: self.list_types(),
            })?;
        Ok(factory())
    }

    /// Registered type names, sorted.
    pub fn list_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a type is registered.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Description of a type followed by its capability listing.
    ///
    /// # Errors
    /// - `UnknownType` if the type is not registered
    pub fn describe(&self, type_name: &str) -> Result<String> {
        let credential = self.construct(type_name)?;
        Ok(format!(
            "{}\nCapabilities:\n{}",
            credential.describe(),
            credential.capabilities()
        ))
    }
}

impl Default for CredentialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with every built-in credential type.
///
/// # Panics
/// If two built-in types share a name. The binary is misconfigured and
/// there is nothing to recover.
pub fn builtin_registry() -> CredentialRegistry {
    let mut registry = CredentialRegistry::new();

    registry
        .register(
            crate::aws::TYPE_NAME,
            Box::new(|| Credential::Aws(AwsProfile::default())),
        )
        .expect("Failed to register aws credential type");

    registry
        .register(
            crate::token::TYPE_NAME,
            Box::new(|| Credential::Token(Token::default())),
        )
        .expect("Failed to register token credential type");

    registry
}
