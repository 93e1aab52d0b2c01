//! Credential types for credvault.
//!
//! Every built-in credential kind is a variant of [`Credential`]. Adding a
//! kind means adding a variant, its match arms and one line in
//! [`builtin_registry`]; the vault itself never changes.

pub mod aws;
pub mod capability;
pub mod credential;
pub mod iam;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod token;

pub use aws::AwsProfile;
pub use capability::{Capability, CapabilityDescriptor};
pub use credential::{Credential, MountView, Verification};
pub use iam::IamClient;
pub use prompt::Prompter;
pub use provider::{
    AccessKeyMetadata, AwsAccessKeys, CallerIdentity, NewAccessKey, SigningKey, Upstream,
};
pub use registry::{builtin_registry, CredentialFactory, CredentialRegistry};
pub use token::Token;
