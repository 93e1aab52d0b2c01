//! Upstream systems of record for rotate and verify.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

use credvault_common::Result;

/// Access key id and secret used to sign a request.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Identity the signing key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub arn: String,
    pub account: String,
    pub user_id: String,
}

/// One access key of the calling user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyMetadata {
    pub access_key_id: String,
    pub status: String,
}

/// A freshly created access key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NewAccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for NewAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccessKey")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Access key management for the user owning the signing key.
///
/// Every call authenticates as `key`, so the operations act on that key's
/// own IAM user.
#[async_trait]
pub trait AwsAccessKeys: Send + Sync {
    /// Resolve the identity behind `key`.
    async fn caller_identity(&self, key: &SigningKey) -> Result<CallerIdentity>;

    /// List the user's access keys.
    async fn list_access_keys(&self, key: &SigningKey) -> Result<Vec<AccessKeyMetadata>>;

    /// Create a new access key for the user.
    async fn create_access_key(&self, key: &SigningKey) -> Result<NewAccessKey>;

    /// Delete one of the user's access keys.
    async fn delete_access_key(&self, key: &SigningKey, access_key_id: &str) -> Result<()>;
}

/// Upstream clients handed to rotate and verify.
#[derive(Clone)]
pub struct Upstream {
    pub aws: Arc<dyn AwsAccessKeys>,
}

impl Upstream {
    /// Bundle the given clients.
    pub fn new(aws: Arc<dyn AwsAccessKeys>) -> Self {
        Self { aws }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use credvault_common::Error;
    use std::sync::Mutex;

    /// Simulated IAM user with a bounded set of keys.
    #[derive(Default)]
    pub struct FakeIam {
        pub keys: Mutex<Vec<(String, String)>>,
        pub calls: Mutex<Vec<String>>,
        pub fail_create: bool,
        pub counter: Mutex<u32>,
    }

    impl FakeIam {
        pub fn with_keys(keys: &[(&str, &str)]) -> Self {
            Self {
                keys: Mutex::new(
                    keys.iter()
                        .map(|(id, secret)| (id.to_string(), secret.to_string()))
                        .collect(),
                ),
                ..Default::default()
            }
        }

        fn authenticate(&self, key: &SigningKey) -> Result<()> {
            let keys = self.keys.lock().unwrap();
            if keys
                .iter()
                .any(|(id, secret)| *id == key.access_key_id && *secret == key.secret_access_key)
            {
                Ok(())
            } else {
                Err(Error::Network(
                    "InvalidClientTokenId: The security token included in the request is invalid"
                        .to_string(),
                ))
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl AwsAccessKeys for FakeIam {
        async fn caller_identity(&self, key: &SigningKey) -> Result<CallerIdentity> {
            self.authenticate(key)?;
            self.record("GetCallerIdentity".to_string());
            Ok(CallerIdentity {
                arn: "arn:aws:iam::123456789012:user/alice".to_string(),
                account: "123456789012".to_string(),
                user_id: "AIDAEXAMPLE".to_string(),
            })
        }

        async fn list_access_keys(&self, key: &SigningKey) -> Result<Vec<AccessKeyMetadata>> {
            self.authenticate(key)?;
            self.record("ListAccessKeys".to_string());
            Ok(self
                .keys
                .lock()
                .unwrap()
                .iter()
                .map(|(id, _)| AccessKeyMetadata {
                    access_key_id: id.clone(),
                    status: "Active".to_string(),
                })
                .collect())
        }

        async fn create_access_key(&self, key: &SigningKey) -> Result<NewAccessKey> {
            self.authenticate(key)?;
            self.record("CreateAccessKey".to_string());
            if self.fail_create {
                return Err(Error::Network("LimitExceeded".to_string()));
            }
            let mut keys = self.keys.lock().unwrap();
            if keys.len() >= 2 {
                return Err(Error::Network(
                    "LimitExceeded: Cannot exceed quota for AccessKeysPerUser: 2".to_string(),
                ));
            }
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            let created = NewAccessKey {
                access_key_id: format!("AKIANEW{}", counter),
                secret_access_key: format!("new-secret-{}", counter),
            };
            keys.push((
                created.access_key_id.clone(),
                created.secret_access_key.clone(),
            ));
            Ok(created)
        }

        async fn delete_access_key(&self, key: &SigningKey, access_key_id: &str) -> Result<()> {
            self.authenticate(key)?;
            self.record(format!("DeleteAccessKey {}", access_key_id));
            let mut keys = self.keys.lock().unwrap();
            let before = keys.len();
            keys.retain(|(id, _)| id != access_key_id);
            if keys.len() == before {
                return Err(Error::Network(format!("NoSuchEntity: {}", access_key_id)));
            }
            Ok(())
        }
    }
}
