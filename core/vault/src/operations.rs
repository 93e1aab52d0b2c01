//! Vault operations over encrypted credential records.
//!
//! Every operation that reads record contents takes the passphrase of the
//! private key. Records whose type does not support an operation are
//! reported as [`Outcome::Skipped`] before anything is decrypted.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use credvault_common::{Error, RecordKey, Result};
use credvault_credentials::{
    Capability, Credential, CredentialRegistry, Prompter, Upstream, Verification,
};
use credvault_crypto::Envelope;
use credvault_mount::MountFiles;
use credvault_storage::RecordStore;

/// Exported variables of one record.
pub type EnvVars = Vec<(String, Zeroizing<String>)>;

/// Result of applying an operation to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    /// The record was left alone; the message says why.
    Skipped(String),
}

impl<T> Outcome<T> {
    /// Whether the operation was applied.
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

/// An [`Outcome`] tagged with the record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome<T> {
    pub key: RecordKey,
    pub outcome: Outcome<T>,
}

/// Files to expose plus what happened to each selected record.
#[derive(Debug)]
pub struct MountCollection {
    pub files: MountFiles,
    /// `Done` carries the virtual path the record was appended to.
    pub outcomes: Vec<RecordOutcome<String>>,
}

/// Hands a record's plaintext to the user for editing.
pub trait Editor {
    /// Return the edited bytes.
    fn edit(&mut self, key: &RecordKey, contents: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Vault operations handler.
pub struct VaultOperations {
    store: Arc<dyn RecordStore>,
    registry: Arc<CredentialRegistry>,
    envelope: Option<Envelope>,
}

impl VaultOperations {
    /// Create an operations handler without a key pair.
    ///
    /// Only name-level operations work until [`with_envelope`] is applied.
    ///
    /// [`with_envelope`]: Self::with_envelope
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<CredentialRegistry>) -> Self {
        Self {
            store,
            registry,
            envelope: None,
        }
    }

    /// Attach the key pair.
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// The key pair.
    ///
    /// # Errors
    /// - `InvalidInput` if the vault was opened without keys
    pub fn envelope(&self) -> Result<&Envelope> {
        self.envelope
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("Vault was opened without a key pair".to_string()))
    }

    /// The credential registry.
    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    /// The record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Every registered type with its description and capability listing.
    pub fn types(&self) -> Result<Vec<(String, String)>> {
        self.registry
            .list_types()
            .into_iter()
            .map(|type_name| {
                let description = self.registry.describe(&type_name)?;
                Ok((type_name, description))
            })
            .collect()
    }

    /// Records whose name matches any filter, sorted by name then type.
    pub async fn list(&self, filters: &[String]) -> Result<Vec<RecordKey>> {
        self.store.list(filters).await
    }

    /// Unlock the private key once so a wrong passphrase can be reprompted
    /// before any record is touched.
    ///
    /// # Errors
    /// - `Decrypt(BadPassphrase)` on a wrong passphrase
    pub fn check_passphrase(&self, passphrase: &[u8]) -> Result<()> {
        self.envelope()?.check_passphrase(passphrase)
    }

    /// Create a record from interactively entered fields.
    ///
    /// # Preconditions
    /// - `type_name` must be registered
    ///
    /// # Postconditions
    /// - The record is encrypted and stored under its name
    ///
    /// # Errors
    /// - `UnknownType` if the type is not registered
    /// - `AlreadyExists` if a record with the same name and type exists
    /// - `PayloadTooLarge` if the fields exceed the key's capacity
    pub async fn add(&self, type_name: &str, prompter: &mut dyn Prompter) -> Result<RecordKey> {
        let mut credential = self.registry.construct(type_name)?;
        credential.prompt_fields(prompter)?;

        let key = self.store_new(&credential).await?;
        info!(name = %key.name(), type_name = %key.type_name(), "Credential added");
        Ok(key)
    }

    /// Create records from an external credentials file.
    ///
    /// Entries whose record already exists are skipped, the others stored.
    ///
    /// # Errors
    /// - `UnknownType` if the type is not registered
    /// - `InvalidInput` if the type cannot import or the file is malformed
    pub async fn import(&self, type_name: &str, data: &[u8]) -> Result<Vec<RecordOutcome<()>>> {
        let template = self.registry.construct(type_name)?;
        if !template.capabilities().allows(Capability::Import) {
            return Err(Error::InvalidInput(format!(
                "Credential type '{}' does not support import",
                type_name
            )));
        }

        let mut outcomes = Vec::new();
        for credential in template.import(data)? {
            let key = RecordKey::new(credential.type_name(), credential.name())?;
            let outcome = match self.store_new(&credential).await {
                Ok(_) => Outcome::Done(()),
                Err(Error::AlreadyExists(_)) => {
                    Outcome::Skipped(format!("'{}' already exists", credential.name()))
                }
                Err(e) => return Err(e),
            };
            outcomes.push(RecordOutcome { key, outcome });
        }

        let imported = outcomes.iter().filter(|o| o.outcome.is_done()).count();
        info!(type_name = %type_name, imported, skipped = outcomes.len() - imported, "Credentials imported");
        Ok(outcomes)
    }

    /// Decrypt one record.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist
    /// - `UnknownType` if the record's type is not registered
    /// - `Decrypt` on a wrong passphrase or a damaged record
    /// - `MalformedRecord` if the plaintext does not match the type
    pub async fn open_record(&self, key: &RecordKey, passphrase: &[u8]) -> Result<Credential> {
        let mut credential = self.registry.construct(key.type_name())?;
        self.decrypt_into(&mut credential, key, passphrase).await?;
        Ok(credential)
    }

    /// Decrypt every matching record.
    pub async fn show(
        &self,
        filters: &[String],
        passphrase: &[u8],
    ) -> Result<Vec<(RecordKey, Credential)>> {
        let mut shown = Vec::new();
        for key in self.list(filters).await? {
            let credential = self.open_record(&key, passphrase).await?;
            shown.push((key, credential));
        }
        Ok(shown)
    }

    /// Let the user edit one record's serialized fields.
    ///
    /// # Postconditions
    /// - The edited bytes are re-validated against the record's type and
    ///   stored in canonical form
    /// - Unchanged input leaves the record untouched
    ///
    /// # Errors
    /// - `MalformedRecord` if the edited bytes do not match the type
    /// - `InvalidInput` if the edit changes the record's name
    pub async fn edit_record(
        &self,
        key: &RecordKey,
        passphrase: &[u8],
        editor: &mut dyn Editor,
    ) -> Result<Outcome<()>> {
        let original = self.open_record(key, passphrase).await?;
        let serialized = original.serialize()?;

        let edited = editor.edit(key, serialized.as_bytes())?;
        if edited.as_slice() == serialized.as_bytes() {
            return Ok(Outcome::Skipped(format!("'{}' was not changed", key.name())));
        }

        let mut updated = self.registry.construct(key.type_name())?;
        updated.deserialize(&edited)?;
        if updated.name() != key.name() {
            return Err(Error::InvalidInput(format!(
                "Editing cannot rename '{}' to '{}'; add a new credential instead",
                key.name(),
                updated.name()
            )));
        }

        self.seal(key, &updated).await?;
        info!(name = %key.name(), type_name = %key.type_name(), "Credential edited");
        Ok(Outcome::Done(()))
    }

    /// Edit every matching record in turn.
    pub async fn edit(
        &self,
        filters: &[String],
        passphrase: &[u8],
        editor: &mut dyn Editor,
    ) -> Result<Vec<RecordOutcome<()>>> {
        let mut outcomes = Vec::new();
        for key in self.list(filters).await? {
            let outcome = self.edit_record(&key, passphrase, editor).await?;
            outcomes.push(RecordOutcome { key, outcome });
        }
        Ok(outcomes)
    }

    /// Replace one record's secret upstream and store the new one.
    ///
    /// # Postconditions
    /// - On `Done` the previous secret is invalid upstream and the stored
    ///   record holds the new one
    ///
    /// # Errors
    /// - `Rotate` if the upstream rotation fails; the record is untouched
    /// - `RotationNotPersisted` if the upstream rotation succeeded but the
    ///   new secret could not be encrypted or written; the stored record is
    ///   stale
    pub async fn rotate_record(
        &self,
        key: &RecordKey,
        passphrase: &[u8],
        upstream: &Upstream,
    ) -> Result<Outcome<()>> {
        if let Some(skipped) = self.gate(key, Capability::Rotate)? {
            return Ok(skipped);
        }

        let mut credential = self.open_record(key, passphrase).await?;
        debug!(name = %key.name(), type_name = %key.type_name(), "Rotating credential upstream");
        let rotated = credential.rotate_credentials(upstream).await?;

        let persisted = match self.envelope()?.encrypt(rotated.as_bytes()) {
            Ok(ciphertext) => self.store.write(key, &ciphertext).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            error!(
                name = %key.name(),
                type_name = %key.type_name(),
                error = %e,
                "Credential rotated upstream but the new secret was not saved; stored copy is stale"
            );
            return Err(Error::RotationNotPersisted {
                name: key.name().to_string(),
                type_name: key.type_name().to_string(),
                reason: e.to_string(),
            });
        }

        info!(name = %key.name(), type_name = %key.type_name(), "Credential rotated");
        Ok(Outcome::Done(()))
    }

    /// Rotate every matching record, stopping at the first failure.
    pub async fn rotate(
        &self,
        filters: &[String],
        passphrase: &[u8],
        upstream: &Upstream,
    ) -> Result<Vec<RecordOutcome<()>>> {
        let mut outcomes = Vec::new();
        for key in self.list(filters).await? {
            let outcome = self.rotate_record(&key, passphrase, upstream).await?;
            outcomes.push(RecordOutcome { key, outcome });
        }
        Ok(outcomes)
    }

    /// Check one record against its system of record. Never writes.
    pub async fn verify_record(
        &self,
        key: &RecordKey,
        passphrase: &[u8],
        upstream: &Upstream,
    ) -> Result<Outcome<Verification>> {
        if let Some(skipped) = self.gate(key, Capability::Verify)? {
            return Ok(skipped);
        }

        let credential = self.open_record(key, passphrase).await?;
        let verification = credential.verify_credentials(upstream).await?;
        debug!(name = %key.name(), type_name = %key.type_name(), ok = verification.ok, "Credential verified");
        Ok(Outcome::Done(verification))
    }

    /// Verify every matching record.
    pub async fn verify(
        &self,
        filters: &[String],
        passphrase: &[u8],
        upstream: &Upstream,
    ) -> Result<Vec<RecordOutcome<Verification>>> {
        let mut outcomes = Vec::new();
        for key in self.list(filters).await? {
            let outcome = self.verify_record(&key, passphrase, upstream).await?;
            outcomes.push(RecordOutcome { key, outcome });
        }
        Ok(outcomes)
    }

    /// Environment variables exported by every matching record.
    pub async fn env(
        &self,
        filters: &[String],
        passphrase: &[u8],
    ) -> Result<Vec<RecordOutcome<EnvVars>>> {
        let mut outcomes = Vec::new();
        for key in self.list(filters).await? {
            let outcome = match self.gate(&key, Capability::Env)? {
                Some(skipped) => skipped,
                None => Outcome::Done(self.open_record(&key, passphrase).await?.env_vars()?),
            };
            outcomes.push(RecordOutcome { key, outcome });
        }
        Ok(outcomes)
    }

    /// Decrypt every matching mountable record into the files of one
    /// exposure.
    ///
    /// Records sharing a virtual path are concatenated in record-name order.
    pub async fn collect_mount_files(
        &self,
        filters: &[String],
        passphrase: &[u8],
    ) -> Result<MountCollection> {
        let mut files = MountFiles::new();
        let mut outcomes = Vec::new();

        for key in self.list(filters).await? {
            if let Some(skipped) = self.gate(&key, Capability::Mount)? {
                outcomes.push(RecordOutcome { key, outcome: skipped });
                continue;
            }
            let view = self.open_record(&key, passphrase).await?.mount_view()?;
            files.append(&view.path, view.contents.as_bytes())?;
            outcomes.push(RecordOutcome {
                key,
                outcome: Outcome::Done(view.path.clone()),
            });
        }

        debug!(files = files.len(), "Mount files collected");
        Ok(MountCollection { files, outcomes })
    }

    /// Remove every matching record.
    ///
    /// # Errors
    /// - `InvalidInput` if `filters` is empty; deleting everything needs an
    ///   explicit `.`
    pub async fn delete(&self, filters: &[String]) -> Result<Vec<RecordKey>> {
        if filters.is_empty() {
            return Err(Error::InvalidInput(
                "Refusing to delete without a filter".to_string(),
            ));
        }

        let keys = self.list(filters).await?;
        for key in &keys {
            self.store.delete(key).await?;
            warn!(name = %key.name(), type_name = %key.type_name(), "Credential deleted");
        }
        Ok(keys)
    }

    /// Skip outcome if the record's type lacks `capability`.
    fn gate<T>(&self, key: &RecordKey, capability: Capability) -> Result<Option<Outcome<T>>> {
        let credential = self.registry.construct(key.type_name())?;
        if credential.capabilities().allows(capability) {
            return Ok(None);
        }

        debug!(name = %key.name(), type_name = %key.type_name(), capability = %capability, "Skipping record");
        Ok(Some(Outcome::Skipped(format!(
            "'{}' cannot be {} because type '{}' does not support {}",
            key.name(),
            capability.past_participle(),
            key.type_name(),
            capability
        ))))
    }

    async fn decrypt_into(
        &self,
        credential: &mut Credential,
        key: &RecordKey,
        passphrase: &[u8],
    ) -> Result<()> {
        let ciphertext = self.store.read(key).await?;
        let plaintext = self.envelope()?.decrypt(passphrase, &ciphertext)?;
        credential.deserialize(plaintext.as_bytes())
    }

    async fn store_new(&self, credential: &Credential) -> Result<RecordKey> {
        let key = RecordKey::new(credential.type_name(), credential.name())?;
        if self.store.exists(&key).await? {
            return Err(Error::AlreadyExists(format!("Credential {} already exists", key)));
        }
        self.seal(&key, credential).await?;
        Ok(key)
    }

    async fn seal(&self, key: &RecordKey, credential: &Credential) -> Result<()> {
        let plaintext = credential.serialize()?;
        let ciphertext = self.envelope()?.encrypt(plaintext.as_bytes())?;
        self.store.write(key, &ciphertext).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{private_key_pem, public_key_text, PASSPHRASE};
    use super::*;
    use async_trait::async_trait;
    use credvault_common::DecryptFailure;
    use credvault_credentials::{
        builtin_registry, AccessKeyMetadata, AwsAccessKeys, AwsProfile, CallerIdentity,
        NewAccessKey, SigningKey, Token,
    };
    use credvault_storage::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Answers(VecDeque<String>);

    impl Answers {
        fn new(answers: &[&str]) -> Self {
            Self(answers.iter().map(|a| a.to_string()).collect())
        }

        fn next(&mut self) -> Result<String> {
            self.0
                .pop_front()
                .ok_or_else(|| Error::Prompt("out of answers".to_string()))
        }
    }

    impl Prompter for Answers {
        fn field(&mut self, _label: &str) -> Result<String> {
            self.next()
        }

        fn secret(&mut self, _label: &str) -> Result<Zeroizing<String>> {
            self.next().map(Zeroizing::new)
        }

        fn passphrase(&mut self, _key_path: &str) -> Result<Zeroizing<Vec<u8>>> {
            self.next().map(|p| Zeroizing::new(p.into_bytes()))
        }
    }

    /// Replaces the plaintext with a fixed text.
    struct Rewrite(Option<String>);

    impl Editor for Rewrite {
        fn edit(&mut self, _key: &RecordKey, contents: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
            Ok(Zeroizing::new(match &self.0 {
                Some(text) => text.as_bytes().to_vec(),
                None => contents.to_vec(),
            }))
        }
    }

    /// One IAM user whose keys rotate in sequence.
    #[derive(Default)]
    struct StubIam {
        keys: Mutex<Vec<(String, String)>>,
        created: Mutex<u32>,
    }

    impl StubIam {
        fn with_key(id: &str, secret: &str) -> Self {
            let iam = Self::default();
            iam.keys
                .lock()
                .unwrap()
                .push((id.to_string(), secret.to_string()));
            iam
        }

        fn check(&self, key: &SigningKey) -> Result<()> {
            let known = self
                .keys
                .lock()
                .unwrap()
                .iter()
                .any(|(id, secret)| *id == key.access_key_id && *secret == key.secret_access_key);
            if known {
                Ok(())
            } else {
                Err(Error::Network("InvalidClientTokenId".to_string()))
            }
        }
    }

    #[async_trait]
    impl AwsAccessKeys for StubIam {
        async fn caller_identity(&self, key: &SigningKey) -> Result<CallerIdentity> {
            self.check(key)?;
            Ok(CallerIdentity {
                arn: "arn:aws:iam::111122223333:user/ci".to_string(),
                account: "111122223333".to_string(),
                user_id: "AIDATEST".to_string(),
            })
        }

        async fn list_access_keys(&self, key: &SigningKey) -> Result<Vec<AccessKeyMetadata>> {
            self.check(key)?;
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
            self.check(key)?;
            let mut created = self.created.lock().unwrap();
            *created += 1;
            let new_key = NewAccessKey {
                access_key_id: format!("AKIAROTATED{}", created),
                secret_access_key: format!("rotated-{}", created),
            };
            self.keys.lock().unwrap().push((
                new_key.access_key_id.clone(),
                new_key.secret_access_key.clone(),
            ));
            Ok(new_key)
        }

        async fn delete_access_key(&self, key: &SigningKey, access_key_id: &str) -> Result<()> {
            self.check(key)?;
            self.keys.lock().unwrap().retain(|(id, _)| id != access_key_id);
            Ok(())
        }
    }

    /// Reads from a memory store, fails every write.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl RecordStore for ReadOnlyStore {
        fn name(&self) -> &str {
            "read-only"
        }

        async fn list(&self, filters: &[String]) -> Result<Vec<RecordKey>> {
            self.0.list(filters).await
        }

        async fn read(&self, key: &RecordKey) -> Result<Vec<u8>> {
            self.0.read(key).await
        }

        async fn write(&self, _key: &RecordKey, _data: &[u8]) -> Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }

        async fn delete(&self, key: &RecordKey) -> Result<()> {
            self.0.delete(key).await
        }

        async fn exists(&self, key: &RecordKey) -> Result<bool> {
            self.0.exists(key).await
        }
    }

    fn envelope() -> Envelope {
        Envelope::from_bytes(public_key_text().as_bytes(), private_key_pem().as_bytes()).unwrap()
    }

    fn vault_on(store: Arc<dyn RecordStore>) -> VaultOperations {
        VaultOperations::new(store, Arc::new(builtin_registry())).with_envelope(envelope())
    }

    fn vault() -> VaultOperations {
        vault_on(Arc::new(MemoryStore::new()))
    }

    fn aws(name: &str, id: &str, secret: &str) -> Credential {
        Credential::Aws(AwsProfile {
            profile: name.to_string(),
            aws_access_key_id: id.to_string(),
            aws_secret_access_key: secret.to_string(),
        })
    }

    fn token(name: &str, secret: &str) -> Credential {
        Credential::Token(Token {
            name: name.to_string(),
            secret: secret.to_string(),
            description: None,
            env_var: None,
        })
    }

    fn filters(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    async fn seeded() -> VaultOperations {
        let vault = vault();
        vault.store_new(&aws("prod", "AKIAPROD", "prod-secret")).await.unwrap();
        vault.store_new(&aws("staging", "AKIASTAGE", "stage-secret")).await.unwrap();
        vault.store_new(&token("prod", "ghp_123")).await.unwrap();
        vault
    }

    #[tokio::test]
    async fn test_add_then_show() {
        let vault = vault();
        let mut answers = Answers::new(&["prod", "AKIAPROD", "prod-secret"]);

        let key = vault.add("aws", &mut answers).await.unwrap();
        assert_eq!(key.to_string(), "prod (type aws)");

        let shown = vault.show(&[], PASSPHRASE).await.unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].1, aws("prod", "AKIAPROD", "prod-secret"));
    }

    #[tokio::test]
    async fn test_add_unknown_type_lists_known() {
        let err = vault().add("gcp", &mut Answers::new(&[])).await.unwrap_err();
        match err {
            Error::UnknownType { type_name, known } => {
                assert_eq!(type_name, "gcp");
                assert_eq!(known, vec!["aws".to_string(), "token".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_add_refuses_existing_record() {
        let vault = seeded().await;
        let err = vault
            .add("aws", &mut Answers::new(&["prod", "AKIAOTHER", "other"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let shown = vault.show(&filters(&["^prod$"]), PASSPHRASE).await.unwrap();
        assert!(shown.contains(&(
            RecordKey::new("aws", "prod").unwrap(),
            aws("prod", "AKIAPROD", "prod-secret")
        )));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_filtered() {
        let vault = seeded().await;

        let all: Vec<String> = vault.list(&[]).await.unwrap().iter().map(|k| k.to_string()).collect();
        assert_eq!(all, ["prod (type aws)", "prod (type token)", "staging (type aws)"]);

        let staged = vault.list(&filters(&["^stag"])).await.unwrap();
        assert_eq!(staged, vec![RecordKey::new("aws", "staging").unwrap()]);
    }

    #[tokio::test]
    async fn test_wrong_passphrase() {
        let vault = seeded().await;

        assert!(vault.check_passphrase(PASSPHRASE).is_ok());
        let err = vault.show(&[], b"guess").await.unwrap_err();
        assert!(matches!(err, Error::Decrypt(DecryptFailure::BadPassphrase)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_import_skips_existing() {
        let vault = seeded().await;
        let file = b"[prod]\naws_access_key_id=AKIAX\naws_secret_access_key=x\n\n\
                     [dev]\naws_access_key_id=AKIADEV\naws_secret_access_key=dev-secret\n";

        let outcomes = vault.import("aws", file).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].outcome, Outcome::Skipped(_)));
        assert_eq!(outcomes[1].outcome, Outcome::Done(()));
        let dev = vault
            .open_record(&RecordKey::new("aws", "dev").unwrap(), PASSPHRASE)
            .await
            .unwrap();
        assert_eq!(dev, aws("dev", "AKIADEV", "dev-secret"));
    }

    #[tokio::test]
    async fn test_import_unsupported_type() {
        let err = vault().import("token", b"").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_edit_stores_validated_change() {
        let vault = seeded().await;
        let key = RecordKey::new("aws", "staging").unwrap();
        let mut editor = Rewrite(Some(
            r#"{"profile":"staging","aws_access_key_id":"AKIANEW","aws_secret_access_key":"new"}"#
                .to_string(),
        ));

        let outcome = vault.edit_record(&key, PASSPHRASE, &mut editor).await.unwrap();

        assert_eq!(outcome, Outcome::Done(()));
        assert_eq!(
            vault.open_record(&key, PASSPHRASE).await.unwrap(),
            aws("staging", "AKIANEW", "new")
        );
    }

    #[tokio::test]
    async fn test_edit_unchanged_is_skipped() {
        let vault = seeded().await;
        let outcomes = vault
            .edit(&filters(&["staging"]), PASSPHRASE, &mut Rewrite(None))
            .await
            .unwrap();
        assert!(matches!(outcomes[0].outcome, Outcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_edit_rejects_invalid_and_renames() {
        let vault = seeded().await;
        let key = RecordKey::new("aws", "staging").unwrap();

        let err = vault
            .edit_record(&key, PASSPHRASE, &mut Rewrite(Some("{not json".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));

        let renamed = r#"{"profile":"other","aws_access_key_id":"A","aws_secret_access_key":"B"}"#;
        let err = vault
            .edit_record(&key, PASSPHRASE, &mut Rewrite(Some(renamed.to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(
            vault.open_record(&key, PASSPHRASE).await.unwrap(),
            aws("staging", "AKIASTAGE", "stage-secret")
        );
    }

    #[tokio::test]
    async fn test_rotate_stores_new_secret_and_skips_tokens() {
        let vault = seeded().await;
        let upstream = Upstream::new(Arc::new(StubIam::with_key("AKIAPROD", "prod-secret")));

        let outcomes = vault
            .rotate(&filters(&["^prod$"]), PASSPHRASE, &upstream)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].outcome, Outcome::Done(()));
        match &outcomes[1].outcome {
            Outcome::Skipped(reason) => assert!(reason.contains("cannot be rotated")),
            other => panic!("token was not skipped: {other:?}"),
        }
        assert_eq!(
            vault
                .open_record(&RecordKey::new("aws", "prod").unwrap(), PASSPHRASE)
                .await
                .unwrap(),
            aws("prod", "AKIAROTATED1", "rotated-1")
        );
    }

    #[tokio::test]
    async fn test_rotate_upstream_failure_leaves_record() {
        let vault = seeded().await;
        let upstream = Upstream::new(Arc::new(StubIam::default()));
        let key = RecordKey::new("aws", "prod").unwrap();

        let err = vault.rotate_record(&key, PASSPHRASE, &upstream).await.unwrap_err();

        assert!(matches!(err, Error::Rotate(_)));
        assert_eq!(
            vault.open_record(&key, PASSPHRASE).await.unwrap(),
            aws("prod", "AKIAPROD", "prod-secret")
        );
    }

    #[tokio::test]
    async fn test_rotate_write_failure_is_reported_as_stale() {
        let memory = MemoryStore::new();
        vault_on(Arc::new(memory.clone()))
            .store_new(&aws("prod", "AKIAPROD", "prod-secret"))
            .await
            .unwrap();
        let vault = vault_on(Arc::new(ReadOnlyStore(memory)));
        let iam = Arc::new(StubIam::with_key("AKIAPROD", "prod-secret"));
        let upstream = Upstream::new(iam.clone());

        let err = vault
            .rotate_record(&RecordKey::new("aws", "prod").unwrap(), PASSPHRASE, &upstream)
            .await
            .unwrap_err();

        match err {
            Error::RotationNotPersisted { name, type_name, reason } => {
                assert_eq!(name, "prod");
                assert_eq!(type_name, "aws");
                assert!(reason.contains("disk full"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let live: Vec<String> = iam.keys.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(live, ["AKIAROTATED1"]);
    }

    #[tokio::test]
    async fn test_verify_reports_each_record() {
        let vault = seeded().await;
        let upstream = Upstream::new(Arc::new(StubIam::with_key("AKIAPROD", "prod-secret")));

        let outcomes = vault.verify(&[], PASSPHRASE, &upstream).await.unwrap();

        let Outcome::Done(prod) = &outcomes[0].outcome else {
            panic!("prod was not verified");
        };
        assert!(prod.ok);
        assert!(prod.message.contains("arn:aws:iam::111122223333:user/ci"));
        assert!(matches!(outcomes[1].outcome, Outcome::Skipped(_)));
        let Outcome::Done(staging) = &outcomes[2].outcome else {
            panic!("staging was not verified");
        };
        assert!(!staging.ok);
    }

    #[tokio::test]
    async fn test_env_exports_both_types() {
        let vault = seeded().await;

        let outcomes = vault.env(&filters(&["^prod$"]), PASSPHRASE).await.unwrap();

        let names: Vec<Vec<String>> = outcomes
            .iter()
            .map(|o| match &o.outcome {
                Outcome::Done(vars) => vars.iter().map(|(n, _)| n.clone()).collect(),
                Outcome::Skipped(_) => Vec::new(),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["AWS_ACCESS_KEY_ID".to_string(), "AWS_SECRET_ACCESS_KEY".to_string()],
                vec!["PROD".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_mount_files_concatenate_in_name_order() {
        let vault = seeded().await;

        let collection = vault.collect_mount_files(&[], PASSPHRASE).await.unwrap();

        assert_eq!(collection.files.len(), 1);
        let contents = collection.files.get("aws-credentials").unwrap();
        let text = std::str::from_utf8(contents.as_bytes()).unwrap();
        assert_eq!(
            text,
            "[prod]\naws_access_key_id=AKIAPROD\naws_secret_access_key=prod-secret\n\n\
             [staging]\naws_access_key_id=AKIASTAGE\naws_secret_access_key=stage-secret\n\n"
        );
        let skipped: Vec<&RecordKey> = collection
            .outcomes
            .iter()
            .filter(|o| !o.outcome.is_done())
            .map(|o| &o.key)
            .collect();
        assert_eq!(skipped, vec![&RecordKey::new("token", "prod").unwrap()]);
    }

    #[tokio::test]
    async fn test_delete_requires_filter() {
        let vault = seeded().await;

        assert!(matches!(vault.delete(&[]).await.unwrap_err(), Error::InvalidInput(_)));

        let deleted = vault.delete(&filters(&["^staging$"])).await.unwrap();
        assert_eq!(deleted, vec![RecordKey::new("aws", "staging").unwrap()]);
        assert_eq!(vault.list(&[]).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_types_lists_capabilities() {
        let types = vault().types().unwrap();
        let names: Vec<&str> = types.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["aws", "token"]);
        assert!(types[1].1.contains("Capabilities:"));
    }

    #[tokio::test]
    async fn test_without_keys_cannot_decrypt() {
        let store = Arc::new(MemoryStore::new());
        vault_on(store.clone())
            .store_new(&token("ci", "x"))
            .await
            .unwrap();
        let vault = VaultOperations::new(store, Arc::new(builtin_registry()));

        assert_eq!(vault.list(&[]).await.unwrap().len(), 1);
        assert!(vault.show(&[], PASSPHRASE).await.is_err());
    }
}
