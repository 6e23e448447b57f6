use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    crypto::CredentialCipher,
    domain::GuildId,
    errors::Error,
    model::{GuildKey, StoredKey},
    store::GuildKeyStore,
    translation::{
        GuildTranslator, ProviderFactory, ProviderKind, RetryPolicy, TranslationProvider,
    },
    Result,
};

/// Per-guild translators built from encrypted credentials.
///
/// Read-through: a miss decrypts the stored keys, builds the providers and
/// validates them. Keys the provider rejects are pruned from the store.
pub struct TranslatorCache {
    store: Arc<dyn GuildKeyStore>,
    cipher: Option<Arc<CredentialCipher>>,
    factory: Arc<dyn ProviderFactory>,
    retry: RetryPolicy,
    cache: RwLock<HashMap<GuildId, Arc<GuildTranslator>>>,
}

impl TranslatorCache {
    pub fn new(
        store: Arc<dyn GuildKeyStore>,
        cipher: Option<Arc<CredentialCipher>>,
        factory: Arc<dyn ProviderFactory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            cipher,
            factory,
            retry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cipher(&self) -> Result<&CredentialCipher> {
        self.cipher.as_deref().ok_or_else(|| {
            Error::Config("CIPHER_SECRET_KEY is not set; credentials are disabled".to_string())
        })
    }

    /// Validates, encrypts and stores `keys`, replacing any previous record.
    /// Nothing is stored when a key is rejected.
    pub async fn set(
        &self,
        guild_id: GuildId,
        keys: &[(ProviderKind, String)],
        preferred: Option<ProviderKind>,
    ) -> Result<Arc<GuildTranslator>> {
        let cipher = self.cipher()?;

        let providers = keys
            .iter()
            .map(|(kind, key)| self.factory.build(*kind, key))
            .collect::<Result<Vec<_>>>()?;

        let rejected = validate_all(&providers).await;
        if !rejected.is_empty() {
            return Err(Error::Authorization(rejected));
        }

        let stored = keys
            .iter()
            .map(|(kind, key)| {
                Ok(StoredKey {
                    kind: *kind,
                    ciphertext: cipher.encrypt(key)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.store
            .upsert_guild_key(&GuildKey {
                id: guild_id,
                preferred,
                keys: stored,
                created_at: Utc::now(),
            })
            .await?;

        let translator = Arc::new(GuildTranslator::new(providers, preferred, self.retry));
        self.cache.write().await.insert(guild_id, translator.clone());
        info!(guild_id = %guild_id, "translation credentials stored");
        Ok(translator)
    }

    /// The guild's translator, or `None` when it never signed in.
    ///
    /// Fails with [`Error::Authorization`] when every stored key is rejected;
    /// the record is deleted in that case.
    pub async fn get(&self, guild_id: GuildId) -> Result<Option<Arc<GuildTranslator>>> {
        if let Some(hit) = self.cache.read().await.get(&guild_id) {
            return Ok(Some(hit.clone()));
        }

        let Some(mut record) = self.store.get_guild_key(guild_id).await? else {
            return Ok(None);
        };
        let cipher = self.cipher()?;

        let mut providers = Vec::with_capacity(record.keys.len());
        for key in &record.keys {
            let plaintext = cipher.decrypt(&key.ciphertext)?;
            providers.push(self.factory.build(key.kind, &plaintext)?);
        }

        let rejected = validate_all(&providers).await;
        if !rejected.is_empty() {
            warn!(guild_id = %guild_id, ?rejected, "pruning rejected translation keys");
            providers.retain(|p| !rejected.contains(&p.kind()));
            record.keys.retain(|k| !rejected.contains(&k.kind));

            if record.keys.is_empty() {
                self.store.delete_guild_key(guild_id).await?;
                return Err(Error::Authorization(rejected));
            }
            if record.preferred.is_some_and(|p| rejected.contains(&p)) {
                record.preferred = None;
            }
            self.store.upsert_guild_key(&record).await?;
        }

        let translator = Arc::new(GuildTranslator::new(
            providers,
            record.preferred,
            self.retry,
        ));
        self.cache.write().await.insert(guild_id, translator.clone());
        Ok(Some(translator))
    }

    /// Whether the guild has stored credentials, without validating them.
    pub async fn is_signed_in(&self, guild_id: GuildId) -> Result<bool> {
        if self.cache.read().await.contains_key(&guild_id) {
            return Ok(true);
        }
        Ok(self.store.get_guild_key(guild_id).await?.is_some())
    }

    /// Drops the cached translator so the next `get` revalidates.
    pub async fn evict(&self, guild_id: GuildId) {
        self.cache.write().await.remove(&guild_id);
    }

    pub async fn unset(&self, guild_id: GuildId) -> Result<bool> {
        let removed = self.store.delete_guild_key(guild_id).await?;
        self.cache.write().await.remove(&guild_id);
        Ok(removed)
    }

    /// Drops every cached translator.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

/// Kinds whose credentials were rejected. Other validation failures are
/// logged and the key is kept.
async fn validate_all(providers: &[Arc<dyn TranslationProvider>]) -> Vec<ProviderKind> {
    let checks = providers
        .iter()
        .map(|p| async move { (p.kind(), p.validate().await) });
    let results = futures::future::join_all(checks).await;

    let mut rejected = Vec::new();
    for (kind, result) in results {
        match result {
            Ok(()) => {}
            Err(e) if e.is_authorization() => rejected.push(kind),
            Err(e) => warn!(provider = %kind, error = %e, "could not validate translation key"),
        }
    }
    rejected
}
