//! Process-wide wiring of the core: caches, pipeline, sync handlers and
//! commands built once over one store and one relay port.

use std::sync::Arc;

use tracing::warn;

use crate::{
    commands::CommandService,
    config::Config,
    crypto::CredentialCipher,
    ledger::MessageLedger,
    links::ChannelLinkCache,
    registry::TranslateChannelRegistry,
    relay::{RelayPipeline, RelayPort, ThrottleConfig, ThrottledRelay},
    store::Store,
    sync::SyncHandlers,
    translation::{ProviderFactory, RetryPolicy, TranslatorCache},
    Result,
};

pub struct Services {
    pub config: Arc<Config>,
    pub registry: Arc<TranslateChannelRegistry>,
    pub links: Arc<ChannelLinkCache>,
    pub ledger: Arc<MessageLedger>,
    pub translators: Arc<TranslatorCache>,
    pub pipeline: Arc<RelayPipeline>,
    pub sync: SyncHandlers,
    pub commands: CommandService,
}

impl Services {
    /// `port` is wrapped in a [`ThrottledRelay`] configured from `config`.
    pub fn new<S: Store + 'static>(
        config: Arc<Config>,
        store: Arc<S>,
        port: Arc<dyn RelayPort>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<Self> {
        let cipher = match &config.cipher_secret_key {
            Some(secret) => Some(Arc::new(CredentialCipher::from_hex(secret)?)),
            None => {
                warn!("CIPHER_SECRET_KEY not set; sign-in is disabled");
                None
            }
        };

        let registry = Arc::new(TranslateChannelRegistry::new(store.clone()));
        let links = Arc::new(ChannelLinkCache::new(store.clone()));
        let ledger = Arc::new(MessageLedger::new(store.clone()));
        let translators = Arc::new(TranslatorCache::new(
            store,
            cipher,
            factory,
            RetryPolicy {
                max_retries: config.translate_max_retries,
                base: config.translate_retry_base,
            },
        ));

        let port: Arc<dyn RelayPort> =
            Arc::new(ThrottledRelay::new(port, ThrottleConfig::from(config.as_ref())));
        let pipeline = Arc::new(RelayPipeline::new(
            registry.clone(),
            links.clone(),
            ledger.clone(),
            translators.clone(),
            port,
        ));
        let sync = SyncHandlers::new(pipeline.clone());
        let commands = CommandService::new(
            registry.clone(),
            links.clone(),
            translators.clone(),
            config.link_limit,
            config.message_chars_limit,
        );

        Ok(Self {
            config,
            registry,
            links,
            ledger,
            translators,
            pipeline,
            sync,
            commands,
        })
    }
}
