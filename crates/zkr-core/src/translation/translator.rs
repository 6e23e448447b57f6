use std::{sync::Arc, time::Duration};

use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use crate::{
    errors::Error,
    languages::Language,
    translation::{ProviderKind, TranslationContext, TranslationProvider, Usage},
    Result,
};

/// Bounded exponential backoff around provider calls.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base: Duration,
}

impl RetryPolicy {
    fn strategy(&self) -> impl Iterator<Item = Duration> {
        // Delays of base, 2*base, 4*base, ...
        let factor = (self.base.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(500),
        }
    }
}

/// The providers configured for one guild, preferred one first.
pub struct GuildTranslator {
    providers: Vec<Arc<dyn TranslationProvider>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GuildTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildTranslator")
            .field("providers", &self.kinds())
            .field("retry", &self.retry)
            .finish()
    }
}

impl GuildTranslator {
    pub fn new(
        mut providers: Vec<Arc<dyn TranslationProvider>>,
        preferred: Option<ProviderKind>,
        retry: RetryPolicy,
    ) -> Self {
        if let Some(preferred) = preferred {
            providers.sort_by_key(|p| p.kind() != preferred);
        }
        Self { providers, retry }
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Whether the preferred provider reads conversation context.
    pub fn uses_context(&self) -> bool {
        self.providers.first().is_some_and(|p| p.uses_context())
    }

    pub async fn translate(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
    ) -> Result<String> {
        self.translate_in_context(text, source, target, None).await
    }

    /// Translates with the preferred provider, moving on to the next one only
    /// when a provider refuses the language pair.
    pub async fn translate_in_context(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
        context: Option<&TranslationContext>,
    ) -> Result<String> {
        if source.code == target.code || text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let mut last_refusal = None;
        for provider in &self.providers {
            match self
                .translate_with(provider.as_ref(), text, source, target, context)
                .await
            {
                Ok(out) => return Ok(out),
                Err(Error::Translation(reason)) => {
                    debug!(
                        provider = %provider.kind(),
                        source = source.code,
                        target = target.code,
                        %reason,
                        "provider refused translation"
                    );
                    last_refusal = Some(Error::Translation(reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_refusal.unwrap_or_else(|| {
            Error::Translation("no translation provider configured".to_string())
        }))
    }

    async fn translate_with(
        &self,
        provider: &dyn TranslationProvider,
        text: &str,
        source: &'static Language,
        target: &'static Language,
        context: Option<&TranslationContext>,
    ) -> Result<String> {
        let result = RetryIf::spawn(
            self.retry.strategy(),
            || match context {
                Some(context) => provider.translate_in_context(text, source, target, context),
                None => provider.translate(text, source, target),
            },
            |e: &Error| e.is_retryable(),
        )
        .await;

        if let Err(e) = &result {
            if e.is_retryable() {
                warn!(
                    provider = %provider.kind(),
                    attempts = self.retry.max_retries + 1,
                    error = %e,
                    "translation retries exhausted"
                );
            }
        }
        result
    }

    /// Usage of the first provider that reports one.
    pub async fn usage(&self) -> Result<Option<Usage>> {
        for provider in &self.providers {
            if let Some(usage) = provider.usage().await? {
                return Ok(Some(usage));
            }
        }
        Ok(None)
    }
}
