use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{errors::Error, languages::Language, translation::TranslationContext, Result};

/// Which backend a credential belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepL,
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::DeepL, ProviderKind::OpenAi];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::DeepL => "deepl",
            ProviderKind::OpenAi => "openai",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::DeepL => "DeepL",
            ProviderKind::OpenAi => "OpenAI",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepl" => Ok(ProviderKind::DeepL),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(Error::Config(format!("unknown translation provider: {other}"))),
        }
    }
}

/// Character usage of a provider account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Usage {
    pub count: u64,
    pub limit: u64,
}

impl Usage {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    pub fn limit_reached(&self) -> bool {
        self.count >= self.limit
    }
}

/// A translation backend bound to one credential.
///
/// Implementations map rejected credentials to [`Error::Authorization`],
/// provider refusals (unsupported language, exhausted quota) to
/// [`Error::Translation`] and transport failures to [`Error::External`].
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn translate(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
    ) -> Result<String>;

    /// Whether `translate_in_context` reads the context. Callers skip
    /// gathering it otherwise.
    fn uses_context(&self) -> bool {
        false
    }

    async fn translate_in_context(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
        _context: &TranslationContext,
    ) -> Result<String> {
        self.translate(text, source, target).await
    }

    /// Cheap authenticated call used to check the credential.
    async fn validate(&self) -> Result<()>;

    /// `None` when the provider has no usage endpoint.
    async fn usage(&self) -> Result<Option<Usage>> {
        Ok(None)
    }
}

/// Builds providers from decrypted credentials.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, kind: ProviderKind, api_key: &str) -> Result<Arc<dyn TranslationProvider>>;
}
