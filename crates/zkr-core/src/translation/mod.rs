//! Translation providers, per-guild translators and their credential cache.

mod cache;
mod context;
mod provider;
mod translator;

pub use cache::TranslatorCache;
pub use context::{ContextMessage, TranslationContext, HISTORY_LIMIT};
pub use provider::{ProviderFactory, ProviderKind, TranslationProvider, Usage};
pub use translator::{GuildTranslator, RetryPolicy};
