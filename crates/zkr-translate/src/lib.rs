//! HTTP translation providers: DeepL and OpenAI chat completions.
//!
//! Both map HTTP failures onto the core error taxonomy so the core can tell a
//! rejected key from a refusal and from a transport hiccup worth retrying.

mod deepl;
mod openai;

use std::{sync::Arc, time::Duration};

use reqwest::StatusCode;
use zkr_core::{
    errors::Error,
    translation::{ProviderFactory, ProviderKind, TranslationProvider},
    Result,
};

pub use deepl::DeepLProvider;
pub use openai::OpenAiChatProvider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds providers sharing one HTTP client.
#[derive(Clone, Debug)]
pub struct HttpProviderFactory {
    http: reqwest::Client,
    openai_model: String,
}

impl HttpProviderFactory {
    pub fn new(openai_model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("zekuru-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("reqwest client build: {e}")))?;
        Ok(Self {
            http,
            openai_model: openai_model.into(),
        })
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, kind: ProviderKind, api_key: &str) -> Result<Arc<dyn TranslationProvider>> {
        Ok(match kind {
            ProviderKind::DeepL => Arc::new(DeepLProvider::new(self.http.clone(), api_key)),
            ProviderKind::OpenAi => Arc::new(OpenAiChatProvider::new(
                self.http.clone(),
                api_key,
                self.openai_model.clone(),
            )),
        })
    }
}

/// Maps a non-success response onto the core taxonomy.
pub(crate) fn status_error(kind: ProviderKind, status: StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    match status.as_u16() {
        401 | 403 => Error::Authorization(vec![kind]),
        // DeepL: character quota exhausted.
        456 => Error::Translation(format!("{kind} quota exceeded")),
        429 => Error::External(format!("{kind} rate limited: {snippet}")),
        s if s >= 500 => Error::External(format!("{kind} server error {status}: {snippet}")),
        _ => Error::Translation(format!("{kind} request failed {status}: {snippet}")),
    }
}

pub(crate) fn transport_error(kind: ProviderKind, e: reqwest::Error) -> Error {
    Error::External(format!("{kind} request error: {e}"))
}
