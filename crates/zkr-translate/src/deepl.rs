use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zkr_core::{
    errors::Error,
    languages::Language,
    translation::{ProviderKind, TranslationProvider, Usage},
    Result,
};

use crate::{status_error, transport_error};

const FREE_HOST: &str = "https://api-free.deepl.com";
const PRO_HOST: &str = "https://api.deepl.com";

/// Free-plan keys end in `:fx` and only work against the free host.
fn host_for(api_key: &str) -> &'static str {
    if api_key.trim().ends_with(":fx") {
        FREE_HOST
    } else {
        PRO_HOST
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    character_count: u64,
    character_limit: u64,
}

#[derive(Clone, Debug)]
pub struct DeepLProvider {
    http: reqwest::Client,
    api_key: String,
    host: &'static str,
}

impl DeepLProvider {
    pub fn new(http: reqwest::Client, api_key: &str) -> Self {
        Self {
            http,
            host: host_for(api_key),
            api_key: api_key.trim().to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("DeepL-Auth-Key {}", self.api_key)
    }

    async fn fetch_usage(&self) -> Result<Usage> {
        let resp = self
            .http
            .get(format!("{}/v2/usage", self.host))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| transport_error(ProviderKind::DeepL, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(ProviderKind::DeepL, status, &body));
        }
        let usage: UsageResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("deepl usage json error: {e}")))?;
        Ok(Usage {
            count: usage.character_count,
            limit: usage.character_limit,
        })
    }
}

fn language_codes(
    source: &'static Language,
    target: &'static Language,
) -> Result<(&'static str, &'static str)> {
    let source_code = source
        .deepl_source
        .ok_or_else(|| Error::Translation(format!("DeepL does not support '{}' yet!", source.name)))?;
    let target_code = target
        .deepl_target
        .ok_or_else(|| Error::Translation(format!("DeepL does not support '{}' yet!", target.name)))?;
    Ok((source_code, target_code))
}

#[async_trait]
impl TranslationProvider for DeepLProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepL
    }

    async fn translate(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
    ) -> Result<String> {
        let (source_lang, target_lang) = language_codes(source, target)?;
        let request = TranslateRequest {
            text: [text],
            source_lang,
            target_lang,
        };

        let resp = self
            .http
            .post(format!("{}/v2/translate", self.host))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(ProviderKind::DeepL, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(ProviderKind::DeepL, status, &body));
        }

        let parsed: TranslateResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("deepl json error: {e}")))?;
        debug!(source = source.code, target = target.code, "deepl translated");
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| Error::External("deepl returned no translations".to_string()))
    }

    async fn validate(&self) -> Result<()> {
        self.fetch_usage().await.map(|_| ())
    }

    async fn usage(&self) -> Result<Option<Usage>> {
        self.fetch_usage().await.map(Some)
    }
}
