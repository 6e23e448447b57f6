use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zkr_core::{
    errors::Error,
    languages::Language,
    translation::{ProviderKind, TranslationContext, TranslationProvider},
    Result,
};

use crate::{status_error, transport_error};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn system_prompt(source: &Language, target: &Language) -> String {
    format!(
        "You translate Discord chat messages from {} to {}. \
         Reply with the translation only, without quotes or commentary. \
         Keep every placeholder of the form <:N:> exactly as written and in place. \
         Keep markdown formatting and line breaks.",
        source.name, target.name
    )
}

/// The conversation so far, then the message to translate between triple
/// quotes.
fn context_prompt(text: &str, context: &TranslationContext) -> String {
    format!(
        "{}\nTranslate the next message from {}, taking note of the reply and chat history \
         above. Reply with the translation of this message only:\n\"\"\"\n{text}\n\"\"\"",
        context.render(),
        context.author,
    )
}

/// Models sometimes echo the quotes around the message.
fn strip_fences(out: String) -> String {
    match out
        .strip_prefix("\"\"\"")
        .and_then(|rest| rest.strip_suffix("\"\"\""))
    {
        Some(inner) => inner.trim().to_string(),
        None => out,
    }
}

fn chat_request<'a>(model: &'a str, system: &'a str, user: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        temperature: 0.0,
        max_tokens: None,
    }
}

/// Chat-completions translator. OpenAI exposes no usage endpoint for API keys,
/// so `usage` stays at the trait default.
#[derive(Clone, Debug)]
pub struct OpenAiChatProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiChatProvider {
    pub fn new(http: reqwest::Client, api_key: &str, model: String) -> Self {
        Self {
            http,
            api_key: api_key.trim().to_string(),
            model,
        }
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String> {
        let resp = self
            .http
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(ProviderKind::OpenAi, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(ProviderKind::OpenAi, status, &body));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;
        first_content(parsed)
    }
}

fn first_content(resp: ChatResponse) -> Result<String> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::External("openai returned no completion".to_string()))
}

#[async_trait]
impl TranslationProvider for OpenAiChatProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn translate(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
    ) -> Result<String> {
        let prompt = system_prompt(source, target);
        let out = self
            .complete(&chat_request(&self.model, &prompt, text))
            .await?;
        debug!(source = source.code, target = target.code, "openai translated");
        Ok(out)
    }

    fn uses_context(&self) -> bool {
        true
    }

    async fn translate_in_context(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
        context: &TranslationContext,
    ) -> Result<String> {
        let prompt = system_prompt(source, target);
        let user = context_prompt(text, context);
        let out = self
            .complete(&chat_request(&self.model, &prompt, &user))
            .await
            .map(strip_fences)?;
        debug!(
            source = source.code,
            target = target.code,
            history = context.history.len(),
            "openai translated with context"
        );
        Ok(out)
    }

    /// A one-token completion; cheapest call that proves the key works.
    async fn validate(&self) -> Result<()> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "Say A",
            }],
            temperature: 0.0,
            max_tokens: Some(1),
        };
        self.complete(&request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkr_core::{languages::by_code, translation::ContextMessage};

    #[test]
    fn prompt_names_both_languages_and_placeholders() {
        let prompt = system_prompt(by_code("en").unwrap(), by_code("vi").unwrap());
        assert!(prompt.contains("from English to Vietnamese"));
        assert!(prompt.contains("<:N:>"));
    }

    #[test]
    fn validation_request_is_one_token() {
        let body = serde_json::to_value(ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "Say A",
            }],
            temperature: 0.0,
            max_tokens: Some(1),
        })
        .unwrap();
        assert_eq!(body["max_tokens"], 1);
        assert_eq!(body["messages"][0]["content"], "Say A");
    }

    #[test]
    fn translation_request_omits_max_tokens() {
        let body = serde_json::to_value(ChatRequest {
            model: "m",
            messages: vec![],
            temperature: 0.0,
            max_tokens: None,
        })
        .unwrap();
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn context_is_sent_ahead_of_the_message() {
        let context = TranslationContext {
            author: "ana".into(),
            replying_to: None,
            history: vec![ContextMessage {
                author: "bob".into(),
                content: "did the build pass?".into(),
                has_attachments: false,
                has_stickers: false,
            }],
        };
        let user = context_prompt("it did <:0:>", &context);
        let body = serde_json::to_value(chat_request("m", "system", &user)).unwrap();

        let sent = body["messages"][1]["content"].as_str().unwrap();
        assert!(sent.starts_with("User: ana\n"));
        assert!(sent.contains("Chat history:\nbob:\n\"\"\"\ndid the build pass?\n\"\"\""));
        assert!(sent.ends_with("\"\"\"\nit did <:0:>\n\"\"\""));
        assert_eq!(body["messages"][0]["content"], "system");
    }

    #[test]
    fn echoed_quotes_are_removed() {
        assert_eq!(strip_fences("\"\"\"\nhola\n\"\"\"".to_string()), "hola");
        assert_eq!(strip_fences("hola".to_string()), "hola");
    }

    #[test]
    fn reads_first_choice() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" xin chào <:0:>\n"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(resp).unwrap(), "xin chào <:0:>");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_content(empty).unwrap_err().is_retryable());
    }
}
