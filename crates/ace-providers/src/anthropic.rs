//! Insight extraction through the Anthropic messages API.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ace_contracts::error::{AceError, AceResult};
use ace_core::traits::InsightExtractor;

use crate::{
    credentials::{env_lookup, require_key, ANTHROPIC_API_KEY},
    http,
};

pub const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const API_VERSION: &str = "2023-06-01";
const CAPABILITY: &str = "insight extraction";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Concatenate the text blocks of a response.
    pub(crate) fn into_text(self) -> AceResult<String> {
        let text: Vec<String> = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(AceError::Capability {
                capability: CAPABILITY.to_string(),
                reason: "response contained no text".to_string(),
            });
        }
        Ok(text.join("\n"))
    }
}

pub struct AnthropicInsightExtractor {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    url: String,
}

impl AnthropicInsightExtractor {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> AceResult<Self> {
        Ok(Self {
            client: http::client(CAPABILITY)?,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            url: MESSAGES_URL.to_string(),
        })
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> AceResult<Self> {
        Self::from_lookup(model, &env_lookup)
    }

    pub fn from_lookup(model: impl Into<String>, lookup: &dyn Fn(&str) -> Option<String>) -> AceResult<Self> {
        let key = require_key(lookup, ANTHROPIC_API_KEY, CAPABILITY)?;
        Self::new(key, model)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl InsightExtractor for AnthropicInsightExtractor {
    fn extract(&self, prompt: &str) -> AceResult<String> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&MessagesRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .map_err(|e| http::transport_error(CAPABILITY, e))?;

        let text = http::decode::<MessagesResponse>(CAPABILITY, response)?.into_text()?;
        debug!(model = %self.model, chars = text.len(), "insight response received");
        Ok(text)
    }
}

impl std::fmt::Debug for AnthropicInsightExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicInsightExtractor")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ace_contracts::error::ErrorKind;

    use super::*;

    #[test]
    fn missing_key_is_capability_unavailable() {
        let err = AnthropicInsightExtractor::from_lookup("claude-sonnet-4-5", &|_| None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
        assert!(err.to_string().contains("export ANTHROPIC_API_KEY="));
    }

    #[test]
    fn key_is_read_through_the_lookup() {
        let extractor = AnthropicInsightExtractor::from_lookup("claude-sonnet-4-5", &|name| {
            (name == ANTHROPIC_API_KEY).then(|| "sk-ant-test".to_string())
        })
        .unwrap()
        .with_max_tokens(1024);
        let rendered = format!("{extractor:?}");
        assert!(!rendered.contains("sk-ant-test"));
        assert!(rendered.contains("1024"));
    }

    #[test]
    fn text_blocks_are_joined() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"id":"msg_1","content":[
                {"type":"text","text":"```json"},
                {"type":"tool_use","id":"t","name":"x","input":{}},
                {"type":"text","text":"[]\n```"}
            ],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "```json\n[]\n```");

        let empty: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert_eq!(empty.into_text().unwrap_err().kind(), ErrorKind::Capability);
    }
}
