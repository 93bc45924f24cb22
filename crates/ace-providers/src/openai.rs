//! OpenAI-compatible embeddings.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ace_contracts::error::{AceError, AceResult};
use ace_core::traits::EmbeddingService;

use crate::{
    credentials::{env_lookup, require_key, OPENAI_API_KEY},
    http,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CAPABILITY: &str = "embedding";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    pub(crate) fn into_vector(self) -> AceResult<Vec<f32>> {
        self.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AceError::Capability {
                capability: CAPABILITY.to_string(),
                reason: "response contained no embedding".to_string(),
            })
    }
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> AceResult<Self> {
        Ok(Self {
            client: http::client(CAPABILITY)?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Build from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> AceResult<Self> {
        Self::from_lookup(model, &env_lookup)
    }

    pub fn from_lookup(model: impl Into<String>, lookup: &dyn Fn(&str) -> Option<String>) -> AceResult<Self> {
        let key = require_key(lookup, OPENAI_API_KEY, CAPABILITY)?;
        Self::new(key, model)
    }

    /// Point at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl EmbeddingService for OpenAiEmbedder {
    fn embed(&self, text: &str) -> AceResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .map_err(|e| http::transport_error(CAPABILITY, e))?;

        let vector = http::decode::<EmbeddingResponse>(CAPABILITY, response)?.into_vector()?;
        debug!(model = %self.model, dimensions = vector.len(), "embedding received");
        Ok(vector)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
