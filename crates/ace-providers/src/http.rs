//! Shared blocking HTTP plumbing.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use ace_contracts::error::{AceError, AceResult};

const ERROR_BODY_CHARS: usize = 300;

/// A client with no overall request timeout. Callers own cancellation.
pub fn client(capability: &str) -> AceResult<Client> {
    Client::builder()
        .timeout(None::<Duration>)
        .build()
        .map_err(|e| AceError::Capability {
            capability: capability.to_string(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// Decode a JSON response, turning non-2xx statuses into errors.
pub fn decode<T: DeserializeOwned>(capability: &str, response: Response) -> AceResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let excerpt: String = body.chars().take(ERROR_BODY_CHARS).collect();
        return Err(AceError::Capability {
            capability: capability.to_string(),
            reason: format!("HTTP {status}: {excerpt}"),
        });
    }
    response.json().map_err(|e| AceError::Capability {
        capability: capability.to_string(),
        reason: format!("failed to parse response: {e}"),
    })
}

pub fn transport_error(capability: &str, e: reqwest::Error) -> AceError {
    AceError::Capability {
        capability: capability.to_string(),
        reason: format!("HTTP request failed: {e}"),
    }
}
