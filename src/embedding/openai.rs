//! OpenAI-compatible embeddings client.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingProvider, ProviderEmbedding};
use crate::error::ProviderError;

/// Everything the provider needs, resolved by the caller.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dims: usize,
    pub timeout: Duration,
}

/// Calls `POST {base_url}/embeddings` with one input per request.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!config.api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!config.model.trim().is_empty(), "missing embedding model name");

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embeddings HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model,
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<ProviderEmbedding, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: Some(self.dims),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transient {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transient {
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(classify_status(status, body));
        }

        parse_response(&body)
    }
}

/// 429 and 5xx are transient; every other failure status is a rejection.
fn classify_status(status: StatusCode, body: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient {
            status: Some(status.as_u16()),
            message: body,
        }
    } else {
        ProviderError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn parse_response(body: &str) -> Result<ProviderEmbedding, ProviderError> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    parsed.data.sort_by_key(|entry| entry.index);

    let entry = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("response contained no embeddings".into()))?;

    Ok(ProviderEmbedding {
        vector: entry.embedding,
        prompt_tokens: parsed.usage.map(|u| u.prompt_tokens).unwrap_or(0),
    })
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3]}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 5, "total_tokens": 5}
        }"#;
        let parsed = parse_response(body).unwrap();
        assert_eq!(parsed.vector, vec![0.1, -0.2, 0.3]);
        assert_eq!(parsed.prompt_tokens, 5);
    }

    #[test]
    fn test_parse_response_without_usage() {
        let parsed = parse_response(r#"{"data": [{"embedding": [1.0]}]}"#).unwrap();
        assert_eq!(parsed.prompt_tokens, 0);
    }

    #[test]
    fn test_parse_response_errors() {
        assert!(matches!(
            parse_response("not json"),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_response(r#"{"data": []}"#),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_classify_status() {
        let e = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow".into());
        assert!(matches!(e, ProviderError::Transient { status: Some(429), .. }));
        let e = classify_status(StatusCode::BAD_GATEWAY, String::new());
        assert!(matches!(e, ProviderError::Transient { status: Some(502), .. }));
        let e = classify_status(StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(matches!(e, ProviderError::Rejected { status: 401, .. }));
    }

    #[test]
    fn test_new_requires_key() {
        let config = OpenAIConfig {
            base_url: "http://localhost".into(),
            api_key: "  ".into(),
            model: "m".into(),
            dims: 3,
            timeout: Duration::from_secs(1),
        };
        assert!(OpenAIProvider::new(config).is_err());
    }
}
