//! Embedding providers and the retrying embedding generator.
//!
//! - **[`EmbeddingProvider`]**: one text in, one raw vector out. Implemented by
//!   [`OpenAIProvider`] (any OpenAI-compatible `/embeddings` endpoint) and
//!   [`DisabledProvider`].
//! - **[`EmbeddingGenerator`]**: wraps a provider with input validation, the
//!   configured [`RetryPolicy`], dimension checks and unit normalization.
//!
//! Also provides BLOB helpers for SQLite storage:
//! - [`vec_to_blob`] encodes a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] decodes it back
//!
//! # Provider Selection
//!
//! ```rust
//! # use recall_index::config::EmbeddingConfig;
//! # use recall_index::embedding::create_provider;
//! let config = EmbeddingConfig::disabled();
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Failure handling
//!
//! | Failure | Retried |
//! |---------|---------|
//! | blank text, text over `max_input_chars` | no |
//! | network error, HTTP 429, HTTP 5xx | yes |
//! | other HTTP 4xx, malformed response | no |
//! | wrong vector dimension | no |

mod openai;

pub use openai::{OpenAIConfig, OpenAIProvider};

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, ProviderError, Result, ValidationError};
use crate::retry::RetryPolicy;
use crate::vector::{normalize_vector, validate_dimensions};

/// Longest text accepted by [`EmbeddingGenerator`], in characters.
pub const MAX_INPUT_CHARS: usize = 8000;

/// Raw provider output for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEmbedding {
    pub vector: Vec<f32>,
    pub prompt_tokens: u32,
}

/// A backend that turns one text into one vector.
///
/// Implementations perform a single attempt; retrying is the generator's job.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality the provider is configured for.
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> std::result::Result<ProviderEmbedding, ProviderError>;
}

/// Always fails with [`ProviderError::Disabled`].
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> std::result::Result<ProviderEmbedding, ProviderError> {
        Err(ProviderError::Disabled)
    }
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
///
/// The API key is read from the environment variable named by
/// `config.api_key_env` here, once, and handed to the provider.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).with_context(|| {
                format!("{} environment variable not set", config.api_key_env)
            })?;
            let provider = OpenAIProvider::new(OpenAIConfig {
                base_url: config.base_url.clone(),
                api_key,
                model: config.model.clone(),
                dims: config.dims,
                timeout: Duration::from_secs(config.timeout_secs),
            })?;
            Ok(Arc::new(provider))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// What kind of text is being embedded. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingCategory {
    Chunk,
    Summary,
    Query,
    Source,
}

impl EmbeddingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingCategory::Chunk => "chunk",
            EmbeddingCategory::Summary => "summary",
            EmbeddingCategory::Query => "query",
            EmbeddingCategory::Source => "source",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEmbedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub token_count: u32,
    pub dimension: usize,
}

/// Per-index outcome of [`EmbeddingGenerator::generate_batch`].
#[derive(Debug, Default)]
pub struct BatchEmbeddingResult {
    pub successful: Vec<(usize, GeneratedEmbedding)>,
    pub failed: Vec<(usize, Error)>,
    pub total_tokens: u64,
}

/// Validates input, calls the provider under a retry policy, and checks
/// and normalizes the output.
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    dims: usize,
    max_input_chars: usize,
}

impl EmbeddingGenerator {
    /// Expected dimension defaults to `provider.dims()`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, retry: RetryPolicy) -> Self {
        let dims = provider.dims();
        Self {
            provider,
            retry,
            dims,
            max_input_chars: MAX_INPUT_CHARS,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let provider = create_provider(config)?;
        Ok(Self::new(provider, config.retry.policy())
            .with_dims(config.dims)
            .with_max_input_chars(config.max_input_chars))
    }

    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = dims;
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Embed `text` and normalize the result to unit length.
    pub async fn generate(&self, text: &str, category: EmbeddingCategory) -> Result<GeneratedEmbedding> {
        self.generate_with(text, category, true).await
    }

    /// Embed `text`. Only transient provider errors are retried; the error
    /// from the last attempt is returned once the policy is exhausted.
    pub async fn generate_with(
        &self,
        text: &str,
        category: EmbeddingCategory,
        normalize: bool,
    ) -> Result<GeneratedEmbedding> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(ValidationError::TextTooLong {
                len,
                max: self.max_input_chars,
            }
            .into());
        }

        let provider = self.provider.as_ref();
        let raw = self.retry.run(move || provider.embed(text)).await?;

        validate_dimensions(&raw.vector, self.dims)?;
        let vector = if normalize {
            normalize_vector(&raw.vector)?
        } else {
            raw.vector
        };

        tracing::debug!(
            category = category.as_str(),
            chars = len,
            tokens = raw.prompt_tokens,
            "generated embedding"
        );

        Ok(GeneratedEmbedding {
            dimension: vector.len(),
            vector,
            model: self.provider.model_name().to_string(),
            token_count: raw.prompt_tokens,
        })
    }

    /// Embed each text in order. One item's failure never stops the rest.
    pub async fn generate_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        category: EmbeddingCategory,
        normalize: bool,
    ) -> BatchEmbeddingResult {
        let mut result = BatchEmbeddingResult::default();
        for (i, text) in texts.iter().enumerate() {
            match self.generate_with(text.as_ref(), category, normalize).await {
                Ok(embedding) => {
                    result.total_tokens += u64::from(embedding.token_count);
                    result.successful.push((i, embedding));
                }
                Err(err) => {
                    tracing::warn!(index = i, category = category.as_str(), error = %err, "embedding failed");
                    result.failed.push((i, err));
                }
            }
        }
        result
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use recall_index::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns a fixed vector after `failures` transient errors.
    struct ScriptedProvider {
        dims: usize,
        vector: Vec<f32>,
        failures: u32,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(vector: Vec<f32>, failures: u32) -> Self {
            Self {
                dims: 3,
                vector,
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, text: &str) -> std::result::Result<ProviderEmbedding, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ProviderError::Transient {
                    status: Some(503),
                    message: "unavailable".into(),
                });
            }
            if text.contains("reject") {
                return Err(ProviderError::Rejected {
                    status: 400,
                    message: "bad input".into(),
                });
            }
            Ok(ProviderEmbedding {
                vector: self.vector.clone(),
                prompt_tokens: 7,
            })
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[tokio::test]
    async fn test_generate_normalizes() {
        let provider = Arc::new(ScriptedProvider::new(vec![3.0, 0.0, 4.0], 0));
        let gen = EmbeddingGenerator::new(provider, fast_retry());
        let e = gen.generate("hello", EmbeddingCategory::Chunk).await.unwrap();
        assert_eq!(e.dimension, 3);
        assert_eq!(e.model, "scripted");
        assert_eq!(e.token_count, 7);
        assert!((e.vector[0] - 0.6).abs() < 1e-6);
        assert!((e.vector[2] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generate_without_normalize_keeps_raw() {
        let provider = Arc::new(ScriptedProvider::new(vec![3.0, 0.0, 4.0], 0));
        let gen = EmbeddingGenerator::new(provider, fast_retry());
        let e = gen
            .generate_with("hello", EmbeddingCategory::Query, false)
            .await
            .unwrap();
        assert_eq!(e.vector, vec![3.0, 0.0, 4.0]);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![1.0, 0.0, 0.0], 2));
        let gen = EmbeddingGenerator::new(provider.clone(), fast_retry());
        assert!(gen.generate("hello", EmbeddingCategory::Chunk).await.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![1.0, 0.0, 0.0], 10));
        let gen = EmbeddingGenerator::new(provider.clone(), fast_retry());
        let err = gen.generate("hello", EmbeddingCategory::Chunk).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Transient { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_validation_errors_never_reach_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![1.0, 0.0, 0.0], 0));
        let gen = EmbeddingGenerator::new(provider.clone(), fast_retry());

        let err = gen.generate("   \n", EmbeddingCategory::Chunk).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyText)));

        let long = "x".repeat(MAX_INPUT_CHARS + 1);
        let err = gen.generate(&long, EmbeddingCategory::Chunk).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TextTooLong { len: 8001, max: 8000 })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![1.0, 0.0], 0));
        let gen = EmbeddingGenerator::new(provider, fast_retry()).with_dims(3);
        let err = gen.generate("hello", EmbeddingCategory::Chunk).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[tokio::test]
    async fn test_zero_vector_fails_normalization() {
        let provider = Arc::new(ScriptedProvider::new(vec![0.0, 0.0, 0.0], 0));
        let gen = EmbeddingGenerator::new(provider, fast_retry());
        let err = gen.generate("hello", EmbeddingCategory::Chunk).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::ZeroVector)));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![1.0, 1.0, 0.0], 0));
        let gen = EmbeddingGenerator::new(provider, fast_retry());
        let texts = ["first", "", "please reject", "last"];
        let result = gen
            .generate_batch(&texts, EmbeddingCategory::Chunk, true)
            .await;
        let ok: Vec<usize> = result.successful.iter().map(|(i, _)| *i).collect();
        let failed: Vec<usize> = result.failed.iter().map(|(i, _)| *i).collect();
        assert_eq!(ok, vec![0, 3]);
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(result.total_tokens, 14);
    }

    #[tokio::test]
    async fn test_disabled_provider_fails_without_retry() {
        let gen = EmbeddingGenerator::new(Arc::new(DisabledProvider), fast_retry()).with_dims(3);
        let err = gen.generate("hello", EmbeddingCategory::Summary).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Disabled)));
    }

    #[test]
    fn test_create_provider_unknown() {
        let mut config = EmbeddingConfig::disabled();
        config.provider = "ollama".to_string();
        assert!(create_provider(&config).is_err());
    }
}
