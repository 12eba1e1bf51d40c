use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunk::SegmenterConfig;
use crate::hybrid::{validate_weights, HybridWeights};
use crate::retry::RetryPolicy;
use crate::vector::DEFAULT_DIMENSIONS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub segmenter: SegmenterSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterSettings {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_true")]
    pub respect_boundaries: bool,
    /// Pick max/overlap/min from the content length instead of the fixed values.
    #[serde(default = "default_true")]
    pub adaptive: bool,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
            min_chunk_size: default_min_chunk_size(),
            respect_boundaries: true,
            adaptive: true,
        }
    }
}

impl SegmenterSettings {
    /// Config for content of `content_len` characters.
    pub fn for_length(&self, content_len: usize) -> SegmenterConfig {
        if self.adaptive {
            SegmenterConfig {
                respect_boundaries: self.respect_boundaries,
                ..crate::chunk::select_config(content_len)
            }
        } else {
            self.fixed()
        }
    }

    pub fn fixed(&self) -> SegmenterConfig {
        SegmenterConfig {
            max_tokens: self.max_tokens,
            overlap_tokens: self.overlap_tokens,
            min_chunk_size: self.min_chunk_size,
            respect_boundaries: self.respect_boundaries,
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_overlap_tokens() -> usize {
    50
}
fn default_min_chunk_size() -> usize {
    100
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
            retry: RetryConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn disabled() -> Self {
        Self {
            provider: "disabled".to_string(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMENSIONS
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    crate::embedding::MAX_INPUT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackfillConfig {
    #[serde(default = "default_chunk_batch_size")]
    pub chunk_batch_size: usize,
    #[serde(default = "default_summary_scan_window")]
    pub summary_scan_window: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            chunk_batch_size: default_chunk_batch_size(),
            summary_scan_window: default_summary_scan_window(),
            embedding_batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_chunk_batch_size() -> usize {
    10
}
fn default_summary_scan_window() -> usize {
    1000
}
fn default_embedding_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

impl RetrievalConfig {
    pub fn weights(&self) -> HybridWeights {
        HybridWeights {
            semantic: self.semantic_weight,
            keyword: self.keyword_weight,
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.7
}
fn default_keyword_weight() -> f64 {
    0.3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), provider = %config.embedding.provider, "loaded config");
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Segmenter
    config
        .segmenter
        .fixed()
        .validate()
        .with_context(|| "invalid [segmenter] section")?;

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }
    if config.embedding.is_enabled() && config.embedding.model.trim().is_empty() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    let retry = &config.embedding.retry;
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        anyhow::bail!("embedding.retry.multiplier must be >= 1.0");
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        anyhow::bail!("embedding.retry.max_delay_ms must be >= initial_delay_ms");
    }

    // Backfill
    let b = &config.backfill;
    if b.chunk_batch_size == 0 || b.summary_scan_window == 0 || b.embedding_batch_size == 0 {
        anyhow::bail!("backfill batch sizes must be > 0");
    }

    // Retrieval
    validate_weights(&config.retrieval.weights()).with_context(|| "invalid [retrieval] weights")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/recall.sqlite\"\n").unwrap();
        assert_eq!(config.segmenter.max_tokens, 500);
        assert!(config.segmenter.adaptive);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.retry.policy(), RetryPolicy::default());
        assert_eq!(config.backfill.chunk_batch_size, 10);
        assert_eq!(config.backfill.summary_scan_window, 1000);
        assert_eq!(config.backfill.embedding_batch_size, 50);
        assert_eq!(config.retrieval.weights(), HybridWeights::default());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[db]
path = "/tmp/r.sqlite"

[segmenter]
max_tokens = 200
overlap_tokens = 20
min_chunk_size = 50
respect_boundaries = false
adaptive = false

[embedding]
provider = "disabled"
dims = 8

[embedding.retry]
max_retries = 1
initial_delay_ms = 10
max_delay_ms = 20

[retrieval]
semantic_weight = 0.5
keyword_weight = 0.5
"#;
        let config = parse_config(toml).unwrap();
        let seg = config.segmenter.for_length(10_000);
        assert_eq!(seg.max_tokens, 200);
        assert!(!seg.respect_boundaries);
        assert_eq!(config.embedding.retry.policy().max_retries, 1);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_adaptive_selection() {
        let settings = SegmenterSettings::default();
        assert_eq!(settings.for_length(500).max_tokens, 1000);
        assert_eq!(settings.for_length(6000).max_tokens, 400);
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = "[db]\npath = \"x\"\n";
        assert!(parse_config(&format!("{}[segmenter]\nmax_tokens = 0\n", base)).is_err());
        assert!(parse_config(&format!(
            "{}[segmenter]\nmax_tokens = 10\noverlap_tokens = 10\n",
            base
        ))
        .is_err());
        assert!(parse_config(&format!("{}[embedding]\nprovider = \"ollama\"\n", base)).is_err());
        assert!(parse_config(&format!("{}[embedding]\ndims = 0\n", base)).is_err());
        assert!(parse_config(&format!(
            "{}[retrieval]\nsemantic_weight = 0.5\nkeyword_weight = 0.6\n",
            base
        ))
        .is_err());
        assert!(parse_config(&format!("{}[backfill]\nchunk_batch_size = 0\n", base)).is_err());
        assert!(parse_config(&format!("{}[embedding.retry]\nmultiplier = 0.5\n", base)).is_err());
    }

    #[test]
    fn test_missing_db_section() {
        assert!(parse_config("[segmenter]\nmax_tokens = 100\n").is_err());
    }
}
