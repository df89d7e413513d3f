//! Configuration management for hybrid_code_search
//!
//! Supports loading configuration from TOML files with environment and CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embeddings::RetryPolicy;
use crate::search::FusionWeights;
use crate::vector::{HnswParams, VectorBackend};

/// Bumped whenever tokenization or chunk boundaries change in a way that
/// invalidates previously persisted corpora.
const INDEX_FORMAT_REVISION: u32 = 1;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub vector: VectorConfig,
}

/// Indexer-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Cache directory, relative to the project root
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Glob patterns a file must match to be indexed.
    /// When non-empty these replace the extension allowlist.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Glob patterns to exclude, matched against corpus-relative paths
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Extension allowlist used when no include patterns are given
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Maximum file size to index in bytes (default 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Honour the project's root `.gitignore`
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

/// Chunk boundary thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Structural units shorter than this fold into module units
    #[serde(default = "default_min_lines")]
    pub min_lines: usize,

    /// Classes longer than this are represented by their methods only
    #[serde(default = "default_max_class_lines")]
    pub max_class_lines: usize,

    /// Window size for the fixed-size fallback, in lines
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Overlap between consecutive fallback windows, in lines
    #[serde(default = "default_block_overlap")]
    pub block_overlap: usize,
}

/// Ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// BM25 term-frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f32,

    /// BM25 length normalization
    #[serde(default = "default_b")]
    pub b: f32,
}

/// Which embedding provider to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Voyage-compatible HTTP embedding service
    Voyage,
    /// Local feature-hashing model, no network
    Hashed,
    /// Lexical search only
    None,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voyage" | "http" => Ok(Self::Voyage),
            "hashed" | "local" => Ok(Self::Hashed),
            "none" | "off" => Ok(Self::None),
            other => anyhow::bail!("Unknown embedding provider: {}", other),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variables checked, in order, for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Vec<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Vector size of the hashed provider
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
}

fn default_cache_dir() -> String {
    ".rag_cache".to_string()
}

fn default_extensions() -> Vec<String> {
    crate::index::SUPPORTED_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_true() -> bool {
    true
}

fn default_min_lines() -> usize {
    5
}

fn default_max_class_lines() -> usize {
    100
}

fn default_block_size() -> usize {
    50
}

fn default_block_overlap() -> usize {
    10
}

fn default_lexical_weight() -> f32 {
    0.6
}

fn default_vector_weight() -> f32 {
    0.4
}

fn default_top_k() -> usize {
    5
}

fn default_k1() -> f32 {
    1.5
}

fn default_b() -> f32 {
    0.75
}

fn default_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Voyage
}

fn default_model() -> String {
    "voyage-3".to_string()
}

fn default_endpoint() -> String {
    "https://api.voyageai.com/v1/embeddings".to_string()
}

fn default_api_key_env() -> Vec<String> {
    vec!["VOYAGE_API_KEY".to_string(), "ANTHROPIC_API_KEY".to_string()]
}

fn default_batch_size() -> usize {
    96
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_dimensions() -> usize {
    256
}

fn default_max_connections() -> usize {
    16
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_search() -> usize {
    64
}

fn default_max_elements() -> usize {
    100_000
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            extensions: default_extensions(),
            max_file_size: default_max_file_size(),
            respect_gitignore: true,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_lines: default_min_lines(),
            max_class_lines: default_max_class_lines(),
            block_size: default_block_size(),
            block_overlap: default_block_overlap(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            default_top_k: default_top_k(),
            k1: default_k1(),
            b: default_b(),
        }
    }
}

impl SearchConfig {
    pub fn weights(&self) -> FusionWeights {
        FusionWeights::new(self.lexical_weight, self.vector_weight)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            dimensions: default_dimensions(),
        }
    }
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    /// First non-empty API key found in the configured environment variables
    pub fn api_key_from_env(&self) -> Option<String> {
        self.api_key_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            max_connections: default_max_connections(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            max_elements: default_max_elements(),
        }
    }
}

impl VectorConfig {
    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            max_connections: self.max_connections,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            max_elements: self.max_elements,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations
    ///
    /// Search order:
    /// 1. HCS_CONFIG environment variable
    /// 2. ./hybrid_code_search.toml (current directory)
    /// 3. <project root>/.hybrid_code_search.toml
    /// 4. ~/.config/hybrid_code_search/config.toml (user config)
    pub fn from_default_locations(project_root: &Path) -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var("HCS_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        let local_path = PathBuf::from("hybrid_code_search.toml");
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        let project_path = project_root.join(".hybrid_code_search.toml");
        if project_path.exists() {
            let config = Self::from_file(&project_path)?;
            return Ok(Some((config, project_path)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("hybrid_code_search").join("config.toml");
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides.
    /// Env vars take precedence over TOML config values.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(val) = std::env::var("HCS_EMBEDDING_PROVIDER") {
            if !val.is_empty() {
                self.embeddings.provider = val.parse()?;
            }
        }
        if let Ok(val) = std::env::var("HCS_VECTOR_BACKEND") {
            if !val.is_empty() {
                self.vector.backend = val.parse()?;
            }
        }
        if let Ok(val) = std::env::var("HCS_CACHE_DIR") {
            if !val.is_empty() {
                self.indexer.cache_dir = val;
            }
        }
        Ok(self)
    }

    /// Reject settings that would make chunking or ranking ill-defined
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.min_lines == 0 {
            anyhow::bail!("chunking.min_lines must be at least 1");
        }
        if c.block_size == 0 {
            anyhow::bail!("chunking.block_size must be at least 1");
        }
        if c.block_overlap >= c.block_size {
            anyhow::bail!(
                "chunking.block_overlap ({}) must be smaller than chunking.block_size ({})",
                c.block_overlap,
                c.block_size
            );
        }

        let s = &self.search;
        for (name, value) in [
            ("lexical_weight", s.lexical_weight),
            ("vector_weight", s.vector_weight),
            ("k1", s.k1),
            ("b", s.b),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("search.{} must be a non-negative number, got {}", name, value);
            }
        }
        if s.b > 1.0 {
            anyhow::bail!("search.b must be between 0 and 1, got {}", s.b);
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be at least 1");
        }
        Ok(())
    }

    /// Fingerprint of every setting that shapes the persisted corpus.
    /// A mismatch on load means cached units were produced differently.
    pub fn fingerprint(&self) -> String {
        let c = &self.chunking;
        let config_str = format!(
            "rev={}|min={}|max={}|block={}|overlap={}|k1={}|b={}",
            INDEX_FORMAT_REVISION,
            c.min_lines,
            c.max_class_lines,
            c.block_size,
            c.block_overlap,
            self.search.k1,
            self.search.b,
        );
        format!("{:x}", md5::compute(config_str.as_bytes()))
    }

    /// Generate a template configuration file
    pub fn generate_template() -> String {
        r#"# Hybrid Code Search Configuration
# Generated template - customize as needed

[indexer]
# Cache directory, relative to the project root
# Env override: HCS_CACHE_DIR
cache_dir = ".rag_cache"

# Glob patterns a file must match to be indexed (replace the extension allowlist)
include_patterns = []

# Glob patterns to exclude, matched against project-relative paths
exclude_patterns = [
    # "**/generated/**",
]

# Extensions indexed when include_patterns is empty
extensions = ["py", "ts", "js", "tsx", "jsx", "go", "java", "rs", "yaml", "yml", "md"]

# Maximum file size to index in bytes (default: 10MB)
max_file_size = 10485760

# Skip paths listed in the project's .gitignore
respect_gitignore = true

[chunking]
# Functions/classes shorter than this fold into module-level units
min_lines = 5

# Classes longer than this are indexed method by method
max_class_lines = 100

# Fixed-size fallback window for files without a structural parser
block_size = 50
block_overlap = 10

[search]
# Fusion weights for normalized lexical and vector scores
lexical_weight = 0.6
vector_weight = 0.4
default_top_k = 5

# BM25 parameters
k1 = 1.5
b = 0.75

[embeddings]
# voyage | hashed | none
# Env override: HCS_EMBEDDING_PROVIDER
provider = "voyage"
model = "voyage-3"
endpoint = "https://api.voyageai.com/v1/embeddings"

# Checked in order; absence of a key disables vector search
api_key_env = ["VOYAGE_API_KEY", "ANTHROPIC_API_KEY"]

batch_size = 96
max_retries = 3
base_delay_ms = 1000
max_delay_ms = 30000
timeout_secs = 60

# Vector size for the local hashed provider
dimensions = 256

[vector]
# memory | hnsw
# Env override: HCS_VECTOR_BACKEND
backend = "memory"

# HNSW graph parameters (hnsw backend only)
max_connections = 16
ef_construction = 200
ef_search = 64
max_elements = 100000
"#
        .to_string()
    }

    /// Write template config to the specified path
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Merge CLI overrides into the configuration
    pub fn with_overrides(
        mut self,
        provider: Option<EmbeddingProviderKind>,
        backend: Option<VectorBackend>,
    ) -> Self {
        if let Some(provider) = provider {
            self.embeddings.provider = provider;
        }
        if let Some(backend) = backend {
            self.vector.backend = backend;
        }
        self
    }
}
