//! Configuration management.
//!
//! Each pipeline stage owns a small config struct with `Default` values and
//! environment-variable overrides, aggregated into [`GraphloreConfig`].
//! Environment keys follow the deployment convention (`CHUNK_SIZE_TOKENS`,
//! `RATE_LIMIT_RPM`, ...) rather than a crate-specific prefix so that the
//! binary drops into existing deployments unchanged.

use std::path::PathBuf;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| {
        let v = v.trim().to_ascii_lowercase();
        matches!(v.as_str(), "1" | "true" | "yes" | "on")
    })
}

/// Chunker parameters.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens.
    pub chunk_size_tokens: usize,
    /// Overlap carried from the previous chunk, in tokens.
    pub chunk_overlap_tokens: usize,
    /// Minimum chunk size in tokens (except possibly the last chunk).
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 1000,
            chunk_overlap_tokens: 300,
            min_chunk_size: 100,
        }
    }
}

impl ChunkingConfig {
    /// Loads chunker configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<usize>("CHUNK_SIZE_TOKENS") {
            self.chunk_size_tokens = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("CHUNK_OVERLAP_TOKENS") {
            self.chunk_overlap_tokens = v;
        }
        if let Some(v) = env_parse::<usize>("MIN_CHUNK_SIZE") {
            self.min_chunk_size = v;
        }
        self
    }
}

/// Extractor parameters.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Number of gleaning passes after the initial extraction (0 disables).
    pub max_gleanings: usize,
    /// Entity types offered to the extraction prompt.
    pub entity_types: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_gleanings: 1,
            entity_types: [
                "PERSON",
                "ORGANIZATION",
                "LOCATION",
                "CONCEPT",
                "EVENT",
                "PRODUCT",
                "OTHER",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

impl ExtractionConfig {
    /// Loads extractor configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<usize>("MAX_GLEANINGS") {
            self.max_gleanings = v;
        }
        self
    }
}

/// Entity resolution (deduplication) parameters.
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// Whether resolution runs at all after extraction.
    pub enabled: bool,
    /// Pairs below this name similarity are never considered duplicates.
    pub similarity_threshold: f64,
    /// Pairs at or above this similarity merge without consulting the LLM.
    pub auto_merge_threshold: f64,
    /// Whether ambiguous pairs go to the LLM disambiguation prompt.
    pub llm_resolution: bool,
    /// Minimum LLM confidence required to merge an ambiguous pair.
    pub llm_merge_threshold: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.85,
            auto_merge_threshold: 0.95,
            llm_resolution: true,
            llm_merge_threshold: 0.9,
        }
    }
}

impl ResolutionConfig {
    /// Loads resolution configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_bool("ENABLE_ENTITY_RESOLUTION") {
            self.enabled = v;
        }
        if let Some(v) = env_parse::<f64>("ENTITY_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_bool("ENABLE_LLM_ENTITY_RESOLUTION") {
            self.llm_resolution = v;
        }
        if let Some(v) = env_parse::<f64>("AUTO_MERGE_CONFIDENCE_THRESHOLD") {
            self.auto_merge_threshold = v.clamp(0.0, 1.0);
        }
        self
    }
}

/// Community detection parameters.
#[derive(Debug, Clone)]
pub struct CommunityConfig {
    /// Seed ordering node visitation in the local-moving phase.
    pub leiden_seed: u64,
    /// Modularity gain below this is treated as no gain.
    pub tolerance: f64,
    /// Maximum hierarchy depth.
    pub max_levels: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            leiden_seed: 42,
            tolerance: 0.0001,
            max_levels: 10,
        }
    }
}

impl CommunityConfig {
    /// Loads community configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<u64>("COMMUNITY_LEIDEN_SEED") {
            self.leiden_seed = v;
        }
        if let Some(v) = env_parse::<usize>("COMMUNITY_MAX_LEVELS") {
            self.max_levels = v.max(1);
        }
        if let Some(v) = env_parse::<f64>("COMMUNITY_TOLERANCE") {
            self.tolerance = v.max(0.0);
        }
        self
    }
}

/// Global (map-reduce) query parameters.
#[derive(Debug, Clone)]
pub struct GlobalQueryConfig {
    /// Whether map-reduce may run at all.
    pub enable_mapreduce: bool,
    /// Communities per map batch.
    pub batch_size: usize,
    /// Community count at or above which map-reduce auto-triggers.
    pub mapreduce_threshold: usize,
    /// Summaries concatenated in the single-shot fallback.
    pub fallback_top_k: usize,
}

impl Default for GlobalQueryConfig {
    fn default() -> Self {
        Self {
            enable_mapreduce: true,
            batch_size: 10,
            mapreduce_threshold: 20,
            fallback_top_k: 10,
        }
    }
}

impl GlobalQueryConfig {
    /// Loads global query configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_bool("ENABLE_MAPREDUCE") {
            self.enable_mapreduce = v;
        }
        if let Some(v) = env_parse::<usize>("MAPREDUCE_BATCH_SIZE") {
            self.batch_size = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("MAPREDUCE_THRESHOLD") {
            self.mapreduce_threshold = v;
        }
        self
    }
}

/// LLM client policy: routing, rate limiting, retries.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Generation model routed to for all completion calls.
    pub model: String,
    /// Maximum LLM requests per minute.
    pub rate_limit_rpm: u32,
    /// Attempts per call (first try included).
    pub retry_max_attempts: u32,
    /// Base delay for exponential backoff, in seconds.
    pub retry_base_seconds: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            rate_limit_rpm: 60,
            retry_max_attempts: 3,
            retry_base_seconds: 1.0,
        }
    }
}

impl LlmConfig {
    /// Loads LLM configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LLM_MODEL") {
            if !v.trim().is_empty() {
                self.model = v;
            }
        }
        if let Some(v) = env_parse::<u32>("RATE_LIMIT_RPM") {
            self.rate_limit_rpm = v.max(1);
        }
        if let Some(v) = env_parse::<u32>("RETRY_MAX_ATTEMPTS") {
            self.retry_max_attempts = v.max(1);
        }
        if let Some(v) = env_parse::<f64>("RETRY_BASE_SECONDS") {
            self.retry_base_seconds = v.max(0.0);
        }
        self
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Embedding model identifier.
    pub model: String,
    /// Fixed vector dimension for the deployment.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
        }
    }
}

impl EmbeddingConfig {
    /// Loads embedding configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            if !v.trim().is_empty() {
                self.model = v;
            }
        }
        if let Some(v) = env_parse::<usize>("EMBEDDING_DIM") {
            self.dimensions = v.max(1);
        }
        self
    }
}

/// Store locations.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the SQLite databases.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./graphlore-data"),
        }
    }
}

impl StorageConfig {
    /// Loads storage configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("GRAPHLORE_DATA_DIR") {
            if !v.trim().is_empty() {
                self.data_dir = PathBuf::from(v);
            }
        }
        self
    }

    /// Path of the graph store database.
    #[must_use]
    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join("graph.db")
    }

    /// Path of the vector store database.
    #[must_use]
    pub fn vector_db_path(&self) -> PathBuf {
        self.data_dir.join("vectors.db")
    }

    /// Path of the relational (documents + query history) database.
    #[must_use]
    pub fn document_db_path(&self) -> PathBuf {
        self.data_dir.join("documents.db")
    }
}

/// Aggregated configuration for the whole system.
#[derive(Debug, Clone, Default)]
pub struct GraphloreConfig {
    /// Chunker parameters.
    pub chunking: ChunkingConfig,
    /// Extractor parameters.
    pub extraction: ExtractionConfig,
    /// Entity resolution parameters.
    pub resolution: ResolutionConfig,
    /// Community detection parameters.
    pub community: CommunityConfig,
    /// Global query parameters.
    pub global_query: GlobalQueryConfig,
    /// LLM client policy.
    pub llm: LlmConfig,
    /// Embedding backend configuration.
    pub embedding: EmbeddingConfig,
    /// Store locations.
    pub storage: StorageConfig,
}

impl GraphloreConfig {
    /// Loads the full configuration from environment variables.
    ///
    /// Reads a `.env` file first when present so local deployments can keep
    /// credentials out of the shell environment.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            chunking: ChunkingConfig::from_env(),
            extraction: ExtractionConfig::from_env(),
            resolution: ResolutionConfig::from_env(),
            community: CommunityConfig::from_env(),
            global_query: GlobalQueryConfig::from_env(),
            llm: LlmConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            storage: StorageConfig::from_env(),
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GraphloreConfig::default();
        assert_eq!(config.chunking.chunk_size_tokens, 1000);
        assert_eq!(config.chunking.chunk_overlap_tokens, 300);
        assert_eq!(config.chunking.min_chunk_size, 100);
        assert_eq!(config.extraction.max_gleanings, 1);
        assert!((config.resolution.similarity_threshold - 0.85).abs() < f64::EPSILON);
        assert!((config.resolution.auto_merge_threshold - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.community.leiden_seed, 42);
        assert_eq!(config.community.max_levels, 10);
        assert_eq!(config.global_query.batch_size, 10);
        assert_eq!(config.global_query.mapreduce_threshold, 20);
        assert_eq!(config.llm.rate_limit_rpm, 60);
        assert_eq!(config.llm.retry_max_attempts, 3);
        assert_eq!(config.embedding.dimensions, 3072);
    }

    #[test]
    fn env_bool_accepts_common_truthy_forms() {
        for v in ["1", "true", "YES", "On"] {
            unsafe { std::env::set_var("GRAPHLORE_TEST_BOOL", v) };
            assert_eq!(env_bool("GRAPHLORE_TEST_BOOL"), Some(true), "{v}");
        }
        unsafe { std::env::set_var("GRAPHLORE_TEST_BOOL", "off") };
        assert_eq!(env_bool("GRAPHLORE_TEST_BOOL"), Some(false));
        unsafe { std::env::remove_var("GRAPHLORE_TEST_BOOL") };
    }
}
