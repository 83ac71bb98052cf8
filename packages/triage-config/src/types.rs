use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	pub analysis: Analysis,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// Optional fast vector index. Absence routes every similarity tier to the
	/// Postgres scan path.
	pub qdrant: Option<Qdrant>,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
	/// Optional external issue tracker. Absence disables the external search
	/// tier of the similarity resolver.
	pub tracker: Option<TrackerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}
impl EmbeddingProviderConfig {
	/// Version tag stored alongside every vector. Vectors carrying a different
	/// tag are stale and must be re-embedded, never compared.
	pub fn embedding_version(&self) -> String {
		format!("{}:{}:{}", self.provider_id, self.model, self.dimensions)
	}
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
	pub base_url: String,
	pub email: String,
	pub api_token: String,
	pub project: Option<String>,
	pub timeout_ms: u64,
	pub max_results: u32,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	pub similarity_threshold: f32,
	pub top_k: u32,
	pub min_results: u32,
	pub expansion: SearchExpansion,
	pub classifier: Classifier,
}

#[derive(Debug, Deserialize)]
pub struct SearchExpansion {
	pub max_rounds: u32,
}

#[derive(Debug, Deserialize)]
pub struct Classifier {
	pub enabled: bool,
	#[serde(default = "default_classifier_version")]
	pub version: String,
	#[serde(default = "default_classifier_min_margin")]
	pub min_margin: f32,
}

#[derive(Debug, Deserialize)]
pub struct Analysis {
	pub cache_ttl_seconds: i64,
	pub llm_timeout_ms: u64,
	pub job_retention_seconds: i64,
	pub retry: Retry,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
}

fn default_classifier_version() -> String {
	"v1".to_string()
}

fn default_classifier_min_margin() -> f32 {
	0.15
}
