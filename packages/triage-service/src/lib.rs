pub mod analyze;
pub mod cache;
pub mod classify;
pub mod jobs;
pub mod similarity;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

pub use analyze::{AnalysisMode, AnalysisStatus, AnalyzeRequest, AnalyzeResponse, JobErrorInfo};
pub use cache::{FastCache, MemoryCache, ResultCache};
pub use jobs::{JobOutcome, JobRecord, JobState, JobStore, MemoryJobs};
pub use similarity::{RelatedIssue, RelatedQuery, Tier};

use tracing_subscriber::EnvFilter;

use triage_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, TrackerConfig};
use triage_providers::{embedding, generative, tracker, tracker::TrackerHit};
use triage_storage::{db::Db, vector::VectorIndex};

/// Installs the process-wide subscriber at the configured level. A second
/// call is a no-op so embedding hosts keep their own setup.
pub fn init_tracing(cfg: &Config) {
	let filter =
		EnvFilter::try_new(&cfg.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, triage_providers::Result<Vec<Vec<f32>>>>;
}

pub trait GenerativeProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, triage_providers::Result<String>>;
}

pub trait TrackerSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a TrackerConfig,
		jql: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, triage_providers::Result<Vec<TrackerHit>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generative: Arc<dyn GenerativeProvider>,
	pub tracker: Arc<dyn TrackerSearchProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generative: Arc<dyn GenerativeProvider>,
		tracker: Arc<dyn TrackerSearchProvider>,
	) -> Self {
		Self { embedding, generative, tracker }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), generative: provider.clone(), tracker: provider }
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, triage_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl GenerativeProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, triage_providers::Result<String>> {
		Box::pin(generative::complete(cfg, messages))
	}
}

impl TrackerSearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a TrackerConfig,
		jql: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, triage_providers::Result<Vec<TrackerHit>>> {
		Box::pin(tracker::search(cfg, jql, max_results))
	}
}

pub struct TriageService {
	pub cfg: Config,
	pub db: Db,
	pub vector: Option<VectorIndex>,
	pub providers: Providers,
	pub jobs: Arc<dyn JobStore>,
	pub cache: ResultCache,
}
impl TriageService {
	pub fn new(cfg: Config, db: Db, vector: Option<VectorIndex>) -> Self {
		Self::with_providers(cfg, db, vector, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		db: Db,
		vector: Option<VectorIndex>,
		providers: Providers,
	) -> Self {
		Self {
			cfg,
			db,
			vector,
			providers,
			jobs: Arc::new(MemoryJobs::default()),
			cache: ResultCache::new(Arc::new(MemoryCache::default())),
		}
	}

	/// Connects storage from config, bootstrapping the schema and the vector
	/// collection when one is configured.
	pub async fn connect(cfg: Config, providers: Providers) -> Result<Self> {
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema().await?;

		let vector = match &cfg.storage.qdrant {
			Some(qdrant_cfg) => {
				let index = VectorIndex::new(qdrant_cfg)?;

				index.ensure_collection().await?;

				Some(index)
			},
			None => None,
		};

		Ok(Self::with_providers(cfg, db, vector, providers))
	}
}
