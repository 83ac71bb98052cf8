mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Analysis, Classifier, Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers,
	Qdrant, Retry, Search, SearchExpansion, Service, Storage, TrackerConfig,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if let Some(qdrant) = cfg.storage.qdrant.as_ref() {
		if qdrant.url.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.url must be non-empty.".to_string(),
			});
		}
		if qdrant.collection.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.collection must be non-empty.".to_string(),
			});
		}
		if cfg.providers.embedding.dimensions != qdrant.vector_dim {
			return Err(Error::Validation {
				message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
					.to_string(),
			});
		}
	}
	if !(0.0..=1.0).contains(&cfg.search.similarity_threshold) {
		return Err(Error::Validation {
			message: "search.similarity_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.search.top_k == 0 {
		return Err(Error::Validation {
			message: "search.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.search.min_results == 0 {
		return Err(Error::Validation {
			message: "search.min_results must be greater than zero.".to_string(),
		});
	}
	if cfg.search.min_results > cfg.search.top_k {
		return Err(Error::Validation {
			message: "search.min_results must not exceed search.top_k.".to_string(),
		});
	}
	if cfg.search.expansion.max_rounds == 0 {
		return Err(Error::Validation {
			message: "search.expansion.max_rounds must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.classifier.min_margin.is_finite() || cfg.search.classifier.min_margin < 0.0 {
		return Err(Error::Validation {
			message: "search.classifier.min_margin must be a finite number of zero or greater."
				.to_string(),
		});
	}
	if cfg.analysis.cache_ttl_seconds <= 0 {
		return Err(Error::Validation {
			message: "analysis.cache_ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.analysis.llm_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "analysis.llm_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.analysis.job_retention_seconds <= 0 {
		return Err(Error::Validation {
			message: "analysis.job_retention_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.analysis.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "analysis.retry.max_attempts must be greater than zero.".to_string(),
		});
	}

	for (label, key) in
		[("embedding", &cfg.providers.embedding.api_key), ("llm", &cfg.providers.llm.api_key)]
	{
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if let Some(tracker) = cfg.providers.tracker.as_ref() {
		if tracker.base_url.trim().is_empty() {
			return Err(Error::Validation {
				message: "providers.tracker.base_url must be non-empty.".to_string(),
			});
		}
		if tracker.email.trim().is_empty() || tracker.api_token.trim().is_empty() {
			return Err(Error::Validation {
				message: "providers.tracker.email and providers.tracker.api_token must be non-empty."
					.to_string(),
			});
		}
		if tracker.max_results == 0 {
			return Err(Error::Validation {
				message: "providers.tracker.max_results must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if let Some(tracker) = cfg.providers.tracker.as_mut() {
		while tracker.base_url.ends_with('/') {
			tracker.base_url.pop();
		}
		if tracker.project.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
			tracker.project = None;
		}
	}
}
