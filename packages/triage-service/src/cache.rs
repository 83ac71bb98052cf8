use std::{collections::HashMap, sync::Arc, sync::Mutex};

use serde_json::Value;
use time::{Duration, OffsetDateTime};

use triage_storage::{db::Db, queries};

use crate::{Result, jobs::JobOutcome};

/// Volatile fast tier keyed by fingerprint. Implementations may live out of
/// process; every caller treats a fast-tier failure as a miss, never as a
/// request failure.
pub trait FastCache
where
	Self: Send + Sync,
{
	fn get(&self, key: &str, now: OffsetDateTime) -> Result<Option<Value>>;

	fn set(&self, key: &str, value: Value, ttl: Duration, now: OffsetDateTime) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryCache {
	entries: Mutex<HashMap<String, (Value, OffsetDateTime)>>,
}
impl FastCache for MemoryCache {
	fn get(&self, key: &str, now: OffsetDateTime) -> Result<Option<Value>> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let Some((value, expires_at)) = entries.get(key) else {
			return Ok(None);
		};

		if *expires_at <= now {
			entries.remove(key);

			return Ok(None);
		}

		Ok(Some(value.clone()))
	}

	fn set(&self, key: &str, value: Value, ttl: Duration, now: OffsetDateTime) -> Result<()> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.insert(key.to_string(), (value, now + ttl));

		Ok(())
	}
}

/// Two-tier result cache: the fast tier answers first, the durable
/// analysis-run history answers on a fast miss and repopulates the fast
/// tier. Only the durable tier is authoritative.
pub struct ResultCache {
	fast: Arc<dyn FastCache>,
}
impl ResultCache {
	pub fn new(fast: Arc<dyn FastCache>) -> Self {
		Self { fast }
	}

	pub async fn lookup(
		&self,
		db: &Db,
		fingerprint: &str,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<Option<JobOutcome>> {
		if let Some(outcome) = self.fast_lookup(fingerprint, now) {
			return Ok(Some(outcome));
		}

		let Some(run) = queries::latest_completed_run(db, fingerprint).await? else {
			return Ok(None);
		};
		let related_issue_keys = run
			.related_issue_keys
			.and_then(|value| serde_json::from_value(value).ok())
			.unwrap_or_default();
		let outcome = JobOutcome {
			issue_key: run.issue_key,
			report: run.report,
			analysis: run.analysis,
			related_issue_keys,
		};

		self.store(fingerprint, &outcome, ttl, now);

		Ok(Some(outcome))
	}

	pub fn fast_lookup(&self, fingerprint: &str, now: OffsetDateTime) -> Option<JobOutcome> {
		let value = match self.fast.get(fingerprint, now) {
			Ok(value) => value?,
			Err(err) => {
				tracing::warn!(error = %err, "Fast cache read failed; treating as a miss.");

				return None;
			},
		};

		match serde_json::from_value(value) {
			Ok(outcome) => Some(outcome),
			Err(err) => {
				tracing::warn!(error = %err, "Fast cache entry failed to decode; treating as a miss.");

				None
			},
		}
	}

	pub fn store(&self, fingerprint: &str, outcome: &JobOutcome, ttl: Duration, now: OffsetDateTime) {
		let value = match serde_json::to_value(outcome) {
			Ok(value) => value,
			Err(err) => {
				tracing::warn!(error = %err, "Fast cache entry failed to encode; skipping write.");

				return;
			},
		};

		if let Err(err) = self.fast.set(fingerprint, value, ttl, now) {
			tracing::warn!(error = %err, "Fast cache write failed; durable tier still holds the result.");
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::Error;

	use super::*;

	struct FailingCache;

	impl FastCache for FailingCache {
		fn get(&self, _key: &str, _now: OffsetDateTime) -> Result<Option<Value>> {
			Err(Error::Storage { message: "cache down".to_string() })
		}

		fn set(&self, _key: &str, _value: Value, _ttl: Duration, _now: OffsetDateTime) -> Result<()> {
			Err(Error::Storage { message: "cache down".to_string() })
		}
	}

	fn outcome() -> JobOutcome {
		JobOutcome {
			issue_key: "SYSCROS-1".to_string(),
			report: "report".to_string(),
			analysis: "analysis".to_string(),
			related_issue_keys: vec!["SYSCROS-2".to_string()],
		}
	}

	#[test]
	fn entries_expire_at_the_ttl_boundary() {
		let cache = ResultCache::new(Arc::new(MemoryCache::default()));
		let now = OffsetDateTime::now_utc();
		let ttl = Duration::seconds(60);

		cache.store("fp-1", &outcome(), ttl, now);

		assert!(cache.fast_lookup("fp-1", now + Duration::seconds(59)).is_some());
		assert!(cache.fast_lookup("fp-1", now + Duration::seconds(60)).is_none());
	}

	#[test]
	fn misses_are_distinct_per_fingerprint() {
		let cache = ResultCache::new(Arc::new(MemoryCache::default()));
		let now = OffsetDateTime::now_utc();

		cache.store("fp-1", &outcome(), Duration::seconds(60), now);

		assert!(cache.fast_lookup("fp-2", now).is_none());
	}

	#[test]
	fn fast_tier_failures_degrade_to_misses() {
		let cache = ResultCache::new(Arc::new(FailingCache));
		let now = OffsetDateTime::now_utc();

		cache.store("fp-1", &outcome(), Duration::seconds(60), now);

		assert!(cache.fast_lookup("fp-1", now).is_none());
	}

	#[test]
	fn undecodable_entries_are_misses() {
		let fast = Arc::new(MemoryCache::default());
		let cache = ResultCache::new(fast.clone());
		let now = OffsetDateTime::now_utc();

		fast.set("fp-1", serde_json::json!({"not": "an outcome"}), Duration::seconds(60), now)
			.expect("set failed");

		assert!(cache.fast_lookup("fp-1", now).is_none());
	}
}
