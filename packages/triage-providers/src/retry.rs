use std::{future::Future, time::Duration};

use triage_config::Retry;

use crate::{Error, Result};

const MAX_BACKOFF_MS: u64 = 30_000;

/// Retries retryable provider faults with exponential backoff, up to
/// `retry.max_attempts` total attempts. Non-retryable faults surface
/// immediately.
pub async fn with_backoff<T, F, Fut>(retry: &Retry, label: &str, mut call: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut backoff = Duration::from_millis(retry.base_backoff_ms);
	let mut attempt = 0;

	loop {
		attempt += 1;

		match call().await {
			Ok(value) => return Ok(value),
			Err(err) => {
				if !err.is_retryable() || attempt >= retry.max_attempts {
					return Err(err);
				}

				tracing::warn!(
					error = %err,
					provider = label,
					attempt,
					max_attempts = retry.max_attempts,
					"Provider call failed; backing off."
				);

				tokio::time::sleep(backoff).await;

				backoff = backoff.saturating_mul(2).min(Duration::from_millis(MAX_BACKOFF_MS));
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};

	use super::*;

	fn test_retry() -> Retry {
		Retry { max_attempts: 3, base_backoff_ms: 1 }
	}

	#[tokio::test]
	async fn succeeds_after_transient_failures() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let result = with_backoff(&test_retry(), "test", move || {
			let counter = counter.clone();

			async move {
				if counter.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(Error::Timeout)
				} else {
					Ok(42)
				}
			}
		})
		.await;

		assert_eq!(result.expect("retry failed"), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn non_retryable_faults_fail_fast() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let result: Result<()> = with_backoff(&test_retry(), "test", move || {
			let counter = counter.clone();

			async move {
				counter.fetch_add(1, Ordering::SeqCst);

				Err(Error::Auth)
			}
		})
		.await;

		assert!(matches!(result, Err(Error::Auth)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn exhaustion_returns_the_last_error() {
		let result: Result<()> =
			with_backoff(&test_retry(), "test", || async { Err(Error::RateLimited) }).await;

		assert!(matches!(result, Err(Error::RateLimited)));
	}
}
