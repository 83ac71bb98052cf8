use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use triage_domain::{
	fingerprint::{self, FingerprintInput},
	report::{RelatedEntry, ReportIssue, render_report},
	text::{self, IssueText},
};
use triage_storage::{
	models::AnalysisRun,
	queries::{self, IssueUpsert},
};

use crate::{
	Error, Result, TriageService,
	classify::DomainClassifier,
	jobs::{JobOutcome, JobState},
	similarity::RelatedQuery,
};

const CLASSIFIER_TRAINING_LIMIT: i64 = 2_000;

const STATUS_COMPLETED: &str = "COMPLETED";
const STATUS_SKIPPED: &str = "SKIPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
	/// Report and similar issues only; no generative call, no job.
	Skip,
	/// The generative call completes before the response returns.
	Sync,
	/// The generative call runs on a background job; poll with `get_job`.
	#[default]
	Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
	Processing,
	Completed,
	Error,
	Skipped,
	Cached,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
	pub issue_key: String,
	pub summary: String,
	pub component: Option<String>,
	pub os: Option<String>,
	pub logs: Option<String>,
	pub notes: Option<String>,
	#[serde(default)]
	pub mode: AnalysisMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobErrorInfo {
	pub kind: String,
	pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
	pub issue_key: String,
	pub report: String,
	pub analysis: String,
	pub analysis_status: AnalysisStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub job_id: Option<Uuid>,
	pub related_issue_keys: Vec<String>,
	pub cache_hit: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<JobErrorInfo>,
}

/// Everything the orchestrator computes before the mode branch: the issue is
/// upserted, its embedding is current, related issues are resolved and
/// persisted, and the report is rendered.
struct PreparedAnalysis {
	domain: Option<String>,
	report: String,
	related_issue_keys: Vec<String>,
}

struct JobArgs {
	job_id: Uuid,
	fingerprint: String,
	issue_key: String,
	domain: Option<String>,
	os: Option<String>,
	report: String,
	related_issue_keys: Vec<String>,
}

impl TriageService {
	/// The triage entry point. Identical requests under identical
	/// configuration share one fingerprint, which drives both the result
	/// cache and the single-flight job map.
	pub async fn analyze(self: &Arc<Self>, req: AnalyzeRequest) -> Result<AnalyzeResponse> {
		if req.issue_key.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "issue_key must not be blank.".to_string() });
		}
		if req.summary.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "summary must not be blank.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let retention = Duration::seconds(self.cfg.analysis.job_retention_seconds);
		let expired = self.jobs.expire_before(now - retention);

		if expired > 0 {
			tracing::debug!(expired, "Expired terminal jobs.");
		}

		let snapshot = fingerprint::config_snapshot(&self.cfg);
		let fp = fingerprint::fingerprint(
			&FingerprintInput {
				issue_key: &req.issue_key,
				summary: &req.summary,
				logs: req.logs.as_deref(),
				component: req.component.as_deref(),
				os: req.os.as_deref(),
				notes: req.notes.as_deref(),
			},
			&snapshot,
		);
		let ttl = Duration::seconds(self.cfg.analysis.cache_ttl_seconds);

		if let Some(outcome) = self.cache.lookup(&self.db, &fp, ttl, now).await? {
			tracing::info!(issue_key = %req.issue_key, fingerprint = %fp, "Analysis served from cache.");

			return Ok(AnalyzeResponse {
				issue_key: outcome.issue_key,
				report: outcome.report,
				analysis: outcome.analysis,
				analysis_status: AnalysisStatus::Cached,
				job_id: None,
				related_issue_keys: outcome.related_issue_keys,
				cache_hit: true,
				error: None,
			});
		}

		// Every mode registers the fingerprint, so concurrent identical
		// requests share one preparation pass regardless of mode.
		let (job_id, created) = self.jobs.find_or_create(&fp, &req.issue_key, now);

		if !created {
			let record = self.jobs.get(job_id)?;

			tracing::info!(issue_key = %req.issue_key, job_id = %job_id, "Joined an in-flight analysis.");

			return Ok(AnalyzeResponse {
				issue_key: req.issue_key,
				report: record.report,
				analysis: String::new(),
				analysis_status: AnalysisStatus::Processing,
				job_id: Some(job_id),
				related_issue_keys: record.related_issue_keys,
				cache_hit: false,
				error: None,
			});
		}

		let prepared = match self.prepare(&req, now).await {
			Ok(prepared) => prepared,
			Err(err) => {
				self.fail_job(job_id, &err, now);

				return Err(err);
			},
		};

		if let Err(err) =
			self.jobs.note_prepared(job_id, &prepared.report, &prepared.related_issue_keys)
		{
			tracing::warn!(error = %err, job_id = %job_id, "Failed to record the prepared report.");
		}
		if req.mode == AnalysisMode::Skip {
			let run = AnalysisRun {
				run_id: Uuid::new_v4(),
				fingerprint: fp,
				issue_key: req.issue_key.clone(),
				domain: prepared.domain,
				os: req.os.clone(),
				report: prepared.report.clone(),
				analysis: String::new(),
				status: STATUS_SKIPPED.to_string(),
				related_issue_keys: Some(serde_json::json!(prepared.related_issue_keys)),
				created_at: now,
			};

			if let Err(err) = queries::insert_analysis_run(&self.db, &run).await {
				let err = Error::from(err);

				self.fail_job(job_id, &err, now);

				return Err(err);
			}

			// Completing the transient job releases the fingerprint; skipped
			// runs never reach the result cache.
			self.jobs.complete(
				job_id,
				JobOutcome {
					issue_key: req.issue_key.clone(),
					report: prepared.report.clone(),
					analysis: String::new(),
					related_issue_keys: prepared.related_issue_keys.clone(),
				},
				OffsetDateTime::now_utc(),
			)?;

			return Ok(AnalyzeResponse {
				issue_key: req.issue_key,
				report: prepared.report,
				analysis: String::new(),
				analysis_status: AnalysisStatus::Skipped,
				job_id: None,
				related_issue_keys: prepared.related_issue_keys,
				cache_hit: false,
				error: None,
			});
		}

		let args = JobArgs {
			job_id,
			fingerprint: fp,
			issue_key: req.issue_key.clone(),
			domain: prepared.domain,
			os: req.os.clone(),
			report: prepared.report.clone(),
			related_issue_keys: prepared.related_issue_keys.clone(),
		};

		if req.mode == AnalysisMode::Sync {
			let analysis = match self.generate_analysis(&args.report, req.notes.as_deref()).await {
				Ok(analysis) => analysis,
				Err(err) => {
					self.fail_job(job_id, &err, OffsetDateTime::now_utc());

					return Err(err);
				},
			};

			self.finish_job(args, analysis.clone()).await?;

			return Ok(AnalyzeResponse {
				issue_key: req.issue_key,
				report: prepared.report,
				analysis,
				analysis_status: AnalysisStatus::Completed,
				job_id: Some(job_id),
				related_issue_keys: prepared.related_issue_keys,
				cache_hit: false,
				error: None,
			});
		}

		let service = self.clone();
		let notes = req.notes.clone();

		tokio::spawn(async move {
			service.run_analysis_job(args, notes.as_deref()).await;
		});

		Ok(AnalyzeResponse {
			issue_key: req.issue_key,
			report: prepared.report,
			analysis: String::new(),
			analysis_status: AnalysisStatus::Processing,
			job_id: Some(job_id),
			related_issue_keys: prepared.related_issue_keys,
			cache_hit: false,
			error: None,
		})
	}

	pub fn get_job(&self, job_id: Uuid) -> Result<AnalyzeResponse> {
		let record = self.jobs.get(job_id)?;

		Ok(match record.state {
			JobState::Processing => AnalyzeResponse {
				issue_key: record.issue_key,
				report: record.report,
				analysis: String::new(),
				analysis_status: AnalysisStatus::Processing,
				job_id: Some(job_id),
				related_issue_keys: record.related_issue_keys,
				cache_hit: false,
				error: None,
			},
			JobState::Completed => {
				let outcome = record.outcome.unwrap_or(JobOutcome {
					issue_key: record.issue_key,
					report: String::new(),
					analysis: String::new(),
					related_issue_keys: Vec::new(),
				});

				AnalyzeResponse {
					issue_key: outcome.issue_key,
					report: outcome.report,
					analysis: outcome.analysis,
					analysis_status: AnalysisStatus::Completed,
					job_id: Some(job_id),
					related_issue_keys: outcome.related_issue_keys,
					cache_hit: false,
					error: None,
				}
			},
			JobState::Error => AnalyzeResponse {
				issue_key: record.issue_key,
				report: String::new(),
				analysis: String::new(),
				analysis_status: AnalysisStatus::Error,
				job_id: Some(job_id),
				related_issue_keys: Vec::new(),
				cache_hit: false,
				error: Some(JobErrorInfo {
					kind: record.error_kind.unwrap_or_else(|| "UNKNOWN".to_string()),
					message: record.error_message.unwrap_or_default(),
				}),
			},
		})
	}

	async fn prepare(&self, req: &AnalyzeRequest, now: OffsetDateTime) -> Result<PreparedAnalysis> {
		let prior = queries::fetch_issue(&self.db, &req.issue_key).await?;
		let domain = match prior.as_ref().and_then(|issue| issue.domain.clone()) {
			Some(domain) => Some(domain),
			None => self.classify_domain(req).await?,
		};

		queries::upsert_issue(
			&self.db,
			&IssueUpsert {
				issue_key: req.issue_key.clone(),
				summary: req.summary.clone(),
				description: None,
				component: req.component.clone(),
				os: req.os.clone(),
				domain: domain.clone(),
				status: None,
				priority: None,
				labels: None,
			},
			now,
		)
		.await?;

		let description = prior.as_ref().and_then(|issue| issue.description.clone());
		let labels = prior
			.as_ref()
			.and_then(|issue| issue.labels.clone())
			.and_then(|value| serde_json::from_value::<Vec<String>>(value).ok())
			.unwrap_or_default();
		let summary_changed =
			prior.as_ref().map(|issue| issue.summary != req.summary).unwrap_or(true);

		self.ensure_embedding(req, description.as_deref(), &labels, domain.as_deref(), summary_changed, now)
			.await?;

		let signals =
			req.logs.as_deref().map(text::extract_log_signals).unwrap_or_default();
		let query_text = if signals.is_empty() {
			req.summary.clone()
		} else {
			format!("{}\n{}", req.summary, signals.join("\n"))
		};
		let related = self
			.find_related(&RelatedQuery {
				query_text: &query_text,
				component: req.component.as_deref(),
				domain: domain.as_deref(),
				exclude_issue_key: Some(&req.issue_key),
				limit: self.cfg.search.top_k,
				min_results: self.cfg.search.min_results,
			})
			.await?;
		let related_issue_keys: Vec<String> =
			related.iter().map(|hit| hit.issue_key.clone()).collect();

		queries::set_related_issue_keys(&self.db, &req.issue_key, &related_issue_keys, now).await?;

		let summaries = queries::summaries_for_keys(&self.db, &related_issue_keys).await?;
		let entries: Vec<RelatedEntry> = related
			.iter()
			.map(|hit| RelatedEntry {
				issue_key: hit.issue_key.clone(),
				score: hit.score,
				summary: summaries
					.iter()
					.find(|(issue_key, _)| *issue_key == hit.issue_key)
					.map(|(_, summary)| summary.clone()),
			})
			.collect();
		let report = render_report(
			&ReportIssue {
				issue_key: &req.issue_key,
				summary: &req.summary,
				description: description.as_deref(),
				component: req.component.as_deref(),
				os: req.os.as_deref(),
				domain: domain.as_deref(),
				logs: req.logs.as_deref(),
			},
			&entries,
		);

		Ok(PreparedAnalysis { domain, report, related_issue_keys })
	}

	/// Domain inference for unlabeled intake. Only consulted when the issue
	/// has no stored domain; a request with a component scopes tier one by
	/// component anyway, so the classifier stays out of its way.
	async fn classify_domain(&self, req: &AnalyzeRequest) -> Result<Option<String>> {
		if req.component.is_some() || !self.cfg.search.classifier.enabled {
			return Ok(None);
		}

		let rows = queries::classifier_rows(&self.db, CLASSIFIER_TRAINING_LIMIT).await?;
		let classifier = DomainClassifier::train(&rows);

		if classifier.is_empty() {
			return Ok(None);
		}

		let signals =
			req.logs.as_deref().map(text::extract_log_signals).unwrap_or_default();
		let text = if signals.is_empty() {
			req.summary.clone()
		} else {
			format!("{} {}", req.summary, signals.join(" "))
		};
		let domain = classifier.classify(&text, self.cfg.search.classifier.min_margin);

		if let Some(domain) = &domain {
			tracing::info!(issue_key = %req.issue_key, domain = %domain, "Classified issue domain.");
		}

		Ok(domain)
	}

	/// Re-embeds the issue document when its vector is missing, stale under
	/// the current embedding version, or built from an outdated summary. The
	/// vector index write is advisory; Postgres keeps the authoritative copy.
	async fn ensure_embedding(
		&self,
		req: &AnalyzeRequest,
		description: Option<&str>,
		labels: &[String],
		domain: Option<&str>,
		summary_changed: bool,
		now: OffsetDateTime,
	) -> Result<()> {
		let embedding_version = self.cfg.providers.embedding.embedding_version();
		let existing = queries::fetch_embedding(&self.db, &req.issue_key).await?;
		let current = existing
			.as_ref()
			.map(|embedding| embedding.embedding_version == embedding_version)
			.unwrap_or(false);

		if current && !summary_changed {
			return Ok(());
		}

		let doc_text = text::build_embedding_text(&IssueText {
			issue_key: &req.issue_key,
			summary: &req.summary,
			description,
			component: req.component.as_deref(),
			os: req.os.as_deref(),
			domain,
			labels,
			logs: None,
		});
		let texts = vec![doc_text];
		let vectors =
			triage_providers::retry::with_backoff(&self.cfg.analysis.retry, "embedding", || {
				self.providers.embedding.embed(&self.cfg.providers.embedding, &texts)
			})
			.await?;
		let vector = vectors.into_iter().next().ok_or_else(|| Error::Provider {
			kind: "INVALID_RESPONSE".to_string(),
			message: "Embedding response was empty.".to_string(),
		})?;

		queries::upsert_embedding(&self.db, &req.issue_key, &vector, &embedding_version, now)
			.await?;

		if let Some(index) = &self.vector
			&& let Err(err) =
				index.upsert(&req.issue_key, &vector, req.component.as_deref(), domain).await
		{
			tracing::warn!(
				error = %err,
				issue_key = %req.issue_key,
				"Vector index upsert failed; the Postgres scan stays authoritative."
			);
		}

		Ok(())
	}

	/// The generative call, bounded by the configured deadline with retryable
	/// faults retried inside it. A deadline overrun reports as a retryable
	/// TIMEOUT on the job.
	async fn generate_analysis(&self, report: &str, notes: Option<&str>) -> Result<String> {
		let messages = analysis_messages(report, notes);
		let deadline = std::time::Duration::from_millis(self.cfg.analysis.llm_timeout_ms);
		let result = tokio::time::timeout(
			deadline,
			triage_providers::retry::with_backoff(&self.cfg.analysis.retry, "llm", || {
				self.providers.generative.complete(&self.cfg.providers.llm, &messages)
			}),
		)
		.await;

		match result {
			Ok(inner) => Ok(inner?),
			Err(_) => Err(Error::Provider {
				kind: "TIMEOUT".to_string(),
				message: "Analysis generation exceeded the configured deadline.".to_string(),
			}),
		}
	}

	async fn run_analysis_job(&self, args: JobArgs, notes: Option<&str>) {
		let job_id = args.job_id;

		match self.generate_analysis(&args.report, notes).await {
			Ok(analysis) =>
				if let Err(err) = self.finish_job(args, analysis).await {
					tracing::error!(error = %err, job_id = %job_id, "Failed to finish the analysis job.");
				},
			Err(err) => {
				tracing::warn!(error = %err, job_id = %job_id, "Analysis job failed.");

				self.fail_job(job_id, &err, OffsetDateTime::now_utc());
			},
		}
	}

	/// The single completion point for both sync and async paths: persist the
	/// durable run, populate the fast cache, then flip the job to COMPLETED.
	async fn finish_job(&self, args: JobArgs, analysis: String) -> Result<()> {
		let now = OffsetDateTime::now_utc();
		let run = AnalysisRun {
			run_id: Uuid::new_v4(),
			fingerprint: args.fingerprint.clone(),
			issue_key: args.issue_key.clone(),
			domain: args.domain.clone(),
			os: args.os.clone(),
			report: args.report.clone(),
			analysis: analysis.clone(),
			status: STATUS_COMPLETED.to_string(),
			related_issue_keys: Some(serde_json::json!(args.related_issue_keys)),
			created_at: now,
		};

		if let Err(err) = queries::insert_analysis_run(&self.db, &run).await {
			let err = Error::from(err);

			self.fail_job(args.job_id, &err, now);

			return Err(err);
		}

		let outcome = JobOutcome {
			issue_key: args.issue_key,
			report: args.report,
			analysis,
			related_issue_keys: args.related_issue_keys,
		};
		let ttl = Duration::seconds(self.cfg.analysis.cache_ttl_seconds);

		self.cache.store(&args.fingerprint, &outcome, ttl, now);
		self.jobs.complete(args.job_id, outcome, now)?;

		Ok(())
	}

	fn fail_job(&self, job_id: Uuid, err: &Error, now: OffsetDateTime) {
		if let Err(fail_err) = self.jobs.fail(job_id, &error_kind(err), &err.to_string(), now) {
			tracing::warn!(error = %fail_err, job_id = %job_id, "Failed to mark the job as errored.");
		}
	}
}

fn error_kind(err: &Error) -> String {
	match err {
		Error::Provider { kind, .. } => kind.clone(),
		Error::InvalidRequest { .. } => "INVALID_REQUEST".to_string(),
		Error::NotFound { .. } => "NOT_FOUND".to_string(),
		Error::Conflict { .. } => "CONFLICT".to_string(),
		Error::Storage { .. } => "STORAGE".to_string(),
		Error::VectorIndex { .. } => "VECTOR_INDEX".to_string(),
	}
}

fn analysis_messages(report: &str, notes: Option<&str>) -> Vec<Value> {
	let mut user = format!(
		"Analyze this defect report and propose the most likely root cause, \
		the affected area, and concrete next debugging steps.\n\n{report}"
	);

	if let Some(notes) = notes.map(str::trim).filter(|notes| !notes.is_empty()) {
		user.push_str(&format!("\n\nTriager notes:\n{notes}"));
	}

	vec![
		serde_json::json!({
			"role": "system",
			"content": "You are a defect triage engineer. Ground every claim in the \
			report; say so explicitly when the evidence is inconclusive.",
		}),
		serde_json::json!({ "role": "user", "content": user }),
	]
}
