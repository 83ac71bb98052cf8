use std::{collections::HashMap, sync::Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
	Processing,
	Completed,
	Error,
}

/// The terminal payload of a successful job. Also the unit the result cache
/// stores, so polling a job and hitting the cache return the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
	pub issue_key: String,
	pub report: String,
	pub analysis: String,
	pub related_issue_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
	pub job_id: Uuid,
	pub fingerprint: String,
	pub issue_key: String,
	/// Prepared artifacts, visible to joiners and pollers before the
	/// generative call lands.
	pub report: String,
	pub related_issue_keys: Vec<String>,
	pub state: JobState,
	pub outcome: Option<JobOutcome>,
	pub error_kind: Option<String>,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub finished_at: Option<OffsetDateTime>,
}

/// Job lifecycle registry. PROCESSING is the only non-terminal state and the
/// only legal transition source; completing or failing a terminal job is a
/// conflict, never a silent overwrite.
pub trait JobStore
where
	Self: Send + Sync,
{
	/// Single-flight entry point: returns the existing PROCESSING job for the
	/// fingerprint, or registers a new one. The bool is true when a new job
	/// was created.
	fn find_or_create(&self, fingerprint: &str, issue_key: &str, now: OffsetDateTime)
	-> (Uuid, bool);

	/// Records the prepared report and related issues on a PROCESSING job so
	/// joiners see them without waiting for completion.
	fn note_prepared(&self, job_id: Uuid, report: &str, related_issue_keys: &[String])
	-> Result<()>;

	fn complete(&self, job_id: Uuid, outcome: JobOutcome, now: OffsetDateTime) -> Result<()>;

	fn fail(&self, job_id: Uuid, kind: &str, message: &str, now: OffsetDateTime) -> Result<()>;

	fn get(&self, job_id: Uuid) -> Result<JobRecord>;

	/// Drops terminal jobs that finished before the cutoff. PROCESSING jobs
	/// are never expired; they anchor the single-flight map.
	fn expire_before(&self, cutoff: OffsetDateTime) -> usize;
}

#[derive(Default)]
pub struct MemoryJobs {
	jobs: Mutex<HashMap<Uuid, JobRecord>>,
}
impl MemoryJobs {
	fn with_job<T>(
		&self,
		job_id: Uuid,
		f: impl FnOnce(&mut JobRecord) -> Result<T>,
	) -> Result<T> {
		let mut jobs = self.jobs.lock().unwrap_or_else(|err| err.into_inner());
		let job = jobs
			.get_mut(&job_id)
			.ok_or_else(|| Error::NotFound { message: format!("Job {job_id} is unknown.") })?;

		f(job)
	}
}
impl JobStore for MemoryJobs {
	fn find_or_create(
		&self,
		fingerprint: &str,
		issue_key: &str,
		now: OffsetDateTime,
	) -> (Uuid, bool) {
		let mut jobs = self.jobs.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(existing) = jobs
			.values()
			.find(|job| job.state == JobState::Processing && job.fingerprint == fingerprint)
		{
			return (existing.job_id, false);
		}

		let job_id = Uuid::new_v4();

		jobs.insert(
			job_id,
			JobRecord {
				job_id,
				fingerprint: fingerprint.to_string(),
				issue_key: issue_key.to_string(),
				report: String::new(),
				related_issue_keys: Vec::new(),
				state: JobState::Processing,
				outcome: None,
				error_kind: None,
				error_message: None,
				created_at: now,
				finished_at: None,
			},
		);

		(job_id, true)
	}

	fn note_prepared(
		&self,
		job_id: Uuid,
		report: &str,
		related_issue_keys: &[String],
	) -> Result<()> {
		self.with_job(job_id, |job| {
			if job.state != JobState::Processing {
				return Err(Error::Conflict {
					message: format!("Job {job_id} is already terminal."),
				});
			}

			job.report = report.to_string();
			job.related_issue_keys = related_issue_keys.to_vec();

			Ok(())
		})
	}

	fn complete(&self, job_id: Uuid, outcome: JobOutcome, now: OffsetDateTime) -> Result<()> {
		self.with_job(job_id, |job| {
			if job.state != JobState::Processing {
				return Err(Error::Conflict {
					message: format!("Job {job_id} is already terminal."),
				});
			}

			job.state = JobState::Completed;
			job.outcome = Some(outcome);
			job.finished_at = Some(now);

			Ok(())
		})
	}

	fn fail(&self, job_id: Uuid, kind: &str, message: &str, now: OffsetDateTime) -> Result<()> {
		self.with_job(job_id, |job| {
			if job.state != JobState::Processing {
				return Err(Error::Conflict {
					message: format!("Job {job_id} is already terminal."),
				});
			}

			job.state = JobState::Error;
			job.error_kind = Some(kind.to_string());
			job.error_message = Some(message.to_string());
			job.finished_at = Some(now);

			Ok(())
		})
	}

	fn get(&self, job_id: Uuid) -> Result<JobRecord> {
		let jobs = self.jobs.lock().unwrap_or_else(|err| err.into_inner());

		jobs.get(&job_id)
			.cloned()
			.ok_or_else(|| Error::NotFound { message: format!("Job {job_id} is unknown.") })
	}

	fn expire_before(&self, cutoff: OffsetDateTime) -> usize {
		let mut jobs = self.jobs.lock().unwrap_or_else(|err| err.into_inner());
		let before = jobs.len();

		jobs.retain(|_, job| match job.finished_at {
			Some(finished_at) => finished_at >= cutoff,
			None => true,
		});

		before - jobs.len()
	}
}
