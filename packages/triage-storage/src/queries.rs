use serde_json::Value;
use time::OffsetDateTime;

use crate::{
	Result,
	db::Db,
	models::{AnalysisRun, ClassifierRow, EmbeddingCandidate, IssueEmbedding, IssueRecord},
};

#[derive(Debug, Clone)]
pub struct IssueUpsert {
	pub issue_key: String,
	pub summary: String,
	pub description: Option<String>,
	pub component: Option<String>,
	pub os: Option<String>,
	pub domain: Option<String>,
	pub status: Option<String>,
	pub priority: Option<String>,
	pub labels: Option<Value>,
}

/// Transactional upsert keyed by issue_key. Absent optional fields keep the
/// stored value instead of erasing it; intake requests rarely carry the full
/// record.
pub async fn upsert_issue(db: &Db, issue: &IssueUpsert, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO issues (
	issue_key,
	summary,
	description,
	component,
	os,
	domain,
	status,
	priority,
	labels,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
ON CONFLICT (issue_key) DO UPDATE
SET
	summary = EXCLUDED.summary,
	description = COALESCE(EXCLUDED.description, issues.description),
	component = COALESCE(EXCLUDED.component, issues.component),
	os = COALESCE(EXCLUDED.os, issues.os),
	domain = COALESCE(EXCLUDED.domain, issues.domain),
	status = COALESCE(EXCLUDED.status, issues.status),
	priority = COALESCE(EXCLUDED.priority, issues.priority),
	labels = COALESCE(EXCLUDED.labels, issues.labels),
	updated_at = EXCLUDED.updated_at",
	)
	.bind(issue.issue_key.as_str())
	.bind(issue.summary.as_str())
	.bind(issue.description.as_deref())
	.bind(issue.component.as_deref())
	.bind(issue.os.as_deref())
	.bind(issue.domain.as_deref())
	.bind(issue.status.as_deref())
	.bind(issue.priority.as_deref())
	.bind(issue.labels.as_ref())
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn fetch_issue(db: &Db, issue_key: &str) -> Result<Option<IssueRecord>> {
	let issue = sqlx::query_as::<_, IssueRecord>(
		"\
SELECT issue_key, summary, description, component, os, domain, status, priority, labels,
	related_issue_keys, created_at, updated_at
FROM issues
WHERE issue_key = $1",
	)
	.bind(issue_key)
	.fetch_optional(&db.pool)
	.await?;

	Ok(issue)
}

pub async fn set_related_issue_keys(
	db: &Db,
	issue_key: &str,
	related: &[String],
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE issues
SET related_issue_keys = $1, updated_at = $2
WHERE issue_key = $3",
	)
	.bind(serde_json::json!(related))
	.bind(now)
	.bind(issue_key)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn upsert_embedding(
	db: &Db,
	issue_key: &str,
	vec: &[f32],
	embedding_version: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO issue_embeddings (issue_key, vec, embedding_version, created_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (issue_key) DO UPDATE
SET vec = EXCLUDED.vec, embedding_version = EXCLUDED.embedding_version,
	created_at = EXCLUDED.created_at",
	)
	.bind(issue_key)
	.bind(vec)
	.bind(embedding_version)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn fetch_embedding(db: &Db, issue_key: &str) -> Result<Option<IssueEmbedding>> {
	let embedding = sqlx::query_as::<_, IssueEmbedding>(
		"\
SELECT issue_key, vec, embedding_version, created_at
FROM issue_embeddings
WHERE issue_key = $1",
	)
	.bind(issue_key)
	.fetch_optional(&db.pool)
	.await?;

	Ok(embedding)
}

/// Candidate vectors for one similarity tier. Only vectors carrying the
/// current embedding version participate; stale vectors wait for re-embedding
/// rather than being compared across dimensionalities.
pub async fn embedding_candidates(
	db: &Db,
	embedding_version: &str,
	component: Option<&str>,
	domain: Option<&str>,
	exclude_issue_key: Option<&str>,
) -> Result<Vec<EmbeddingCandidate>> {
	let mut builder = sqlx::QueryBuilder::new(
		"SELECT e.issue_key, e.vec, i.updated_at \
         FROM issue_embeddings e JOIN issues i ON i.issue_key = e.issue_key \
         WHERE e.embedding_version = ",
	);

	builder.push_bind(embedding_version);

	if let Some(component) = component {
		builder.push(" AND i.component = ");
		builder.push_bind(component);
	}
	if let Some(domain) = domain {
		builder.push(" AND i.domain = ");
		builder.push_bind(domain);
	}
	if let Some(exclude) = exclude_issue_key {
		builder.push(" AND e.issue_key != ");
		builder.push_bind(exclude);
	}

	builder.push(" ORDER BY i.updated_at DESC");

	let candidates: Vec<EmbeddingCandidate> =
		builder.build_query_as().fetch_all(&db.pool).await?;

	Ok(candidates)
}

pub async fn insert_analysis_run(db: &Db, run: &AnalysisRun) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO analysis_runs (
	run_id,
	fingerprint,
	issue_key,
	domain,
	os,
	report,
	analysis,
	status,
	related_issue_keys,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
	)
	.bind(run.run_id)
	.bind(run.fingerprint.as_str())
	.bind(run.issue_key.as_str())
	.bind(run.domain.as_deref())
	.bind(run.os.as_deref())
	.bind(run.report.as_str())
	.bind(run.analysis.as_str())
	.bind(run.status.as_str())
	.bind(run.related_issue_keys.as_ref())
	.bind(run.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Durable cache tier: the most recent completed run for a fingerprint.
pub async fn latest_completed_run(db: &Db, fingerprint: &str) -> Result<Option<AnalysisRun>> {
	let run = sqlx::query_as::<_, AnalysisRun>(
		"\
SELECT run_id, fingerprint, issue_key, domain, os, report, analysis, status,
	related_issue_keys, created_at
FROM analysis_runs
WHERE fingerprint = $1 AND status = 'COMPLETED'
ORDER BY created_at DESC
LIMIT 1",
	)
	.bind(fingerprint)
	.fetch_optional(&db.pool)
	.await?;

	Ok(run)
}

/// Labeled issues the domain classifier trains on.
pub async fn classifier_rows(db: &Db, limit: i64) -> Result<Vec<ClassifierRow>> {
	let rows = sqlx::query_as::<_, ClassifierRow>(
		"\
SELECT summary, component, domain, labels
FROM issues
WHERE domain IS NOT NULL
ORDER BY updated_at DESC
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn summaries_for_keys(db: &Db, keys: &[String]) -> Result<Vec<(String, String)>> {
	if keys.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, (String, String)>(
		"\
SELECT issue_key, summary
FROM issues
WHERE issue_key = ANY($1)",
	)
	.bind(keys)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}
