use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IssueRecord {
	pub issue_key: String,
	pub summary: String,
	pub description: Option<String>,
	pub component: Option<String>,
	pub os: Option<String>,
	pub domain: Option<String>,
	pub status: Option<String>,
	pub priority: Option<String>,
	pub labels: Option<Value>,
	pub related_issue_keys: Option<Value>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IssueEmbedding {
	pub issue_key: String,
	pub vec: Vec<f32>,
	pub embedding_version: String,
	pub created_at: OffsetDateTime,
}

/// One durable record per completed root-cause computation. Append-only;
/// idempotency is enforced by the in-process single-flight map, the table
/// just holds the facts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRun {
	pub run_id: Uuid,
	pub fingerprint: String,
	pub issue_key: String,
	pub domain: Option<String>,
	pub os: Option<String>,
	pub report: String,
	pub analysis: String,
	pub status: String,
	pub related_issue_keys: Option<Value>,
	pub created_at: OffsetDateTime,
}

/// Issue join row used by the similarity tiers: the candidate's vector plus
/// the recency tie-breaker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmbeddingCandidate {
	pub issue_key: String,
	pub vec: Vec<f32>,
	pub updated_at: OffsetDateTime,
}

/// Training row for the domain classifier.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClassifierRow {
	pub summary: String,
	pub component: Option<String>,
	pub domain: String,
	pub labels: Option<Value>,
}
