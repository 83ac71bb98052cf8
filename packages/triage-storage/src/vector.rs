use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, Query,
		QueryPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder, value::Kind,
	},
};
use uuid::Uuid;

use crate::Result;

/// Optional fast vector index. Purely advisory: the Postgres scan path stays
/// authoritative and every caller is expected to absorb index failures.
pub struct VectorIndex {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl VectorIndex {
	pub fn new(cfg: &triage_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(&self.collection).await? {
			return Ok(());
		}

		let create = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine));

		self.client.create_collection(create).await?;

		Ok(())
	}

	pub async fn upsert(
		&self,
		issue_key: &str,
		vector: &[f32],
		component: Option<&str>,
		domain: Option<&str>,
	) -> Result<()> {
		let mut payload_map = HashMap::new();

		payload_map.insert("issue_key".to_string(), Value::from(issue_key.to_string()));

		if let Some(component) = component {
			payload_map.insert("component".to_string(), Value::from(component.to_string()));
		}
		if let Some(domain) = domain {
			payload_map.insert("domain".to_string(), Value::from(domain.to_string()));
		}

		let point =
			PointStruct::new(point_id(issue_key), vector.to_vec(), Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Nearest-vector query, optionally payload-filtered by component or
	/// domain. Returns `(issue_key, score)` pairs in descending score order.
	pub async fn query(
		&self,
		vector: &[f32],
		component: Option<&str>,
		domain: Option<&str>,
		limit: u32,
	) -> Result<Vec<(String, f32)>> {
		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.with_payload(true)
			.limit(u64::from(limit));
		let mut must = Vec::new();

		if let Some(component) = component {
			must.push(Condition::matches("component", component.to_string()));
		}
		if let Some(domain) = domain {
			must.push(Condition::matches("domain", domain.to_string()));
		}
		if !must.is_empty() {
			search = search.filter(Filter::must(must));
		}

		let response = self.client.query(search).await?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(issue_key) = payload_string(&point.payload, "issue_key") else {
				continue;
			};

			out.push((issue_key, point.score));
		}

		Ok(out)
	}
}

/// Point ids must be UUIDs or integers; derive a stable UUID from the issue
/// key so re-upserts overwrite in place.
fn point_id(issue_key: &str) -> String {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, issue_key.as_bytes()).to_string()
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}
