use serde::Serialize;

use triage_domain::similarity::cosine_similarity;
use triage_storage::queries;

use crate::{Error, Result, TriageService};

const MAX_QUERY_TERMS: usize = 8;
const QUERY_STOPWORDS: [&str; 12] =
	["after", "and", "for", "from", "not", "of", "on", "the", "when", "while", "with", "without"];

/// Which fallback tier produced a hit. A hit keeps the tier that found it
/// first even when a later tier re-scores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
	Component,
	Domain,
	Global,
	Tracker,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedIssue {
	pub issue_key: String,
	pub score: f32,
	pub tier: Tier,
}

#[derive(Debug, Clone)]
pub struct RelatedQuery<'a> {
	pub query_text: &'a str,
	pub component: Option<&'a str>,
	pub domain: Option<&'a str>,
	pub exclude_issue_key: Option<&'a str>,
	pub limit: u32,
	pub min_results: u32,
}

impl TriageService {
	/// Resolves similar issues through the tier ladder: component-scoped,
	/// domain-scoped, global, then the external tracker. Each tier only runs
	/// while the merged result set is still short of `min_results`; the
	/// external tier only runs when no local tier produced enough evidence.
	pub async fn find_related(&self, query: &RelatedQuery<'_>) -> Result<Vec<RelatedIssue>> {
		if query.limit == 0 {
			return Err(Error::InvalidRequest { message: "limit must be positive.".to_string() });
		}

		let texts = vec![query.query_text.to_string()];
		let vectors =
			triage_providers::retry::with_backoff(&self.cfg.analysis.retry, "embedding", || {
				self.providers.embedding.embed(&self.cfg.providers.embedding, &texts)
			})
			.await?;
		let query_vec = vectors.into_iter().next().ok_or_else(|| Error::Provider {
			kind: "INVALID_RESPONSE".to_string(),
			message: "Embedding response was empty.".to_string(),
		})?;
		let threshold = self.cfg.search.similarity_threshold;
		let mut merged: Vec<RelatedIssue> = Vec::new();

		if let Some(component) = query.component {
			let hits = self
				.tier_candidates(&query_vec, Some(component), None, query.exclude_issue_key, query.limit)
				.await?;

			merge(&mut merged, hits, Tier::Component, threshold);
		}

		if merged.len() < query.min_results as usize
			&& let Some(domain) = query.domain
		{
			let hits = self
				.tier_candidates(&query_vec, None, Some(domain), query.exclude_issue_key, query.limit)
				.await?;

			merge(&mut merged, hits, Tier::Domain, threshold);
		}

		if merged.len() < query.min_results as usize {
			let hits = self
				.tier_candidates(&query_vec, None, None, query.exclude_issue_key, query.limit)
				.await?;

			merge(&mut merged, hits, Tier::Global, threshold);
		}

		// Merged hits already cleared the threshold, so an empty set means no
		// local evidence at all.
		if merged.is_empty() {
			self.tracker_tier(query, &mut merged).await;
		}

		merged.sort_by(|a, b| b.score.total_cmp(&a.score));
		merged.truncate(query.limit as usize);

		Ok(merged)
	}

	/// One scoped nearest-neighbor pass. The vector index answers when
	/// configured and healthy; any index failure falls back to the
	/// authoritative Postgres scan instead of failing the tier.
	async fn tier_candidates(
		&self,
		query_vec: &[f32],
		component: Option<&str>,
		domain: Option<&str>,
		exclude_issue_key: Option<&str>,
		limit: u32,
	) -> Result<Vec<(String, f32)>> {
		if let Some(vector) = &self.vector {
			match vector.query(query_vec, component, domain, limit).await {
				Ok(hits) => {
					return Ok(hits
						.into_iter()
						.filter(|(issue_key, _)| Some(issue_key.as_str()) != exclude_issue_key)
						.collect());
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						"Vector index query failed; falling back to the Postgres scan."
					);
				},
			}
		}

		let embedding_version = self.cfg.providers.embedding.embedding_version();
		let candidates = queries::embedding_candidates(
			&self.db,
			&embedding_version,
			component,
			domain,
			exclude_issue_key,
		)
		.await?;
		let mut scored = Vec::with_capacity(candidates.len());

		for candidate in candidates {
			match cosine_similarity(query_vec, &candidate.vec) {
				Ok(score) => scored.push((candidate.issue_key, score)),
				Err(err) => {
					tracing::warn!(
						error = %err,
						issue_key = %candidate.issue_key,
						"Skipping candidate with a mismatched vector."
					);
				},
			}
		}

		// Candidates arrive in recency order; the stable sort keeps that as
		// the tie-breaker for equal scores.
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		scored.truncate(limit as usize);

		Ok(scored)
	}

	/// External tracker tier with bounded query broadening: start from the
	/// full term set and drop the trailing term each round until the tracker
	/// answers, the terms run out, or the rounds are exhausted. Tracker
	/// faults are absorbed; this tier is best-effort by contract.
	async fn tracker_tier(&self, query: &RelatedQuery<'_>, merged: &mut Vec<RelatedIssue>) {
		let Some(tracker_cfg) = &self.cfg.providers.tracker else {
			return;
		};
		let terms = query_terms(query.query_text);
		let max_rounds = self.cfg.search.expansion.max_rounds;

		for round in 0..=max_rounds {
			let Some(round_terms) = broadened(&terms, round) else {
				return;
			};
			let jql = synthesize_jql(&round_terms, tracker_cfg.project.as_deref());

			tracing::info!(round, jql = %jql, "External tracker search.");

			let hits = match self
				.providers
				.tracker
				.search(tracker_cfg, &jql, query.limit)
				.await
			{
				Ok(hits) => hits,
				Err(err) => {
					tracing::warn!(error = %err, round, "External tracker search failed; skipping the tier.");

					return;
				},
			};

			if hits.is_empty() {
				continue;
			}

			for hit in hits {
				if Some(hit.issue_key.as_str()) == query.exclude_issue_key
					|| merged.iter().any(|r| r.issue_key == hit.issue_key)
				{
					continue;
				}

				merged.push(RelatedIssue { issue_key: hit.issue_key, score: 0., tier: Tier::Tracker });
			}

			return;
		}
	}
}

/// Folds one tier's hits into the merged set: new keys append, known keys
/// keep the highest score seen and the tier that found them first.
fn merge(merged: &mut Vec<RelatedIssue>, hits: Vec<(String, f32)>, tier: Tier, threshold: f32) {
	for (issue_key, score) in hits {
		if score < threshold {
			continue;
		}

		match merged.iter_mut().find(|r| r.issue_key == issue_key) {
			Some(existing) =>
				if score > existing.score {
					existing.score = score;
				},
			None => merged.push(RelatedIssue { issue_key, score, tier }),
		}
	}
}

/// Salient search terms from the query text: lowercase alphanumeric tokens,
/// stopwords removed, deduplicated in order, capped at [`MAX_QUERY_TERMS`].
fn query_terms(text: &str) -> Vec<String> {
	let mut terms = Vec::new();

	for token in text.split(|c: char| !c.is_alphanumeric()) {
		if token.len() < 3 {
			continue;
		}

		let token = token.to_lowercase();

		if QUERY_STOPWORDS.contains(&token.as_str()) || terms.contains(&token) {
			continue;
		}

		terms.push(token);

		if terms.len() == MAX_QUERY_TERMS {
			break;
		}
	}

	terms
}

/// The term set for one broadening round: round `n` drops the `n` trailing
/// terms. Returns `None` once no terms would remain.
fn broadened(terms: &[String], round: u32) -> Option<Vec<String>> {
	let keep = terms.len().checked_sub(round as usize)?;

	if keep == 0 {
		return None;
	}

	Some(terms[..keep].to_vec())
}

fn synthesize_jql(terms: &[String], project: Option<&str>) -> String {
	let mut jql = format!(r#"text ~ "{}""#, terms.join(" "));

	if let Some(project) = project {
		jql = format!(r#"project = "{project}" AND {jql}"#);
	}

	jql.push_str(" ORDER BY updated DESC");

	jql
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merge_keeps_the_highest_score_and_the_first_tier() {
		let mut merged = Vec::new();

		merge(&mut merged, vec![("SYSCROS-2".to_string(), 0.8)], Tier::Component, 0.5);
		merge(
			&mut merged,
			vec![("SYSCROS-2".to_string(), 0.9), ("SYSCROS-3".to_string(), 0.7)],
			Tier::Global,
			0.5,
		);

		assert_eq!(merged.len(), 2);
		assert_eq!(merged[0].issue_key, "SYSCROS-2");
		assert_eq!(merged[0].score, 0.9);
		assert_eq!(merged[0].tier, Tier::Component);
		assert_eq!(merged[1].tier, Tier::Global);
	}

	#[test]
	fn merge_filters_below_the_threshold() {
		let mut merged = Vec::new();

		merge(
			&mut merged,
			vec![("SYSCROS-2".to_string(), 0.49), ("SYSCROS-3".to_string(), 0.5)],
			Tier::Component,
			0.5,
		);

		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].issue_key, "SYSCROS-3");
	}

	#[test]
	fn query_terms_drop_stopwords_and_duplicates() {
		let terms = query_terms("HDMI flicker after HDMI hotplug on the dock");

		assert_eq!(terms, ["hdmi", "flicker", "hotplug", "dock"]);
	}

	#[test]
	fn broadening_drops_trailing_terms_then_stops() {
		let terms =
			vec!["hdmi".to_string(), "flicker".to_string(), "hotplug".to_string()];

		assert_eq!(broadened(&terms, 0).map(|t| t.len()), Some(3));
		assert_eq!(broadened(&terms, 2).map(|t| t.len()), Some(1));
		assert_eq!(broadened(&terms, 3), None);
		assert_eq!(broadened(&terms, 4), None);
	}

	#[test]
	fn jql_carries_the_project_scope_when_configured() {
		let terms = vec!["hdmi".to_string(), "flicker".to_string()];

		assert_eq!(
			synthesize_jql(&terms, None),
			r#"text ~ "hdmi flicker" ORDER BY updated DESC"#
		);
		assert_eq!(
			synthesize_jql(&terms, Some("SYSCROS")),
			r#"project = "SYSCROS" AND text ~ "hdmi flicker" ORDER BY updated DESC"#
		);
	}
}
