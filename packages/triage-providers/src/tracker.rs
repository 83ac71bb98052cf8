use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use triage_config::TrackerConfig;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct TrackerHit {
	pub issue_key: String,
	pub summary: Option<String>,
}

/// Full-text search against the external issue tracker's REST API. The
/// caller synthesizes (and logs) the query string; this module submits it
/// verbatim.
pub async fn search(cfg: &TrackerConfig, jql: &str, max_results: u32) -> Result<Vec<TrackerHit>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}/rest/api/2/search", cfg.base_url);
	let max_results = max_results.min(cfg.max_results);
	let res = client
		.get(url)
		.basic_auth(&cfg.email, Some(&cfg.api_token))
		.query(&[("jql", jql), ("maxResults", &max_results.to_string()), ("fields", "summary")])
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_search_response(json)
}

fn parse_search_response(json: Value) -> Result<Vec<TrackerHit>> {
	let issues = json.get("issues").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Tracker response is missing issues array.".to_string() }
	})?;
	let mut out = Vec::with_capacity(issues.len());

	for issue in issues {
		let Some(issue_key) = issue.get("key").and_then(|v| v.as_str()) else {
			continue;
		};
		let summary = issue
			.get("fields")
			.and_then(|fields| fields.get("summary"))
			.and_then(|v| v.as_str())
			.map(str::to_string);

		out.push(TrackerHit { issue_key: issue_key.to_string(), summary });
	}

	Ok(out)
}
