use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use triage_config::LlmProviderConfig;

use crate::{Error, Result};

/// Chat-completions call returning the first choice's content. The caller
/// assembles the messages; this module only speaks the wire shape.
pub async fn complete(cfg: &LlmProviderConfig, messages: &[Value]) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion(json)
}

fn parse_completion(json: Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing message content.".to_string(),
		})?;
	let trimmed = content.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Completion response content is empty.".to_string(),
		});
	}

	Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_first_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "Likely a DP link training regression." } }
			]
		});

		assert_eq!(
			parse_completion(json).expect("parse failed"),
			"Likely a DP link training regression."
		);
	}

	#[test]
	fn empty_content_is_invalid() {
		let json = serde_json::json!({
			"choices": [ { "message": { "content": "   " } } ]
		});
		let err = parse_completion(json).unwrap_err();

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}
}
