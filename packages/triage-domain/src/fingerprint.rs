use serde_json::Value;

use triage_config::Config;

/// Request fields that participate in the idempotency identity. Optional
/// fields that are absent or blank hash as `null`, so "no logs" and
/// `logs = ""` produce the same fingerprint.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
	pub issue_key: &'a str,
	pub summary: &'a str,
	pub logs: Option<&'a str>,
	pub component: Option<&'a str>,
	pub os: Option<&'a str>,
	pub notes: Option<&'a str>,
}

/// Behavior-affecting settings folded into the fingerprint. Changing the
/// embedding provider, the similarity threshold, or the classifier version
/// changes every fingerprint, which retires old cache entries without any
/// explicit invalidation pass.
pub fn config_snapshot(cfg: &Config) -> Value {
	serde_json::json!({
		"embedding_version": cfg.providers.embedding.embedding_version(),
		"similarity_threshold": cfg.search.similarity_threshold,
		"classifier_version": cfg.search.classifier.version,
	})
}

/// blake3 hex over a canonical JSON payload. `serde_json::Map` is backed by a
/// BTreeMap, so keys serialize in sorted order and semantically equal inputs
/// hash identically regardless of field ordering.
pub fn fingerprint(input: &FingerprintInput<'_>, config_snapshot: &Value) -> String {
	let payload = serde_json::json!({
		"issue_key": input.issue_key.trim(),
		"summary": input.summary.trim(),
		"logs": normalized(input.logs),
		"component": normalized(input.component),
		"os": normalized(input.os),
		"notes": normalized(input.notes),
		"config": config_snapshot,
	});
	let raw = serde_json::to_vec(&payload).unwrap_or_default();

	blake3::hash(&raw).to_hex().to_string()
}

fn normalized(field: Option<&str>) -> Option<&str> {
	field.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn input<'a>() -> FingerprintInput<'a> {
		FingerprintInput {
			issue_key: "SYSCROS-1",
			summary: "HDMI flicker after hotplug",
			logs: Some("kernel: drm error"),
			component: Some("display"),
			os: Some("chromeos"),
			notes: None,
		}
	}

	fn snapshot() -> Value {
		serde_json::json!({ "embedding_version": "p:m:3" })
	}

	#[test]
	fn identical_inputs_fingerprint_identically() {
		assert_eq!(fingerprint(&input(), &snapshot()), fingerprint(&input(), &snapshot()));
	}

	#[test]
	fn whitespace_and_absence_normalize() {
		let mut padded = input();
		padded.summary = "  HDMI flicker after hotplug  ";
		padded.notes = Some("   ");

		assert_eq!(fingerprint(&padded, &snapshot()), fingerprint(&input(), &snapshot()));
	}

	#[test]
	fn any_field_change_changes_the_fingerprint() {
		let base = fingerprint(&input(), &snapshot());
		let mut other = input();
		other.component = Some("audio");

		assert_ne!(fingerprint(&other, &snapshot()), base);

		let mut other = input();
		other.logs = None;

		assert_ne!(fingerprint(&other, &snapshot()), base);
	}

	#[test]
	fn config_snapshot_participates_in_identity() {
		let base = fingerprint(&input(), &snapshot());
		let changed = serde_json::json!({ "embedding_version": "p:m2:3" });

		assert_ne!(fingerprint(&input(), &changed), base);
	}
}
