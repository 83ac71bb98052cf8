use regex::Regex;

const MAX_LOG_SIGNALS: usize = 30;

/// Fields of an issue that feed the embedding text. Mirrors what intake
/// stores, so query-side and document-side vectors live in the same space.
#[derive(Debug, Clone, Default)]
pub struct IssueText<'a> {
	pub issue_key: &'a str,
	pub summary: &'a str,
	pub description: Option<&'a str>,
	pub component: Option<&'a str>,
	pub os: Option<&'a str>,
	pub domain: Option<&'a str>,
	pub labels: &'a [String],
	pub logs: Option<&'a str>,
}

/// One text blob per issue for the embedding provider: summary first, then
/// the discriminating metadata, then extracted log signals rather than raw
/// logs (raw logs drown the summary in noise and blow the provider's input
/// limits).
pub fn build_embedding_text(issue: &IssueText<'_>) -> String {
	let mut parts = Vec::new();

	parts.push(format!("Issue: {}", issue.issue_key));
	parts.push(format!("Summary: {}", issue.summary));

	if let Some(component) = non_blank(issue.component) {
		parts.push(format!("Component: {component}"));
	}
	if let Some(domain) = non_blank(issue.domain) {
		parts.push(format!("Domain: {domain}"));
	}
	if let Some(os) = non_blank(issue.os) {
		parts.push(format!("OS: {os}"));
	}
	if !issue.labels.is_empty() {
		parts.push(format!("Labels: {}", issue.labels.join(", ")));
	}
	if let Some(description) = non_blank(issue.description) {
		parts.push(format!("Description:\n{description}"));
	}
	if let Some(logs) = non_blank(issue.logs) {
		let signals = extract_log_signals(logs);

		if !signals.is_empty() {
			parts.push(format!("Log signals:\n{}", signals.join("\n")));
		}
	}

	parts.join("\n")
}

/// Pulls failure signatures out of raw logs: lines that mention an error
/// keyword, deduplicated, capped at [`MAX_LOG_SIGNALS`].
pub fn extract_log_signals(logs: &str) -> Vec<String> {
	let Ok(signal) = Regex::new(
		r"(?i)\b(error|err|fail|failed|failure|panic|fatal|crash|timeout|exception|segfault|oops)\b",
	) else {
		return Vec::new();
	};
	let mut out = Vec::new();

	for line in logs.lines() {
		let trimmed = line.trim();

		if trimmed.is_empty() || !signal.is_match(trimmed) {
			continue;
		}
		if out.iter().any(|existing: &String| existing == trimmed) {
			continue;
		}

		out.push(trimmed.to_string());

		if out.len() >= MAX_LOG_SIGNALS {
			break;
		}
	}

	out
}

fn non_blank(field: Option<&str>) -> Option<&str> {
	field.map(str::trim).filter(|value| !value.is_empty())
}
