const MAX_DESCRIPTION_CHARS: usize = 1_200;
const MAX_RELATED_ITEMS: usize = 5;
const MAX_LOG_SIGNAL_LINES: usize = 10;

use crate::text;

#[derive(Debug, Clone)]
pub struct ReportIssue<'a> {
	pub issue_key: &'a str,
	pub summary: &'a str,
	pub description: Option<&'a str>,
	pub component: Option<&'a str>,
	pub os: Option<&'a str>,
	pub domain: Option<&'a str>,
	pub logs: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RelatedEntry {
	pub issue_key: String,
	pub score: f32,
	pub summary: Option<String>,
}

/// The fast, non-generative report: issue header, description excerpt, log
/// signals, and the ranked related issues. Always renderable without any
/// provider call.
pub fn render_report(issue: &ReportIssue<'_>, related: &[RelatedEntry]) -> String {
	let mut lines = Vec::new();

	lines.push(format!("Issue: {}", issue.issue_key));
	lines.push(format!("Summary: {}", issue.summary));

	if let Some(component) = issue.component.map(str::trim).filter(|value| !value.is_empty()) {
		lines.push(format!("Component: {component}"));
	}
	if let Some(domain) = issue.domain.map(str::trim).filter(|value| !value.is_empty()) {
		lines.push(format!("Domain: {domain}"));
	}
	if let Some(os) = issue.os.map(str::trim).filter(|value| !value.is_empty()) {
		lines.push(format!("OS: {os}"));
	}

	if let Some(description) = issue.description.map(str::trim).filter(|value| !value.is_empty()) {
		lines.push(String::new());
		lines.push("Description:".to_string());
		lines.push(truncate(description, MAX_DESCRIPTION_CHARS));
	}

	if let Some(logs) = issue.logs {
		let signals = text::extract_log_signals(logs);

		if !signals.is_empty() {
			lines.push(String::new());
			lines.push("Log signals:".to_string());

			for signal in signals.iter().take(MAX_LOG_SIGNAL_LINES) {
				lines.push(format!("  {signal}"));
			}
		}
	}

	lines.push(String::new());

	if related.is_empty() {
		lines.push("No related issues found.".to_string());
	} else {
		lines.push("Related issues:".to_string());

		for (index, entry) in related.iter().take(MAX_RELATED_ITEMS).enumerate() {
			let summary = entry.summary.as_deref().unwrap_or("");

			lines.push(format!(
				"{}. {}  sim={:.4}  {}",
				index + 1,
				entry.issue_key,
				entry.score,
				truncate(summary, 120),
			));
		}
	}

	let mut out = lines.join("\n");

	out.push('\n');

	out
}

fn truncate(value: &str, max_chars: usize) -> String {
	if value.chars().count() <= max_chars {
		return value.to_string();
	}

	let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();

	format!("{kept}...")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn issue<'a>() -> ReportIssue<'a> {
		ReportIssue {
			issue_key: "SYSCROS-1",
			summary: "HDMI flicker after hotplug",
			description: Some("Screen flickers when the cable is replugged."),
			component: Some("display"),
			os: Some("chromeos"),
			domain: None,
			logs: None,
		}
	}

	#[test]
	fn report_lists_related_issues_in_order() {
		let related = vec![
			RelatedEntry {
				issue_key: "SYSCROS-88".to_string(),
				score: 0.91,
				summary: Some("HDMI output flickers on dock".to_string()),
			},
			RelatedEntry { issue_key: "SYSCROS-12".to_string(), score: 0.55, summary: None },
		];
		let report = render_report(&issue(), &related);
		let first = report.find("SYSCROS-88").expect("missing first entry");
		let second = report.find("SYSCROS-12").expect("missing second entry");

		assert!(first < second);
		assert!(report.contains("sim=0.9100"));
	}

	#[test]
	fn report_without_related_issues_says_so() {
		let report = render_report(&issue(), &[]);

		assert!(report.contains("No related issues found."));
	}

	#[test]
	fn long_descriptions_truncate() {
		let description = "x".repeat(5_000);
		let mut long_issue = issue();
		long_issue.description = Some(&description);

		let report = render_report(&long_issue, &[]);

		assert!(report.contains("..."));
		assert!(report.len() < 2_500);
	}
}
