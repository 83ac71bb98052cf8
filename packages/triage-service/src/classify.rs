use std::collections::HashMap;

use triage_storage::models::ClassifierRow;

const MIN_TOKEN_LEN: usize = 3;

/// Token-frequency domain classifier trained on already-labeled issues. It
/// only fills the domain slot of the similarity resolver when intake carries
/// no component and no domain; a low-confidence guess is worse than none, so
/// [`classify`](DomainClassifier::classify) demands a margin between the top
/// two domains.
#[derive(Debug, Default)]
pub struct DomainClassifier {
	token_domain: HashMap<String, HashMap<String, u32>>,
}
impl DomainClassifier {
	pub fn train(rows: &[ClassifierRow]) -> Self {
		let mut token_domain: HashMap<String, HashMap<String, u32>> = HashMap::new();

		for row in rows {
			let mut text = row.summary.clone();

			if let Some(component) = &row.component {
				text.push(' ');
				text.push_str(component);
			}

			for label in labels_of(row) {
				text.push(' ');
				text.push_str(&label);
			}

			for token in tokenize(&text) {
				*token_domain.entry(token).or_default().entry(row.domain.clone()).or_default() +=
					1;
			}
		}

		Self { token_domain }
	}

	pub fn is_empty(&self) -> bool {
		self.token_domain.is_empty()
	}

	/// Scores each domain by the fraction of this text's tokens it owns.
	/// Returns the best domain only when its probability mass beats the
	/// runner-up by at least `min_margin`.
	pub fn classify(&self, text: &str, min_margin: f32) -> Option<String> {
		let mut scores: HashMap<&str, f32> = HashMap::new();

		for token in tokenize(text) {
			let Some(domains) = self.token_domain.get(&token) else {
				continue;
			};
			let total: u32 = domains.values().sum();

			if total == 0 {
				continue;
			}

			for (domain, count) in domains {
				*scores.entry(domain).or_default() += *count as f32 / total as f32;
			}
		}

		let mass: f32 = scores.values().sum();

		if mass <= 0. {
			return None;
		}

		let mut ranked: Vec<(&str, f32)> =
			scores.into_iter().map(|(domain, score)| (domain, score / mass)).collect();

		ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

		let (best_domain, best) = ranked[0];
		let second = ranked.get(1).map(|(_, score)| *score).unwrap_or(0.);

		if best - second < min_margin {
			return None;
		}

		Some(best_domain.to_string())
	}
}

fn labels_of(row: &ClassifierRow) -> Vec<String> {
	row.labels
		.as_ref()
		.and_then(|value| value.as_array())
		.map(|labels| {
			labels.iter().filter_map(|label| label.as_str().map(str::to_string)).collect()
		})
		.unwrap_or_default()
}

fn tokenize(text: &str) -> Vec<String> {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|token| token.len() >= MIN_TOKEN_LEN)
		.map(str::to_lowercase)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(summary: &str, component: Option<&str>, domain: &str) -> ClassifierRow {
		ClassifierRow {
			summary: summary.to_string(),
			component: component.map(str::to_string),
			domain: domain.to_string(),
			labels: None,
		}
	}

	fn trained() -> DomainClassifier {
		DomainClassifier::train(&[
			row("hdmi flicker after hotplug", Some("display"), "graphics"),
			row("external monitor blank on dock", Some("display"), "graphics"),
			row("wifi drops after suspend", Some("network"), "connectivity"),
			row("bluetooth pairing timeout", Some("network"), "connectivity"),
		])
	}

	#[test]
	fn clear_vocabulary_classifies() {
		let classifier = trained();

		assert_eq!(
			classifier.classify("hdmi monitor flicker", 0.15).as_deref(),
			Some("graphics")
		);
		assert_eq!(
			classifier.classify("wifi timeout after suspend", 0.15).as_deref(),
			Some("connectivity")
		);
	}

	#[test]
	fn ambiguous_text_stays_unclassified() {
		let classifier = trained();

		// "after" is shared vocabulary; both domains score equally.
		assert_eq!(classifier.classify("crash after update", 0.15), None);
	}

	#[test]
	fn unknown_vocabulary_stays_unclassified() {
		let classifier = trained();

		assert_eq!(classifier.classify("battery drains overnight", 0.15), None);
	}

	#[test]
	fn empty_training_set_never_classifies() {
		let classifier = DomainClassifier::train(&[]);

		assert!(classifier.is_empty());
		assert_eq!(classifier.classify("hdmi flicker", 0.), None);
	}
}
