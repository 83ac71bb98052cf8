use crate::{Error, Result};

/// Normalized dot product, clamped to [0, 1]. Defined only for vectors of
/// matching dimensionality; a mismatch is an error, not a zero score.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32> {
	if query.len() != candidate.len() {
		return Err(Error::DimensionMismatch { query: query.len(), candidate: candidate.len() });
	}

	let mut dot = 0.0_f64;
	let mut query_norm = 0.0_f64;
	let mut candidate_norm = 0.0_f64;

	for (a, b) in query.iter().zip(candidate.iter()) {
		dot += f64::from(*a) * f64::from(*b);
		query_norm += f64::from(*a) * f64::from(*a);
		candidate_norm += f64::from(*b) * f64::from(*b);
	}

	if query_norm == 0.0 || candidate_norm == 0.0 {
		return Ok(0.0);
	}

	let similarity = dot / (query_norm.sqrt() * candidate_norm.sqrt());

	Ok(similarity.clamp(0.0, 1.0) as f32)
}
