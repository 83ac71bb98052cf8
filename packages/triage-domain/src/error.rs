#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Embedding dimension mismatch: query has {query} components, candidate has {candidate}.")]
	DimensionMismatch { query: usize, candidate: usize },
}
