pub mod fingerprint;
pub mod report;
pub mod similarity;
pub mod text;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
