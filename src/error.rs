//! Crate-wide error types and `Result` alias.

// crates.io
use url::Url;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the JWK set resolution pipeline.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	/// Transient JWK set retrieval failure; recovered by the retry layer
	/// (once) or the outage layer (serves the last known good set).
	#[error("JWK set unavailable: {0}")]
	Unavailable(String),
	#[error("Upstream HTTP status {status} from {url}")]
	HttpStatus { status: reqwest::StatusCode, url: Url },
	/// The rate limiter's refusal; never retried.
	#[error("JWK set retrieval rate limit reached")]
	RateLimited,
	/// Generic key sourcing failure surfaced to the application.
	#[error("Key sourcing failed: {0}")]
	KeySource(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether this is the transient retrieval kind.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Self::Unavailable(_))
	}

	/// Coerce into the transient kind, preserving an already-transient error.
	pub(crate) fn into_unavailable(self) -> Self {
		match self {
			unavailable @ Self::Unavailable(_) => unavailable,
			other => Self::Unavailable(other.to_string()),
		}
	}
}
