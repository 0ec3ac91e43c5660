//! Leaf source fetching and parsing the JWK set from a URL.

// crates.io
use async_trait::async_trait;
use url::Url;
// self
use crate::{_prelude::*, http::ResourceRetriever, source::SecurityContext};

/// Leaf [`JwkSetSource`] retrieving the JWK set from a URL or local file via
/// a [`ResourceRetriever`].
///
/// Every failure — I/O, HTTP status, parse — surfaces as the transient
/// unavailable kind; the retry and outage layers rely on that.
pub struct UrlSource {
	url: Url,
	retriever: Box<dyn ResourceRetriever>,
}
impl UrlSource {
	/// Create a new URL-backed source.
	pub fn new(url: Url, retriever: Box<dyn ResourceRetriever>) -> Self {
		Self { url, retriever }
	}

	/// The JWK set URL.
	pub fn url(&self) -> &Url {
		&self.url
	}
}
#[async_trait]
impl JwkSetSource for UrlSource {
	async fn jwk_set(
		&self,
		_evaluator: &RefreshEvaluator,
		_now: i64,
		_context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		let bytes =
			self.retriever.retrieve(&self.url).await.map_err(Error::into_unavailable)?;
		let jwk_set = serde_json::from_slice::<JwkSet>(&bytes).map_err(|err| {
			Error::Unavailable(format!("Failed to parse the JWK set from {}: {err}", self.url))
		})?;

		Ok(Arc::new(jwk_set))
	}
}
