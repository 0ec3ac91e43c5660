//! JWK set retrieval over HTTP and from local files.

// std
use std::time::Duration;
// crates.io
use async_trait::async_trait;
use reqwest::{Client, redirect::Policy};
use url::Url;
// self
use crate::_prelude::*;

/// Default HTTP connect timeout for JWK set retrieval.
pub const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
/// Default HTTP read timeout for JWK set retrieval.
pub const DEFAULT_HTTP_READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Default HTTP entity size limit for JWK set retrieval (50 KiB).
pub const DEFAULT_HTTP_SIZE_LIMIT: usize = 50 * 1024;

/// Retrieves the raw bytes of a JWK set resource.
#[async_trait]
pub trait ResourceRetriever: Send + Sync {
	/// Fetch the resource at `url`.
	async fn retrieve(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Default retriever: HTTP(S) via reqwest with bounded timeouts and response
/// size; `file` URLs are read from the local filesystem.
#[derive(Debug)]
pub struct DefaultResourceRetriever {
	client: Client,
	size_limit: usize,
}
impl DefaultResourceRetriever {
	/// Build a retriever with the default timeouts and size limit.
	pub fn new() -> Result<Self> {
		Self::with_limits(
			DEFAULT_HTTP_CONNECT_TIMEOUT,
			DEFAULT_HTTP_READ_TIMEOUT,
			DEFAULT_HTTP_SIZE_LIMIT,
		)
	}

	/// Build a retriever with explicit timeouts and size limit.
	pub fn with_limits(
		connect_timeout: Duration,
		read_timeout: Duration,
		size_limit: usize,
	) -> Result<Self> {
		let client = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(format!("jwks-resolver/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(connect_timeout)
			.timeout(read_timeout)
			.build()?;

		Ok(Self { client, size_limit })
	}
}
#[async_trait]
impl ResourceRetriever for DefaultResourceRetriever {
	async fn retrieve(&self, url: &Url) -> Result<Vec<u8>> {
		if url.scheme() == "file" {
			let path = url
				.to_file_path()
				.map_err(|()| Error::Unavailable(format!("Invalid file URL {url}")))?;

			return Ok(tokio::fs::read(path).await?);
		}

		let response = self.client.get(url.clone()).send().await?;
		let status = response.status();

		if !status.is_success() {
			return Err(Error::HttpStatus { status, url: url.clone() });
		}

		let bytes = response.bytes().await?;

		if bytes.len() > self.size_limit {
			return Err(Error::Unavailable(format!(
				"Response size {size} bytes exceeds the configured limit of {limit} bytes",
				size = bytes.len(),
				limit = self.size_limit
			)));
		}

		tracing::debug!(%url, status = %status, size = bytes.len(), "jwk set fetch complete");

		Ok(bytes.to_vec())
	}
}
