//! Application-facing JWK source: selector-driven lookup with miss-driven
//! refresh, and failover.

// crates.io
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::Jwk;
// self
use crate::{_prelude::*, selector::JwkSelector, source::SecurityContext};

/// A source of JWKs matching a selector.
#[async_trait]
pub trait JwkSource: Send + Sync {
	/// Return the keys matching `selector`.
	async fn select(
		&self,
		selector: &JwkSelector,
		context: Option<&SecurityContext>,
	) -> Result<Vec<Jwk>>;

	/// Release owned resources.
	async fn close(&self);
}

/// Adapts a [`JwkSetSource`] chain into a [`JwkSource`].
///
/// A lookup is a read-write-read transaction: fetch the set, match, and on an
/// empty match re-query with a reference-comparison evaluator pinning the set
/// just observed. The caching layer then refreshes only if no other caller
/// has replaced that instance in the meantime, which is what lets a request
/// for a freshly rotated key-id force a refresh without the application
/// knowing about caching.
pub struct SelectingJwkSource {
	source: Box<dyn JwkSetSource>,
}
impl SelectingJwkSource {
	/// Wrap a JWK set source chain.
	pub fn new(source: Box<dyn JwkSetSource>) -> Self {
		Self { source }
	}
}
#[async_trait]
impl JwkSource for SelectingJwkSource {
	async fn select(
		&self,
		selector: &JwkSelector,
		context: Option<&SecurityContext>,
	) -> Result<Vec<Jwk>> {
		let now = Utc::now().timestamp_millis();
		let jwk_set = self.source.jwk_set(&RefreshEvaluator::NoRefresh, now, context).await?;
		let selected = selector.select(&jwk_set);

		if !selected.is_empty() {
			return Ok(selected);
		}

		match self
			.source
			.jwk_set(&RefreshEvaluator::ReferenceComparison(jwk_set), now, context)
			.await
		{
			Ok(recent) => Ok(selector.select(&recent)),
			// a rate-limited miss-driven refresh means no matching key, not
			// a failed lookup
			Err(Error::RateLimited) => Ok(Vec::new()),
			Err(err) => Err(err),
		}
	}

	async fn close(&self) {
		self.source.close().await;
	}
}

/// Delegates to a secondary [`JwkSource`] when the primary fails.
pub struct FailoverJwkSource {
	source: Box<dyn JwkSource>,
	failover: Box<dyn JwkSource>,
}
impl FailoverJwkSource {
	/// Combine a primary source with a failover.
	pub fn new(source: Box<dyn JwkSource>, failover: Box<dyn JwkSource>) -> Self {
		Self { source, failover }
	}
}
#[async_trait]
impl JwkSource for FailoverJwkSource {
	async fn select(
		&self,
		selector: &JwkSelector,
		context: Option<&SecurityContext>,
	) -> Result<Vec<Jwk>> {
		match self.source.select(selector, context).await {
			Err(err) => {
				tracing::warn!(error = %err, "primary jwk source failed, failing over");

				self.failover.select(selector, context).await
			},
			result => result,
		}
	}

	async fn close(&self) {
		self.source.close().await;
		self.failover.close().await;
	}
}
