//! Single-retry wrapper for transient retrieval failures.

// crates.io
use async_trait::async_trait;
// self
use crate::{
	_prelude::*,
	events::{self, EventKind, EventListener, SourceComponent},
	source::SecurityContext,
};

/// Retries the inner source exactly once when it fails with the transient
/// unavailable kind. Any other failure propagates untouched.
pub struct RetrySource {
	source: Box<dyn JwkSetSource>,
	listener: Option<EventListener>,
}
impl RetrySource {
	/// Wrap `source` with a single retry.
	pub fn new(source: Box<dyn JwkSetSource>, listener: Option<EventListener>) -> Self {
		Self { source, listener }
	}
}
#[async_trait]
impl JwkSetSource for RetrySource {
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		match self.source.jwk_set(evaluator, now, context).await {
			Err(err) if err.is_unavailable() => {
				tracing::debug!(error = %err, "transient jwk set failure, retrying once");

				events::emit(
					&self.listener,
					SourceComponent::Retrying,
					context,
					EventKind::Retrial { error: err.to_string() },
				);

				self.source.jwk_set(evaluator, now, context).await
			},
			result => result,
		}
	}

	async fn close(&self) {
		self.source.close().await;
	}
}
