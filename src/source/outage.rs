//! Outage-tolerant fallback serving the last known good JWK set.

// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::CachedObject,
	events::{self, EventKind, EventListener, SourceComponent},
	source::SecurityContext,
};

/// Serves a clone of the last successfully fetched JWK set while the inner
/// source fails transiently, for up to the configured outage time to live.
///
/// The served set is a fresh instance over the same keys: an outer
/// reference-comparison evaluator must never mistake the outage copy for the
/// instance it has pinned. After cloning, the evaluator is re-checked against
/// the clone; a force-refresh demand propagates the original failure instead.
pub struct OutageSource {
	source: Box<dyn JwkSetSource>,
	time_to_live: i64,
	cached: RwLock<Option<CachedObject<Arc<JwkSet>>>>,
	listener: Option<EventListener>,
}
impl OutageSource {
	/// Wrap `source` with an outage cache living for `time_to_live`
	/// milliseconds past each successful fetch.
	pub fn new(
		source: Box<dyn JwkSetSource>,
		time_to_live: i64,
		listener: Option<EventListener>,
	) -> Self {
		Self { source, time_to_live, cached: RwLock::new(None), listener }
	}
}
#[async_trait]
impl JwkSetSource for OutageSource {
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		match self.source.jwk_set(evaluator, now, context).await {
			Ok(jwk_set) => {
				*self.cached.write().await =
					Some(CachedObject::new(jwk_set.clone(), now, self.time_to_live));

				Ok(jwk_set)
			},
			Err(err) if err.is_unavailable() => {
				let cached = { self.cached.read().await.clone() };

				if let Some(cache) = cached
					&& cache.is_valid(now)
				{
					let remaining_time = cache.expiration_time().saturating_sub(now);

					events::emit(
						&self.listener,
						SourceComponent::OutageTolerant,
						context,
						EventKind::Outage { error: err.to_string(), remaining_time },
					);
					tracing::warn!(
						error = %err,
						remaining_time,
						"upstream outage, serving the last known good jwk set"
					);

					let clone = Arc::new(JwkSet { keys: cache.value().keys.clone() });

					if !evaluator.requires_refresh(&clone) {
						return Ok(clone);
					}
					// force refresh demanded, fall through to the original error
				}

				Err(err)
			},
			Err(err) => Err(err),
		}
	}

	async fn close(&self) {
		self.source.close().await;
		*self.cached.write().await = None;
	}
}
