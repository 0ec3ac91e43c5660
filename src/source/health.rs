//! Health status reporting per call.

// crates.io
use async_trait::async_trait;
// self
use crate::{
	_prelude::*,
	health::{HealthListener, HealthReport},
	source::SecurityContext,
};

/// Reports the health of every call on the inner source: healthy on success,
/// not healthy (with the failure) on any error. Errors always re-propagate.
///
/// Health is observed per call; there is no background polling.
pub struct HealthReportingSource {
	source: Box<dyn JwkSetSource>,
	listener: HealthListener,
}
impl HealthReportingSource {
	/// Wrap `source`, notifying `listener` on every call.
	pub fn new(source: Box<dyn JwkSetSource>, listener: HealthListener) -> Self {
		Self { source, listener }
	}
}
#[async_trait]
impl JwkSetSource for HealthReportingSource {
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		match self.source.jwk_set(evaluator, now, context).await {
			Ok(jwk_set) => {
				(self.listener)(HealthReport::healthy(now, context.cloned()));

				Ok(jwk_set)
			},
			Err(err) => {
				(self.listener)(HealthReport::not_healthy(
					err.to_string(),
					now,
					context.cloned(),
				));

				Err(err)
			},
		}
	}

	async fn close(&self) {
		self.source.close().await;
	}
}
