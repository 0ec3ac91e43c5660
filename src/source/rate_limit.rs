//! Token-bucket rate limiting of JWK set retrievals.

// std
use std::sync::{Mutex, PoisonError};
// crates.io
use async_trait::async_trait;
// self
use crate::{
	_prelude::*,
	events::{self, EventKind, EventListener, SourceComponent},
	source::SecurityContext,
};

/// Allows at most two retrievals per minimum time interval.
///
/// Under steady-state operation the time-based cache triggers at most one
/// refresh per interval; the second token accommodates a concurrent
/// refresh-ahead task or a rotation-driven selector miss. A third request
/// within the interval signals pathological behaviour (such as a stream of
/// requests for unknown key-ids) and fails with [`Error::RateLimited`] so
/// callers can tell rate limiting from an outage.
pub struct RateLimitedSource {
	source: Box<dyn JwkSetSource>,
	min_time_interval: i64,
	state: Mutex<RateLimitState>,
	listener: Option<EventListener>,
}
impl RateLimitedSource {
	/// Wrap `source`, allowing two retrievals per `min_time_interval`
	/// milliseconds.
	pub fn new(
		source: Box<dyn JwkSetSource>,
		min_time_interval: i64,
		listener: Option<EventListener>,
	) -> Self {
		Self {
			source,
			min_time_interval,
			state: Mutex::new(RateLimitState { next_opening_time: i64::MIN, counter: 0 }),
			listener,
		}
	}

	/// The minimum allowed time interval between two retrievals.
	pub fn min_time_interval(&self) -> i64 {
		self.min_time_interval
	}
}
#[async_trait]
impl JwkSetSource for RateLimitedSource {
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		// The mutex only guards the counter arithmetic; the downstream call
		// happens outside it.
		let rate_limit_hit = {
			let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

			if state.next_opening_time <= now {
				state.next_opening_time = now.saturating_add(self.min_time_interval);
				// one token consumed by this call, one left for the interval
				state.counter = 1;

				false
			} else if state.counter > 0 {
				state.counter -= 1;

				false
			} else {
				true
			}
		};

		if rate_limit_hit {
			events::emit(
				&self.listener,
				SourceComponent::RateLimited,
				context,
				EventKind::RateLimited,
			);

			return Err(Error::RateLimited);
		}

		self.source.jwk_set(evaluator, now, context).await
	}

	async fn close(&self) {
		self.source.close().await;
	}
}

#[derive(Debug)]
struct RateLimitState {
	next_opening_time: i64,
	counter: u32,
}
