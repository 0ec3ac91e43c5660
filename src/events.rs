//! Event taxonomy and listener dispatch for the source stack.
//!
//! Each decorator carries an optional listener invoked synchronously on the
//! calling task. Listeners are expected to be cheap; anything heavier should
//! hand off to a channel.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// self
use crate::_prelude::*;

/// Pipeline component that emitted an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceComponent {
	/// The blocking time-to-live cache.
	Caching,
	/// The refresh-ahead cache.
	RefreshAheadCaching,
	/// The rate limiter.
	RateLimited,
	/// The single-retry wrapper.
	Retrying,
	/// The outage-tolerant fallback cache.
	OutageTolerant,
}

/// Event payloads, tagged per decorator.
///
/// Queue lengths are estimates of the tasks waiting on the emitting source's
/// refresh mutex at the time of emission.
#[derive(Clone, Debug)]
pub enum EventKind {
	/// A cache refresh is about to call the inner source.
	RefreshInitiated {
		/// Estimated tasks queued on the refresh mutex.
		queue_length: usize,
	},
	/// A cache refresh stored a new JWK set.
	RefreshCompleted {
		/// The freshly stored set.
		jwk_set: Arc<JwkSet>,
		/// Estimated tasks queued on the refresh mutex.
		queue_length: usize,
	},
	/// Another task holds the refresh mutex; this caller is waiting.
	WaitingForRefresh {
		/// Estimated tasks queued on the refresh mutex.
		queue_length: usize,
	},
	/// The wait for the refresh mutex exceeded the cache refresh timeout.
	RefreshTimedOut {
		/// Estimated tasks queued on the refresh mutex.
		queue_length: usize,
	},
	/// A refresh completed but left no valid cache entry.
	UnableToRefresh,
	/// A one-shot background refresh was scheduled ahead of expiry.
	RefreshScheduled,
	/// The computed schedule delay was not positive; nothing was scheduled.
	RefreshNotScheduled,
	/// A background refresh task started.
	ScheduledRefreshInitiated,
	/// A background refresh task stored a new JWK set.
	ScheduledRefreshCompleted {
		/// The freshly stored set.
		jwk_set: Arc<JwkSet>,
	},
	/// A scheduler-triggered refresh failed; the error is never surfaced.
	ScheduledRefreshFailed {
		/// The failure, rendered.
		error: String,
	},
	/// A background refresh failed; a later request may re-trigger it.
	UnableToRefreshAheadOfExpiration,
	/// A retrieval was refused because the interval budget is exhausted.
	RateLimited,
	/// A transient failure is being retried once.
	Retrial {
		/// The failure, rendered.
		error: String,
	},
	/// The upstream is failing and the outage cache is serving.
	Outage {
		/// The upstream failure, rendered.
		error: String,
		/// Milliseconds until the outage cache itself expires.
		remaining_time: i64,
	},
}

/// An event together with its originating component and the optional per-call
/// security context.
#[derive(Clone)]
pub struct Event {
	/// The component that emitted the event.
	pub source: SourceComponent,
	/// The context of the call that triggered the event, if any.
	pub context: Option<SecurityContext>,
	/// The payload.
	pub kind: EventKind,
}
impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Event")
			.field("source", &self.source)
			.field("context", &self.context.as_ref().map(|_| "<opaque>"))
			.field("kind", &self.kind)
			.finish()
	}
}

/// Listener invoked synchronously for every event a source emits.
pub type EventListener = Arc<dyn Fn(Event) + Send + Sync>;

pub(crate) fn emit(
	listener: &Option<EventListener>,
	source: SourceComponent,
	context: Option<&SecurityContext>,
	kind: EventKind,
) {
	if let Some(listener) = listener {
		listener(Event { source, context: context.cloned(), kind });
	}
}
