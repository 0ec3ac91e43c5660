//! Caching source that proactively refreshes ahead of expiration.

// std
use std::sync::{
	Mutex, PoisonError,
	atomic::{AtomicI64, Ordering},
};
// crates.io
use async_trait::async_trait;
use chrono::Utc;
use tokio::{
	task::{JoinHandle, JoinSet},
	time,
};
// self
use crate::{
	_prelude::*,
	cache::CachedObject,
	events::{self, EventKind, EventListener, SourceComponent},
	source::{
		SecurityContext,
		caching::{CachingSource, millis_duration},
	},
};

/// Caching [`JwkSetSource`] that refreshes the JWK set before it expires, so
/// foreground requests keep being served from the cache while updates run on
/// background tasks.
///
/// A request arriving inside the refresh-ahead window returns the cached set
/// immediately and, at most once per cache generation, spawns a background
/// force-refresh. With `scheduled` enabled, each successful refresh also
/// schedules a one-shot background refresh ahead of the new expiry, so the
/// window is reached even without request traffic.
pub struct RefreshAheadSource {
	inner: Arc<Inner>,
}
impl RefreshAheadSource {
	/// Wrap `source` with refresh-ahead caching.
	///
	/// The refresh-ahead time plus the cache refresh timeout must not exceed
	/// the time to live, otherwise the window would start before the cache
	/// entry exists.
	pub fn new(
		source: Box<dyn JwkSetSource>,
		time_to_live: i64,
		cache_refresh_timeout: i64,
		refresh_ahead_time: i64,
		scheduled: bool,
		listener: Option<EventListener>,
	) -> Result<Self> {
		if refresh_ahead_time.saturating_add(cache_refresh_timeout) > time_to_live {
			return Err(Error::Validation {
				field: "refresh_ahead_time",
				reason: format!(
					"The sum of the refresh-ahead time ({refresh_ahead_time}ms) and the cache refresh timeout ({cache_refresh_timeout}ms) must not exceed the time-to-live ({time_to_live}ms)."
				),
			});
		}

		Ok(Self {
			inner: Arc::new(Inner {
				caching: CachingSource::with_component(
					source,
					time_to_live,
					cache_refresh_timeout,
					SourceComponent::RefreshAheadCaching,
					listener.clone(),
				),
				refresh_ahead_time,
				scheduled,
				listener,
				lazy_lock: Mutex::new(()),
				cache_expiration_marker: AtomicI64::new(-1),
				refresh_tasks: Mutex::new(JoinSet::new()),
				scheduled_task: Mutex::new(None),
			}),
		})
	}
}
#[async_trait]
impl JwkSetSource for RefreshAheadSource {
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		let Some(cache) = self.inner.caching.cached().await else {
			tracing::debug!("cache empty, performing initial fetch");

			return self
				.inner
				.clone()
				.load_and_schedule(&RefreshEvaluator::NoRefresh, now, context)
				.await;
		};

		if evaluator.requires_refresh(cache.value()) {
			return self.inner.clone().load_and_schedule(evaluator, now, context).await;
		}
		if cache.is_expired(now) {
			return self
				.inner
				.clone()
				.load_and_schedule(
					&RefreshEvaluator::ReferenceComparison(cache.value().clone()),
					now,
					context,
				)
				.await;
		}

		self.inner.clone().refresh_ahead_of_expiration(&cache, false, now, context);

		Ok(cache.value().clone())
	}

	async fn close(&self) {
		self.inner.close().await;
	}
}

struct Inner {
	caching: CachingSource,
	refresh_ahead_time: i64,
	scheduled: bool,
	listener: Option<EventListener>,
	// guards the decision to spawn a background refresh; no I/O under it
	lazy_lock: Mutex<()>,
	// expiration time of the generation whose refresh is under way; -1 when
	// none, reset to -1 on failure so a later request can retry
	cache_expiration_marker: AtomicI64,
	refresh_tasks: Mutex<JoinSet<()>>,
	scheduled_task: Mutex<Option<JoinHandle<()>>>,
}
impl Inner {
	async fn load_and_schedule(
		self: Arc<Self>,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		let jwk_set = self.caching.load_blocking(evaluator, now, context).await?;

		if self.scheduled
			&& let Some(cache) = self.caching.cached().await
		{
			self.clone().schedule_refresh_ahead_of_expiration(&cache, now, context);
		}

		Ok(jwk_set)
	}

	/// Schedule a one-shot background refresh ahead of `cache`'s expiry,
	/// replacing any previously scheduled one.
	fn schedule_refresh_ahead_of_expiration(
		self: Arc<Self>,
		cache: &CachedObject<Arc<JwkSet>>,
		now: i64,
		context: Option<&SecurityContext>,
	) {
		// firing this early keeps request traffic from beating the scheduler
		// to the refresh window
		let delay = cache
			.expiration_time()
			.saturating_sub(now)
			.saturating_sub(self.refresh_ahead_time)
			.saturating_sub(self.caching.cache_refresh_timeout());
		let mut slot = self.scheduled_task.lock().unwrap_or_else(PoisonError::into_inner);

		if let Some(previous) = slot.take() {
			previous.abort();
		}

		if delay > 0 {
			let inner = self.clone();
			let cache = cache.clone();
			let context_owned = context.cloned();

			*slot = Some(tokio::spawn(async move {
				time::sleep(millis_duration(delay)).await;

				// scheduled work cannot be driven by a caller's clock
				let now = Utc::now().timestamp_millis();

				// only refreshes if this generation is still the current one
				inner.clone().refresh_ahead_of_expiration(
					&cache,
					true,
					now,
					context_owned.as_ref(),
				);
			}));

			events::emit(
				&self.listener,
				SourceComponent::RefreshAheadCaching,
				context,
				EventKind::RefreshScheduled,
			);
		} else {
			events::emit(
				&self.listener,
				SourceComponent::RefreshAheadCaching,
				context,
				EventKind::RefreshNotScheduled,
			);
		}
	}

	/// Spawn a background force-refresh for `cache`'s generation, unless one
	/// is already under way.
	///
	/// `force_refresh` is set by the scheduler path, which has already slept
	/// its way to the window; lazy callers pass `false` and are filtered by
	/// the window check.
	fn refresh_ahead_of_expiration(
		self: Arc<Self>,
		cache: &CachedObject<Arc<JwkSet>>,
		force_refresh: bool,
		now: i64,
		context: Option<&SecurityContext>,
	) {
		if !force_refresh && !cache.is_expired(now.saturating_add(self.refresh_ahead_time)) {
			return;
		}
		if self.cache_expiration_marker.load(Ordering::SeqCst) >= cache.expiration_time() {
			// an update for this generation is already under way
			return;
		}

		let Ok(_guard) = self.lazy_lock.try_lock() else {
			return;
		};

		// re-check now that this task holds the lock
		if self.cache_expiration_marker.load(Ordering::SeqCst) >= cache.expiration_time() {
			return;
		}

		self.cache_expiration_marker.store(cache.expiration_time(), Ordering::SeqCst);

		let inner = self.clone();
		let context_owned = context.cloned();
		let mut tasks = self.refresh_tasks.lock().unwrap_or_else(PoisonError::into_inner);

		while tasks.try_join_next().is_some() {}

		tasks.spawn(async move {
			let context = context_owned;

			events::emit(
				&inner.listener,
				SourceComponent::RefreshAheadCaching,
				context.as_ref(),
				EventKind::ScheduledRefreshInitiated,
			);

			match inner
				.clone()
				.load_and_schedule(&RefreshEvaluator::ForceRefresh, now, context.as_ref())
				.await
			{
				Ok(jwk_set) => {
					events::emit(
						&inner.listener,
						SourceComponent::RefreshAheadCaching,
						context.as_ref(),
						EventKind::ScheduledRefreshCompleted { jwk_set },
					);
				},
				Err(err) => {
					// another task may retry this generation
					inner.cache_expiration_marker.store(-1, Ordering::SeqCst);

					tracing::debug!(error = %err, "background jwk set refresh failed");

					if force_refresh {
						events::emit(
							&inner.listener,
							SourceComponent::RefreshAheadCaching,
							context.as_ref(),
							EventKind::ScheduledRefreshFailed { error: err.to_string() },
						);
					}

					events::emit(
						&inner.listener,
						SourceComponent::RefreshAheadCaching,
						context.as_ref(),
						EventKind::UnableToRefreshAheadOfExpiration,
					);
				},
			}
		});
	}

	async fn close(&self) {
		if let Some(task) = self.scheduled_task.lock().unwrap_or_else(PoisonError::into_inner).take()
		{
			task.abort();
		}

		self.caching.close_inner().await;

		let mut tasks = {
			let mut slot = self.refresh_tasks.lock().unwrap_or_else(PoisonError::into_inner);

			std::mem::take(&mut *slot)
		};

		tasks.abort_all();

		let _ = time::timeout(millis_duration(self.caching.cache_refresh_timeout()), async {
			while tasks.join_next().await.is_some() {}
		})
		.await;

		// a draining refresh may have scheduled one more one-shot
		if let Some(task) =
			self.scheduled_task.lock().unwrap_or_else(PoisonError::into_inner).take()
		{
			task.abort();
		}
	}
}
