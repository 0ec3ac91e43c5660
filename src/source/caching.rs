//! Time-to-live caching source with blocking single-flight refresh.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use async_trait::async_trait;
use tokio::{
	sync::{Mutex, RwLock},
	time,
};
// self
use crate::{
	_prelude::*,
	cache::CachedObject,
	events::{self, EventKind, EventListener, SourceComponent},
	source::SecurityContext,
};

/// Caching [`JwkSetSource`] that blocks callers during cache updates.
///
/// A single refresh mutex serialises updates: the first caller to acquire it
/// exclusively calls the inner source, later callers wait up to the cache
/// refresh timeout and then reuse the result. A waiter that eventually gets
/// the mutex re-checks its evaluator against the current cache first, so a
/// refresh performed meanwhile is reused instead of repeated.
pub struct CachingSource {
	source: Box<dyn JwkSetSource>,
	time_to_live: i64,
	cache_refresh_timeout: i64,
	component: SourceComponent,
	cached: RwLock<Option<CachedObject<Arc<JwkSet>>>>,
	refresh_lock: Mutex<()>,
	waiters: AtomicUsize,
	listener: Option<EventListener>,
}
impl CachingSource {
	/// Wrap `source` with a cache living for `time_to_live` milliseconds;
	/// contended callers wait up to `cache_refresh_timeout` milliseconds for
	/// an in-flight refresh.
	pub fn new(
		source: Box<dyn JwkSetSource>,
		time_to_live: i64,
		cache_refresh_timeout: i64,
		listener: Option<EventListener>,
	) -> Self {
		Self::with_component(
			source,
			time_to_live,
			cache_refresh_timeout,
			SourceComponent::Caching,
			listener,
		)
	}

	pub(crate) fn with_component(
		source: Box<dyn JwkSetSource>,
		time_to_live: i64,
		cache_refresh_timeout: i64,
		component: SourceComponent,
		listener: Option<EventListener>,
	) -> Self {
		Self {
			source,
			time_to_live,
			cache_refresh_timeout,
			component,
			cached: RwLock::new(None),
			refresh_lock: Mutex::new(()),
			waiters: AtomicUsize::new(0),
			listener,
		}
	}

	/// The time to live of the cached JWK set, in milliseconds.
	pub fn time_to_live(&self) -> i64 {
		self.time_to_live
	}

	/// The cache refresh timeout, in milliseconds.
	pub fn cache_refresh_timeout(&self) -> i64 {
		self.cache_refresh_timeout
	}

	pub(crate) async fn cached(&self) -> Option<CachedObject<Arc<JwkSet>>> {
		self.cached.read().await.clone()
	}

	fn queue_length(&self) -> usize {
		self.waiters.load(Ordering::Relaxed)
	}

	/// Load and cache the JWK set, serialising refreshers on the refresh
	/// mutex.
	pub(crate) async fn load_blocking(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		if let Ok(_guard) = self.refresh_lock.try_lock() {
			return self.refresh_under_lock(evaluator, now, context).await;
		}

		events::emit(
			&self.listener,
			self.component,
			context,
			EventKind::WaitingForRefresh { queue_length: self.queue_length() },
		);

		self.waiters.fetch_add(1, Ordering::Relaxed);

		let acquired =
			time::timeout(millis_duration(self.cache_refresh_timeout), self.refresh_lock.lock())
				.await;

		self.waiters.fetch_sub(1, Ordering::Relaxed);

		match acquired {
			Ok(_guard) => self.refresh_under_lock(evaluator, now, context).await,
			Err(_) => {
				events::emit(
					&self.listener,
					self.component,
					context,
					EventKind::RefreshTimedOut { queue_length: self.queue_length() },
				);

				Err(Error::Unavailable(format!(
					"Timeout while waiting for cache refresh ({}ms exceeded)",
					self.cache_refresh_timeout
				)))
			},
		}
	}

	// Must only run while the refresh mutex is held.
	async fn refresh_under_lock(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		let current = self.cached().await;
		let cache = match current {
			// another refresher satisfied this evaluator while we waited
			Some(cache) if !evaluator.requires_refresh(cache.value()) => cache,
			_ => {
				events::emit(
					&self.listener,
					self.component,
					context,
					EventKind::RefreshInitiated { queue_length: self.queue_length() },
				);

				let jwk_set = self.source.jwk_set(evaluator, now, context).await?;
				let cache = CachedObject::new(jwk_set.clone(), now, self.time_to_live);

				*self.cached.write().await = Some(cache.clone());

				events::emit(
					&self.listener,
					self.component,
					context,
					EventKind::RefreshCompleted { jwk_set, queue_length: self.queue_length() },
				);

				cache
			},
		};

		if cache.is_valid(now) {
			return Ok(cache.value().clone());
		}

		events::emit(&self.listener, self.component, context, EventKind::UnableToRefresh);

		Err(Error::Unavailable("Unable to refresh cache".into()))
	}

	pub(crate) async fn close_inner(&self) {
		self.source.close().await;
		*self.cached.write().await = None;
	}
}
#[async_trait]
impl JwkSetSource for CachingSource {
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		let Some(cache) = self.cached().await else {
			tracing::debug!("cache empty, performing initial fetch");

			return self.load_blocking(&RefreshEvaluator::NoRefresh, now, context).await;
		};

		if evaluator.requires_refresh(cache.value()) {
			return self.load_blocking(evaluator, now, context).await;
		}
		if cache.is_expired(now) {
			return self
				.load_blocking(
					&RefreshEvaluator::ReferenceComparison(cache.value().clone()),
					now,
					context,
				)
				.await;
		}

		Ok(cache.value().clone())
	}

	async fn close(&self) {
		self.close_inner().await;
	}
}

pub(crate) fn millis_duration(millis: i64) -> Duration {
	Duration::from_millis(millis.max(0) as u64)
}
