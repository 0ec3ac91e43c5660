//! Assembly and validation of the JWK source decorator stack.

// std
use std::time::Duration;
// crates.io
use url::Url;
// self
use crate::{
	_prelude::*,
	events::EventListener,
	health::HealthListener,
	http::{DefaultResourceRetriever, ResourceRetriever},
	key_source::{FailoverJwkSource, JwkSource, SelectingJwkSource},
	source::{
		caching::CachingSource, health::HealthReportingSource, outage::OutageSource,
		rate_limit::RateLimitedSource, refresh_ahead::RefreshAheadSource, retry::RetrySource,
		url::UrlSource,
	},
};

/// Default time to live of cached JWK sets: 5 minutes.
pub const DEFAULT_CACHE_TIME_TO_LIVE: i64 = 5 * 60 * 1_000;
/// Default cache refresh timeout: 15 seconds.
pub const DEFAULT_CACHE_REFRESH_TIMEOUT: i64 = 15 * 1_000;
/// Default refresh-ahead time: 30 seconds.
pub const DEFAULT_REFRESH_AHEAD_TIME: i64 = 30_000;
/// Default rate-limiting minimum time interval between retrievals: 30
/// seconds.
pub const DEFAULT_RATE_LIMIT_MIN_INTERVAL: i64 = 30_000;

/// Builds a [`JwkSource`] by wrapping a leaf JWK set source with the
/// selected capabilities in their canonical order, outermost first:
/// failover, selection, refresh-ahead or plain caching, rate limiting,
/// health reporting, outage tolerance, retrial, leaf.
///
/// Caching, refresh-ahead, and rate limiting are enabled by default;
/// retrial, outage tolerance, health reporting, and failover are opt-in.
pub struct JwkSourceBuilder {
	source: Box<dyn JwkSetSource>,
	caching: bool,
	cache_time_to_live: i64,
	cache_refresh_timeout: i64,
	caching_listener: Option<EventListener>,
	refresh_ahead: bool,
	refresh_ahead_time: i64,
	refresh_ahead_scheduled: bool,
	rate_limited: bool,
	min_time_interval: i64,
	rate_limit_listener: Option<EventListener>,
	retrying: bool,
	retry_listener: Option<EventListener>,
	outage_tolerant: bool,
	outage_time_to_live: Option<i64>,
	outage_listener: Option<EventListener>,
	health_listener: Option<HealthListener>,
	failover: Option<Box<dyn JwkSource>>,
}
impl JwkSourceBuilder {
	/// Start from a JWK set URL, fetched with the default retriever
	/// (default timeouts and size limit).
	pub fn from_url(url: Url) -> Result<Self> {
		let retriever = DefaultResourceRetriever::new()?;

		Ok(Self::from_source(Box::new(UrlSource::new(url, Box::new(retriever)))))
	}

	/// Start from a JWK set URL fetched with the supplied retriever.
	pub fn from_url_with_retriever(url: Url, retriever: Box<dyn ResourceRetriever>) -> Self {
		Self::from_source(Box::new(UrlSource::new(url, retriever)))
	}

	/// Start from an existing leaf source.
	pub fn from_source(source: Box<dyn JwkSetSource>) -> Self {
		Self {
			source,
			caching: true,
			cache_time_to_live: DEFAULT_CACHE_TIME_TO_LIVE,
			cache_refresh_timeout: DEFAULT_CACHE_REFRESH_TIMEOUT,
			caching_listener: None,
			refresh_ahead: true,
			refresh_ahead_time: DEFAULT_REFRESH_AHEAD_TIME,
			refresh_ahead_scheduled: false,
			rate_limited: true,
			min_time_interval: DEFAULT_RATE_LIMIT_MIN_INTERVAL,
			rate_limit_listener: None,
			retrying: false,
			retry_listener: None,
			outage_tolerant: false,
			outage_time_to_live: None,
			outage_listener: None,
			health_listener: None,
			failover: None,
		}
	}

	/// Toggle caching of the JWK set.
	pub fn cache(mut self, enable: bool) -> Self {
		self.caching = enable;

		self
	}

	/// Enable caching with an explicit time to live and refresh timeout.
	pub fn cache_with(mut self, time_to_live: Duration, cache_refresh_timeout: Duration) -> Self {
		self.caching = true;
		self.cache_time_to_live = millis(time_to_live);
		self.cache_refresh_timeout = millis(cache_refresh_timeout);

		self
	}

	/// Cache the JWK set forever (no expiration); disables refresh-ahead,
	/// which a non-expiring cache never needs.
	pub fn cache_forever(mut self) -> Self {
		self.caching = true;
		self.cache_time_to_live = i64::MAX;
		self.refresh_ahead = false;

		self
	}

	/// Attach an event listener to the caching layer (plain or
	/// refresh-ahead).
	pub fn cache_event_listener(mut self, listener: EventListener) -> Self {
		self.caching_listener = Some(listener);

		self
	}

	/// Toggle refresh-ahead caching; enabling it also enables caching.
	pub fn refresh_ahead(mut self, enable: bool) -> Self {
		if enable {
			self.caching = true;
		}

		self.refresh_ahead = enable;

		self
	}

	/// Enable refresh-ahead caching with an explicit window; `scheduled`
	/// additionally refreshes on a schedule, regardless of request traffic.
	pub fn refresh_ahead_with(mut self, refresh_ahead_time: Duration, scheduled: bool) -> Self {
		self.caching = true;
		self.refresh_ahead = true;
		self.refresh_ahead_time = millis(refresh_ahead_time);
		self.refresh_ahead_scheduled = scheduled;

		self
	}

	/// Toggle rate limiting of JWK set retrievals.
	pub fn rate_limited(mut self, enable: bool) -> Self {
		self.rate_limited = enable;

		self
	}

	/// Enable rate limiting with an explicit minimum time interval between
	/// retrievals.
	pub fn rate_limited_with(mut self, min_time_interval: Duration) -> Self {
		self.rate_limited = true;
		self.min_time_interval = millis(min_time_interval);

		self
	}

	/// Attach an event listener to the rate limiter.
	pub fn rate_limit_event_listener(mut self, listener: EventListener) -> Self {
		self.rate_limit_listener = Some(listener);

		self
	}

	/// Toggle a single retrial on transient retrieval failures.
	pub fn retrying(mut self, enable: bool) -> Self {
		self.retrying = enable;

		self
	}

	/// Attach an event listener to the retry layer.
	pub fn retry_event_listener(mut self, listener: EventListener) -> Self {
		self.retry_listener = Some(listener);

		self
	}

	/// Toggle outage tolerance. Without an explicit time to live the outage
	/// cache lives for ten times the cache time to live.
	pub fn outage_tolerant(mut self, enable: bool) -> Self {
		self.outage_tolerant = enable;

		self
	}

	/// Enable outage tolerance with an explicit time to live.
	pub fn outage_tolerant_with(mut self, time_to_live: Duration) -> Self {
		self.outage_tolerant = true;
		self.outage_time_to_live = Some(millis(time_to_live));

		self
	}

	/// Serve the last known good JWK set indefinitely during outages.
	pub fn outage_tolerant_forever(mut self) -> Self {
		self.outage_tolerant = true;
		self.outage_time_to_live = Some(i64::MAX);

		self
	}

	/// Attach an event listener to the outage layer.
	pub fn outage_event_listener(mut self, listener: EventListener) -> Self {
		self.outage_listener = Some(listener);

		self
	}

	/// Report the health of every retrieval to `listener`.
	pub fn health_reporting(mut self, listener: HealthListener) -> Self {
		self.health_listener = Some(listener);

		self
	}

	/// Delegate to `failover` when this source fails.
	pub fn failover(mut self, failover: Box<dyn JwkSource>) -> Self {
		self.failover = Some(failover);

		self
	}

	/// Validate the configuration and assemble the stack.
	pub fn build(self) -> Result<Box<dyn JwkSource>> {
		if !self.caching && self.rate_limited {
			return Err(Error::Validation {
				field: "rate_limited",
				reason: "Rate limiting requires caching.".into(),
			});
		}
		if !self.caching && self.refresh_ahead {
			return Err(Error::Validation {
				field: "refresh_ahead",
				reason: "Refresh-ahead caching requires general caching.".into(),
			});
		}
		if self.caching && self.rate_limited && self.cache_time_to_live <= self.min_time_interval
		{
			return Err(Error::Validation {
				field: "min_time_interval",
				reason:
					"The rate-limiting minimum time interval between requests must be less than the cache time-to-live."
						.into(),
			});
		}
		if self.caching
			&& self.outage_tolerant
			&& self.cache_time_to_live == i64::MAX
			&& self.outage_time_to_live == Some(i64::MAX)
		{
			return Err(Error::Validation {
				field: "outage_tolerant",
				reason: "Outage tolerance is not necessary with a non-expiring cache.".into(),
			});
		}
		if self.caching && self.refresh_ahead && self.cache_time_to_live == i64::MAX {
			return Err(Error::Validation {
				field: "refresh_ahead",
				reason: "Refresh-ahead caching is not necessary with a non-expiring cache.".into(),
			});
		}

		let mut source = self.source;

		if self.retrying {
			source = Box::new(RetrySource::new(source, self.retry_listener));
		}
		if self.outage_tolerant {
			let time_to_live = self.outage_time_to_live.unwrap_or(if self.caching {
				self.cache_time_to_live.saturating_mul(10)
			} else {
				DEFAULT_CACHE_TIME_TO_LIVE * 10
			});

			source = Box::new(OutageSource::new(source, time_to_live, self.outage_listener));
		}
		if let Some(listener) = self.health_listener {
			source = Box::new(HealthReportingSource::new(source, listener));
		}
		if self.rate_limited {
			source = Box::new(RateLimitedSource::new(
				source,
				self.min_time_interval,
				self.rate_limit_listener,
			));
		}
		if self.refresh_ahead {
			source = Box::new(RefreshAheadSource::new(
				source,
				self.cache_time_to_live,
				self.cache_refresh_timeout,
				self.refresh_ahead_time,
				self.refresh_ahead_scheduled,
				self.caching_listener,
			)?);
		} else if self.caching {
			source = Box::new(CachingSource::new(
				source,
				self.cache_time_to_live,
				self.cache_refresh_timeout,
				self.caching_listener,
			));
		}

		let jwk_source: Box<dyn JwkSource> = Box::new(SelectingJwkSource::new(source));

		Ok(match self.failover {
			Some(failover) => Box::new(FailoverJwkSource::new(jwk_source, failover)),
			None => jwk_source,
		})
	}
}

fn millis(value: Duration) -> i64 {
	i64::try_from(value.as_millis()).unwrap_or(i64::MAX)
}
