//! End-to-end behaviour of builder-assembled stacks against a scripted leaf.

// std
use std::{
	sync::atomic::Ordering,
	time::Duration,
};
// crates.io
use jwks_resolver::{JwkSelector, JwkSourceBuilder};
use tokio::time;
// self
use crate::support::{ScriptedLeaf, Step, jwk_set};

#[tokio::test]
async fn the_first_fetch_is_reused_until_expiry() {
	let _ = tracing_subscriber::fmt::try_init();

	let (leaf, calls) = ScriptedLeaf::new(vec![Step::Set(jwk_set(&["a"])), Step::Unavailable]);
	let source = JwkSourceBuilder::from_source(Box::new(leaf)).build().expect("stack");
	let first = source.select(&JwkSelector::key_id("a"), None).await.expect("first");
	let second = source.select(&JwkSelector::key_id("a"), None).await.expect("second");

	assert_eq!(first.len(), 1);
	assert_eq!(second.len(), 1);
	// the default five-minute cache absorbs the second lookup
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	source.close().await;
}

#[tokio::test]
async fn expiry_refetches_and_picks_up_rotated_keys() {
	let _ = tracing_subscriber::fmt::try_init();

	let (leaf, calls) = ScriptedLeaf::new(vec![
		Step::Set(jwk_set(&["a"])),
		Step::Set(jwk_set(&["a", "b"])),
	]);
	let source = JwkSourceBuilder::from_source(Box::new(leaf))
		.cache_with(Duration::from_millis(300), Duration::from_millis(100))
		.refresh_ahead(false)
		.rate_limited_with(Duration::from_millis(100))
		.build()
		.expect("stack");
	let first = source.select(&JwkSelector::key_id("a"), None).await.expect("first");

	assert_eq!(first.len(), 1);

	time::sleep(Duration::from_millis(350)).await;

	let second = source.select(&JwkSelector::key_id("b"), None).await.expect("second");

	assert_eq!(second.len(), 1);
	assert_eq!(second[0].common.key_id.as_deref(), Some("b"));
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	source.close().await;
}

#[tokio::test]
async fn a_selector_miss_drives_a_refresh_before_expiry() {
	let _ = tracing_subscriber::fmt::try_init();

	let (leaf, calls) =
		ScriptedLeaf::new(vec![Step::Set(jwk_set(&["a"])), Step::Set(jwk_set(&["b"]))]);
	let source = JwkSourceBuilder::from_source(Box::new(leaf)).build().expect("stack");
	let first = source.select(&JwkSelector::key_id("a"), None).await.expect("first");

	assert_eq!(first.len(), 1);

	// "b" is not in the cached set; the miss re-queries with the observed
	// instance pinned, forcing one refresh
	let second = source.select(&JwkSelector::key_id("b"), None).await.expect("second");

	assert_eq!(second.len(), 1);
	assert_eq!(second[0].common.key_id.as_deref(), Some("b"));
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	source.close().await;
}

#[tokio::test]
async fn unknown_key_storms_are_rate_limited_without_starving_known_keys() {
	let _ = tracing_subscriber::fmt::try_init();

	let (leaf, calls) = ScriptedLeaf::new(vec![Step::Set(jwk_set(&["known"]))]);
	let min_time_interval = Duration::from_millis(300);
	let source = std::sync::Arc::new(
		JwkSourceBuilder::from_source(Box::new(leaf))
			.cache_with(Duration::from_secs(2), Duration::from_millis(200))
			.refresh_ahead(false)
			.rate_limited_with(min_time_interval)
			.build()
			.expect("stack"),
	);
	let deadline = time::Instant::now() + Duration::from_millis(700);
	let mut stormers = Vec::new();

	for _ in 0..4 {
		let source = source.clone();

		stormers.push(tokio::spawn(async move {
			while time::Instant::now() < deadline {
				let unknown = source
					.select(&JwkSelector::key_id("unknown"), None)
					.await
					.expect("storm lookups never error");

				assert!(unknown.is_empty());

				let known = source
					.select(&JwkSelector::key_id("known"), None)
					.await
					.expect("known lookups never error");

				assert_eq!(known.len(), 1);

				time::sleep(Duration::from_millis(10)).await;
			}
		}));
	}

	for storm in stormers {
		storm.await.expect("storm task");
	}

	// two retrievals per rate-limit window, plus the initial fetch
	let windows = 700_u64.div_ceil(300) as usize;

	assert!(calls.load(Ordering::SeqCst) <= 2 * windows + 1);

	source.close().await;
}

#[tokio::test]
async fn outages_are_bridged_until_the_outage_cache_expires() {
	let _ = tracing_subscriber::fmt::try_init();

	let (leaf, _calls) = ScriptedLeaf::new(vec![Step::Set(jwk_set(&["a"])), Step::Unavailable]);
	let source = JwkSourceBuilder::from_source(Box::new(leaf))
		.cache_with(Duration::from_millis(150), Duration::from_millis(100))
		.refresh_ahead(false)
		.rate_limited_with(Duration::from_millis(50))
		.outage_tolerant_with(Duration::from_millis(600))
		.build()
		.expect("stack");
	let first = source.select(&JwkSelector::key_id("a"), None).await.expect("first");

	assert_eq!(first.len(), 1);

	// cache expired, upstream down: the outage cache bridges the gap
	time::sleep(Duration::from_millis(200)).await;

	let bridged = source.select(&JwkSelector::key_id("a"), None).await.expect("bridged");

	assert_eq!(bridged.len(), 1);

	// outage window exhausted: the upstream failure surfaces
	time::sleep(Duration::from_millis(500)).await;

	let err = source.select(&JwkSelector::key_id("a"), None).await.unwrap_err();

	assert!(err.is_unavailable());

	source.close().await;
}

#[tokio::test]
async fn retrial_bridges_a_single_transient_failure() {
	let _ = tracing_subscriber::fmt::try_init();

	let (leaf, calls) = ScriptedLeaf::new(vec![
		Step::Unavailable,
		Step::Set(jwk_set(&["a"])),
	]);
	let source = JwkSourceBuilder::from_source(Box::new(leaf))
		.retrying(true)
		.build()
		.expect("stack");
	let first = source.select(&JwkSelector::key_id("a"), None).await.expect("retried");

	assert_eq!(first.len(), 1);
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	source.close().await;
}
