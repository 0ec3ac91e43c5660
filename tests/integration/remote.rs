//! End-to-end tests over a real HTTP endpoint.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use jwks_resolver::{JwkSelector, JwkSourceBuilder};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

const JWKS_BODY: &str = r#"{
    "keys": [
        {
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": "primary",
            "n": "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYnKCkqKywtLi8wMTIzNDU2Nzg5Ojs8PT4_QEFCQ0RFRkdISUpLTE1OT1BRUlNUVVZXWFlaW1xdXl9gYWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1-f4A",
            "e": "AQAB"
        }
    ]
}"#;

fn jwks_url(server: &MockServer) -> Url {
	Url::parse(&format!("{}/.well-known/jwks.json", server.uri())).expect("url")
}

#[tokio::test]
async fn fetches_and_caches_a_remote_jwk_set() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/.well-known/jwks.json"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(JWKS_BODY)
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let source =
		JwkSourceBuilder::from_url(jwks_url(&server)).expect("builder").build().expect("stack");
	let first = source.select(&JwkSelector::key_id("primary"), None).await.expect("first");
	let second = source.select(&JwkSelector::key_id("primary"), None).await.expect("second");

	assert_eq!(first.len(), 1);
	assert_eq!(second.len(), 1);

	source.close().await;
	server.verify().await;
}

#[tokio::test]
async fn retrial_recovers_from_a_transient_upstream_error() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let request_counter = Arc::new(AtomicUsize::new(0));
	let counter_handle = request_counter.clone();

	Mock::given(method("GET"))
		.and(path("/.well-known/jwks.json"))
		.respond_with(move |_: &wiremock::Request| {
			match counter_handle.fetch_add(1, Ordering::SeqCst) {
				0 => ResponseTemplate::new(500),
				_ => ResponseTemplate::new(200)
					.set_body_string(JWKS_BODY)
					.insert_header("content-type", "application/json"),
			}
		})
		.mount(&server)
		.await;

	let source = JwkSourceBuilder::from_url(jwks_url(&server))
		.expect("builder")
		.retrying(true)
		.build()
		.expect("stack");
	let keys = source.select(&JwkSelector::key_id("primary"), None).await.expect("retried");

	assert_eq!(keys.len(), 1);
	assert_eq!(request_counter.load(Ordering::SeqCst), 2);

	source.close().await;
}

#[tokio::test]
async fn unknown_kids_re_query_the_endpoint_once() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/.well-known/jwks.json"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(JWKS_BODY)
				.insert_header("content-type", "application/json"),
		)
		.expect(2)
		.mount(&server)
		.await;

	let source =
		JwkSourceBuilder::from_url(jwks_url(&server)).expect("builder").build().expect("stack");
	let missing = source.select(&JwkSelector::key_id("rotated-away"), None).await.expect("miss");

	assert!(missing.is_empty());

	source.close().await;
	server.verify().await;
}

#[tokio::test]
async fn oversized_responses_are_rejected_as_unavailable() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let oversized = format!(
		r#"{{ "keys": [], "padding": "{}" }}"#,
		"x".repeat(64 * 1024)
	);

	Mock::given(method("GET"))
		.and(path("/.well-known/jwks.json"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(oversized)
				.insert_header("content-type", "application/json"),
		)
		.mount(&server)
		.await;

	let source = JwkSourceBuilder::from_url(jwks_url(&server))
		.expect("builder")
		.retrying(false)
		.build()
		.expect("stack");
	let err = source.select(&JwkSelector::key_id("primary"), None).await.unwrap_err();

	assert!(err.is_unavailable());

	source.close().await;
}
