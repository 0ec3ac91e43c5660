//! Composable JWK set resolution pipeline — single-flight caching,
//! refresh-ahead, rate limiting, retrial, and outage tolerance between an
//! application and a remote JWKS endpoint.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod builder;
pub mod cache;
pub mod evaluator;
pub mod events;
pub mod health;
pub mod http;
pub mod key_source;
pub mod selector;
pub mod source;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use jsonwebtoken::jwk::JwkSet;

	pub use crate::{
		Error, Result,
		evaluator::RefreshEvaluator,
		source::{JwkSetSource, SecurityContext},
	};
}
pub use crate::{
	builder::JwkSourceBuilder,
	error::{Error, Result},
	evaluator::RefreshEvaluator,
	key_source::JwkSource,
	selector::JwkSelector,
	source::{JwkSetSource, SecurityContext},
};
