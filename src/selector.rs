//! Key selection over a JWK set.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use jsonwebtoken::jwk::{Jwk, KeyAlgorithm, PublicKeyUse};
// self
use crate::_prelude::*;

/// Selects the subset of a JWK set an application call is interested in,
/// most commonly by key-id.
#[derive(Clone)]
pub struct JwkSelector {
	kind: SelectorKind,
}
impl JwkSelector {
	/// Select keys by key-id.
	pub fn key_id(kid: impl Into<String>) -> Self {
		Self { kind: SelectorKind::KeyId(kid.into()) }
	}

	/// Select keys by public key use.
	pub fn key_use(value: PublicKeyUse) -> Self {
		Self { kind: SelectorKind::KeyUse(value) }
	}

	/// Select keys by key algorithm.
	pub fn algorithm(value: KeyAlgorithm) -> Self {
		Self { kind: SelectorKind::Algorithm(value) }
	}

	/// Select keys with a custom predicate.
	pub fn matching(predicate: impl Fn(&Jwk) -> bool + Send + Sync + 'static) -> Self {
		Self { kind: SelectorKind::Predicate(Arc::new(predicate)) }
	}

	/// Apply the selector to `jwk_set`, returning the matching subset.
	pub fn select(&self, jwk_set: &JwkSet) -> Vec<Jwk> {
		jwk_set.keys.iter().filter(|jwk| self.matches(jwk)).cloned().collect()
	}

	fn matches(&self, jwk: &Jwk) -> bool {
		match &self.kind {
			SelectorKind::KeyId(kid) => jwk.common.key_id.as_deref() == Some(kid.as_str()),
			SelectorKind::KeyUse(value) => jwk.common.public_key_use.as_ref() == Some(value),
			SelectorKind::Algorithm(value) => jwk.common.key_algorithm.as_ref() == Some(value),
			SelectorKind::Predicate(predicate) => predicate(jwk),
		}
	}
}
impl Debug for JwkSelector {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match &self.kind {
			SelectorKind::KeyId(kid) => write!(f, "JwkSelector::KeyId({kid})"),
			SelectorKind::KeyUse(value) => write!(f, "JwkSelector::KeyUse({value:?})"),
			SelectorKind::Algorithm(value) => write!(f, "JwkSelector::Algorithm({value:?})"),
			SelectorKind::Predicate(_) => write!(f, "JwkSelector::Predicate"),
		}
	}
}

#[derive(Clone)]
enum SelectorKind {
	KeyId(String),
	KeyUse(PublicKeyUse),
	Algorithm(KeyAlgorithm),
	Predicate(Arc<dyn Fn(&Jwk) -> bool + Send + Sync>),
}
