//! Shared doubles for driving the pipeline without a network.

// std
use std::{
	collections::VecDeque,
	sync::{Arc, Mutex, PoisonError, atomic::{AtomicUsize, Ordering}},
};
// crates.io
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jwks_resolver::{Error, JwkSetSource, RefreshEvaluator, Result, SecurityContext};

/// Build a synthetic JWK set holding one octet key per key-id.
pub fn jwk_set(kids: &[&str]) -> Arc<JwkSet> {
	let keys = kids
		.iter()
		.map(|kid| serde_json::json!({ "kty": "oct", "kid": kid, "k": "c2VjcmV0" }))
		.collect::<Vec<_>>();
	let jwk_set = serde_json::from_value(serde_json::json!({ "keys": keys }))
		.expect("synthetic JWK set must deserialize");

	Arc::new(jwk_set)
}

/// One scripted leaf response.
pub enum Step {
	Set(Arc<JwkSet>),
	Unavailable,
}

/// Scripted leaf source; once the script runs out, the last behaviour
/// repeats.
pub struct ScriptedLeaf {
	steps: Mutex<VecDeque<Step>>,
	last: Mutex<Option<Arc<JwkSet>>>,
	sticky_failure: Mutex<bool>,
	calls: Arc<AtomicUsize>,
}
impl ScriptedLeaf {
	pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let leaf = Self {
			steps: Mutex::new(steps.into()),
			last: Mutex::new(None),
			sticky_failure: Mutex::new(false),
			calls: calls.clone(),
		};

		(leaf, calls)
	}
}
#[async_trait]
impl JwkSetSource for ScriptedLeaf {
	async fn jwk_set(
		&self,
		_evaluator: &RefreshEvaluator,
		_now: i64,
		_context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let step = self.steps.lock().unwrap_or_else(PoisonError::into_inner).pop_front();

		match step {
			Some(Step::Set(jwk_set)) => {
				*self.last.lock().unwrap_or_else(PoisonError::into_inner) =
					Some(jwk_set.clone());
				*self.sticky_failure.lock().unwrap_or_else(PoisonError::into_inner) = false;

				Ok(jwk_set)
			},
			Some(Step::Unavailable) => {
				*self.sticky_failure.lock().unwrap_or_else(PoisonError::into_inner) = true;

				Err(Error::Unavailable("scripted upstream failure".into()))
			},
			None => {
				if *self.sticky_failure.lock().unwrap_or_else(PoisonError::into_inner) {
					return Err(Error::Unavailable("scripted upstream failure".into()));
				}

				// repeat the last served set as a new instance, the way a
				// stable upstream would
				let last = self.last.lock().unwrap_or_else(PoisonError::into_inner).clone();

				match last {
					Some(jwk_set) => Ok(Arc::new(JwkSet { keys: jwk_set.keys.clone() })),
					None => Err(Error::Unavailable("scripted leaf exhausted".into())),
				}
			},
		}
	}
}
