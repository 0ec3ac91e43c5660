//! Generic JWK set source contract and the decorator chain built on it.

pub mod caching;
pub mod health;
pub mod outage;
pub mod rate_limit;
pub mod refresh_ahead;
pub mod retry;
pub mod url;


// std
use std::any::Any;
// crates.io
use async_trait::async_trait;
// self
use crate::_prelude::*;

/// Opaque per-call security context, passed through the stack untouched and
/// echoed in emitted events and health reports.
pub type SecurityContext = Arc<dyn Any + Send + Sync>;

/// A source of JWK sets, composable as a decorator chain.
///
/// `now` is the caller-supplied clock in milliseconds since the Unix epoch;
/// the chain reads no other clock on the request path, which keeps every
/// expiry code path reachable from tests without sleeping.
#[async_trait]
pub trait JwkSetSource: Send + Sync {
	/// Return the JWK set at `now`, honouring the refresh intent communicated
	/// by `evaluator`.
	async fn jwk_set(
		&self,
		evaluator: &RefreshEvaluator,
		now: i64,
		context: Option<&SecurityContext>,
	) -> Result<Arc<JwkSet>>;

	/// Release owned resources. Each decorator closes its inner source, so
	/// the chain closes from the outside in. Calls after close are undefined.
	async fn close(&self) {}
}
