use std::error::Error as StdError;

use tracing::warn;

/// Integrator-supplied policy for the resources a pool manages.
///
/// The pool itself treats resources as opaque values; everything
/// resource-specific lives behind this trait. `create` fabricates a new
/// instance, `ping` verifies liveness at checkout time, and `normalize`
/// resets per-use state (autocommit flags, read timeouts and the like)
/// before a resource is handed out.
pub trait Manager: Send + Sync + 'static {
    /// The pooled resource type. Its `Drop` implementation is its native
    /// close; the pool drops resources it discards and never closes them
    /// any other way.
    type Resource: Send + 'static;

    /// Opaque configuration handed to every `create` call. Exposed to
    /// callers only as a clone, so pool state cannot be mutated through it.
    type Args: Clone + Send + Sync + 'static;

    /// Error returned when a resource cannot be fabricated. Propagated
    /// unchanged to the caller of [`Pool::get`](crate::Pool::get).
    type Error: StdError + Send + Sync + 'static;

    /// Fabricate a new resource.
    ///
    /// Called with the pool lock held, so a reserved slot cannot be lost to
    /// a concurrent checkout while the factory runs.
    fn create(&self, args: &Self::Args) -> Result<Self::Resource, Self::Error>;

    /// Report whether the resource is still usable.
    ///
    /// Runs during every checkout. Returning `false` makes the pool discard
    /// the resource and fabricate a replacement.
    fn ping(&self, _resource: &mut Self::Resource) -> bool {
        warn!("Manager::ping is not overridden; assuming the resource is live");
        true
    }

    /// Reset mutable per-use state so every checkout observes a resource in
    /// the same condition.
    fn normalize(&self, _resource: &mut Self::Resource) {
        warn!("Manager::normalize is not overridden; per-use state carries over");
    }
}
