use std::error::Error as StdError;

/// Errors surfaced by pool operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E>
where
    E: StdError + Send + Sync + 'static,
{
    /// The checkout deadline elapsed without a resource being returned.
    #[error("pool is empty and no resource was returned within the timeout")]
    PoolEmpty,
    /// The resource is not tracked by this pool.
    #[error("resource does not belong to this pool")]
    UnknownResource,
    /// The factory failed while fabricating a resource.
    #[error(transparent)]
    Factory(E),
}

/// Errors rejected by [`Pool::new`](crate::Pool::new).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The pool requires a capacity of at least 1.
    #[error("pool capacity must be at least 1")]
    ZeroCapacity,
}

// Flow-control signal between grow/enqueue and checkout: there is no room
// for another tracker. Collapses into a wait (or `Error::PoolEmpty`) before
// reaching callers.
#[derive(Debug)]
pub(crate) struct PoolFull;
