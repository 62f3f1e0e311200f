use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::trace;

use crate::manager::Manager;
use crate::pool::{SharedPool, WeakOpt};

// Liveness token for one checkout. The wrapper holds the only strong
// reference; the pool's tracker holds a weak one, so "the token is dead"
// means "no wrapper presents this resource any more".
pub(crate) struct Lease {
    id: u64,
}

impl Lease {
    pub(crate) fn new(id: u64) -> Lease {
        Lease { id }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// A checked-out resource.
///
/// Dereferences to the underlying resource. The resource goes back to the
/// pool when the wrapper is dropped, on every exit path including panic
/// unwinding; [`close`](Pooled::close) is the explicit spelling. Because the
/// wrapper's own methods shadow any same-named methods on the resource,
/// calling `close()` on the handle always means "return to the pool", never
/// the resource's native close.
///
/// A wrapper that outlives its pool simply drops the resource.
pub struct Pooled<M: Manager> {
    resource: Option<M::Resource>,
    lease: Option<Arc<Lease>>,
    pool: WeakOpt<SharedPool<M>>,
    is_reused: bool,
}

impl<M: Manager> Pooled<M> {
    pub(crate) fn new(
        resource: M::Resource,
        lease: Arc<Lease>,
        pool: WeakOpt<SharedPool<M>>,
        is_reused: bool,
    ) -> Pooled<M> {
        Pooled {
            resource: Some(resource),
            lease: Some(lease),
            pool,
            is_reused,
        }
    }

    /// Whether this checkout dequeued an existing resource rather than
    /// fabricating a fresh one.
    pub fn is_reused(&self) -> bool {
        self.is_reused
    }

    /// The underlying resource.
    pub fn resource(&self) -> &M::Resource {
        self.resource.as_ref().expect("wrapper already closed")
    }

    /// The underlying resource, mutably.
    pub fn resource_mut(&mut self) -> &mut M::Resource {
        self.resource.as_mut().expect("wrapper already closed")
    }

    /// Return the resource to the pool.
    ///
    /// Consuming the wrapper makes a second close unrepresentable. Dropping
    /// the wrapper has the same effect; after either, the wrapper holds
    /// neither the resource nor a pool reference.
    pub fn close(self) {
        // Drop runs the return path.
    }

    /// Take ownership of the underlying resource, removing it from the
    /// pool.
    ///
    /// The pool reclaims the abandoned slot during its next harvest, after
    /// which a replacement resource can be constructed in its place.
    pub fn detach(mut self) -> M::Resource {
        let resource = self.resource.take().expect("wrapper already closed");
        self.lease.take();
        trace!("resource detached from its pool");
        resource
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<SharedPool<M>>) -> bool {
        self.pool
            .upgrade()
            .map_or(false, |pool| Arc::ptr_eq(&pool, shared))
    }

    // Dismantle the wrapper for an explicit `Pool::put`. The lease is
    // handed to the caller so it outlives the return; dropping it earlier
    // would let a concurrent harvest observe a dead token mid-return.
    pub(crate) fn into_parts(mut self) -> (u64, M::Resource, Arc<Lease>) {
        let resource = self.resource.take().expect("wrapper already closed");
        let lease = self.lease.take().expect("wrapper already closed");
        (lease.id(), resource, lease)
    }

    fn return_to_pool(&mut self) {
        let resource = match self.resource.take() {
            Some(resource) => resource,
            None => return,
        };
        let lease = self.lease.take().expect("lease held while resource held");
        match self.pool.upgrade() {
            Some(shared) => {
                // An error here means the pool no longer tracks this
                // resource (it was cleared); the value is dropped and its
                // own Drop closes it.
                let _ = shared.put_back(lease.id(), resource);
            }
            None => trace!("pool dropped before the resource returned; dropping resource"),
        }
    }
}

impl<M: Manager> Deref for Pooled<M> {
    type Target = M::Resource;

    fn deref(&self) -> &M::Resource {
        self.resource()
    }
}

impl<M: Manager> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut M::Resource {
        self.resource_mut()
    }
}

impl<M: Manager> Drop for Pooled<M> {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}

impl<M: Manager> fmt::Debug for Pooled<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("is_reused", &self.is_reused)
            .finish()
    }
}
