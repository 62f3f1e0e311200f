use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{ConfigError, Error, PoolFull};
use crate::manager::Manager;
use crate::resource::{Lease, Pooled};

/// A bounded pool of reusable resources.
///
/// The pool keeps at most `capacity + overflow` resources in existence at
/// once. Checkouts prefer an already-constructed resource, fall back to
/// fabricating a new one while under the ceiling, and otherwise block until
/// a resource is returned or the configured timeout elapses.
///
/// `Pool` is a shared handle: clones refer to the same underlying pool and
/// may be sent freely across threads.
pub struct Pool<M: Manager> {
    shared: Arc<SharedPool<M>>,
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Pool<M> {
        Pool {
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct SharedPool<M: Manager> {
    manager: M,
    args: M::Args,
    config: Config,
    inner: Mutex<PoolInner<M::Resource>>,
    // Signalled once per returned resource; checkout blocks here when the
    // available region is empty.
    not_empty: Condvar,
}

// The ring is split in two. `[start, start + available)` is the available
// region, a FIFO queue of parked trackers. The rest is the unavailable
// region: checked-out trackers in arbitrary order, plus the only `None`
// slots. `end` sits one past the available region and is where a returned
// tracker is swapped in.
struct PoolInner<R> {
    slots: Box<[Option<Tracker<R>>]>,
    start: usize,
    end: usize,
    // Trackers in existence, parked or not.
    size: usize,
    // Trackers currently queued in the available region.
    available: usize,
    next_id: u64,
}

// Bookkeeping for one live resource. `stash` holds the value while it is
// parked in the pool; `lease` weakly references the token inside the
// wrapper currently presenting it.
struct Tracker<R> {
    id: u64,
    stash: Option<R>,
    lease: WeakOpt<Lease>,
}

impl<R> Tracker<R> {
    fn new(id: u64, resource: R) -> Tracker<R> {
        Tracker {
            id,
            stash: Some(resource),
            lease: WeakOpt::none(),
        }
    }

    // No wrapper is keeping this resource checked out. Upgrading observes
    // clearedness without retaining a strong reference.
    fn available(&self) -> bool {
        self.lease.upgrade().is_none()
    }
}

impl<M: Manager> Pool<M> {
    /// Create a pool that fabricates resources with `manager`, handing
    /// `args` to every factory call.
    pub fn new(manager: M, args: M::Args, config: Config) -> Result<Pool<M>, ConfigError> {
        if config.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Pool {
            shared: Arc::new(SharedPool {
                manager,
                args,
                config,
                inner: Mutex::new(PoolInner::new(config.maxsize())),
                not_empty: Condvar::new(),
            }),
        })
    }

    /// Check out a resource, blocking up to the configured timeout when the
    /// pool is exhausted.
    ///
    /// The resource has passed the manager's liveness probe and been
    /// normalised. Fails with [`Error::PoolEmpty`] when the deadline
    /// elapses, or with [`Error::Factory`] when a needed fabrication fails.
    pub fn get(&self) -> Result<Pooled<M>, Error<M::Error>> {
        self.shared.checkout(true)
    }

    /// Check out a resource without blocking.
    ///
    /// Runs the non-blocking part of checkout (reclaim, dequeue, grow) and
    /// returns `Ok(None)` where [`get`](Pool::get) would wait.
    pub fn try_get(&self) -> Result<Option<Pooled<M>>, Error<M::Error>> {
        match self.shared.checkout(false) {
            Ok(pooled) => Ok(Some(pooled)),
            Err(Error::PoolEmpty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Explicitly return a checked-out resource.
    ///
    /// Equivalent to dropping the wrapper, except that a wrapper belonging
    /// to a different pool is rejected with [`Error::UnknownResource`]
    /// before going home to its own pool as it drops.
    pub fn put(&self, resource: Pooled<M>) -> Result<(), Error<M::Error>> {
        if !resource.belongs_to(&self.shared) {
            return Err(Error::UnknownResource);
        }
        let (id, value, lease) = resource.into_parts();
        let result = self.shared.put_back(id, value);
        drop(lease);
        result
    }

    /// Drop every tracked resource.
    ///
    /// Parked resources are closed immediately by being dropped. Resources
    /// currently checked out are forgotten; they are dropped when their
    /// wrappers try to come home.
    pub fn clear(&self) {
        let mut inner = self.shared.inner.lock();
        let dropped = inner.size;
        for slot in inner.slots.iter_mut() {
            *slot = None;
        }
        inner.size = 0;
        inner.available = 0;
        inner.start = 0;
        inner.end = 0;
        debug!("cleared the pool, dropping {} trackers", dropped);
    }

    /// The number of resources in existence, parked or checked out.
    pub fn size(&self) -> usize {
        self.shared.inner.lock().size
    }

    /// The number of resources parked and ready for checkout.
    pub fn available(&self) -> usize {
        self.shared.inner.lock().available
    }

    /// Whether no resource is currently parked.
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Steady-state maximum of parked resources.
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Temporary headroom above capacity.
    pub fn overflow(&self) -> usize {
        self.shared.config.overflow
    }

    /// Hard ceiling on concurrently existing resources.
    pub fn maxsize(&self) -> usize {
        self.shared.config.maxsize()
    }

    /// The checkout deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.shared.config.timeout
    }

    /// A copy of the arguments handed to the factory.
    ///
    /// Mutating the returned value has no effect on the pool.
    pub fn factory_arguments(&self) -> M::Args {
        self.shared.args.clone()
    }

    #[cfg(test)]
    fn locked(&self) -> MutexGuard<'_, PoolInner<M::Resource>> {
        self.shared.inner.lock()
    }

    #[cfg(test)]
    fn harvest_now(&self) {
        let mut inner = self.shared.inner.lock();
        self.shared.harvest(&mut inner);
    }
}

impl<M: Manager> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Pool")
            .field("size", &inner.size)
            .field("available", &inner.available)
            .field("maxsize", &inner.slots.len())
            .finish()
    }
}

impl<M: Manager> SharedPool<M> {
    // The checkout phases run in a fixed order under one lock acquisition:
    // reclaim abandoned slots if nothing is queued, dequeue, grow, and only
    // then block. The thread suspends nowhere but the condition wait.
    fn checkout(self: &Arc<Self>, block: bool) -> Result<Pooled<M>, Error<M::Error>> {
        let mut inner = self.inner.lock();

        if inner.is_empty() {
            self.harvest(&mut inner);
        }

        let mut reused = true;
        let mut idx = inner.dequeue();

        if idx.is_none() {
            if let Some(grown) = self.try_grow(&mut inner).map_err(Error::Factory)? {
                idx = Some(grown);
                reused = false;
            }
        }

        let mut idx = match idx {
            Some(idx) => idx,
            None if block => self.wait_for_resource(&mut inner)?,
            None => return Err(Error::PoolEmpty),
        };

        let (mut resource, mut id) = {
            let tracker = inner.slots[idx].as_mut().expect("checked-out slot is occupied");
            let resource = tracker.stash.take().expect("parked tracker holds a resource");
            (resource, tracker.id)
        };

        if !self.manager.ping(&mut resource) {
            debug!("resource {} failed its liveness probe, replacing it", id);
            drop(resource);
            inner.remove_at(idx);
            // The lock has not been released since the removal, so the
            // freed slot cannot be claimed by a concurrent grow.
            idx = self
                .try_grow(&mut inner)
                .map_err(Error::Factory)?
                .expect("removal left room to grow");
            let tracker = inner.slots[idx].as_mut().expect("grown slot is occupied");
            resource = tracker.stash.take().expect("fresh tracker holds a resource");
            id = tracker.id;
            reused = false;
        }

        self.manager.normalize(&mut resource);

        let lease = Arc::new(Lease::new(id));
        inner.slots[idx]
            .as_mut()
            .expect("checked-out slot is occupied")
            .lease = WeakOpt::downgrade(&lease);
        drop(inner);

        trace!("checkout of resource {} complete, reused: {}", id, reused);
        Ok(Pooled::new(resource, lease, WeakOpt::downgrade(self), reused))
    }

    // Step 4 of checkout: wait on the not-empty condition. The deadline is
    // computed once; spurious wakes re-arm with the remaining budget.
    fn wait_for_resource(
        &self,
        inner: &mut MutexGuard<'_, PoolInner<M::Resource>>,
    ) -> Result<usize, Error<M::Error>> {
        match self.config.timeout {
            None => {
                while inner.is_empty() {
                    trace!("checkout waiting for a returned resource");
                    self.not_empty.wait(inner);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while inner.is_empty() {
                    trace!("checkout waiting for a returned resource");
                    if self.not_empty.wait_until(inner, deadline).timed_out() {
                        if inner.is_empty() {
                            debug!("checkout deadline elapsed with the pool still empty");
                            return Err(Error::PoolEmpty);
                        }
                        break;
                    }
                }
            }
        }
        Ok(inner.dequeue().expect("not-empty signalled with nothing queued"))
    }

    // Step 3 of checkout: reserve the first empty unavailable slot and
    // fabricate a resource into it. `Ok(None)` means the pool is at its
    // ceiling. The factory runs with the lock held; slot reservation and
    // construction are atomic.
    fn try_grow(
        &self,
        inner: &mut PoolInner<M::Resource>,
    ) -> Result<Option<usize>, M::Error> {
        let idx = match inner.vacant_slot() {
            Ok(idx) => idx,
            Err(PoolFull) => return Ok(None),
        };
        let resource = self.manager.create(&self.args)?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots[idx] = Some(Tracker::new(id, resource));
        inner.size += 1;
        debug!("fabricated resource {} into slot {}", id, idx);
        Ok(Some(idx))
    }

    /// Return `resource` to the tracker identified by `id`, re-queueing it
    /// or contracting the pool when the available region is saturated.
    pub(crate) fn put_back(&self, id: u64, resource: M::Resource) -> Result<(), Error<M::Error>> {
        let mut inner = self.inner.lock();
        let idx = match inner.find_tracker(id) {
            Some(idx) => idx,
            None => {
                debug!("returned resource {} is no longer tracked, dropping it", id);
                return Err(Error::UnknownResource);
            }
        };
        {
            let tracker = inner.slots[idx]
                .as_mut()
                .expect("find_tracker returned an occupied slot");
            tracker.stash = Some(resource);
            tracker.lease = WeakOpt::none();
        }
        if inner.available < self.config.capacity {
            inner.enqueue(idx);
            trace!("resource {} returned to the pool", id);
            self.not_empty.notify_one();
        } else {
            // Overflow contraction: the available region is already at
            // capacity, so the tracker is surplus. Dropping it closes the
            // resource.
            inner.remove_at(idx);
            debug!("pool saturated, discarding overflow resource {}", id);
        }
        Ok(())
    }

    // Reclaim trackers whose wrapper disappeared without completing a
    // return. A dead lease with the resource still parked means the return
    // never ran; the tracker goes back on the queue. A dead lease with no
    // resource means the client detached it; the slot is released.
    fn harvest(&self, inner: &mut PoolInner<M::Resource>) {
        for idx in inner.unavailable_indices() {
            let parked = match inner.slots[idx].as_ref() {
                Some(tracker) if tracker.available() => tracker.stash.is_some(),
                _ => continue,
            };
            let id = inner.slots[idx].as_ref().expect("slot is occupied").id;
            if parked && inner.available < self.config.capacity {
                inner.enqueue(idx);
                debug!("harvested lost resource {}", id);
                self.not_empty.notify_one();
            } else {
                inner.remove_at(idx);
                debug!("released the slot of abandoned resource {}", id);
            }
        }
    }
}

impl<R> PoolInner<R> {
    fn new(maxsize: usize) -> PoolInner<R> {
        let mut slots = Vec::with_capacity(maxsize);
        slots.resize_with(maxsize, || None);
        PoolInner {
            slots: slots.into_boxed_slice(),
            start: 0,
            end: 0,
            size: 0,
            available: 0,
            next_id: 0,
        }
    }

    fn maxsize(&self) -> usize {
        self.slots.len()
    }

    fn is_empty(&self) -> bool {
        self.available == 0
    }

    // Take the head of the available region without blocking. The tracker
    // stays in its slot, which is now part of the unavailable region.
    fn dequeue(&mut self) -> Option<usize> {
        if self.available == 0 {
            return None;
        }
        let idx = self.start;
        debug_assert!(self.slots[idx].is_some(), "available region has a hole");
        self.start = (self.start + 1) % self.maxsize();
        self.available -= 1;
        Some(idx)
    }

    // Swap the tracker at `idx` into the slot at `end` and extend the
    // available region over it. The displaced slot contents (an arbitrary
    // unavailable tracker, or a hole) land at `idx`, which stays in the
    // unavailable region.
    fn enqueue(&mut self, idx: usize) {
        debug_assert!(self.available < self.maxsize(), "available region overflow");
        let end = self.end;
        self.slots.swap(idx, end);
        self.end = (end + 1) % self.maxsize();
        self.available += 1;
    }

    fn remove_at(&mut self, idx: usize) -> Option<Tracker<R>> {
        let tracker = self.slots[idx].take();
        if tracker.is_some() {
            self.size -= 1;
        }
        tracker
    }

    // The first empty slot in the unavailable region.
    fn vacant_slot(&mut self) -> Result<usize, PoolFull> {
        if self.size < self.maxsize() {
            for idx in self.unavailable_indices() {
                if self.slots[idx].is_none() {
                    return Ok(idx);
                }
            }
        }
        Err(PoolFull)
    }

    // Indices of the unavailable region in ring order, starting at `end`.
    // Collected up front so callers may mutate the ring while walking them.
    fn unavailable_indices(&self) -> Vec<usize> {
        let maxsize = self.maxsize();
        let i = self.end;
        let mut j = self.start;
        if j < i || self.available == 0 {
            j += maxsize;
        }
        (i..j).map(|k| k % maxsize).collect()
    }

    fn find_tracker(&self, id: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().map_or(false, |tracker| tracker.id == id))
    }
}

// `Weak::new()` allocates space for a `T` it will never hold, so the empty
// case is represented with `None` instead.
pub(crate) struct WeakOpt<T>(Option<Weak<T>>);

impl<T> WeakOpt<T> {
    pub(crate) fn none() -> Self {
        WeakOpt(None)
    }

    pub(crate) fn downgrade(arc: &Arc<T>) -> Self {
        WeakOpt(Some(Arc::downgrade(arc)))
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<T>> {
        self.0.as_ref().and_then(Weak::upgrade)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    // Test double shaped like a driver session: an `open` flag the liveness
    // probe reads, and a field of per-use state the normaliser resets.
    #[derive(Debug)]
    struct MockResource {
        id: u32,
        open: bool,
        cursor: u32,
    }

    impl MockResource {
        // Shadowed by `Pooled::close`; a passing test proves it never runs
        // through the wrapper.
        #[allow(dead_code)]
        fn close(&mut self) {
            self.open = false;
        }
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("factory refused to build a resource")]
    struct Refused;

    struct MockManager {
        serial: AtomicU32,
        fail: Arc<AtomicBool>,
    }

    impl MockManager {
        fn new() -> MockManager {
            MockManager {
                serial: AtomicU32::new(0),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failure_flag(&self) -> Arc<AtomicBool> {
            self.fail.clone()
        }
    }

    impl Manager for MockManager {
        type Resource = MockResource;
        type Args = HashMap<String, String>;
        type Error = Refused;

        fn create(&self, _args: &HashMap<String, String>) -> Result<MockResource, Refused> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Refused);
            }
            Ok(MockResource {
                id: self.serial.fetch_add(1, Ordering::SeqCst),
                open: true,
                cursor: 0,
            })
        }

        fn ping(&self, resource: &mut MockResource) -> bool {
            resource.open
        }

        fn normalize(&self, resource: &mut MockResource) {
            resource.cursor = 0;
        }
    }

    fn pool(capacity: usize, overflow: usize) -> Pool<MockManager> {
        pool_with_timeout(capacity, overflow, None)
    }

    fn pool_with_timeout(
        capacity: usize,
        overflow: usize,
        timeout: Option<Duration>,
    ) -> Pool<MockManager> {
        Pool::new(
            MockManager::new(),
            HashMap::new(),
            Config {
                capacity,
                overflow,
                timeout,
            },
        )
        .expect("valid config")
    }

    fn assert_invariants(pool: &Pool<MockManager>) {
        let inner = pool.locked();
        let maxsize = inner.slots.len();
        assert!(inner.start < maxsize);
        assert!(inner.end < maxsize);
        assert!(inner.available <= inner.size);
        assert!(inner.size <= maxsize);
        assert_eq!(inner.end, (inner.start + inner.available) % maxsize);
        assert_eq!(
            inner.size,
            inner.slots.iter().filter(|slot| slot.is_some()).count()
        );
        // The available region is hole-free, parked, and unleased.
        for offset in 0..inner.available {
            let idx = (inner.start + offset) % maxsize;
            let tracker = inner.slots[idx]
                .as_ref()
                .expect("available region has no holes");
            assert!(tracker.available());
            assert!(tracker.stash.is_some());
        }
        let mut ids: Vec<u64> = inner.slots.iter().flatten().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), inner.size, "tracker ids are not unique");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = Pool::new(MockManager::new(), HashMap::new(), Config::new(0));
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn config_observables() {
        let pool = pool_with_timeout(2, 3, Some(Duration::from_secs(7)));
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.overflow(), 3);
        assert_eq!(pool.maxsize(), 5);
        assert_eq!(pool.timeout(), Some(Duration::from_secs(7)));
        assert_eq!(pool.size(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn checkout_round_trips_the_same_resource() {
        let pool = pool(1, 1);
        let first = pool.get().expect("checkout");
        assert_eq!(first.id, 0);
        assert!(!first.is_reused());
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.available(), 0);
        drop(first);
        assert_eq!(pool.available(), 1);

        let second = pool.get().expect("checkout");
        assert_eq!(second.id, 0);
        assert!(second.is_reused());
        assert_invariants(&pool);
    }

    #[test]
    fn normalize_runs_on_every_checkout() {
        let pool = pool(1, 0);
        let mut wrapper = pool.get().expect("checkout");
        wrapper.cursor = 42;
        drop(wrapper);
        let wrapper = pool.get().expect("checkout");
        assert_eq!(wrapper.cursor, 0);
    }

    #[test]
    fn wrapper_close_shadows_the_native_close() {
        let pool = pool(1, 0);
        let wrapper = pool.get().expect("checkout");
        wrapper.close();
        assert_eq!(pool.available(), 1);
        let again = pool.get().expect("checkout");
        assert!(again.open, "native close must not run through the wrapper");
    }

    #[test]
    fn overflow_contracts_on_return() {
        let pool = pool(1, 1);
        let a = pool.get().expect("checkout");
        let b = pool.get().expect("overflow checkout");
        assert_eq!(pool.size(), 2);
        drop(b);
        assert_eq!(pool.available(), 1);
        drop(a);
        // The second return found the available region saturated.
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.available(), 1);
        assert_invariants(&pool);
    }

    #[test]
    fn checkout_is_fifo() {
        let pool = pool(3, 0);
        let a = pool.get().expect("checkout");
        let b = pool.get().expect("checkout");
        let c = pool.get().expect("checkout");
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        drop(a);
        drop(b);
        drop(c);

        let first = pool.get().expect("checkout");
        let second = pool.get().expect("checkout");
        let third = pool.get().expect("checkout");
        assert_eq!(first.id, a_id);
        assert_eq!(second.id, b_id);
        assert_eq!(third.id, c_id);
    }

    #[test]
    fn try_get_does_not_block() {
        let pool = pool(1, 0);
        let held = pool.get().expect("checkout");
        assert!(pool.try_get().expect("try_get").is_none());
        drop(held);
        assert!(pool.try_get().expect("try_get").is_some());
    }

    #[test]
    fn depleted_pool_times_out() {
        let pool = pool_with_timeout(1, 1, Some(Duration::from_millis(50)));
        let _a = pool.get().expect("checkout");
        let _b = pool.get().expect("overflow checkout");
        let err = pool.get().expect_err("pool is depleted");
        assert!(matches!(err, Error::PoolEmpty));
    }

    #[test]
    fn dead_resource_is_replaced() {
        let pool = pool(1, 0);
        let mut wrapper = pool.get().expect("checkout");
        assert_eq!(wrapper.id, 0);
        wrapper.open = false;
        drop(wrapper);

        let replacement = pool.get().expect("checkout");
        assert_eq!(replacement.id, 1);
        assert!(!replacement.is_reused());
        assert_eq!(pool.size(), 1);
        assert_invariants(&pool);
    }

    #[test]
    fn factory_failure_propagates() {
        let manager = MockManager::new();
        let fail = manager.failure_flag();
        let pool = Pool::new(manager, HashMap::new(), Config::new(1)).expect("valid config");

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            pool.get().expect_err("factory refuses"),
            Error::Factory(Refused)
        ));
        assert_eq!(pool.size(), 0);

        fail.store(false, Ordering::SeqCst);
        assert_eq!(pool.get().expect("checkout").id, 0);
    }

    #[test]
    fn replacement_factory_failure_propagates() {
        let manager = MockManager::new();
        let fail = manager.failure_flag();
        let pool = Pool::new(manager, HashMap::new(), Config::new(1)).expect("valid config");

        let mut wrapper = pool.get().expect("checkout");
        wrapper.open = false;
        drop(wrapper);

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            pool.get().expect_err("replacement factory refuses"),
            Error::Factory(Refused)
        ));
        // The dead resource was removed and nothing replaced it.
        assert_eq!(pool.size(), 0);
        assert_invariants(&pool);
    }

    #[test]
    fn detach_leaves_a_slot_for_harvest() {
        let pool = pool(1, 0);
        let raw = pool.get().expect("checkout").detach();
        assert_eq!(raw.id, 0);
        // The zombie tracker still occupies its slot.
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.available(), 0);

        // The next checkout runs dry, releases the slot, and grows.
        let next = pool.get().expect("checkout");
        assert_eq!(next.id, 1);
        assert!(!next.is_reused());
        assert_eq!(pool.size(), 1);
        assert_invariants(&pool);
    }

    #[test]
    fn harvest_requeues_a_lost_resource() {
        let pool = pool(1, 0);
        let wrapper = pool.get().expect("checkout");
        let id = wrapper.id;
        let raw = wrapper.detach();
        // Park the value back in its tracker by hand, as if a return had
        // been cut short, then harvest.
        {
            let mut inner = pool.locked();
            let tracker = inner
                .slots
                .iter_mut()
                .flatten()
                .next()
                .expect("tracker exists");
            tracker.stash = Some(raw);
        }
        pool.harvest_now();
        assert_eq!(pool.available(), 1);

        let again = pool.get().expect("checkout");
        assert_eq!(again.id, id);
        assert!(again.is_reused());
    }

    #[test]
    fn put_returns_to_the_right_pool() {
        let pool = pool(1, 0);
        let wrapper = pool.get().expect("checkout");
        pool.put(wrapper).expect("put");
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn put_rejects_a_foreign_wrapper() {
        let pool_a = pool(1, 0);
        let pool_b = pool(1, 0);
        let wrapper = pool_a.get().expect("checkout");
        assert!(matches!(
            pool_b.put(wrapper).expect_err("foreign wrapper"),
            Error::UnknownResource
        ));
        // The wrapper still went home as it dropped.
        assert_eq!(pool_a.available(), 1);
        assert_eq!(pool_b.size(), 0);
    }

    #[test]
    fn clear_discards_parked_resources() {
        let pool = pool(2, 0);
        let a = pool.get().expect("checkout");
        let b = pool.get().expect("checkout");
        drop(a);
        drop(b);
        assert_eq!(pool.size(), 2);

        pool.clear();
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.get().expect("checkout").id, 2);
    }

    #[test]
    fn return_after_clear_is_dropped() {
        let pool = pool(1, 0);
        let wrapper = pool.get().expect("checkout");
        pool.clear();
        drop(wrapper);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.available(), 0);
        assert_invariants(&pool);
    }

    #[test]
    fn factory_arguments_returns_a_detached_copy() {
        let mut args = HashMap::new();
        args.insert("host".to_owned(), "localhost".to_owned());
        let pool = Pool::new(MockManager::new(), args, Config::new(1)).expect("valid config");

        let mut copy = pool.factory_arguments();
        copy.insert("host".to_owned(), "elsewhere".to_owned());
        assert_eq!(
            pool.factory_arguments().get("host").map(String::as_str),
            Some("localhost")
        );
    }

    #[test]
    fn wrapper_outliving_the_pool_drops_the_resource() {
        let pool = pool(1, 0);
        let wrapper = pool.get().expect("checkout");
        drop(pool);
        // Nothing to return to; the drop must not panic.
        drop(wrapper);
    }

    #[test]
    fn ring_invariants_hold_through_churn() {
        let pool = pool(2, 2);
        let a = pool.get().expect("checkout");
        let b = pool.get().expect("checkout");
        let c = pool.get().expect("checkout");
        drop(b);
        let d = pool.get().expect("checkout");
        assert!(d.is_reused());
        drop(a);
        drop(d);
        drop(c);
        assert_invariants(&pool);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.available(), 2);
    }
}
