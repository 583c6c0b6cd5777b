use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::availability::{self, Availability, ShutdownSignal};
use crate::metrics::Metrics;
use crate::object::{Object, ObjectInner};
use crate::waiters::{WaitQueues, Waiter};
use crate::{Manager, PoolBuilder, PoolConfig, PoolError, Status};

/// Generic object and connection pool.
///
/// This struct can be cloned and transferred across thread boundaries and
/// uses reference counting for its internal state.
pub struct Pool<M: Manager> {
    pub(crate) inner: Arc<PoolInner<M>>,
}

// Implemented manually to avoid unnecessary trait bounds.
impl<M> fmt::Debug for Pool<M>
where
    M: fmt::Debug + Manager,
    M::Type: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("inner", &self.inner).finish()
    }
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Manager> Pool<M> {
    /// Instantiates a builder for a new [`Pool`].
    ///
    /// This is the only way to create a [`Pool`] instance.
    pub fn builder(manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(manager)
    }

    pub(crate) fn from_builder(builder: PoolBuilder<M>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: ArrayQueue::new(builder.config.max_size),
                size: AtomicUsize::new(0),
                grow_lock: Mutex::new(()),
                registry: Mutex::new(Vec::with_capacity(builder.config.max_size)),
                waiters: WaitQueues::new(),
                availability: Availability::new(),
                shutdown: Arc::new(ShutdownSignal::new()),
                manager: builder.manager,
                config: builder.config,
            }),
        }
    }

    /// Retrieves an [`Object`] from this [`Pool`] or blocks the calling
    /// thread until one becomes available, up to the configured
    /// [`PoolConfig::timeout`].
    ///
    /// Returns `Ok(None)` only when the acquire gave up waiting and
    /// [`PoolConfig::error_on_timeout`] is disabled; with the default
    /// configuration a timeout surfaces as [`PoolError::Timeout`].
    ///
    /// # Errors
    ///
    /// See [`PoolError`] for details.
    pub fn get(&self) -> Result<Option<Object<M>>, PoolError<M::Error>> {
        self.timeout_get(self.inner.config.timeout)
    }

    /// Retrieves an [`Object`] from this [`Pool`] using a different
    /// `timeout` than the configured one. `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// See [`PoolError`] for details.
    pub fn timeout_get(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<Object<M>>, PoolError<M::Error>> {
        if !self.inner.availability.is_up() {
            return Err(PoolError::Unavailable);
        }
        let inner_obj = match self.inner.try_obtain()? {
            Some(inner_obj) => inner_obj,
            None => match self.inner.wait_blocking(timeout) {
                Some(inner_obj) => inner_obj,
                None => {
                    self.inner.manager.on_timeout();
                    return if self.inner.config.error_on_timeout {
                        Err(PoolError::Timeout)
                    } else {
                        Ok(None)
                    };
                }
            },
        };
        PoolInner::ready(&self.inner, inner_obj, false).map(Some)
    }

    /// Begins a deferred acquisition. Never blocks.
    ///
    /// The returned future resolves as soon as a releaser hands a slot over,
    /// or immediately when the pool has an idle slot or room to grow. There
    /// is no intrinsic timeout; race the future against your own timer if
    /// you need one. Dropping the future cancels the acquisition without
    /// losing a slot.
    pub fn get_deferred(&self) -> DeferredGet<M> {
        DeferredGet {
            state: self.inner.begin_deferred(),
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `obj` to this [`Pool`], propagating return-hook failures.
    ///
    /// With `recreate` a replacement value is produced via
    /// [`Manager::create`] and the old one disposed through
    /// [`Manager::destroy`] before the slot re-enters circulation. A failed
    /// create keeps the old value in the slot.
    ///
    /// Dropping an [`Object`] returns it as well; the difference is that the
    /// drop path can only log [`Manager::on_return`] failures while this
    /// method surfaces them. The slot is back in the pool before any error
    /// is returned.
    ///
    /// # Errors
    ///
    /// See [`PoolError`] for details.
    pub fn release(&self, obj: Object<M>, recreate: bool) -> Result<(), PoolError<M::Error>> {
        debug_assert!(
            Object::belongs_to(&obj, &self.inner),
            "released an object belonging to a different pool"
        );
        let inner_obj = match Object::take_inner(obj) {
            Some(inner_obj) => inner_obj,
            None => return Ok(()),
        };
        let inner_obj = if recreate {
            match self.inner.recreate(inner_obj) {
                Ok(inner_obj) => inner_obj,
                Err((inner_obj, e)) => {
                    // The slot keeps its old value and re-enters circulation
                    // before the error surfaces.
                    self.inner.return_object(inner_obj);
                    return Err(PoolError::Backend(e));
                }
            }
        } else {
            inner_obj
        };
        self.inner.try_return(inner_obj)
    }

    /// Marks the resource provider unreachable and starts the recovery
    /// probe.
    ///
    /// While unavailable every regular acquire fails fast with
    /// [`PoolError::Unavailable`]; the probe thread retries every
    /// [`PoolConfig::check_interval`] until [`Manager::check_available`]
    /// succeeds. Returns `false` when the pool was already unavailable; the
    /// probe is started only once per outage.
    pub fn set_unavailable(&self) -> bool {
        if !self.inner.availability.mark_down() {
            return false;
        }
        tracing::warn!(
            "{}: resource provider marked unavailable",
            self.inner.config.name
        );
        self.inner.manager.on_unavailable();
        availability::spawn_probe(&self.inner);
        true
    }

    /// Whether the pool currently lends slots.
    pub fn is_available(&self) -> bool {
        self.inner.availability.is_up()
    }

    /// When the current outage began, if there is one.
    pub fn unavailable_since(&self) -> Option<SystemTime> {
        self.inner.availability.since()
    }

    /// Retrieves [`Status`] of this [`Pool`].
    ///
    /// The fields are snapshot reads and may be mildly inconsistent with
    /// each other under concurrent load.
    #[must_use]
    pub fn status(&self) -> Status {
        Status {
            max_size: self.inner.config.max_size,
            size: self.inner.size.load(Ordering::Acquire),
            available: self.inner.free.len(),
            blocking_waiters: self.inner.waiters.blocking_len(),
            deferred_waiters: self.inner.waiters.deferred_len(),
        }
    }

    /// Terse one-line summary of the pool counters.
    #[must_use]
    pub fn statistics(&self) -> String {
        let status = self.status();
        format!(
            "Pool: {}/{} (max {}), blocking waiters: {}, deferred waiters: {}",
            status.available,
            status.size,
            status.max_size,
            status.blocking_waiters,
            status.deferred_waiters
        )
    }

    /// The [`statistics`] summary followed by one line of metadata per
    /// known slot.
    ///
    /// [`statistics`]: Pool::statistics
    #[must_use]
    pub fn statistics_full(&self) -> String {
        use std::fmt::Write as _;

        let mut out = self.statistics();
        let registry = self.inner.registry.lock();
        for (idx, metrics) in registry.iter().enumerate() {
            let _ = write!(
                out,
                "\n#{}: gets {}, last get {} by thread {}, last return {} by thread {}",
                idx,
                metrics.get_times(),
                fmt_age(metrics.last_get_time()),
                metrics.last_get_thread(),
                fmt_age(metrics.last_return_time()),
                metrics.last_return_thread(),
            );
        }
        out
    }

    /// Returns [`Manager`] of this [`Pool`].
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }
}

fn fmt_age(time: Option<SystemTime>) -> String {
    match time.and_then(|t| t.elapsed().ok()) {
        Some(age) => format!("{:.1?} ago", age),
        None => "never".to_string(),
    }
}

pub(crate) struct PoolInner<M: Manager> {
    manager: M,
    config: PoolConfig,
    /// Idle slots, FIFO. Sized to `max_size` so a return can never fail.
    free: ArrayQueue<ObjectInner<M>>,
    /// Total slots created so far. Grows up to `max_size` and never
    /// shrinks.
    size: AtomicUsize,
    /// Serialises the capacity check of pool growth.
    grow_lock: Mutex<()>,
    /// Metadata handles of every known slot, lent out or not.
    registry: Mutex<Vec<Arc<Metrics>>>,
    waiters: WaitQueues<ObjectInner<M>>,
    availability: Availability,
    shutdown: Arc<ShutdownSignal>,
}

// Implemented manually to avoid unnecessary trait bounds on the struct.
impl<M> fmt::Debug for PoolInner<M>
where
    M: fmt::Debug + Manager,
    M::Type: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolInner")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .field("size", &self.size)
            .finish()
    }
}

impl<M: Manager> Drop for PoolInner<M> {
    fn drop(&mut self) {
        self.shutdown.notify();
    }
}

impl<M: Manager> PoolInner<M> {
    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn shutdown(&self) -> &Arc<ShutdownSignal> {
        &self.shutdown
    }

    /// Tries the free list, then capacity growth. Never waits and never
    /// consults the availability gate - the recovery probe enters here
    /// directly.
    fn try_obtain(&self) -> Result<Option<ObjectInner<M>>, PoolError<M::Error>> {
        if let Some(inner_obj) = self.free.pop() {
            return Ok(Some(inner_obj));
        }
        self.try_grow()
    }

    /// Creates a new slot if the pool is still under capacity.
    ///
    /// The capacity check is double-checked under the growth mutex; the
    /// increment is reserved under the lock while [`Manager::create`] runs
    /// outside it.
    fn try_grow(&self) -> Result<Option<ObjectInner<M>>, PoolError<M::Error>> {
        if self.size.load(Ordering::Acquire) >= self.config.max_size {
            return Ok(None);
        }
        {
            let _guard = self.grow_lock.lock();
            if self.size.load(Ordering::Acquire) >= self.config.max_size {
                return Ok(None);
            }
            let _ = self.size.fetch_add(1, Ordering::Release);
        }
        match self.manager.create() {
            Ok(obj) => {
                let metrics = Arc::new(Metrics::default());
                self.registry.lock().push(Arc::clone(&metrics));
                Ok(Some(ObjectInner { obj, metrics }))
            }
            Err(e) => {
                let _ = self.size.fetch_sub(1, Ordering::Release);
                Err(PoolError::Backend(e))
            }
        }
    }

    /// Enrols a blocking waiter and parks the thread. `None` means the
    /// acquire was abandoned after its timeout.
    fn wait_blocking(&self, timeout: Option<Duration>) -> Option<ObjectInner<M>> {
        let waiter = self.waiters.enroll_blocking();
        // A release that found the queues empty while this waiter was being
        // enrolled has pushed its slot to the free list instead. Re-poll
        // once so the waiter does not park with a slot already idle.
        if let Some(extra) = self.free.pop() {
            return Some(match waiter.withdraw() {
                Some(assigned) => {
                    self.return_object(extra);
                    assigned
                }
                None => extra,
            });
        }
        waiter.wait(timeout)
    }

    fn begin_deferred(&self) -> DeferredState<M> {
        if !self.availability.is_up() {
            return DeferredState::Failed(Some(PoolError::Unavailable));
        }
        match self.try_obtain() {
            Err(e) => DeferredState::Failed(Some(e)),
            Ok(Some(inner_obj)) => DeferredState::Ready(Some(inner_obj)),
            Ok(None) => {
                let capacity = self.config.deferred_capacity;
                if capacity > 0 && self.waiters.deferred_len() >= capacity - 1 {
                    return DeferredState::Failed(Some(PoolError::QueueFull));
                }
                let mut receiver = self.waiters.enroll_deferred();
                // Same missed-wakeup guard as the blocking path. Closing the
                // receiver first makes any concurrent hand-off either land
                // before `try_recv` or fail back to the releaser.
                if let Some(extra) = self.free.pop() {
                    receiver.close();
                    return match receiver.try_recv() {
                        Ok(assigned) => {
                            self.return_object(extra);
                            DeferredState::Ready(Some(assigned))
                        }
                        Err(_) => DeferredState::Ready(Some(extra)),
                    };
                }
                DeferredState::Waiting(receiver)
            }
        }
    }

    /// Runs the pre-use hook and stamps the lend metadata. A hook failure
    /// sends the slot back into circulation before the error surfaces.
    pub(crate) fn ready(
        pool: &Arc<Self>,
        mut inner_obj: ObjectInner<M>,
        deferred: bool,
    ) -> Result<Object<M>, PoolError<M::Error>> {
        let hook = if deferred {
            pool.manager
                .on_get_deferred(&mut inner_obj.obj, &inner_obj.metrics)
        } else {
            pool.manager.on_get(&mut inner_obj.obj, &inner_obj.metrics)
        };
        if let Err(e) = hook {
            pool.return_object(inner_obj);
            return Err(PoolError::Backend(e));
        }
        inner_obj.metrics.mark_get();
        Ok(Object::new(inner_obj, pool))
    }

    /// Drop-path return. Hook failures are logged, never propagated.
    pub(crate) fn return_object(&self, inner_obj: ObjectInner<M>) {
        if let Err(e) = self.try_return(inner_obj) {
            tracing::warn!("{}: return hook failed: {}", self.config.name, e);
        }
    }

    /// Hands the slot to the longest-enrolled live waiter, else runs the
    /// return hook and pushes it onto the free list. A hook failure
    /// propagates only after the slot is safely back in the pool.
    pub(crate) fn try_return(
        &self,
        mut inner_obj: ObjectInner<M>,
    ) -> Result<(), PoolError<M::Error>> {
        inner_obj.metrics.mark_return();
        let mut inner_obj = match self.hand_off(inner_obj) {
            None => return Ok(()),
            Some(inner_obj) => inner_obj,
        };
        let hook = self.manager.on_return(&mut inner_obj.obj);
        if let Err(rejected) = self.free.push(inner_obj) {
            // The free list is sized to `max_size`, so a push can only fail
            // for an object that never belonged to this pool.
            drop(rejected);
            debug_assert!(false, "free list rejected a returned slot");
        }
        hook.map_err(PoolError::Backend)
    }

    /// Serves waiters in arrival order, skipping the stale ones. Returns
    /// the slot when every enrolled waiter turned out stale or the queues
    /// are empty.
    fn hand_off(&self, mut inner_obj: ObjectInner<M>) -> Option<ObjectInner<M>> {
        while let Some(waiter) = self.waiters.pop_next() {
            inner_obj = match waiter {
                Waiter::Blocking(blocking) => match blocking.resolve(inner_obj) {
                    Ok(()) => return None,
                    // The waiter gave up; try the next tag.
                    Err(stale) => stale,
                },
                Waiter::Deferred(sender) => match sender.send(inner_obj) {
                    Ok(()) => return None,
                    // The future was cancelled; try the next tag.
                    Err(cancelled) => cancelled,
                },
            };
        }
        Some(inner_obj)
    }

    /// Replaces the slot value, creating the replacement before disposing
    /// the old one so a failed create leaves the slot intact.
    fn recreate(
        &self,
        mut inner_obj: ObjectInner<M>,
    ) -> Result<ObjectInner<M>, (ObjectInner<M>, M::Error)> {
        match self.manager.create() {
            Ok(obj) => {
                let old = std::mem::replace(&mut inner_obj.obj, obj);
                self.manager.destroy(old);
                Ok(inner_obj)
            }
            Err(e) => Err((inner_obj, e)),
        }
    }

    /// One recovery attempt: probe-mode acquire (availability gate and
    /// waiter enrolment both bypassed), check, release. Returns `true` once
    /// the provider is reachable again.
    pub(crate) fn probe_recovery(&self) -> bool {
        let mut inner_obj = match self.try_obtain() {
            Ok(Some(inner_obj)) => inner_obj,
            Ok(None) => {
                tracing::debug!(
                    "{}: no slot available for the recovery check",
                    self.config.name
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(
                    "{}: recovery check failed to obtain a slot: {}",
                    self.config.name,
                    e
                );
                return false;
            }
        };
        let verdict = self.manager.check_available(&mut inner_obj.obj);
        self.return_object(inner_obj);
        match verdict {
            Ok(true) => {
                self.recover();
                true
            }
            Ok(false) => {
                tracing::debug!("{}: resource provider still unavailable", self.config.name);
                false
            }
            Err(e) => {
                tracing::warn!("{}: availability check failed: {}", self.config.name, e);
                false
            }
        }
    }

    fn recover(&self) {
        if !self.availability.mark_up() {
            return;
        }
        for metrics in self.registry.lock().iter() {
            metrics.reset_age();
        }
        tracing::info!(
            "{}: resource provider available again",
            self.config.name
        );
        self.manager.on_available();
    }
}

/// Future returned by [`Pool::get_deferred()`].
///
/// Resolves once a releaser hands a slot over, in strict enrolment order
/// with the blocking waiters. Dropping it before completion cancels the
/// acquisition; a slot assigned in the meantime is routed back to the pool.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct DeferredGet<M: Manager> {
    state: DeferredState<M>,
    pool: Weak<PoolInner<M>>,
}

impl<M: Manager> Unpin for DeferredGet<M> {}

enum DeferredState<M: Manager> {
    /// Resolved up front, or already delivered (`None`).
    Ready(Option<ObjectInner<M>>),
    /// Enrolled in the deferred wait queue.
    Waiting(oneshot::Receiver<ObjectInner<M>>),
    /// Failed up front.
    Failed(Option<PoolError<M::Error>>),
}

impl<M: Manager> fmt::Debug for DeferredGet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            DeferredState::Ready(_) => "ready",
            DeferredState::Waiting(_) => "waiting",
            DeferredState::Failed(_) => "failed",
        };
        f.debug_struct("DeferredGet").field("state", &state).finish()
    }
}

impl<M: Manager> Future for DeferredGet<M> {
    type Output = Result<Object<M>, PoolError<M::Error>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let inner_obj = match &mut this.state {
            DeferredState::Ready(slot) => slot.take().expect("polled after completion"),
            DeferredState::Failed(err) => {
                return Poll::Ready(Err(err.take().expect("polled after completion")))
            }
            DeferredState::Waiting(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(inner_obj)) => inner_obj,
                // The pool was dropped with this waiter still enrolled.
                Poll::Ready(Err(_)) => return Poll::Ready(Err(PoolError::Unavailable)),
            },
        };
        this.state = DeferredState::Ready(None);
        let pool = match this.pool.upgrade() {
            Some(pool) => pool,
            None => return Poll::Ready(Err(PoolError::Unavailable)),
        };
        Poll::Ready(PoolInner::ready(&pool, inner_obj, true))
    }
}

impl<M: Manager> Drop for DeferredGet<M> {
    fn drop(&mut self) {
        let inner_obj = match &mut self.state {
            DeferredState::Ready(slot) => slot.take(),
            DeferredState::Failed(_) => None,
            DeferredState::Waiting(receiver) => {
                // After `close` a concurrent hand-off either already landed
                // (claimed by `try_recv`) or failed back to the releaser.
                receiver.close();
                receiver.try_recv().ok()
            }
        };
        if let Some(inner_obj) = inner_obj {
            if let Some(pool) = self.pool.upgrade() {
                pool.return_object(inner_obj);
            }
        }
    }
}
