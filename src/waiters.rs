use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;

/// Arrival-order tag recorded for every enrolled waiter.
#[derive(Clone, Copy, Debug)]
pub(crate) enum WaiterKind {
    Blocking,
    Deferred,
}

/// A waiter popped in arrival order by the release path.
pub(crate) enum Waiter<T> {
    Blocking(Arc<BlockingWaiter<T>>),
    Deferred(oneshot::Sender<T>),
}

/// The two kind-specific wait queues plus the order log tying them together.
///
/// Enqueue pushes the record first and its tag second, so a consumer that
/// popped a tag is guaranteed to find a record after at most a brief spin.
/// The multiset of tags in the order log always equals the multiset of
/// records across both queues.
pub(crate) struct WaitQueues<T> {
    blocking: SegQueue<Arc<BlockingWaiter<T>>>,
    deferred: SegQueue<oneshot::Sender<T>>,
    order: SegQueue<WaiterKind>,
    blocking_len: AtomicUsize,
    deferred_len: AtomicUsize,
}

impl<T> WaitQueues<T> {
    pub(crate) fn new() -> Self {
        Self {
            blocking: SegQueue::new(),
            deferred: SegQueue::new(),
            order: SegQueue::new(),
            blocking_len: AtomicUsize::new(0),
            deferred_len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn enroll_blocking(&self) -> Arc<BlockingWaiter<T>> {
        let waiter = Arc::new(BlockingWaiter::new());
        self.blocking.push(Arc::clone(&waiter));
        let _ = self.blocking_len.fetch_add(1, Ordering::Relaxed);
        self.order.push(WaiterKind::Blocking);
        waiter
    }

    pub(crate) fn enroll_deferred(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.deferred.push(tx);
        let _ = self.deferred_len.fetch_add(1, Ordering::Relaxed);
        self.order.push(WaiterKind::Deferred);
        rx
    }

    /// Pops the longest-enrolled waiter, whichever kind it is.
    ///
    /// The record push may still be in flight when its tag becomes visible;
    /// spin until it lands.
    pub(crate) fn pop_next(&self) -> Option<Waiter<T>> {
        match self.order.pop()? {
            WaiterKind::Blocking => {
                let waiter = loop {
                    match self.blocking.pop() {
                        Some(waiter) => break waiter,
                        None => hint::spin_loop(),
                    }
                };
                let _ = self.blocking_len.fetch_sub(1, Ordering::Relaxed);
                Some(Waiter::Blocking(waiter))
            }
            WaiterKind::Deferred => {
                let sender = loop {
                    match self.deferred.pop() {
                        Some(sender) => break sender,
                        None => hint::spin_loop(),
                    }
                };
                let _ = self.deferred_len.fetch_sub(1, Ordering::Relaxed);
                Some(Waiter::Deferred(sender))
            }
        }
    }

    pub(crate) fn blocking_len(&self) -> usize {
        self.blocking_len.load(Ordering::Relaxed)
    }

    pub(crate) fn deferred_len(&self) -> usize {
        self.deferred_len.load(Ordering::Relaxed)
    }
}

/// One parked blocking acquire.
///
/// The mutex serialises the two competing transitions "releaser assigns the
/// result" and "waiter commits to its timeout" - exactly one wins, so a slot
/// is never both handed over and abandoned.
pub(crate) struct BlockingWaiter<T> {
    state: Mutex<WaitState<T>>,
    signal: Condvar,
}

struct WaitState<T> {
    result: Option<T>,
    timed_out: bool,
}

impl<T> BlockingWaiter<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(WaitState {
                result: None,
                timed_out: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Parks the calling thread until a releaser assigns a slot or the
    /// timeout expires. `None` waits indefinitely.
    ///
    /// Returns `None` only after committing `timed_out`, at which point
    /// releasers skip this record.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.result.take() {
                return Some(result);
            }
            match deadline {
                None => self.signal.wait(&mut state),
                Some(deadline) => {
                    if self.signal.wait_until(&mut state, deadline).timed_out() {
                        // A releaser may have won the race between the timer
                        // expiring and this re-check; the slot must not be
                        // lost.
                        if let Some(result) = state.result.take() {
                            return Some(result);
                        }
                        state.timed_out = true;
                        return None;
                    }
                }
            }
        }
    }

    /// Assigns a slot unless the waiter already committed to its timeout,
    /// in which case the slot is handed back.
    pub(crate) fn resolve(&self, value: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.timed_out {
            return Err(value);
        }
        state.result = Some(value);
        let _ = self.signal.notify_one();
        Ok(())
    }

    /// Withdraws the record so releasers skip it, claiming any slot that was
    /// already assigned. Used when the enrolling thread found a slot on its
    /// own and no longer intends to park.
    pub(crate) fn withdraw(&self) -> Option<T> {
        let mut state = self.state.lock();
        // Committing to the timeout here keeps a still-enqueued record from
        // ever being resolved again.
        state.timed_out = true;
        state.result.take()
    }
}
