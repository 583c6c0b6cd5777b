use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime};

use parking_lot::{Condvar, Mutex};

use crate::pool::PoolInner;
use crate::Manager;

/// Coarse up/down state of the resource provider as observed by the pool.
///
/// The atomic mirrors the mutex-guarded state so the acquire fast path can
/// gate without locking. Transitions are check-then-set under the mutex.
pub(crate) struct Availability {
    up: AtomicBool,
    state: Mutex<DownState>,
}

struct DownState {
    since: Option<SystemTime>,
}

impl Availability {
    pub(crate) fn new() -> Self {
        Self {
            up: AtomicBool::new(true),
            state: Mutex::new(DownState { since: None }),
        }
    }

    pub(crate) fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub(crate) fn since(&self) -> Option<SystemTime> {
        self.state.lock().since
    }

    /// Transition to unavailable. Returns `false` when already down.
    pub(crate) fn mark_down(&self) -> bool {
        let mut state = self.state.lock();
        if !self.up.load(Ordering::Acquire) {
            return false;
        }
        self.up.store(false, Ordering::Release);
        state.since = Some(SystemTime::now());
        true
    }

    /// Transition back to available. Returns `false` when already up.
    pub(crate) fn mark_up(&self) -> bool {
        let mut state = self.state.lock();
        if self.up.load(Ordering::Acquire) {
            return false;
        }
        self.up.store(true, Ordering::Release);
        state.since = None;
        true
    }
}

/// Wakes the recovery probe out of its sleep when the pool goes away.
///
/// Shared between the probe thread and the pool so the probe exits promptly
/// instead of sleeping out its full interval after the last handle drops.
pub(crate) struct ShutdownSignal {
    down: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            down: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn notify(&self) {
        let mut down = self.down.lock();
        *down = true;
        let _ = self.wake.notify_all();
    }

    /// Sleeps for `period` or until shutdown. Returns `true` when shutting
    /// down.
    fn sleep(&self, period: Duration) -> bool {
        let mut down = self.down.lock();
        if *down {
            return true;
        }
        let _ = self.wake.wait_for(&mut down, period);
        *down
    }
}

/// Starts the dedicated recovery worker for a pool that just went down.
///
/// The worker holds only a weak reference so a forgotten pool is not kept
/// alive by its own probe.
pub(crate) fn spawn_probe<M: Manager>(pool: &Arc<PoolInner<M>>) {
    let name = format!("{}-probe", pool.config().name);
    let weak = Arc::downgrade(pool);
    let shutdown = Arc::clone(pool.shutdown());
    let interval = pool.config().check_interval;
    let spawned = thread::Builder::new()
        .name(name)
        .spawn(move || probe_loop(weak, shutdown, interval));
    if let Err(e) = spawned {
        tracing::warn!(
            "{}: failed to spawn the recovery probe: {}",
            pool.config().name,
            e
        );
    }
}

fn probe_loop<M: Manager>(
    pool: Weak<PoolInner<M>>,
    shutdown: Arc<ShutdownSignal>,
    interval: Duration,
) {
    loop {
        if shutdown.sleep(interval) {
            return;
        }
        let pool = match pool.upgrade() {
            Some(pool) => pool,
            None => return,
        };
        if pool.probe_recovery() {
            return;
        }
    }
}
