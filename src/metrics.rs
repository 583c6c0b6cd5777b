use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The timestamp sentinel meaning "never, or long ago".
///
/// The recovery probe resets slot ages to this value so age-sensitive
/// managers treat every slot as stale after an outage.
const NEVER: u64 = 0;

/// Usage metadata of a single pooled slot.
///
/// All fields are atomics so updates made by one thread are visible to
/// readers on any other without locking. Timestamps are wall-clock
/// microseconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct Metrics {
    get_times: AtomicUsize,
    last_get: AtomicU64,
    last_return: AtomicU64,
    last_get_thread: AtomicU64,
    last_return_thread: AtomicU64,
}

// 64bit microseconds is 580000 years - really not important
#[allow(clippy::cast_possible_truncation)]
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(NEVER)
}

fn decode(micros: u64) -> Option<SystemTime> {
    (micros != NEVER).then(|| UNIX_EPOCH + Duration::from_micros(micros))
}

impl Metrics {
    /// Number of times this slot has been lent out.
    pub fn get_times(&self) -> usize {
        self.get_times.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last lend, if any.
    pub fn last_get_time(&self) -> Option<SystemTime> {
        decode(self.last_get.load(Ordering::Relaxed))
    }

    /// Wall-clock time of the last return, if any.
    pub fn last_return_time(&self) -> Option<SystemTime> {
        decode(self.last_return.load(Ordering::Relaxed))
    }

    /// Identity of the thread that last acquired this slot. `0` means never.
    pub fn last_get_thread(&self) -> u64 {
        self.last_get_thread.load(Ordering::Relaxed)
    }

    /// Identity of the thread that last returned this slot. `0` means never.
    pub fn last_return_thread(&self) -> u64 {
        self.last_return_thread.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_get(&self) {
        let _ = self.get_times.fetch_add(1, Ordering::Relaxed);
        self.last_get.store(now_micros(), Ordering::Relaxed);
        self.last_get_thread
            .store(current_thread(), Ordering::Relaxed);
    }

    pub(crate) fn mark_return(&self) {
        self.last_return.store(now_micros(), Ordering::Relaxed);
        self.last_return_thread
            .store(current_thread(), Ordering::Relaxed);
    }

    /// Forgets the last get/return times so the slot reads as stale.
    pub(crate) fn reset_age(&self) {
        self.last_get.store(NEVER, Ordering::Relaxed);
        self.last_return.store(NEVER, Ordering::Relaxed);
    }
}

/// Compact per-process thread identity: a counter latched per thread on
/// first use. Identities start at 1; `0` is reserved for "never".
pub(crate) fn current_thread() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TID.with(|tid| *tid)
}
