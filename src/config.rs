use std::time::Duration;

/// [`Pool`] configuration.
///
/// [`Pool`]: super::Pool
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Human label used in log messages and as the name of the recovery
    /// probe thread.
    pub name: String,

    /// Maximum size of the [`Pool`].
    ///
    /// [`Pool`]: super::Pool
    pub max_size: usize,

    /// Default timeout for blocking acquires. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Maximum number of enrolled deferred waiters. `0` disables the limit.
    pub deferred_capacity: usize,

    /// Period of the recovery probe while the pool is unavailable.
    pub check_interval: Duration,

    /// Whether a blocking acquire that gives up waiting reports
    /// [`PoolError::Timeout`] instead of yielding `None`.
    ///
    /// [`PoolError::Timeout`]: super::PoolError::Timeout
    pub error_on_timeout: bool,
}

impl PoolConfig {
    /// Creates a new [`PoolConfig`] with the provided `max_size`, no
    /// timeout, an unlimited deferred queue and a 5 second probe interval.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            name: "pool".to_string(),
            max_size,
            timeout: None,
            deferred_capacity: 0,
            check_interval: Duration::from_secs(5),
            error_on_timeout: true,
        }
    }
}

impl Default for PoolConfig {
    /// Creates a new [`PoolConfig`] with the `max_size` being set to
    /// `cpu_count * 4` ignoring any logical CPUs (Hyper-Threading).
    fn default() -> Self {
        Self::new(num_cpus::get_physical() * 4)
    }
}
