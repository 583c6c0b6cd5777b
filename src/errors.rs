use std::fmt;

/// Possible errors returned by the acquire and release methods.
#[derive(Debug)]
pub enum PoolError<E> {
    /// [`Pool`] is in the unavailable state; acquires fail fast until the
    /// recovery probe restores it.
    ///
    /// [`Pool`]: super::Pool
    Unavailable,

    /// A blocking acquire did not obtain a slot within its window.
    Timeout,

    /// A deferred acquire was rejected because the deferred wait queue is
    /// at capacity.
    QueueFull,

    /// Backend reported an error.
    Backend(E),
}

impl<E> From<E> for PoolError<E> {
    fn from(e: E) -> Self {
        Self::Backend(e)
    }
}

impl<E: fmt::Display> fmt::Display for PoolError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Pool is unavailable"),
            Self::Timeout => write!(
                f,
                "Timeout occurred while waiting for a slot to become available"
            ),
            Self::QueueFull => write!(f, "Deferred wait queue is at capacity"),
            Self::Backend(e) => write!(f, "Error occurred in the pool manager: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PoolError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable | Self::Timeout | Self::QueueFull => None,
            Self::Backend(e) => Some(e),
        }
    }
}
