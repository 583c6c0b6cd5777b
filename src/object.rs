use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use crate::metrics::Metrics;
use crate::pool::PoolInner;
use crate::{Manager, Pool};

/// Wrapper around the actual pooled object which implements [`Deref`],
/// [`DerefMut`] and [`Drop`] traits.
///
/// Use this object just as if it was of type `T` and upon leaving a scope
/// the [`Drop::drop()`] will take care of returning it to the pool.
#[must_use]
pub struct Object<M: Manager> {
    /// The actual object plus its slot metadata.
    inner: Option<ObjectInner<M>>,

    /// Pool to return the pooled object to.
    pool: Weak<PoolInner<M>>,
}

impl<M> fmt::Debug for Object<M>
where
    M: Manager,
    M::Type: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<M: Manager> Object<M> {
    pub(crate) fn new(inner: ObjectInner<M>, pool: &Arc<PoolInner<M>>) -> Self {
        Self {
            inner: Some(inner),
            pool: Arc::downgrade(pool),
        }
    }

    /// Usage metadata of the underlying slot.
    pub fn metrics(this: &Self) -> &Metrics {
        &this.inner.as_ref().unwrap().metrics
    }

    /// Returns the [`Pool`] this [`Object`] belongs to.
    ///
    /// Since [`Object`]s only hold a [`Weak`] reference to the [`Pool`] they
    /// come from, this can fail and return [`None`] instead.
    pub fn pool(this: &Self) -> Option<Pool<M>> {
        this.pool.upgrade().map(|inner| Pool { inner })
    }

    /// Takes the slot out, defusing the drop-path return.
    pub(crate) fn take_inner(mut this: Self) -> Option<ObjectInner<M>> {
        this.inner.take()
    }

    pub(crate) fn belongs_to(this: &Self, pool: &Arc<PoolInner<M>>) -> bool {
        std::ptr::eq(this.pool.as_ptr(), Arc::as_ptr(pool))
    }
}

impl<M: Manager> Drop for Object<M> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.return_object(inner);
            }
        }
    }
}

impl<M: Manager> Deref for Object<M> {
    type Target = M::Type;
    fn deref(&self) -> &M::Type {
        &self.inner.as_ref().unwrap().obj
    }
}

impl<M: Manager> DerefMut for Object<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner.as_mut().unwrap().obj
    }
}

impl<M: Manager> AsRef<M::Type> for Object<M> {
    fn as_ref(&self) -> &M::Type {
        self
    }
}

impl<M: Manager> AsMut<M::Type> for Object<M> {
    fn as_mut(&mut self) -> &mut M::Type {
        self
    }
}

/// A slot: the pooled value plus a shared handle on its metadata.
///
/// The value is owned by exactly one place at any time - the holder, the
/// free list or a waiter result cell. The metadata stays reachable from the
/// pool registry even while the value is lent out.
pub(crate) struct ObjectInner<M: Manager> {
    pub(crate) obj: M::Type,
    pub(crate) metrics: Arc<Metrics>,
}

impl<M> fmt::Debug for ObjectInner<M>
where
    M: Manager,
    M::Type: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectInner")
            .field("obj", &self.obj)
            .field("metrics", &self.metrics)
            .finish()
    }
}
