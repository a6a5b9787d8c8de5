//! Reference-counted native handles.
//!
//! Every backend object (context, buffer, program, kernel, queue, event) is
//! wrapped in a [`Shared`]: cloning retains, dropping the last clone runs the
//! release callback exactly once. Identity is stable for the lifetime of the
//! native object and is what caches key on.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Release<T> = Box<dyn FnOnce(&T) + Send + Sync>;

struct Inner<T: Send + Sync + 'static> {
    id: u64,
    release: Option<Release<T>>,
    raw: T,
}

impl<T: Send + Sync + 'static> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.raw);
        }
    }
}

/// Shared ownership of a native resource.
pub struct Shared<T: Send + Sync + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    /// Wraps a resource that needs no explicit release.
    pub fn new(raw: T) -> Self {
        Self { inner: Arc::new(Inner { id: NEXT_ID.fetch_add(1, Ordering::Relaxed), release: None, raw }) }
    }

    /// Wraps a resource; `release` runs when the last handle is dropped.
    pub fn with_release(raw: T, release: impl FnOnce(&T) + Send + Sync + 'static) -> Self {
        let inner = Inner { id: NEXT_ID.fetch_add(1, Ordering::Relaxed), release: Some(Box::new(release)), raw };
        Self { inner: Arc::new(inner) }
    }

    /// Process-unique identity of the underlying resource.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of live handles.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Send + Sync + 'static> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Send + Sync + 'static> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.raw
    }
}

impl<T: Send + Sync + 'static> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T: Send + Sync + 'static> Eq for Shared<T> {}

impl<T: Send + Sync + 'static> std::hash::Hash for Shared<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared").field("id", &self.id()).field("raw", &self.inner.raw).finish()
    }
}
