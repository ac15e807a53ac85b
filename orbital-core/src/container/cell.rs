//! State Cell
//!
//! The single slot holding the committed state.
//!
//! # Locking
//!
//! Two locks with different jobs:
//!
//! - `writer` serializes updates. It is held while the transform runs, so a
//!   transform always sees the value committed immediately before it.
//! - `value` guards the pointer to the committed state. It is only held long
//!   enough to clone or swap an `Arc`, so readers never wait on a transform.
//!
//! The new value is computed before anything is stored. A transform that
//! fails or panics leaves the committed value untouched.
//!
//! Transforms must not call back into the same cell; the writer lock is not
//! reentrant.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

/// The mutable slot holding the current state.
pub struct StateCell<S> {
    writer: Mutex<()>,
    value: RwLock<Arc<S>>,
}

impl<S> StateCell<S> {
    /// Create a cell holding `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            writer: Mutex::new(()),
            value: RwLock::new(Arc::new(initial)),
        }
    }

    /// Get a clone of the current value.
    pub fn read(&self) -> S
    where
        S: Clone,
    {
        self.value.read().as_ref().clone()
    }

    /// Get a shared handle to the current value without cloning it.
    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.value.read())
    }

    /// Apply `f` to the value current at the moment of application and store
    /// the result.
    pub fn atomic_update<F>(&self, f: F) -> Arc<S>
    where
        F: FnOnce(&S) -> S,
    {
        let writer = self.write();
        let next = f(&*writer.current());
        writer.commit(next)
    }

    /// Like [`atomic_update`](Self::atomic_update), but the transform may
    /// refuse. On `Err` nothing is stored.
    pub fn try_atomic_update<F, E>(&self, f: F) -> Result<Arc<S>, E>
    where
        F: FnOnce(&S) -> Result<S, E>,
    {
        let writer = self.write();
        let next = f(&*writer.current())?;
        Ok(writer.commit(next))
    }

    /// Take exclusive write access.
    ///
    /// Every other writer waits until the returned guard is dropped. Readers
    /// are not blocked.
    pub(crate) fn write(&self) -> CellWriter<'_, S> {
        CellWriter {
            _exclusive: self.writer.lock(),
            cell: self,
        }
    }
}

impl<S> std::fmt::Debug for StateCell<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("value", &*self.snapshot())
            .finish()
    }
}

/// Exclusive write access to a [`StateCell`].
pub(crate) struct CellWriter<'a, S> {
    _exclusive: MutexGuard<'a, ()>,
    cell: &'a StateCell<S>,
}

impl<'a, S> CellWriter<'a, S> {
    /// The committed value. Stable for the lifetime of this guard.
    pub(crate) fn current(&self) -> Arc<S> {
        self.cell.snapshot()
    }

    /// Replace the committed value.
    pub(crate) fn commit(&self, next: S) -> Arc<S> {
        let next = Arc::new(next);
        *self.cell.value.write() = Arc::clone(&next);
        next
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
