//! Idling Hooks
//!
//! The scheduler brackets every registered intent with
//! [`IdlingResource::begin_work`] and [`IdlingResource::end_work`]. A test
//! harness injects a resource that counts outstanding brackets and treats
//! zero as quiescence.
//!
//! The resource is passed to each container explicitly. Several containers
//! may share one registry, in which case it reports quiescence only when all
//! of them are idle.
//!
//! # Exception Safety
//!
//! `end_work` is driven by a drop guard that travels with the intent's
//! future. It fires when the intent completes, fails, panics, is cancelled,
//! or is dropped without ever being polled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Begin/end markers around the execution of one intent.
pub trait IdlingResource: Send + Sync {
    /// An intent has been accepted and is about to run.
    fn begin_work(&self);

    /// An intent has finished, successfully or not.
    fn end_work(&self);
}

impl<T> IdlingResource for Arc<T>
where
    T: IdlingResource + ?Sized,
{
    fn begin_work(&self) {
        (**self).begin_work()
    }

    fn end_work(&self) {
        (**self).end_work()
    }
}

/// An idling resource that ignores every marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIdling;

impl IdlingResource for NoopIdling {
    fn begin_work(&self) {}

    fn end_work(&self) {}
}

/// Counts outstanding intents and wakes waiters when the count reaches zero.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(IdlingRegistry::new());
/// let container = Container::builder(0).idling(registry.clone()).build()?;
///
/// container.intent(|ctx| async move { ctx.reduce(|n| n + 1)?; Ok(()) })?;
/// registry.wait_for_idle().await;
/// assert_eq!(container.current_state(), 1);
/// ```
#[derive(Debug, Default)]
pub struct IdlingRegistry {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl IdlingRegistry {
    /// Create a registry with no outstanding work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intents between `begin_work` and `end_work`.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Whether no registered intent is in flight.
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    /// Wait until no registered intent is in flight.
    ///
    /// Returns immediately if already idle.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent end_work cannot be missed.
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl IdlingResource for IdlingRegistry {
    fn begin_work(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    fn end_work(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.idle.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("end_work called with no outstanding work"),
        }
    }
}

/// Calls `end_work` when dropped.
pub(crate) struct IdlingGuard {
    resource: Arc<dyn IdlingResource>,
}

impl IdlingGuard {
    /// Call `begin_work` and return a guard for the matching `end_work`.
    pub(crate) fn begin(resource: Arc<dyn IdlingResource>) -> Self {
        resource.begin_work();
        Self { resource }
    }
}

impl Drop for IdlingGuard {
    fn drop(&mut self) {
        self.resource.end_work();
    }
}
