//! Reduction Serializer
//!
//! Turns reduction requests into state-cell updates and publishes each commit
//! on the state stream.
//!
//! # Guarantees
//!
//! - One reduction at a time. The cell's writer lock is taken for the
//!   duration of the transform and the publish, and for nothing else.
//! - Freshness. The transform's input is read after the writer lock is
//!   acquired, so it is always the value committed immediately before.
//! - All-or-nothing. A transform that returns `Err` or panics stores nothing
//!   and publishes nothing.
//! - Commit order. Publishing happens under the writer lock, so every
//!   observer sees commits in the order they were stored.
//!
//! # Deduplication
//!
//! Off by default: every commit is published even if it equals the previous
//! value. With a comparator installed, a result equal to the current value is
//! neither stored nor published.

use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::cell::StateCell;
use super::channel::{Multicast, Subscription};
use crate::error::{panic_message, ContainerError, IntentError};

/// Equality test used to suppress consecutive duplicate states.
pub(crate) type Distinct<S> = Box<dyn Fn(&S, &S) -> bool + Send + Sync>;

/// Serializes reductions against a [`StateCell`] and publishes the results.
pub struct ReductionSerializer<S> {
    cell: StateCell<S>,
    states: Multicast<S>,
    distinct: Option<Distinct<S>>,
    commits: AtomicU64,
    closed: AtomicBool,
}

impl<S> ReductionSerializer<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a serializer over a fresh cell holding `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            cell: StateCell::new(initial),
            states: Multicast::new(),
            distinct: None,
            commits: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Suppress results that compare equal to the current value.
    pub(crate) fn with_distinct(mut self, distinct: Distinct<S>) -> Self {
        self.distinct = Some(distinct);
        self
    }

    /// The committed value.
    pub fn current(&self) -> S {
        self.cell.read()
    }

    /// Number of values committed since creation.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    /// Apply `f` to the latest committed value and publish the result.
    pub fn reduce<F>(&self, f: F) -> Result<S, ContainerError>
    where
        F: FnOnce(&S) -> S,
    {
        self.try_reduce(|state| Ok::<_, Infallible>(f(state)))
    }

    /// Apply a fallible `f` to the latest committed value.
    ///
    /// On `Err` the state is left as it was and the error is returned as
    /// [`ContainerError::Reduction`].
    pub fn try_reduce<F, E>(&self, f: F) -> Result<S, ContainerError>
    where
        F: FnOnce(&S) -> Result<S, E>,
        E: Into<IntentError>,
    {
        let writer = self.cell.write();
        if self.closed.load(Ordering::Acquire) {
            return Err(ContainerError::Closed);
        }

        let current = writer.current();
        let next = match catch_unwind(AssertUnwindSafe(|| f(&*current))) {
            Ok(Ok(next)) => next,
            Ok(Err(err)) => return Err(ContainerError::Reduction(err.into())),
            Err(payload) => {
                return Err(ContainerError::ReductionPanicked(panic_message(payload)));
            }
        };

        if let Some(distinct) = &self.distinct {
            if distinct(&*current, &next) {
                tracing::trace!("reduction produced an equal state; not published");
                return Ok(next);
            }
        }

        let committed = writer.commit(next);
        let sequence = self.commits.fetch_add(1, Ordering::AcqRel) + 1;
        let delivered = self.states.publish(committed.as_ref().clone());
        tracing::trace!(sequence, delivered, "state committed");

        Ok(committed.as_ref().clone())
    }

    /// Attach a state observer. It first receives the current value, then
    /// every later commit.
    pub fn subscribe(&self) -> Subscription<S> {
        let writer = self.cell.write();
        self.states.subscribe_with(writer.current().as_ref().clone())
    }

    /// Number of attached state observers.
    pub fn observer_count(&self) -> usize {
        self.states.observer_count()
    }

    /// Refuse further reductions and end every state subscription.
    ///
    /// Waits for an in-progress reduction to finish first.
    pub fn close(&self) {
        let _writer = self.cell.write();
        self.closed.store(true, Ordering::Release);
        self.states.close();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<S> std::fmt::Debug for ReductionSerializer<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReductionSerializer")
            .field("cell", &self.cell)
            .field("distinct", &self.distinct.is_some())
            .field("commits", &self.commits.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reductions_publish_in_commit_order() {
        let serializer = ReductionSerializer::new(0);
        let mut states = serializer.subscribe();

        serializer.reduce(|v| v + 1).unwrap();
        serializer.reduce(|v| v + 2).unwrap();
        serializer.reduce(|v| v + 3).unwrap();

        let seen: Vec<i32> = std::iter::from_fn(|| states.try_recv()).collect();
        assert_eq!(seen, vec![0, 1, 3, 6]);
        assert_eq!(serializer.commit_count(), 3);
    }

    #[test]
    fn late_subscriber_sees_only_latest() {
        let serializer = ReductionSerializer::new(1);
        serializer.reduce(|v| v * 10).unwrap();
        serializer.reduce(|v| v + 1).unwrap();

        let mut states = serializer.subscribe();
        assert_eq!(states.try_recv(), Some(11));
        assert_eq!(states.try_recv(), None);
    }

    #[test]
    fn failed_reduction_commits_nothing() {
        let serializer = ReductionSerializer::new(5);
        let mut states = serializer.subscribe();
        assert_eq!(states.try_recv(), Some(5));

        let err = serializer
            .try_reduce(|_| Err::<i32, _>("invalid transition"))
            .unwrap_err();
        assert!(matches!(err, ContainerError::Reduction(_)));
        assert_eq!(serializer.current(), 5);
        assert_eq!(states.try_recv(), None);
        assert_eq!(serializer.commit_count(), 0);
    }

    #[test]
    fn panicking_reduction_is_reported() {
        let serializer = ReductionSerializer::new(5);
        let err = serializer
            .reduce(|_| panic!("bad transform"))
            .unwrap_err();

        match err {
            ContainerError::ReductionPanicked(message) => assert_eq!(message, "bad transform"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(serializer.reduce(|v| v + 1).unwrap(), 6);
    }

    #[test]
    fn equal_states_are_published_by_default() {
        let serializer = ReductionSerializer::new(7);
        let mut states = serializer.subscribe();
        serializer.reduce(|v| *v).unwrap();

        assert_eq!(states.try_recv(), Some(7));
        assert_eq!(states.try_recv(), Some(7));
    }

    #[test]
    fn distinct_suppresses_equal_states() {
        let serializer =
            ReductionSerializer::new(7).with_distinct(Box::new(|a: &i32, b: &i32| a == b));
        let mut states = serializer.subscribe();
        serializer.reduce(|v| *v).unwrap();
        serializer.reduce(|v| v + 1).unwrap();

        assert_eq!(states.try_recv(), Some(7));
        assert_eq!(states.try_recv(), Some(8));
        assert_eq!(states.try_recv(), None);
        assert_eq!(serializer.commit_count(), 1);
    }

    #[test]
    fn closed_serializer_refuses_reductions() {
        let serializer = ReductionSerializer::new(0);
        let mut states = serializer.subscribe();
        serializer.close();

        assert!(matches!(
            serializer.reduce(|v| v + 1),
            Err(ContainerError::Closed)
        ));
        assert_eq!(serializer.current(), 0);
        assert_eq!(states.try_recv(), Some(0));
        assert_eq!(states.try_recv(), None);
    }

    #[test]
    fn observers_see_every_commit_from_many_threads() {
        let serializer = Arc::new(ReductionSerializer::new(0_u32));
        let mut states = serializer.subscribe();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let serializer = Arc::clone(&serializer);
                thread::spawn(move || {
                    for _ in 0..250 {
                        serializer.reduce(|v| v + 1).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let seen: Vec<u32> = std::iter::from_fn(|| states.try_recv()).collect();
        let expected: Vec<u32> = (0..=1000).collect();
        assert_eq!(seen, expected);
    }
}
