//! Saved-State Decorator
//!
//! Persists each state emitted on the wrapped container's state stream.
//! The snapshot is written before the value is handed to the observer, so an
//! observer that has seen a state knows it has been saved.
//!
//! Saving happens as values are observed. With no observer attached nothing
//! is written; callers that need continuous persistence keep one stream
//! subscribed for the container's lifetime.
//!
//! A failed save is logged and the value is still delivered. Persistence
//! never changes what the observer sees.
//!
//! To pick up where a previous run left off, seed the new container with
//! [`restore_snapshot_or`](super::restore_snapshot_or) before wrapping it.

use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use serde::Serialize;

use super::snapshot::{encode_snapshot, SnapshotStore};
use super::ContainerApi;
use crate::config::SubmitOptions;
use crate::container::{Intent, IntentHandle};
use crate::error::ContainerError;

/// Wraps a container and saves every emitted state under one key.
pub struct SavedStateDecorator<C, St> {
    actual: C,
    store: Arc<St>,
    key: Arc<str>,
}

impl<C, St> SavedStateDecorator<C, St>
where
    St: SnapshotStore + 'static,
{
    /// Wrap `actual`, saving its states in `store` under `key`.
    pub fn new(actual: C, store: Arc<St>, key: impl Into<String>) -> Self {
        Self {
            actual,
            store,
            key: Arc::from(key.into()),
        }
    }

    /// The wrapped container.
    pub fn actual(&self) -> &C {
        &self.actual
    }

    /// The key snapshots are saved under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

fn save<S, St>(store: &St, key: &str, state: &S) -> Result<(), ContainerError>
where
    S: Serialize,
    St: SnapshotStore + ?Sized,
{
    store.save(key, encode_snapshot(state)?)
}

impl<S, SE, C, St> ContainerApi<S, SE> for SavedStateDecorator<C, St>
where
    C: ContainerApi<S, SE>,
    St: SnapshotStore + 'static,
    S: Serialize + Send + 'static,
    SE: Send + 'static,
{
    fn current_state(&self) -> S {
        self.actual.current_state()
    }

    fn state_stream(&self) -> BoxStream<'static, S> {
        let store = Arc::clone(&self.store);
        let key = Arc::clone(&self.key);

        self.actual
            .state_stream()
            .inspect(move |state| {
                if let Err(err) = save(&*store, &key, state) {
                    tracing::warn!(key = %key, error = %err, "failed to save state snapshot");
                }
            })
            .boxed()
    }

    fn side_effect_stream(&self) -> BoxStream<'static, SE> {
        self.actual.side_effect_stream()
    }

    fn submit_intent(
        &self,
        options: SubmitOptions,
        intent: Intent<S, SE>,
    ) -> Result<IntentHandle, ContainerError> {
        self.actual.submit_intent(options, intent)
    }
}
