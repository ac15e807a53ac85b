//! Decorators
//!
//! [`ContainerApi`] is the capability set that wrappers compose over: a
//! current-value accessor, the state stream, the side-effect stream and a
//! submission entry point. [`Container`] is the primary implementation;
//! decorators wrap any other implementation and forward to it.
//!
//! A decorator may tap the state stream, but it must not reorder or drop
//! values, and it forwards side effects and submissions untouched.
//!
//! - [`SavedStateDecorator`] writes every emitted state to a [`SnapshotStore`].
//! - [`LoggingDecorator`] traces emitted states, side effects and submissions.
//!
//! The convenience methods in [`ContainerExt`] work on any implementation.

mod logging;
mod saved_state;
mod snapshot;

pub use logging::LoggingDecorator;
pub use saved_state::SavedStateDecorator;
pub use snapshot::{
    decode_snapshot, encode_snapshot, restore_snapshot, restore_snapshot_or, MemorySnapshotStore,
    SnapshotStore,
};

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::BoxStream;

use crate::config::SubmitOptions;
use crate::container::{boxed_intent, Container, Intent, IntentContext, IntentHandle};
use crate::error::{ContainerError, IntentResult};

/// The four operations every container and decorator exposes.
pub trait ContainerApi<S, SE>: Send + Sync {
    /// Synchronous snapshot of the committed state.
    fn current_state(&self) -> S;

    /// Live state stream: the current value, then every commit in order.
    fn state_stream(&self) -> BoxStream<'static, S>;

    /// Live side-effect stream with no replay.
    fn side_effect_stream(&self) -> BoxStream<'static, SE>;

    /// Launch an intent.
    fn submit_intent(
        &self,
        options: SubmitOptions,
        intent: Intent<S, SE>,
    ) -> Result<IntentHandle, ContainerError>;
}

impl<S, SE> ContainerApi<S, SE> for Container<S, SE>
where
    S: Clone + Send + Sync + 'static,
    SE: Clone + Send + 'static,
{
    fn current_state(&self) -> S {
        Container::current_state(self)
    }

    fn state_stream(&self) -> BoxStream<'static, S> {
        self.subscribe_state().boxed()
    }

    fn side_effect_stream(&self) -> BoxStream<'static, SE> {
        self.subscribe_side_effects().boxed()
    }

    fn submit_intent(
        &self,
        options: SubmitOptions,
        intent: Intent<S, SE>,
    ) -> Result<IntentHandle, ContainerError> {
        self.submit_with(options, intent)
    }
}

impl<S, SE, C> ContainerApi<S, SE> for Arc<C>
where
    C: ContainerApi<S, SE> + ?Sized,
{
    fn current_state(&self) -> S {
        (**self).current_state()
    }

    fn state_stream(&self) -> BoxStream<'static, S> {
        (**self).state_stream()
    }

    fn side_effect_stream(&self) -> BoxStream<'static, SE> {
        (**self).side_effect_stream()
    }

    fn submit_intent(
        &self,
        options: SubmitOptions,
        intent: Intent<S, SE>,
    ) -> Result<IntentHandle, ContainerError> {
        (**self).submit_intent(options, intent)
    }
}

/// Convenience syntax over any [`ContainerApi`].
pub trait ContainerExt<S, SE>: ContainerApi<S, SE> {
    /// Launch an intent, registered with the idling resource.
    fn intent<F, Fut>(&self, intent: F) -> Result<IntentHandle, ContainerError>
    where
        F: FnOnce(IntentContext<S, SE>) -> Fut + Send + 'static,
        Fut: Future<Output = IntentResult> + Send + 'static,
    {
        self.intent_with(true, intent)
    }

    /// Launch an intent, choosing whether it registers with the idling resource.
    fn intent_with<F, Fut>(
        &self,
        register_idling: bool,
        intent: F,
    ) -> Result<IntentHandle, ContainerError>
    where
        F: FnOnce(IntentContext<S, SE>) -> Fut + Send + 'static,
        Fut: Future<Output = IntentResult> + Send + 'static,
    {
        self.submit_intent(SubmitOptions { register_idling }, boxed_intent(intent))
    }
}

impl<S, SE, C> ContainerExt<S, SE> for C where C: ContainerApi<S, SE> + ?Sized {}
