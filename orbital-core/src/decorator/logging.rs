//! Logging decorator: traces what flows through a container.

use std::fmt::Debug;
use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};

use super::ContainerApi;
use crate::config::SubmitOptions;
use crate::container::{Intent, IntentHandle};
use crate::error::ContainerError;

/// Emits a `debug` event for every observed state and side effect and for
/// each submission. Values are forwarded unchanged.
pub struct LoggingDecorator<C> {
    actual: C,
    name: Arc<str>,
}

impl<C> LoggingDecorator<C> {
    pub fn new(actual: C, name: impl Into<String>) -> Self {
        Self {
            actual,
            name: Arc::from(name.into()),
        }
    }

    pub fn actual(&self) -> &C {
        &self.actual
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S, SE, C> ContainerApi<S, SE> for LoggingDecorator<C>
where
    C: ContainerApi<S, SE>,
    S: Debug + Send + 'static,
    SE: Debug + Send + 'static,
{
    fn current_state(&self) -> S {
        self.actual.current_state()
    }

    fn state_stream(&self) -> BoxStream<'static, S> {
        let name = Arc::clone(&self.name);
        self.actual
            .state_stream()
            .inspect(move |state| tracing::debug!(container = %name, ?state, "state"))
            .boxed()
    }

    fn side_effect_stream(&self) -> BoxStream<'static, SE> {
        let name = Arc::clone(&self.name);
        self.actual
            .side_effect_stream()
            .inspect(move |effect| tracing::debug!(container = %name, ?effect, "side effect"))
            .boxed()
    }

    fn submit_intent(
        &self,
        options: SubmitOptions,
        intent: Intent<S, SE>,
    ) -> Result<IntentHandle, ContainerError> {
        match self.actual.submit_intent(options, intent) {
            Ok(handle) => {
                tracing::debug!(container = %self.name, intent = %handle.id(), "intent submitted");
                Ok(handle)
            }
            Err(err) => {
                tracing::debug!(container = %self.name, error = %err, "intent rejected");
                Err(err)
            }
        }
    }
}
