//! Intent Scheduler
//!
//! Launches every submitted intent as its own tokio task and returns at
//! once. Intents never wait for each other: a suspended intent yields its
//! worker thread to the rest.
//!
//! # Failure Handling
//!
//! Each task catches its intent's error or panic. The failure is logged,
//! published on the failure channel and returned from the intent's handle.
//! Under [`FailurePolicy::Escalate`] it also shuts the container down.
//! Cancellation is not a failure and is never escalated.
//!
//! # Cancellation
//!
//! Every intent gets a child of the scheduler's root token. Cancelling the
//! handle, or closing the scheduler, stops the intent at its next suspension
//! point. Reductions run synchronously between suspension points, so a
//! cancelled intent never leaves a reduction half-applied.
//!
//! # Admission
//!
//! With `max_in_flight` set, a submission that would exceed the limit is
//! rejected with [`ContainerError::Saturated`] instead of waiting.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::channel::{Multicast, Subscription};
use super::observer::IntentId;
use crate::config::{ContainerConfig, FailurePolicy, SubmitOptions};
use crate::error::{panic_message, ContainerError, IntentResult};
use crate::idling::{IdlingGuard, IdlingResource};

/// What went wrong inside a failed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A reduction's transform returned an error or panicked.
    Reduction,

    /// The intent body returned an error.
    Intent,

    /// The intent body panicked.
    Panic,
}

/// A report published on the failure channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentFailure {
    pub intent: IntentId,
    pub kind: FailureKind,
    pub message: String,
}

impl IntentFailure {
    fn new(intent: IntentId, error: &ContainerError) -> Self {
        let kind = match error {
            ContainerError::Reduction(_) | ContainerError::ReductionPanicked(_) => {
                FailureKind::Reduction
            }
            ContainerError::IntentPanicked(_) => FailureKind::Panic,
            _ => FailureKind::Intent,
        };
        Self {
            intent,
            kind,
            message: error.to_string(),
        }
    }
}

/// Launches intents and tracks them until they finish.
pub(crate) struct IntentScheduler {
    name: String,
    runtime: Handle,
    root: CancellationToken,
    permits: Option<Arc<Semaphore>>,
    limit: usize,
    failure_policy: FailurePolicy,
    defaults: SubmitOptions,
    idling: Arc<dyn IdlingResource>,
    failures: Multicast<IntentFailure>,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl IntentScheduler {
    pub(crate) fn new(
        config: &ContainerConfig,
        runtime: Handle,
        idling: Arc<dyn IdlingResource>,
    ) -> Self {
        let limit = config.max_in_flight.unwrap_or(usize::MAX);
        Self {
            name: config.name.clone(),
            runtime,
            root: CancellationToken::new(),
            permits: config
                .max_in_flight
                .map(|limit| Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS)))),
            limit,
            failure_policy: config.failure_policy,
            defaults: config.submit_options(),
            idling,
            failures: Multicast::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Options applied by submissions that do not choose their own.
    pub(crate) fn default_options(&self) -> SubmitOptions {
        self.defaults
    }

    /// Launch an intent without waiting for it.
    ///
    /// `intent` is called on the spawned task, never on the caller's thread.
    /// `escalate` runs if the intent fails under the escalate policy.
    pub(crate) fn launch<F, Fut, E>(
        self: &Arc<Self>,
        options: SubmitOptions,
        intent: F,
        escalate: E,
    ) -> Result<IntentHandle, ContainerError>
    where
        F: FnOnce(IntentId, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = IntentResult> + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            return Err(ContainerError::Closed);
        }

        let permit = self.admit()?;
        let id = IntentId::new();
        let token = self.root.child_token();
        let idling = options
            .register_idling
            .then(|| IdlingGuard::begin(Arc::clone(&self.idling)));
        let in_flight = InFlight::enter(Arc::clone(&self.in_flight));

        let scheduler = Arc::clone(self);
        let handle_token = token.clone();
        let cancellation = token.clone();
        let span = tracing::debug_span!("intent", container = %self.name, intent = %id);

        let task = async move {
            let _permit = permit;
            let _idling = idling;
            let _in_flight = in_flight;

            let body = AssertUnwindSafe(async move { intent(id, cancellation).await });
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ContainerError::Cancelled),
                result = body.catch_unwind() => match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(ContainerError::from_intent_error(err)),
                    Err(payload) => Err(ContainerError::IntentPanicked(panic_message(payload))),
                },
            };

            match &outcome {
                Ok(()) => tracing::trace!("intent finished"),
                Err(ContainerError::Cancelled) => tracing::debug!("intent cancelled"),
                Err(err) => scheduler.fail(id, err, escalate),
            }
            outcome
        }
        .instrument(span);

        Ok(IntentHandle {
            id,
            cancellation: handle_token,
            join: self.runtime.spawn(task),
        })
    }

    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, ContainerError> {
        let Some(permits) = &self.permits else {
            return Ok(None);
        };
        match Arc::clone(permits).try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                tracing::warn!(container = %self.name, limit = self.limit, "submission rejected");
                Err(ContainerError::Saturated { limit: self.limit })
            }
            Err(tokio::sync::TryAcquireError::Closed) => Err(ContainerError::Closed),
        }
    }

    fn fail<E>(&self, intent: IntentId, error: &ContainerError, escalate: E)
    where
        E: FnOnce(),
    {
        let failure = IntentFailure::new(intent, error);
        self.failures.publish(failure);

        match self.failure_policy {
            FailurePolicy::Isolate => {
                tracing::warn!(error = %error, "intent failed");
            }
            FailurePolicy::Escalate => {
                tracing::error!(error = %error, "intent failed; escalating to container shutdown");
                escalate();
            }
        }
    }

    /// Attach an observer to the failure channel.
    pub(crate) fn failures(&self) -> Subscription<IntentFailure> {
        self.failures.subscribe()
    }

    /// Number of launched intents that have not finished.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse new intents and cancel every running one.
    ///
    /// Returns `false` if the scheduler was already closed.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.root.cancel();
        if let Some(permits) = &self.permits {
            permits.close();
        }
        self.failures.close();
        true
    }
}

/// Counts an intent as in flight until dropped.
struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to one launched intent.
///
/// Dropping the handle does not stop the intent.
#[derive(Debug)]
pub struct IntentHandle {
    id: IntentId,
    cancellation: CancellationToken,
    join: JoinHandle<Result<(), ContainerError>>,
}

impl IntentHandle {
    /// The intent's ID.
    pub fn id(&self) -> IntentId {
        self.id
    }

    /// Ask the intent to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether the intent's task has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the intent and return how it ended.
    pub async fn join(self) -> Result<(), ContainerError> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => Err(ContainerError::Cancelled),
            Err(err) => Err(ContainerError::IntentPanicked(panic_message(err.into_panic()))),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
