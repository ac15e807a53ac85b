//! Intent Context
//!
//! The handle a running intent uses to touch its container. It exposes the
//! two primitives an intent needs, requesting a reduction and posting a side
//! effect, plus a read of the current state and the intent's cancellation
//! signal.
//!
//! A context is created for one intent and is dropped when that intent
//! finishes. It is bound to exactly one container.
//!
//! # Reading State
//!
//! [`IntentContext::state`] is a snapshot. After a suspension point it may
//! already be stale, so updates should always go through
//! [`IntentContext::reduce`], whose transform receives the latest value.
//!
//! ```rust,ignore
//! container.submit(|ctx| async move {
//!     let profile = fetch_profile().await?;
//!     ctx.reduce(|state| state.with_profile(profile))?;
//!     ctx.post_side_effect(Toast::Loaded);
//!     Ok(())
//! })?;
//! ```

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::runtime::Core;
use super::observer::IntentId;
use crate::error::{ContainerError, IntentError, IntentResult};

/// A type-erased intent, as passed across the [`ContainerApi`] seam.
///
/// [`ContainerApi`]: crate::decorator::ContainerApi
pub type Intent<S, SE> =
    Box<dyn FnOnce(IntentContext<S, SE>) -> BoxFuture<'static, IntentResult> + Send>;

/// Erase an intent closure into an [`Intent`].
pub fn boxed_intent<S, SE, F, Fut>(intent: F) -> Intent<S, SE>
where
    F: FnOnce(IntentContext<S, SE>) -> Fut + Send + 'static,
    Fut: Future<Output = IntentResult> + Send + 'static,
{
    Box::new(move |ctx| intent(ctx).boxed())
}

/// Execution context handed to one running intent.
pub struct IntentContext<S, SE> {
    intent: IntentId,
    core: Arc<Core<S, SE>>,
    cancellation: CancellationToken,
}

impl<S, SE> IntentContext<S, SE>
where
    S: Clone + Send + Sync + 'static,
    SE: Clone + Send + 'static,
{
    pub(crate) fn new(intent: IntentId, core: Arc<Core<S, SE>>, cancellation: CancellationToken) -> Self {
        Self {
            intent,
            core,
            cancellation,
        }
    }

    /// ID of the intent this context belongs to.
    pub fn intent_id(&self) -> IntentId {
        self.intent
    }

    /// Snapshot of the committed state.
    pub fn state(&self) -> S {
        self.core.serializer.current()
    }

    /// Request a reduction. `f` receives the latest committed state, not the
    /// state at the time the intent started.
    ///
    /// Returns the new state. Fails with [`ContainerError::Cancelled`] if the
    /// intent was cancelled, in which case the reduction is not started.
    pub fn reduce<F>(&self, f: F) -> Result<S, ContainerError>
    where
        F: FnOnce(&S) -> S,
    {
        self.ensure_running()?;
        self.core.serializer.reduce(f)
    }

    /// Request a reduction whose transform may fail. On failure the state is
    /// unchanged and the error comes back as [`ContainerError::Reduction`].
    pub fn try_reduce<F, E>(&self, f: F) -> Result<S, ContainerError>
    where
        F: FnOnce(&S) -> Result<S, E>,
        E: Into<IntentError>,
    {
        self.ensure_running()?;
        self.core.serializer.try_reduce(f)
    }

    /// Post a one-shot side effect to every currently attached observer.
    ///
    /// Returns how many observers received it.
    pub fn post_side_effect(&self, side_effect: SE) -> usize {
        let delivered = self.core.side_effects.publish(side_effect);
        if delivered == 0 {
            tracing::trace!("side effect posted with no observers attached");
        }
        delivered
    }

    /// Whether this intent has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when this intent is asked to stop.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// A token cancelled together with this intent, for nested work.
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation.child_token()
    }

    fn ensure_running(&self) -> Result<(), ContainerError> {
        if self.cancellation.is_cancelled() {
            return Err(ContainerError::Cancelled);
        }
        Ok(())
    }
}

impl<S, SE> std::fmt::Debug for IntentContext<S, SE> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentContext")
            .field("intent", &self.intent)
            .field("container", &self.core.name)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
