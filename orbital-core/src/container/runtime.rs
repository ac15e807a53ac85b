//! Container Runtime
//!
//! Ties the pieces together: a reduction serializer holding the state, a
//! side-effect channel, and a scheduler that launches intents against them.
//!
//! `Container` is a cheap handle. Clones share the same state, streams and
//! scheduler, so a container can be handed to many threads and tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! let container: Container<u32, String> = Container::new(0)?;
//! let mut states = container.subscribe_state();
//!
//! container.submit(|ctx| async move {
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!     ctx.reduce(|n| n + 1)?;
//!     ctx.post_side_effect("incremented".to_string());
//!     Ok(())
//! })?;
//!
//! assert_eq!(states.recv().await, Some(0));
//! assert_eq!(states.recv().await, Some(1));
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::channel::{Multicast, Subscription};
use super::context::IntentContext;
use super::scheduler::{IntentFailure, IntentHandle, IntentScheduler};
use super::serializer::{Distinct, ReductionSerializer};
use crate::config::{ContainerConfig, FailurePolicy, SubmitOptions};
use crate::error::{ContainerError, IntentResult};
use crate::idling::{IdlingResource, NoopIdling};

/// State and side-effect plumbing shared by the container and every
/// running intent's context.
pub(crate) struct Core<S, SE> {
    pub(crate) name: String,
    pub(crate) serializer: ReductionSerializer<S>,
    pub(crate) side_effects: Multicast<SE>,
}

impl<S, SE> Core<S, SE>
where
    S: Clone + Send + Sync + 'static,
    SE: Clone + Send + 'static,
{
    fn close(&self) {
        self.serializer.close();
        self.side_effects.close();
    }
}

/// Concurrency-safe state holder.
pub struct Container<S, SE> {
    core: Arc<Core<S, SE>>,
    scheduler: Arc<IntentScheduler>,
}

impl<S, SE> Clone for Container<S, SE> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<S, SE> Container<S, SE>
where
    S: Clone + Send + Sync + 'static,
    SE: Clone + Send + 'static,
{
    /// Start building a container holding `initial`.
    pub fn builder(initial: S) -> ContainerBuilder<S, SE> {
        ContainerBuilder::new(initial)
    }

    /// Create a container with default configuration on the current runtime.
    pub fn new(initial: S) -> Result<Self, ContainerError> {
        Self::builder(initial).build()
    }

    /// Name used in tracing output.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Synchronous snapshot of the committed state.
    pub fn current_state(&self) -> S {
        self.core.serializer.current()
    }

    /// Attach a state observer. It receives the current value first, then
    /// every later commit in commit order.
    pub fn subscribe_state(&self) -> Subscription<S> {
        self.core.serializer.subscribe()
    }

    /// Attach a side-effect observer. It receives only side effects posted
    /// after it attached.
    pub fn subscribe_side_effects(&self) -> Subscription<SE> {
        self.core.side_effects.subscribe()
    }

    /// Attach a failure observer.
    pub fn failures(&self) -> Subscription<IntentFailure> {
        self.scheduler.failures()
    }

    /// Launch an intent with the configured default options.
    ///
    /// Returns as soon as the intent is scheduled.
    pub fn submit<F, Fut>(&self, intent: F) -> Result<IntentHandle, ContainerError>
    where
        F: FnOnce(IntentContext<S, SE>) -> Fut + Send + 'static,
        Fut: Future<Output = IntentResult> + Send + 'static,
    {
        self.submit_with(self.scheduler.default_options(), intent)
    }

    /// Launch an intent with explicit options.
    pub fn submit_with<F, Fut>(
        &self,
        options: SubmitOptions,
        intent: F,
    ) -> Result<IntentHandle, ContainerError>
    where
        F: FnOnce(IntentContext<S, SE>) -> Fut + Send + 'static,
        Fut: Future<Output = IntentResult> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        let escalation = self.clone();

        self.scheduler.launch(
            options,
            move |id, token| intent(IntentContext::new(id, core, token)),
            move || escalation.shutdown(),
        )
    }

    /// Number of intents launched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    /// Number of committed reductions since creation.
    pub fn commit_count(&self) -> u64 {
        self.core.serializer.commit_count()
    }

    /// Number of attached state observers.
    pub fn state_observer_count(&self) -> usize {
        self.core.serializer.observer_count()
    }

    /// Number of attached side-effect observers.
    pub fn side_effect_observer_count(&self) -> usize {
        self.core.side_effects.observer_count()
    }

    /// Whether the container has been shut down.
    pub fn is_closed(&self) -> bool {
        self.scheduler.is_closed()
    }

    /// Cancel every running intent, end every stream and refuse new work.
    ///
    /// The committed state stays readable through
    /// [`current_state`](Self::current_state). Calling this twice is a no-op.
    pub fn shutdown(&self) {
        if self.scheduler.close() {
            tracing::info!(container = %self.core.name, "container shut down");
        }
        self.core.close();
    }
}

impl<S, SE> std::fmt::Debug for Container<S, SE>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.core.name)
            .field("serializer", &self.core.serializer)
            .field("in_flight", &self.scheduler.in_flight())
            .field("closed", &self.scheduler.is_closed())
            .finish()
    }
}

/// Builder for [`Container`].
pub struct ContainerBuilder<S, SE> {
    initial: S,
    config: ContainerConfig,
    idling: Arc<dyn IdlingResource>,
    runtime: Option<Handle>,
    distinct: Option<Distinct<S>>,
    _side_effects: PhantomData<fn() -> SE>,
}

impl<S, SE> ContainerBuilder<S, SE>
where
    S: Clone + Send + Sync + 'static,
    SE: Clone + Send + 'static,
{
    /// Start from default configuration.
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            config: ContainerConfig::default(),
            idling: Arc::new(NoopIdling),
            runtime: None,
            distinct: None,
            _side_effects: PhantomData,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Name used in tracing output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// How intent failures are handled.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Reject submissions once `limit` intents are in flight.
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.config.max_in_flight = Some(limit);
        self
    }

    /// Whether [`Container::submit`] registers with the idling resource.
    pub fn register_idling(mut self, register: bool) -> Self {
        self.config.register_idling = register;
        self
    }

    /// Idling resource notified around each registered intent.
    pub fn idling(mut self, idling: Arc<dyn IdlingResource>) -> Self {
        self.idling = idling;
        self
    }

    /// Runtime that intents are spawned on. Defaults to the runtime the
    /// builder is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Suppress reductions whose result equals the current state.
    pub fn distinct_until_changed(mut self) -> Self
    where
        S: PartialEq,
    {
        self.distinct = Some(Box::new(|current: &S, next: &S| current == next));
        self
    }

    /// Build the container.
    ///
    /// Fails with [`ContainerError::NoRuntime`] when no runtime was given and
    /// none is current.
    pub fn build(self) -> Result<Container<S, SE>, ContainerError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ContainerError::NoRuntime)?,
        };

        let mut serializer = ReductionSerializer::new(self.initial);
        if let Some(distinct) = self.distinct {
            serializer = serializer.with_distinct(distinct);
        }

        tracing::debug!(
            container = %self.config.name,
            policy = ?self.config.failure_policy,
            max_in_flight = ?self.config.max_in_flight,
            "container created"
        );

        Ok(Container {
            core: Arc::new(Core {
                name: self.config.name.clone(),
                serializer,
                side_effects: Multicast::new(),
            }),
            scheduler: Arc::new(IntentScheduler::new(&self.config, runtime, self.idling)),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idling::IdlingRegistry;
    use std::time::Duration;

    #[test]
    fn build_outside_runtime_fails() {
        let result = Container::<i32, ()>::new(0);
        assert!(matches!(result, Err(ContainerError::NoRuntime)));
    }

    #[test]
    fn build_with_explicit_runtime_and_submit_from_plain_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let container: Container<i32, ()> = Container::builder(1)
            .runtime(runtime.handle().clone())
            .build()
            .unwrap();

        let handle = container
            .submit(|ctx| async move {
                ctx.reduce(|n| n * 10)?;
                Ok(())
            })
            .unwrap();

        runtime.block_on(handle.join()).unwrap();
        assert_eq!(container.current_state(), 10);
    }

    #[tokio::test]
    async fn reduce_and_post_side_effect() {
        let container: Container<Vec<&'static str>, String> = Container::new(Vec::new()).unwrap();
        let mut states = container.subscribe_state();
        let mut effects = container.subscribe_side_effects();

        container
            .submit(|ctx| async move {
                ctx.reduce(|items| {
                    let mut items = items.clone();
                    items.push("first");
                    items
                })?;
                ctx.post_side_effect("saved".to_string());
                Ok(())
            })
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(states.recv().await, Some(vec![]));
        assert_eq!(states.recv().await, Some(vec!["first"]));
        assert_eq!(effects.recv().await, Some("saved".to_string()));
        assert_eq!(container.commit_count(), 1);
    }

    #[tokio::test]
    async fn context_reports_latest_state() {
        let container: Container<i32, ()> = Container::new(3).unwrap();
        container
            .submit(|ctx| async move {
                assert_eq!(ctx.state(), 3);
                ctx.reduce(|n| n + 1)?;
                assert_eq!(ctx.state(), 4);
                Ok(())
            })
            .unwrap()
            .join()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_intent_does_not_reduce() {
        let container: Container<i32, ()> = Container::new(0).unwrap();
        let handle = container
            .submit(|ctx| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ctx.reduce(|n| n + 1)?;
                Ok(())
            })
            .unwrap();

        handle.cancel();
        assert!(matches!(handle.join().await, Err(ContainerError::Cancelled)));
        assert_eq!(container.current_state(), 0);
        assert_eq!(container.in_flight(), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_streams_and_rejects_work() {
        let container: Container<i32, u8> = Container::new(5).unwrap();
        let mut states = container.subscribe_state();
        let mut effects = container.subscribe_side_effects();

        container.shutdown();
        assert!(container.is_closed());

        assert_eq!(states.recv().await, Some(5));
        assert_eq!(states.recv().await, None);
        assert_eq!(effects.recv().await, None);
        assert_eq!(container.current_state(), 5);

        let rejected = container.submit(|_| async { Ok(()) });
        assert!(matches!(rejected, Err(ContainerError::Closed)));
    }

    #[tokio::test]
    async fn escalated_failure_shuts_container_down() {
        let container: Container<i32, ()> = Container::builder(0)
            .failure_policy(FailurePolicy::Escalate)
            .build()
            .unwrap();
        let mut states = container.subscribe_state();

        let failing = container
            .submit(|_| async { Err("unrecoverable".into()) })
            .unwrap();
        assert!(failing.join().await.is_err());

        assert!(container.is_closed());
        assert_eq!(states.recv().await, Some(0));
        assert_eq!(states.recv().await, None);
        assert!(matches!(
            container.submit(|_| async { Ok(()) }),
            Err(ContainerError::Closed)
        ));
    }

    #[tokio::test]
    async fn distinct_until_changed_skips_equal_states() {
        let container: Container<i32, ()> = Container::builder(1)
            .distinct_until_changed()
            .build()
            .unwrap();
        let mut states = container.subscribe_state();

        container
            .submit(|ctx| async move {
                ctx.reduce(|n| *n)?;
                ctx.reduce(|n| n + 1)?;
                Ok(())
            })
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(states.recv().await, Some(1));
        assert_eq!(states.recv().await, Some(2));
        assert_eq!(states.try_recv(), None);
    }

    #[tokio::test]
    async fn config_default_controls_idling_registration() {
        let registry = Arc::new(IdlingRegistry::new());
        let container: Container<i32, ()> = Container::builder(0)
            .register_idling(false)
            .idling(registry.clone())
            .build()
            .unwrap();

        let handle = container
            .submit(|ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .unwrap();

        assert_eq!(container.in_flight(), 1);
        assert!(registry.is_idle());
        handle.cancel();
        let _ = handle.join().await;
    }
}
