//! Orbital Core
//!
//! This crate provides a concurrency-safe state container for application
//! logic. It implements:
//!
//! - A state holder whose updates are serialized reductions
//! - Intents: asynchronous units of work launched against a container
//! - A replaying state stream and a one-shot side-effect stream
//! - Idling hooks so tests can wait for outstanding work
//! - Decorators that wrap a container and forward to it
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `container`: State cell, reduction serializer, intent scheduler and streams
//! - `decorator`: The container capability trait and wrappers built on it
//! - `idling`: Busy/idle accounting for outstanding intents
//! - `config`: Container configuration
//! - `error`: Error types shared across the crate
//!
//! # Example
//!
//! ```rust,ignore
//! use orbital_core::Container;
//!
//! let container: Container<u32, String> = Container::new(0)?;
//! let mut states = container.subscribe_state();
//!
//! container.submit(|ctx| async move {
//!     ctx.reduce(|count| count + 1)?;
//!     ctx.post_side_effect(format!("count is {}", ctx.state()));
//!     Ok(())
//! })?;
//!
//! // Observers see the current value first, then each commit.
//! assert_eq!(states.recv().await, Some(0));
//! assert_eq!(states.recv().await, Some(1));
//! ```

pub mod config;
pub mod container;
pub mod decorator;
pub mod error;
pub mod idling;

pub use config::{ContainerConfig, FailurePolicy, SubmitOptions};
pub use container::{
    boxed_intent, Container, ContainerBuilder, FailureKind, Intent, IntentContext, IntentFailure,
    IntentHandle, IntentId, ObserverId, StateCell, Subscription,
};
pub use decorator::{ContainerApi, ContainerExt, LoggingDecorator, SavedStateDecorator};
pub use error::{ContainerError, IntentError, IntentResult};
pub use idling::{IdlingRegistry, IdlingResource, NoopIdling};
