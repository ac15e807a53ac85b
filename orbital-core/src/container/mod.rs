//! State Container
//!
//! This module implements the container: a concurrency-safe holder of
//! application state that runs many intents at once while applying their
//! reductions one at a time.
//!
//! # Concepts
//!
//! ## Intents
//!
//! An intent is a unit of work submitted to the container. Each intent runs
//! as its own task and may suspend for as long as it likes (timers, I/O,
//! nested operations) without holding up any other intent.
//!
//! ## Reductions
//!
//! A reduction is a transform from the latest committed state to the next
//! one. Its input is bound when the reduction runs, not when the intent
//! starts, so a long-suspended intent never overwrites updates made while it
//! was waiting.
//!
//! ## Streams
//!
//! The state stream replays the current value to each new observer and then
//! delivers every commit in order. The side-effect stream delivers one-shot
//! values only to observers attached when they are posted.
//!
//! # Implementation Notes
//!
//! The only mutual exclusion is the state cell's writer lock, held while a
//! transform runs and its result is published. It is never held across an
//! `.await`, because reductions are synchronous closures.

mod cell;
mod channel;
mod context;
mod observer;
mod runtime;
mod scheduler;
mod serializer;

pub use cell::StateCell;
pub use channel::Subscription;
pub use context::{boxed_intent, Intent, IntentContext};
pub use observer::{IntentId, ObserverId};
pub use runtime::{Container, ContainerBuilder};
pub use scheduler::{FailureKind, IntentFailure, IntentHandle};
pub use serializer::ReductionSerializer;
