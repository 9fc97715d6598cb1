//! Core dataflow primitives for the analysis engine
//!
//! These primitives carry no knowledge of activation data or views; they are
//! the plumbing the controller and coordinator are built from.
//!
//! # Core Components
//!
//! - **[`EventBus`]** - Synchronous typed publish/subscribe with per-handler failure isolation
//! - **[`Throttle`]** - Trailing-edge scheduled task that always runs with the latest arguments
//! - **[`RequestSequencer`]** - Monotonic request numbering with highest-accepted tracking
//! - **[`Relay`]** - Unbounded channel carrying UI intents into the controller
//!
//! # Architecture Principles
//!
//! 1. **Single Owner** - Only the controller mutates analysis state
//! 2. **Run To Completion** - A publish finishes before any event it triggers starts
//! 3. **Never Apply Stale Data** - Out-of-order responses are dropped, not merged

pub mod event_bus;
pub mod relay;
pub mod sequencer;
pub mod throttle;

pub use event_bus::{EventBus, HandlerFailure, SubscriptionId, UnknownEventName};
pub use relay::{Relay, RelayError, relay};
pub use sequencer::RequestSequencer;
pub use throttle::Throttle;
