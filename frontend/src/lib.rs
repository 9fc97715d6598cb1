//! State synchronization and cell-selection engine for exploring the hidden
//! states of recurrent networks.
//!
//! A single [`controller::StateController`] owns the analysis state. Views
//! talk to it only through the [`events::AppEventBus`] and UI intents; the
//! data backend sits behind [`gateway::DataGateway`].
//!
//! Everything runs on one thread. Async work is spawned with
//! `tokio::task::spawn_local`, so the engine must be driven from a
//! `tokio::task::LocalSet`.

pub mod app;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod dataflow;
pub mod error_display;
pub mod events;
pub mod gateway;
pub mod selection;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod scenario_tests;
