//! # lace-core
//!
//! Core conversation engine for Lace, an AI coding agent frontend.
//!
//! This crate is framework-agnostic and can be used by:
//! - Tauri desktop app (via commands)
//! - SSH daemon (via JSON-RPC)
//! - Web server (via REST/WebSocket)
//!
//! ## Key Concepts
//!
//! - **Thread**: an event-sourced conversation; its entire state is the
//!   fold of its append-only event log.
//! - **Turn**: a user message and the Agent's complete response, driven
//!   by [`agent::Agent::run_turn`].
//! - **Event**: the closed set of kinds a Thread's log may contain.

pub mod agent;
pub mod approval;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod model;
pub mod paths;
pub mod policy;
pub mod store;
pub mod threads;
pub mod tools;

pub use agent::{Agent, Provider, TurnState};
pub use approval::{ApprovalCoordinator, ApprovalOutcome};
pub use model::{Event, EventPayload, Project, Session, Thread, ThreadId, ThreadView};
pub use policy::PolicyResolver;
pub use store::{EventStore, JsonlEventStore, NullEventStore};
pub use threads::ThreadManager;
pub use tools::{Executor, Tool, ToolRegistry};
