//! Fleetwork — task coordination core for a fleet of autonomous worker agents.
//!
//! This crate is the dispatcher-with-persistent-transactional-state described
//! in the system design: agents register, heartbeat, and pull work from a
//! shared pool; a SQLite store holds projects, tasks, and agent state; the
//! core enforces who may claim what, in what order, and under what
//! concurrency limits, and surfaces stuck work and offline agents as
//! first-class background concerns.
//!
//! Transport (HTTP, CLI, container packaging) is deliberately not part of
//! this crate — see `core::Core` for the thin boundary a transport adapter
//! is expected to drive.

pub mod adapters;
pub mod application;
pub mod config;
pub mod core;
pub mod domain;
pub mod telemetry;

pub use crate::core::Core;
pub use domain::errors::{CoreError, CoreResult};
