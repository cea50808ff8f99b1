//! Background sweeps: heartbeat, stuck-task reclamation, and idempotency GC.
//!
//! Each sweep is an independent `tokio::spawn`ed loop, cooperatively
//! cancellable via a shared `tokio_util::sync::CancellationToken`.

pub mod heartbeat_sweep;
pub mod idempotency_gc;
pub mod stuck_sweep;

pub use heartbeat_sweep::HeartbeatSweep;
pub use idempotency_gc::IdempotencyGc;
pub use stuck_sweep::StuckSweep;
