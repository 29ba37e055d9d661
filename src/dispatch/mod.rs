//! Match dispatch
//!
//! Units of work flow through an at-least-once job queue into a worker
//! pool. Redeliveries are harmless: unit ids double as idempotency keys
//! for match creation, and the per-unit seed makes a re-run produce the
//! identical trace.

pub mod queue;
pub mod sweeper;
pub mod worker;

pub use queue::{InMemoryJobQueue, JobQueue, MatchUnit, UnitSeat};
pub use sweeper::{StaleSweeper, SweepStats};
pub use worker::{CompletionHook, MatchDispatcher};
