//! Deterministic simultaneous-move grid game
//!
//! The simulator runs one match to completion: concurrent move fan-out per
//! round, collision resolution on the proposed board in a fixed priority
//! order, and a lossless frame trace for replay.

pub mod board;
pub mod replay;
pub mod simulator;

pub use board::{BoardSnapshot, Cell};
pub use replay::{DeathEvent, RecordedMove, ReplayFrame};
pub use simulator::{outcomes_by_score, MatchSimulator, SimulatedParticipant, SimulationReport};
