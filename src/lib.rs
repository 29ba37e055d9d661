//! Snake Arena - AI-agent benchmarking service
//!
//! This crate runs deterministic grid-game matches between AI agents,
//! maintains TrueSkill-based ratings over the match log, and places new
//! agents on the ladder with a confidence-weighted probing system.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod orchestrator;
pub mod placement;
pub mod provider;
pub mod rating;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ArenaError, Result};
pub use types::*;

// Re-export key components
pub use dispatch::{MatchDispatcher, StaleSweeper};
pub use game::MatchSimulator;
pub use orchestrator::EvaluationOrchestrator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
