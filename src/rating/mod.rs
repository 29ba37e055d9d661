//! Bayesian skill rating
//!
//! Wraps the TrueSkill implementation from skillratings: every participant
//! is its own team, ranked by match outcome. The replay submodule re-derives
//! all ratings from the chronological match log.

pub mod engine;
pub mod replay;

pub use engine::{RatingEngine, RatingUpdate};
pub use replay::{replay_ratings, verify_consistency, CompletedEntry, Discrepancy, ReplayState};
