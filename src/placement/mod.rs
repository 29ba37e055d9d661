//! Confidence-weighted placement
//!
//! Finds a fair rating neighborhood for an onboarding agent in a small game
//! budget. Outcomes are weighted by how much skill signal they carry before
//! they move the estimate; low-confidence results schedule a rematch rather
//! than shifting the estimate on a fluke.

pub mod confidence;
pub mod engine;

pub use confidence::{result_confidence, MatchEvidence};
pub use engine::{EvaluationSample, PlacementState, RankedOpponent};
