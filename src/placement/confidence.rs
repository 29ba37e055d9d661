//! Outcome confidence scoring
//!
//! How much a single result should be trusted as skill signal. The
//! constants were calibrated against historical match data: wall deaths
//! with near-zero score are decisive, body collisions in close games are
//! often tactical flukes, and mutual head-on collisions are close to noise.

use serde::{Deserialize, Serialize};

use crate::types::{DeathCause, Outcome};

/// Everything about one result that informs its confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub outcome: Outcome,
    pub my_score: u32,
    pub opponent_score: u32,
    pub my_death_cause: Option<DeathCause>,
    pub rounds: u32,
}

impl MatchEvidence {
    fn score_diff(&self) -> u32 {
        self.my_score.abs_diff(self.opponent_score)
    }
}

/// Base confidence from the score differential alone.
fn base_confidence(score_diff: u32) -> f64 {
    match score_diff {
        0 => 0.40,
        1..=2 => 0.60,
        3..=5 => 0.75,
        6..=10 => 0.85,
        _ => 0.95,
    }
}

/// Confidence pair for a result: how much to trust it as a win and as a
/// loss. Losses are weighed more leniently than wins on purpose; a fluky
/// loss should not tank a placement, while wins still count.
fn confidence_pair(evidence: &MatchEvidence) -> (f64, f64) {
    let diff = evidence.score_diff();
    let base = base_confidence(diff);
    let mut win_confidence = base;
    let mut loss_confidence = base;

    if evidence.outcome == Outcome::Lost {
        match evidence.my_death_cause {
            Some(DeathCause::Wall) => {
                if evidence.my_score <= 1 {
                    // Early wall death with nothing on the board: decisive
                    loss_confidence = (loss_confidence + 0.15).min(1.0);
                } else {
                    loss_confidence *= 0.9;
                }
            }
            Some(DeathCause::BodyCollision) => {
                // Usually a tactical error late in a close game
                loss_confidence *= 0.5;
            }
            Some(DeathCause::HeadCollision) => {
                // Both heads on one cell is essentially a coin flip
                loss_confidence = 0.25;
            }
            None => {}
        }
    }

    if evidence.rounds < 10 {
        win_confidence *= 0.8;
        loss_confidence *= 0.6;
    } else if evidence.rounds > 50 {
        win_confidence = (win_confidence * 1.1).min(1.0);
        loss_confidence = (loss_confidence * 1.1).min(1.0);
    }

    // Lost on a tied score: barely a loss at all
    if diff == 0 && evidence.outcome == Outcome::Lost {
        loss_confidence *= 0.4;
    }

    (win_confidence, loss_confidence)
}

/// Confidence in the result the match actually produced.
pub fn result_confidence(evidence: &MatchEvidence) -> f64 {
    let (win_confidence, loss_confidence) = confidence_pair(evidence);
    match evidence.outcome {
        Outcome::Won => win_confidence,
        Outcome::Lost => loss_confidence,
        Outcome::Tied => (win_confidence + loss_confidence) / 2.0,
    }
}
