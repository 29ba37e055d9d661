//! Placement state and opponent selection
//!
//! The state is a pure fold over an agent's completed evaluation history:
//! seed from the current ranked population, then apply each result in
//! order. Nothing here is independently durable; rebuilding from the match
//! log always reproduces the same state.
//!
//! Ratings on this side are display-scale (Elo-like). The global ranking
//! still comes from the TrueSkill fold; placement only steers which
//! opponents an onboarding agent meets and when to stop probing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArenaError, Result};
use crate::placement::confidence::{result_confidence, MatchEvidence};
use crate::types::{AgentId, Outcome};

/// Prior skill estimate when no ranked population exists yet
pub const PRIOR_MU: f64 = 1500.0;
pub const PRIOR_SIGMA: f64 = 200.0;
/// Uncertainty never collapses below this
pub const MIN_SIGMA: f64 = 50.0;
/// Base K-factor before uncertainty and confidence scaling
pub const K_BASE: f64 = 32.0;
/// Results below this confidence against a new opponent get a rematch
pub const REMATCH_THRESHOLD: f64 = 0.45;

const PRIOR_FLOOR: f64 = 1100.0;
const PRIOR_CEILING: f64 = 1900.0;

/// One ranked agent as seen by opponent selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOpponent {
    pub agent_id: AgentId,
    pub name: String,
    /// Display rating
    pub rating: f64,
}

/// One completed evaluation match from the probing agent's side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub opponent_id: AgentId,
    /// Opponent display rating when the match was dispatched
    pub opponent_rating: f64,
    pub evidence: MatchEvidence,
}

/// Derived placement state for one onboarding agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementState {
    pub agent_id: AgentId,
    pub mu: f64,
    pub sigma: f64,
    pub games_played: u32,
    pub max_games: u32,
    /// Plausible display-rating interval
    pub floor: f64,
    pub ceiling: f64,
    pub opponents_played: BTreeSet<AgentId>,
    /// At most one opponent owed a rematch after a low-confidence result
    pub pending_rematch: Option<AgentId>,
}

impl PlacementState {
    /// Seed a fresh state from the current ranked population: estimate at
    /// the population median, interval over the full rating span, sigma
    /// proportional to the span. Fixed priors when no one is ranked yet.
    pub fn seed(agent_id: AgentId, max_games: u32, ranked: &[RankedOpponent]) -> Self {
        let (mu, floor, ceiling, sigma) = if ranked.is_empty() {
            (PRIOR_MU, PRIOR_FLOOR, PRIOR_CEILING, PRIOR_SIGMA)
        } else {
            let mut ratings: Vec<f64> = ranked.iter().map(|opponent| opponent.rating).collect();
            ratings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = if ratings.len() % 2 == 1 {
                ratings[ratings.len() / 2]
            } else {
                (ratings[ratings.len() / 2 - 1] + ratings[ratings.len() / 2]) / 2.0
            };
            let floor = ratings[0];
            let ceiling = ratings[ratings.len() - 1];
            let sigma = ((ceiling - floor) / 4.0).clamp(100.0, 400.0);
            (median, floor, ceiling, sigma)
        };

        Self {
            agent_id,
            mu,
            sigma,
            games_played: 0,
            max_games,
            floor,
            ceiling,
            opponents_played: BTreeSet::new(),
            pending_rematch: None,
        }
    }

    /// Rebuild the state by re-folding a chronological evaluation history.
    pub fn rebuild(
        agent_id: AgentId,
        max_games: u32,
        ranked: &[RankedOpponent],
        history: &[EvaluationSample],
    ) -> Self {
        let mut state = Self::seed(agent_id, max_games, ranked);
        for sample in history {
            state.apply(sample);
        }
        state
    }

    /// Fold one result into the state.
    pub fn apply(&mut self, sample: &EvaluationSample) {
        let confidence = result_confidence(&sample.evidence);
        let first_meeting = !self.opponents_played.contains(&sample.opponent_id);

        if self.pending_rematch.as_deref() == Some(sample.opponent_id.as_str()) {
            self.pending_rematch = None;
        }

        let expected = 1.0 / (1.0 + 10f64.powf((sample.opponent_rating - self.mu) / 400.0));
        let actual = match sample.evidence.outcome {
            Outcome::Won => 1.0,
            Outcome::Lost => 0.0,
            Outcome::Tied => 0.5,
        };
        let k = K_BASE * (self.sigma / 100.0) * confidence;
        self.mu += k * (actual - expected);
        self.sigma = (self.sigma - 10.0 * confidence).max(MIN_SIGMA);

        self.update_interval(sample, confidence);

        if confidence < REMATCH_THRESHOLD && first_meeting {
            debug!(
                agent_id = %self.agent_id,
                opponent_id = %sample.opponent_id,
                confidence,
                "low-confidence result, scheduling rematch"
            );
            self.pending_rematch = Some(sample.opponent_id.clone());
        }

        self.opponents_played.insert(sample.opponent_id.clone());
        self.games_played += 1;
    }

    /// Tighten the plausible interval with the new result. A win proves we
    /// belong at or above the opponent; a trusted loss proves at or below;
    /// a draw pins us near them without hard-capping either side.
    fn update_interval(&mut self, sample: &EvaluationSample, confidence: f64) {
        let opponent = sample.opponent_rating;
        match sample.evidence.outcome {
            Outcome::Won => {
                self.floor = self.floor.max(opponent);
            }
            Outcome::Lost => {
                if confidence >= 0.5 {
                    self.ceiling = self.ceiling.min(opponent);
                }
            }
            Outcome::Tied => {
                self.floor = self.floor.max(opponent - self.sigma / 4.0);
                if opponent >= self.mu {
                    self.ceiling = self.ceiling.min(opponent + self.sigma);
                }
            }
        }
        if self.floor > self.ceiling {
            self.floor = opponent;
            self.ceiling = opponent;
        }
    }

    /// Whether the probe is done: the game budget is spent. Sigma bottoming
    /// out at `MIN_SIGMA` is a diagnostic, not a stop condition; the agent
    /// still plays out its budget.
    pub fn is_converged(&self) -> bool {
        self.games_played >= self.max_games
    }

    fn interval_midpoint(&self) -> f64 {
        (self.floor + self.ceiling) / 2.0
    }

    /// Pick the next opponent. A pending rematch wins outright; otherwise
    /// prefer an unplayed opponent rated closest to the interval midpoint,
    /// falling back to repeats only when everyone has been played.
    pub fn select_opponent<'a>(&self, ranked: &'a [RankedOpponent]) -> Result<&'a RankedOpponent> {
        if ranked.is_empty() {
            return Err(ArenaError::EmptyOpponentPool {
                agent_id: self.agent_id.clone(),
            }
            .into());
        }

        if let Some(pending) = &self.pending_rematch {
            if let Some(opponent) = ranked.iter().find(|o| &o.agent_id == pending) {
                return Ok(opponent);
            }
        }

        let midpoint = self.interval_midpoint();
        let closest = |pool: &mut dyn Iterator<Item = &'a RankedOpponent>| {
            pool.min_by(|a, b| {
                (a.rating - midpoint)
                    .abs()
                    .partial_cmp(&(b.rating - midpoint).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        };

        let mut unplayed = ranked
            .iter()
            .filter(|o| !self.opponents_played.contains(&o.agent_id));
        if let Some(opponent) = closest(&mut unplayed) {
            return Ok(opponent);
        }
        // Budget outlasted the pool; repeat the most informative opponent
        closest(&mut ranked.iter()).ok_or_else(|| {
            ArenaError::EmptyOpponentPool {
                agent_id: self.agent_id.clone(),
            }
            .into()
        })
    }
}
