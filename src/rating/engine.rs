//! TrueSkill rating updates
//!
//! Each participant plays as a single-member team; ranks come straight from
//! the match outcome (win beats tie beats loss). The configuration mirrors
//! the environment's draw rate and the standard skill-to-noise ratio.

use skillratings::trueskill::{trueskill_multi_team, TrueSkillConfig, TrueSkillRating};
use skillratings::MultiTeamOutcome;

use crate::error::{ArenaError, Result};
use crate::types::{AgentId, Outcome, SkillEstimate, DEFAULT_MU};

/// One agent's rating change from a match
#[derive(Debug, Clone, PartialEq)]
pub struct RatingUpdate {
    pub agent_id: AgentId,
    pub old: SkillEstimate,
    pub new: SkillEstimate,
}

impl RatingUpdate {
    pub fn display_delta(&self) -> f64 {
        self.new.display_rating() - self.old.display_rating()
    }
}

/// Stateless TrueSkill calculator shared across workers
#[derive(Debug, Clone)]
pub struct RatingEngine {
    config: TrueSkillConfig,
}

impl Default for RatingEngine {
    fn default() -> Self {
        Self {
            config: TrueSkillConfig {
                // Grid matches draw roughly one game in ten
                draw_probability: 0.1,
                beta: DEFAULT_MU / 6.0,
                default_dynamics: 0.5,
            },
        }
    }
}

impl RatingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate one completed match. Input order is preserved in the output.
    pub fn rate(&self, participants: &[(AgentId, SkillEstimate, Outcome)]) -> Result<Vec<RatingUpdate>> {
        if participants.len() < 2 {
            return Err(ArenaError::InvalidMatch {
                reason: format!(
                    "rating requires at least 2 participants, got {}",
                    participants.len()
                ),
            }
            .into());
        }

        let priors: Vec<[TrueSkillRating; 1]> = participants
            .iter()
            .map(|(_, skill, _)| [TrueSkillRating::from(*skill)])
            .collect();
        let teams: Vec<(&[TrueSkillRating], MultiTeamOutcome)> = priors
            .iter()
            .zip(participants.iter())
            .map(|(team, (_, _, outcome))| (team.as_slice(), MultiTeamOutcome::new(outcome.rank())))
            .collect();

        let rated = trueskill_multi_team(&teams, &self.config);

        Ok(participants
            .iter()
            .zip(rated.iter())
            .map(|((agent_id, old, _), team)| RatingUpdate {
                agent_id: agent_id.clone(),
                old: *old,
                new: SkillEstimate::from(team[0]),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_SIGMA;

    fn fresh(id: &str, outcome: Outcome) -> (AgentId, SkillEstimate, Outcome) {
        (id.to_string(), SkillEstimate::default(), outcome)
    }

    #[test]
    fn test_winner_gains_loser_drops() {
        let engine = RatingEngine::new();
        let updates = engine
            .rate(&[fresh("winner", Outcome::Won), fresh("loser", Outcome::Lost)])
            .unwrap();

        assert!(updates[0].new.mu > updates[0].old.mu);
        assert!(updates[1].new.mu < updates[1].old.mu);
        // A decisive result always shrinks uncertainty
        assert!(updates[0].new.sigma < DEFAULT_SIGMA);
        assert!(updates[1].new.sigma < DEFAULT_SIGMA);
    }

    #[test]
    fn test_equal_priors_update_symmetrically() {
        let engine = RatingEngine::new();
        let updates = engine
            .rate(&[fresh("a", Outcome::Won), fresh("b", Outcome::Lost)])
            .unwrap();

        let gain = updates[0].new.mu - updates[0].old.mu;
        let drop = updates[1].old.mu - updates[1].new.mu;
        assert!((gain - drop).abs() < 1e-6);
    }

    #[test]
    fn test_tie_pulls_means_together() {
        let engine = RatingEngine::new();
        let strong = SkillEstimate {
            mu: 30.0,
            sigma: 2.0,
        };
        let weak = SkillEstimate { mu: 20.0, sigma: 2.0 };
        let updates = engine
            .rate(&[
                ("strong".to_string(), strong, Outcome::Tied),
                ("weak".to_string(), weak, Outcome::Tied),
            ])
            .unwrap();

        assert!(updates[0].new.mu < strong.mu);
        assert!(updates[1].new.mu > weak.mu);
    }

    #[test]
    fn test_upset_moves_more_than_expected_result() {
        let engine = RatingEngine::new();
        let favorite = SkillEstimate { mu: 30.0, sigma: 3.0 };
        let underdog = SkillEstimate { mu: 20.0, sigma: 3.0 };

        let upset = engine
            .rate(&[
                ("underdog".to_string(), underdog, Outcome::Won),
                ("favorite".to_string(), favorite, Outcome::Lost),
            ])
            .unwrap();
        let expected = engine
            .rate(&[
                ("favorite".to_string(), favorite, Outcome::Won),
                ("underdog".to_string(), underdog, Outcome::Lost),
            ])
            .unwrap();

        let upset_gain = upset[0].new.mu - upset[0].old.mu;
        let expected_gain = expected[0].new.mu - expected[0].old.mu;
        assert!(upset_gain > expected_gain);
    }

    #[test]
    fn test_rejects_single_participant() {
        let engine = RatingEngine::new();
        assert!(engine.rate(&[fresh("only", Outcome::Won)]).is_err());
    }
}
