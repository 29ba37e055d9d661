//! Stale match cleanup
//!
//! A match stuck in progress past the inactivity threshold is presumed
//! orphaned by a dead worker: its record is deleted so the agent can be
//! scheduled again, and any unacked queue units past the threshold are
//! requeued. The sweep also audits cached agent state against the match
//! log and repairs rows that drifted.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::dispatch::queue::JobQueue;
use crate::error::{ArenaError, Result};
use crate::rating::{replay_ratings, verify_consistency, CompletedEntry, RatingEngine};
use crate::storage::{AgentStore, MatchStore};
use crate::utils::current_timestamp;

pub struct StaleSweeper {
    queue: Arc<dyn JobQueue>,
    agents: Arc<dyn AgentStore>,
    matches: Arc<dyn MatchStore>,
    rating: RatingEngine,
    config: AppConfig,
}

/// What one sweep did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub stale_deleted: usize,
    pub units_recovered: usize,
    pub agents_repaired: usize,
}

impl StaleSweeper {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        agents: Arc<dyn AgentStore>,
        matches: Arc<dyn MatchStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            queue,
            agents,
            matches,
            rating: RatingEngine::new(),
            config,
        }
    }

    pub async fn run_once(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        let cutoff = current_timestamp()
            - ChronoDuration::minutes(self.config.dispatch.stale_after_minutes);
        for record in self.matches.stale_in_progress(cutoff).await? {
            let stale = ArenaError::StaleMatch {
                match_id: record.id.to_string(),
            };
            warn!(
                %stale,
                updated_at = %record.updated_at,
                "deleting stale in-progress match"
            );
            if self.matches.delete_match(record.id).await? {
                stats.stale_deleted += 1;
            }
        }

        let stale_after = std::time::Duration::from_secs(
            self.config.dispatch.stale_after_minutes.max(0) as u64 * 60,
        );
        stats.units_recovered = self.queue.recover(stale_after).await?;

        stats.agents_repaired = self.repair_divergent_agents().await?;

        if stats != SweepStats::default() {
            info!(
                stale_deleted = stats.stale_deleted,
                units_recovered = stats.units_recovered,
                agents_repaired = stats.agents_repaired,
                "sweep finished"
            );
        }
        Ok(stats)
    }

    /// Re-fold the completed log and overwrite any cached agent skill or
    /// counters that no longer match it.
    async fn repair_divergent_agents(&self) -> Result<usize> {
        let entries: Vec<CompletedEntry> = self
            .matches
            .completed_matches()
            .await?
            .into_iter()
            .filter_map(|record| {
                let ended_at = record.ended_at?;
                Some(CompletedEntry {
                    match_id: record.id.to_string(),
                    ended_at,
                    participants: record
                        .results
                        .iter()
                        .map(|result| (result.agent_id.clone(), result.outcome, result.score))
                        .collect(),
                })
            })
            .collect();

        let state = replay_ratings(&self.rating, &entries)?;
        let agents = self.agents.list_agents().await?;
        let discrepancies = verify_consistency(&state, &agents);

        let mut repaired = 0;
        for agent in agents {
            if !discrepancies.iter().any(|d| d.agent_id == agent.id) {
                continue;
            }
            let mut fixed = agent;
            fixed.skill = state.ratings.get(&fixed.id).copied().unwrap_or_default();
            fixed.counters = state.counters.get(&fixed.id).copied().unwrap_or_default();
            warn!(agent_id = %fixed.id, "repaired agent row from match log");
            self.agents.put_agent(fixed).await?;
            repaired += 1;
        }
        Ok(repaired)
    }
}
