//! Match execution workers
//!
//! Workers pull units off the queue, run the simulation, and persist the
//! outcome: the completed result first, then rating updates and aggregate
//! counters keyed off that durable log entry, then the ack. Transient
//! failures retry with backoff and jitter; exhausted units mark the match
//! failed and are acked so they stop circulating.
//!
//! Rating writes for the two seated agents are serialized through per-agent
//! locks taken in sorted order, so concurrent matches sharing an agent
//! cannot interleave read-modify-write cycles or deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::dispatch::queue::{JobQueue, MatchUnit};
use crate::error::{ArenaError, Result};
use crate::game::MatchSimulator;
use crate::provider::create_provider;
use crate::rating::RatingEngine;
use crate::storage::{AgentStore, MatchRecord, MatchSeat, MatchStore};
use crate::types::{AgentId, MatchStatus, Outcome, ParticipantResult, SkillEstimate};
use crate::utils::backoff_with_jitter;

/// Callback fired after a match has been fully persisted
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_match_completed(&self, record: &MatchRecord) -> Result<()>;
}

pub struct MatchDispatcher {
    queue: Arc<dyn JobQueue>,
    agents: Arc<dyn AgentStore>,
    matches: Arc<dyn MatchStore>,
    rating: RatingEngine,
    config: AppConfig,
    agent_locks: Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
    hooks: RwLock<Vec<Arc<dyn CompletionHook>>>,
}

impl MatchDispatcher {
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
            agent_locks: Mutex::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_completion_hook(&self, hook: Arc<dyn CompletionHook>) {
        self.hooks.write().await.push(hook);
    }

    /// Submit a unit: create its match record if this is the first delivery
    /// and put it on the queue. Safe to call repeatedly with the same unit.
    pub async fn submit(&self, unit: MatchUnit) -> Result<bool> {
        let seats: Vec<MatchSeat> = unit
            .seats
            .iter()
            .enumerate()
            .map(|(slot, seat)| MatchSeat {
                agent_id: seat.config.agent_id.clone(),
                slot,
                name: seat.config.name.clone(),
                rating_at_match: seat.rating_at_match,
            })
            .collect();
        let record = MatchRecord::queued(unit.match_id, unit.purpose, unit.params, seats);
        let created = self.matches.create_match(record).await?;
        if created {
            debug!(match_id = %unit.match_id, unit_id = %unit.unit_id, "match record created");
        }
        self.queue.enqueue(unit).await
    }

    /// Start the worker pool. Workers exit when the queue shuts down.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.dispatch.workers)
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                tokio::spawn(async move {
                    debug!(worker, "match worker started");
                    dispatcher.work_loop().await;
                    debug!(worker, "match worker stopped");
                })
            })
            .collect()
    }

    async fn work_loop(&self) {
        loop {
            let unit = match self.queue.dequeue().await {
                Ok(Some(unit)) => unit,
                Ok(None) => break,
                Err(error) => {
                    error!(%error, "dequeue failed");
                    break;
                }
            };
            self.run_unit(unit).await;
        }
    }

    /// Execute one unit with bounded retries, acking in every terminal path.
    pub async fn run_unit(&self, unit: MatchUnit) {
        let max_attempts = self.config.dispatch.max_retry_attempts;
        let mut attempt = 0;
        loop {
            match self.process_unit(&unit).await {
                Ok(()) => break,
                Err(error) => {
                    let transient = error
                        .downcast_ref::<ArenaError>()
                        .map(ArenaError::is_transient)
                        .unwrap_or(false);
                    if transient && attempt < max_attempts {
                        let delay = backoff_with_jitter(self.config.retry_delay(), attempt);
                        warn!(
                            unit_id = %unit.unit_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "transient failure, retrying unit"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    error!(unit_id = %unit.unit_id, attempt, %error, "unit failed permanently");
                    // A result that already landed stays a result; only the
                    // rating fold was lost, and the sweep rebuilds that from
                    // the log
                    let completed = matches!(
                        self.matches.get_match(unit.match_id).await,
                        Ok(Some(record)) if record.status == MatchStatus::Completed
                    );
                    if completed {
                        warn!(match_id = %unit.match_id, "result already persisted, keeping it");
                    } else if let Err(fail_error) = self
                        .matches
                        .fail_match(unit.match_id, error.to_string())
                        .await
                    {
                        error!(match_id = %unit.match_id, %fail_error, "could not mark match failed");
                    }
                    break;
                }
            }
        }
        if let Err(error) = self.queue.ack(&unit.unit_id).await {
            error!(unit_id = %unit.unit_id, %error, "ack failed");
        }
    }

    async fn process_unit(&self, unit: &MatchUnit) -> Result<()> {
        let record = self
            .matches
            .get_match(unit.match_id)
            .await?
            .ok_or_else(|| ArenaError::MatchNotFound {
                match_id: unit.match_id.to_string(),
            })?;
        if record.status == MatchStatus::Completed {
            // Redelivery of finished work
            debug!(unit_id = %unit.unit_id, "unit already completed, dropping redelivery");
            return Ok(());
        }

        // Every seat must resolve to a known agent before any work starts
        for seat in &unit.seats {
            self.agents
                .get_agent(&seat.config.agent_id)
                .await?
                .ok_or_else(|| ArenaError::AgentNotFound {
                    agent_id: seat.config.agent_id.clone(),
                })?;
        }

        self.matches.set_in_progress(unit.match_id).await?;

        let providers = unit
            .seats
            .iter()
            .enumerate()
            .map(|(slot, seat)| {
                create_provider(
                    &seat.config.provider,
                    unit.params.seed.wrapping_add(slot as u64 + 1),
                )
            })
            .collect();
        let simulator = MatchSimulator::new(unit.params, providers, self.config.move_timeout())?;
        let report = simulator.run().await?;

        let results: Vec<ParticipantResult> = report
            .results
            .iter()
            .map(|participant| {
                let seat = &unit.seats[participant.slot];
                ParticipantResult {
                    agent_id: seat.config.agent_id.clone(),
                    slot: participant.slot,
                    outcome: participant.outcome,
                    score: participant.score,
                    death_cause: participant.death_cause,
                    death_round: participant.death_round,
                    rating_at_match: Some(seat.rating_at_match),
                }
            })
            .collect();

        // Serialize writes for the seated agents before any state changes
        let _guards = self.lock_agents(&results).await;

        // The completed result is persisted first. The rating fold below
        // mirrors one durable log entry; redelivery after a crash in between
        // hits the completed-status guard above, and the sweep reconciles
        // any cached row the fold never reached.
        self.matches
            .complete_match(unit.match_id, results.clone(), report.rounds, report.frames)
            .await?;
        self.apply_ratings(&results).await?;

        info!(
            match_id = %unit.match_id,
            purpose = ?unit.purpose,
            rounds = report.rounds,
            "match completed"
        );

        if let Some(record) = self.matches.get_match(unit.match_id).await? {
            let hooks = self.hooks.read().await.clone();
            for hook in hooks {
                if let Err(error) = hook.on_match_completed(&record).await {
                    warn!(match_id = %unit.match_id, %error, "completion hook failed");
                }
            }
        }
        Ok(())
    }

    /// Take the per-agent locks in sorted id order.
    async fn lock_agents(&self, results: &[ParticipantResult]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids: Vec<AgentId> = results.iter().map(|r| r.agent_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let locks: Vec<Arc<Mutex<()>>> = {
            let mut registry = self.agent_locks.lock().await;
            ids.iter()
                .map(|id| Arc::clone(registry.entry(id.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Fold the match into each agent's skill and counters.
    async fn apply_ratings(&self, results: &[ParticipantResult]) -> Result<()> {
        let mut participants: Vec<(AgentId, SkillEstimate, Outcome)> = Vec::new();
        for result in results {
            let agent = self
                .agents
                .get_agent(&result.agent_id)
                .await?
                .ok_or_else(|| ArenaError::AgentNotFound {
                    agent_id: result.agent_id.clone(),
                })?;
            participants.push((agent.id, agent.skill, result.outcome));
        }

        let updates = self.rating.rate(&participants)?;
        for (update, result) in updates.iter().zip(results.iter()) {
            let mut agent = self
                .agents
                .get_agent(&update.agent_id)
                .await?
                .ok_or_else(|| ArenaError::AgentNotFound {
                    agent_id: update.agent_id.clone(),
                })?;
            agent.skill = update.new;
            agent.counters.apply(result.outcome, result.score);
            debug!(
                agent_id = %agent.id,
                mu = agent.skill.mu,
                sigma = agent.skill.sigma,
                display = agent.skill.display_rating(),
                "rating updated"
            );
            self.agents.put_agent(agent).await?;
        }
        Ok(())
    }
}
