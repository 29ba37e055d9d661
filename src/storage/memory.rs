//! In-memory storage implementations

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ArenaError, Result};
use crate::game::ReplayFrame;
use crate::storage::{AgentStore, MatchRecord, MatchStore};
use crate::types::{Agent, MatchId, MatchPurpose, MatchStatus, ParticipantResult, TestStatus};

/// Agent rows behind a read-write lock
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<String, Agent>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryAgentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn put_agent(&self, agent: Agent) -> Result<()> {
        let mut agents = self
            .agents
            .write()
            .map_err(|_| ArenaError::InternalError {
                message: "agent store lock poisoned".to_string(),
            })?;
        agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let agents = self
            .agents
            .read()
            .map_err(|_| ArenaError::InternalError {
                message: "agent store lock poisoned".to_string(),
            })?;
        Ok(agents.get(agent_id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let agents = self
            .agents
            .read()
            .map_err(|_| ArenaError::InternalError {
                message: "agent store lock poisoned".to_string(),
            })?;
        let mut all: Vec<Agent> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at));
        Ok(all)
    }

    async fn ranked_agents(&self) -> Result<Vec<Agent>> {
        let mut ranked: Vec<Agent> = self
            .list_agents()
            .await?
            .into_iter()
            .filter(|agent| agent.is_ranked_opponent())
            .collect();
        ranked.sort_by(|a, b| {
            b.skill
                .display_rating()
                .partial_cmp(&a.skill.display_rating())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranked)
    }

    async fn evaluation_candidates(&self, limit: usize) -> Result<Vec<Agent>> {
        let all = self.list_agents().await?;
        let mut candidates: Vec<Agent> = all
            .iter()
            .filter(|agent| agent.is_active && agent.test_status == TestStatus::Testing)
            .cloned()
            .collect();
        candidates.extend(
            all.iter()
                .filter(|agent| agent.is_active && agent.test_status == TestStatus::Untested)
                .cloned(),
        );
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn set_test_status(&self, agent_id: &str, status: TestStatus) -> Result<()> {
        let mut agents = self
            .agents
            .write()
            .map_err(|_| ArenaError::InternalError {
                message: "agent store lock poisoned".to_string(),
            })?;
        let agent = agents.get_mut(agent_id).ok_or_else(|| ArenaError::AgentNotFound {
            agent_id: agent_id.to_string(),
        })?;
        agent.test_status = status;
        Ok(())
    }
}

/// Match records plus an append-order completion log
pub struct InMemoryMatchStore {
    inner: RwLock<MatchStoreInner>,
}

#[derive(Default)]
struct MatchStoreInner {
    matches: HashMap<MatchId, MatchRecord>,
    /// Ids in completion order; the source of truth for replay order
    completed_order: Vec<MatchId>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MatchStoreInner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MatchStoreInner>> {
        self.inner.read().map_err(|_| {
            ArenaError::InternalError {
                message: "match store lock poisoned".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MatchStoreInner>> {
        self.inner.write().map_err(|_| {
            ArenaError::InternalError {
                message: "match store lock poisoned".to_string(),
            }
            .into()
        })
    }
}

impl Default for InMemoryMatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn create_match(&self, record: MatchRecord) -> Result<bool> {
        let mut inner = self.write()?;
        if inner.matches.contains_key(&record.id) {
            return Ok(false);
        }
        inner.matches.insert(record.id, record);
        Ok(true)
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>> {
        Ok(self.read()?.matches.get(&match_id).cloned())
    }

    async fn set_in_progress(&self, match_id: MatchId) -> Result<()> {
        let mut inner = self.write()?;
        let record = inner.matches.get_mut(&match_id).ok_or_else(|| {
            ArenaError::MatchNotFound {
                match_id: match_id.to_string(),
            }
        })?;
        record.status = MatchStatus::InProgress;
        record.started_at = Some(Utc::now());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_match(
        &self,
        match_id: MatchId,
        results: Vec<ParticipantResult>,
        rounds: u32,
        frames: Vec<ReplayFrame>,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let record = inner.matches.get_mut(&match_id).ok_or_else(|| {
            ArenaError::MatchNotFound {
                match_id: match_id.to_string(),
            }
        })?;
        let now = Utc::now();
        record.status = MatchStatus::Completed;
        record.results = results;
        record.rounds = Some(rounds);
        record.frames = frames;
        record.ended_at = Some(now);
        record.updated_at = now;
        inner.completed_order.push(match_id);
        Ok(())
    }

    async fn fail_match(&self, match_id: MatchId, reason: String) -> Result<()> {
        let mut inner = self.write()?;
        let record = inner.matches.get_mut(&match_id).ok_or_else(|| {
            ArenaError::MatchNotFound {
                match_id: match_id.to_string(),
            }
        })?;
        record.status = MatchStatus::Failed;
        record.failure_reason = Some(reason);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn completed_matches(&self) -> Result<Vec<MatchRecord>> {
        let inner = self.read()?;
        Ok(inner
            .completed_order
            .iter()
            .filter_map(|id| inner.matches.get(id).cloned())
            .collect())
    }

    async fn completed_for_agent(
        &self,
        agent_id: &str,
        purpose: MatchPurpose,
    ) -> Result<Vec<MatchRecord>> {
        Ok(self
            .completed_matches()
            .await?
            .into_iter()
            .filter(|record| {
                record.purpose == purpose && record.seat_for(agent_id).is_some()
            })
            .collect())
    }

    async fn has_pending_for_agent(&self, agent_id: &str) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.matches.values().any(|record| {
            matches!(record.status, MatchStatus::Queued | MatchStatus::InProgress)
                && record.seat_for(agent_id).is_some()
        }))
    }

    async fn stale_in_progress(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchRecord>> {
        let inner = self.read()?;
        Ok(inner
            .matches
            .values()
            .filter(|record| {
                record.status == MatchStatus::InProgress && record.updated_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn delete_match(&self, match_id: MatchId) -> Result<bool> {
        let mut inner = self.write()?;
        inner.completed_order.retain(|id| *id != match_id);
        Ok(inner.matches.remove(&match_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MatchSeat;
    use crate::types::{BoardParams, Outcome, ProviderKind, SkillEstimate};
    use crate::utils::generate_match_id;

    fn ranked(id: &str, mu: f64) -> Agent {
        let mut agent =
            Agent::discovered(id.to_string(), id.to_uppercase(), ProviderKind::Random);
        agent.is_active = true;
        agent.test_status = TestStatus::Ranked;
        agent.skill = SkillEstimate { mu, sigma: 1.0 };
        agent
    }

    fn seats(a: &str, b: &str) -> Vec<MatchSeat> {
        vec![
            MatchSeat {
                agent_id: a.to_string(),
                slot: 0,
                name: a.to_uppercase(),
                rating_at_match: 1500.0,
            },
            MatchSeat {
                agent_id: b.to_string(),
                slot: 1,
                name: b.to_uppercase(),
                rating_at_match: 1500.0,
            },
        ]
    }

    fn result(agent_id: &str, slot: usize, outcome: Outcome) -> ParticipantResult {
        ParticipantResult {
            agent_id: agent_id.to_string(),
            slot,
            outcome,
            score: 0,
            death_cause: None,
            death_round: None,
            rating_at_match: Some(1500.0),
        }
    }

    #[tokio::test]
    async fn test_ranked_agents_sorted_by_display_rating() {
        let store = InMemoryAgentStore::new();
        store.put_agent(ranked("low", 20.0)).await.unwrap();
        store.put_agent(ranked("high", 30.0)).await.unwrap();
        store
            .put_agent(Agent::discovered(
                "new".to_string(),
                "NEW".to_string(),
                ProviderKind::Random,
            ))
            .await
            .unwrap();

        let ranked = store.ranked_agents().await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "high");
        assert_eq!(ranked[1].id, "low");
    }

    #[tokio::test]
    async fn test_evaluation_candidates_testing_first() {
        let store = InMemoryAgentStore::new();
        let mut untested =
            Agent::discovered("fresh".to_string(), "FRESH".to_string(), ProviderKind::Random);
        untested.is_active = true;
        store.put_agent(untested).await.unwrap();

        let mut testing =
            Agent::discovered("midway".to_string(), "MIDWAY".to_string(), ProviderKind::Random);
        testing.is_active = true;
        testing.test_status = TestStatus::Testing;
        store.put_agent(testing).await.unwrap();

        let candidates = store.evaluation_candidates(10).await.unwrap();
        assert_eq!(candidates[0].id, "midway");
        assert_eq!(candidates[1].id, "fresh");

        let limited = store.evaluation_candidates(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "midway");
    }

    #[tokio::test]
    async fn test_create_match_is_idempotent() {
        let store = InMemoryMatchStore::new();
        let id = generate_match_id();
        let record = MatchRecord::queued(
            id,
            MatchPurpose::Ladder,
            BoardParams::default(),
            seats("a", "b"),
        );

        assert!(store.create_match(record.clone()).await.unwrap());
        assert!(!store.create_match(record).await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_order_preserved() {
        let store = InMemoryMatchStore::new();
        let first = generate_match_id();
        let second = generate_match_id();
        for id in [first, second] {
            store
                .create_match(MatchRecord::queued(
                    id,
                    MatchPurpose::Ladder,
                    BoardParams::default(),
                    seats("a", "b"),
                ))
                .await
                .unwrap();
        }

        // Complete in reverse creation order
        store
            .complete_match(
                second,
                vec![result("a", 0, Outcome::Won), result("b", 1, Outcome::Lost)],
                5,
                vec![],
            )
            .await
            .unwrap();
        store
            .complete_match(
                first,
                vec![result("a", 0, Outcome::Lost), result("b", 1, Outcome::Won)],
                7,
                vec![],
            )
            .await
            .unwrap();

        let completed = store.completed_matches().await.unwrap();
        assert_eq!(completed[0].id, second);
        assert_eq!(completed[1].id, first);
    }

    #[tokio::test]
    async fn test_pending_detection_and_stale_sweep() {
        let store = InMemoryMatchStore::new();
        let id = generate_match_id();
        store
            .create_match(MatchRecord::queued(
                id,
                MatchPurpose::Evaluation,
                BoardParams::default(),
                seats("a", "b"),
            ))
            .await
            .unwrap();

        assert!(store.has_pending_for_agent("a").await.unwrap());
        assert!(!store.has_pending_for_agent("c").await.unwrap());

        store.set_in_progress(id).await.unwrap();
        // Anything touched before a future cutoff counts as stale
        let stale = store
            .stale_in_progress(Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);

        assert!(store.delete_match(id).await.unwrap());
        assert!(!store.has_pending_for_agent("a").await.unwrap());
    }
}
