//! Persistence seams for agents and matches
//!
//! The traits here are the only storage surface the rest of the service
//! sees. The in-memory implementations back tests and single-process runs;
//! a database-backed pair would slot in behind the same traits.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::game::ReplayFrame;
use crate::types::{
    Agent, AgentId, BoardParams, MatchId, MatchPurpose, MatchStatus, ParticipantResult, TestStatus,
};

pub use memory::{InMemoryAgentStore, InMemoryMatchStore};

/// One seat of a match, fixed when the match is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSeat {
    pub agent_id: AgentId,
    pub slot: usize,
    pub name: String,
    /// Display rating of the seated agent at dispatch time
    pub rating_at_match: f64,
}

/// Full persisted record of a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub purpose: MatchPurpose,
    pub status: MatchStatus,
    pub params: BoardParams,
    pub seats: Vec<MatchSeat>,
    /// Empty until the match completes
    pub results: Vec<ParticipantResult>,
    pub rounds: Option<u32>,
    pub frames: Vec<ReplayFrame>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MatchRecord {
    /// A freshly queued match with its seats fixed.
    pub fn queued(id: MatchId, purpose: MatchPurpose, params: BoardParams, seats: Vec<MatchSeat>) -> Self {
        let now = Utc::now();
        Self {
            id,
            purpose,
            status: MatchStatus::Queued,
            params,
            seats,
            results: Vec::new(),
            rounds: None,
            frames: Vec::new(),
            failure_reason: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
        }
    }

    pub fn result_for(&self, agent_id: &str) -> Option<&ParticipantResult> {
        self.results.iter().find(|result| result.agent_id == agent_id)
    }

    pub fn opponent_result(&self, agent_id: &str) -> Option<&ParticipantResult> {
        self.results.iter().find(|result| result.agent_id != agent_id)
    }

    pub fn seat_for(&self, agent_id: &str) -> Option<&MatchSeat> {
        self.seats.iter().find(|seat| seat.agent_id == agent_id)
    }
}

/// Storage for agent rows
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert or replace an agent row.
    async fn put_agent(&self, agent: Agent) -> Result<()>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// Active ranked agents, best display rating first.
    async fn ranked_agents(&self) -> Result<Vec<Agent>>;

    /// Active agents awaiting placement: agents mid-placement first, then
    /// untested ones, discovery order within each group.
    async fn evaluation_candidates(&self, limit: usize) -> Result<Vec<Agent>>;

    async fn set_test_status(&self, agent_id: &str, status: TestStatus) -> Result<()>;
}

/// Storage for match records
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Create a match if no record with this id exists yet. Returns false
    /// when the id was already present (redelivered unit).
    async fn create_match(&self, record: MatchRecord) -> Result<bool>;

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>>;

    async fn set_in_progress(&self, match_id: MatchId) -> Result<()>;

    /// Persist the terminal state of a successful match.
    async fn complete_match(
        &self,
        match_id: MatchId,
        results: Vec<ParticipantResult>,
        rounds: u32,
        frames: Vec<ReplayFrame>,
    ) -> Result<()>;

    async fn fail_match(&self, match_id: MatchId, reason: String) -> Result<()>;

    /// Completed matches in completion order.
    async fn completed_matches(&self) -> Result<Vec<MatchRecord>>;

    /// Completed matches of one purpose featuring an agent, completion order.
    async fn completed_for_agent(
        &self,
        agent_id: &str,
        purpose: MatchPurpose,
    ) -> Result<Vec<MatchRecord>>;

    /// Whether the agent has a queued or in-progress match.
    async fn has_pending_for_agent(&self, agent_id: &str) -> Result<bool>;

    /// In-progress matches untouched since `cutoff`.
    async fn stale_in_progress(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchRecord>>;

    async fn delete_match(&self, match_id: MatchId) -> Result<bool>;
}
