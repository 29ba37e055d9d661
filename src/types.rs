//! Common types used throughout the arena service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillratings::trueskill::TrueSkillRating;
use uuid::Uuid;

/// Unique identifier for agents
pub type AgentId = String;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Default mean of a new agent's skill belief
pub const DEFAULT_MU: f64 = 25.0;

/// Default uncertainty of a new agent's skill belief
pub const DEFAULT_SIGMA: f64 = DEFAULT_MU / 3.0;

/// Scales conservative skill into the legacy-compatible display rating
pub const DISPLAY_MULTIPLIER: f64 = 50.0;

/// Evaluation lifecycle of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Untested,
    Testing,
    Ranked,
    Retired,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Untested => write!(f, "untested"),
            TestStatus::Testing => write!(f, "testing"),
            TestStatus::Ranked => write!(f, "ranked"),
            TestStatus::Retired => write!(f, "retired"),
        }
    }
}

/// Lifecycle of a match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// Why a match was played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPurpose {
    /// Regular ladder play between ranked agents
    Ladder,
    /// Placement match for an onboarding agent
    Evaluation,
}

/// Terminal result for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Won,
    Lost,
    Tied,
}

impl Outcome {
    /// Rating rank for this outcome (0 is best; wins beat ties beat losses).
    pub fn rank(&self) -> usize {
        match self {
            Outcome::Won => 0,
            Outcome::Tied => 1,
            Outcome::Lost => 2,
        }
    }
}

/// How a participant died, when it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// Candidate head left the board
    Wall,
    /// Two or more candidate heads landed on the same cell
    HeadCollision,
    /// Candidate head landed on a proposed body segment
    BodyCollision,
}

/// A simultaneous move on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Coordinate delta with (0,0) at the bottom-left, so Up is y + 1.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gaussian skill belief for an agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillEstimate {
    pub mu: f64,
    pub sigma: f64,
}

impl Default for SkillEstimate {
    fn default() -> Self {
        Self {
            mu: DEFAULT_MU,
            sigma: DEFAULT_SIGMA,
        }
    }
}

impl SkillEstimate {
    /// Conservative skill: the public, uncertainty-penalized rank key.
    pub fn conservative(&self) -> f64 {
        self.mu - 3.0 * self.sigma
    }

    /// Legacy-compatible display rating derived from conservative skill.
    pub fn display_rating(&self) -> f64 {
        self.conservative() * DISPLAY_MULTIPLIER
    }
}

impl From<TrueSkillRating> for SkillEstimate {
    fn from(rating: TrueSkillRating) -> Self {
        Self {
            mu: rating.rating,
            sigma: rating.uncertainty,
        }
    }
}

impl From<SkillEstimate> for TrueSkillRating {
    fn from(estimate: SkillEstimate) -> Self {
        Self {
            rating: estimate.mu,
            uncertainty: estimate.sigma,
        }
    }
}

/// Which move provider backs an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    /// Picks a random legal-looking move each round
    Random,
    /// Always answers with the same direction
    Fixed { direction: Direction },
    /// Replays a fixed sequence of directions, then repeats the last one
    Scripted { moves: Vec<Direction> },
}

/// Everything the dispatch layer needs to field one participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: AgentId,
    pub name: String,
    pub provider: ProviderKind,
}

/// Aggregate counters cached per agent; always recomputable from the match log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounters {
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
    pub score_sum: u64,
    pub games_played: u64,
}

impl AggregateCounters {
    /// Fold one participant outcome into the counters.
    pub fn apply(&mut self, outcome: Outcome, score: u32) {
        match outcome {
            Outcome::Won => self.wins += 1,
            Outcome::Lost => self.losses += 1,
            Outcome::Tied => self.ties += 1,
        }
        self.score_sum += score as u64;
        self.games_played += 1;
    }
}

/// An evaluated AI player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub provider: ProviderKind,
    pub skill: SkillEstimate,
    pub counters: AggregateCounters,
    pub test_status: TestStatus,
    pub is_active: bool,
    pub discovered_at: DateTime<Utc>,
}

impl Agent {
    /// Create an agent as discovered: inactive and untested.
    pub fn discovered(id: AgentId, name: String, provider: ProviderKind) -> Self {
        Self {
            id,
            name,
            provider,
            skill: SkillEstimate::default(),
            counters: AggregateCounters::default(),
            test_status: TestStatus::Untested,
            is_active: false,
            discovered_at: Utc::now(),
        }
    }

    /// Whether this agent can be selected as a placement opponent.
    pub fn is_ranked_opponent(&self) -> bool {
        self.is_active && self.test_status == TestStatus::Ranked
    }

    pub fn config(&self) -> AgentConfig {
        AgentConfig {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// Terminal result for one participant of a completed match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub agent_id: AgentId,
    pub slot: usize,
    pub outcome: Outcome,
    pub score: u32,
    pub death_cause: Option<DeathCause>,
    pub death_round: Option<u32>,
    /// Display rating of this participant when the match was dispatched.
    /// Lets placement rebuilds stay stable as the leaderboard moves.
    pub rating_at_match: Option<f64>,
}

/// Board parameters for one match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardParams {
    pub width: u32,
    pub height: u32,
    pub apple_count: u32,
    pub max_rounds: u32,
    /// First score to reach this target ends the match
    pub apple_target: u32,
    /// Seed for apple spawns and fallback moves; fixes the full trace
    pub seed: u64,
}

impl Default for BoardParams {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            apple_count: 5,
            max_rounds: 100,
            apple_target: 10,
            seed: 0,
        }
    }
}
