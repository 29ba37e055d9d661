//! Job queue contract and in-memory implementation
//!
//! At-least-once semantics: a dequeued unit stays pending until acked, and
//! `recover` requeues units whose worker went quiet. Enqueueing a unit id
//! that is already live is suppressed, so callers can resubmit blindly.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{ArenaError, Result};
use crate::types::{AgentConfig, BoardParams, MatchId, MatchPurpose};

/// One seat of a unit: who plays and their rating at dispatch time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSeat {
    pub config: AgentConfig,
    pub rating_at_match: f64,
}

/// One match to be executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchUnit {
    /// Idempotency key; also fixes the match seed
    pub unit_id: String,
    pub match_id: MatchId,
    pub purpose: MatchPurpose,
    pub params: BoardParams,
    pub seats: Vec<UnitSeat>,
}

/// Work queue seam between submitters and the worker pool
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue a unit. Returns false when a unit with this id is already
    /// queued, running, or pending ack.
    async fn enqueue(&self, unit: MatchUnit) -> Result<bool>;

    /// Wait for the next unit. `None` means the queue shut down.
    async fn dequeue(&self) -> Result<Option<MatchUnit>>;

    /// Mark a unit done. Only acked units leave the queue for good.
    async fn ack(&self, unit_id: &str) -> Result<()>;

    /// Requeue units that were dequeued longer than `older_than` ago and
    /// never acked. Returns how many were requeued.
    async fn recover(&self, older_than: Duration) -> Result<usize>;
}

/// Single-process queue on an unbounded channel
pub struct InMemoryJobQueue {
    sender: mpsc::UnboundedSender<MatchUnit>,
    receiver: Mutex<mpsc::UnboundedReceiver<MatchUnit>>,
    /// Ids enqueued and not yet acked
    live: StdMutex<HashSet<String>>,
    /// Dequeued-but-unacked units with their dequeue time
    pending: StdMutex<HashMap<String, (MatchUnit, Instant)>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            live: StdMutex::new(HashSet::new()),
            pending: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_err() -> anyhow::Error {
        ArenaError::InternalError {
            message: "job queue lock poisoned".to_string(),
        }
        .into()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, unit: MatchUnit) -> Result<bool> {
        {
            let mut live = self.live.lock().map_err(|_| Self::lock_err())?;
            if !live.insert(unit.unit_id.clone()) {
                debug!(unit_id = %unit.unit_id, "duplicate unit suppressed");
                return Ok(false);
            }
        }
        self.sender.send(unit).map_err(|_| ArenaError::InternalError {
            message: "job queue channel closed".to_string(),
        })?;
        Ok(true)
    }

    async fn dequeue(&self) -> Result<Option<MatchUnit>> {
        let unit = {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };
        if let Some(unit) = &unit {
            let mut pending = self.pending.lock().map_err(|_| Self::lock_err())?;
            pending.insert(unit.unit_id.clone(), (unit.clone(), Instant::now()));
        }
        Ok(unit)
    }

    async fn ack(&self, unit_id: &str) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| Self::lock_err())?
            .remove(unit_id);
        self.live
            .lock()
            .map_err(|_| Self::lock_err())?
            .remove(unit_id);
        Ok(())
    }

    async fn recover(&self, older_than: Duration) -> Result<usize> {
        let expired: Vec<MatchUnit> = {
            let mut pending = self.pending.lock().map_err(|_| Self::lock_err())?;
            let cutoff = Instant::now();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, (_, taken))| cutoff.duration_since(*taken) >= older_than)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|(unit, _)| unit))
                .collect()
        };

        let count = expired.len();
        for unit in expired {
            debug!(unit_id = %unit.unit_id, "requeueing unacked unit");
            self.sender.send(unit).map_err(|_| ArenaError::InternalError {
                message: "job queue channel closed".to_string(),
            })?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use crate::utils::generate_match_id;

    fn unit(id: &str) -> MatchUnit {
        MatchUnit {
            unit_id: id.to_string(),
            match_id: generate_match_id(),
            purpose: MatchPurpose::Ladder,
            params: BoardParams::default(),
            seats: vec![
                UnitSeat {
                    config: AgentConfig {
                        agent_id: "a".to_string(),
                        name: "A".to_string(),
                        provider: ProviderKind::Random,
                    },
                    rating_at_match: 1500.0,
                },
                UnitSeat {
                    config: AgentConfig {
                        agent_id: "b".to_string(),
                        name: "B".to_string(),
                        provider: ProviderKind::Random,
                    },
                    rating_at_match: 1500.0,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(unit("u1")).await.unwrap();
        queue.enqueue(unit("u2")).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().unwrap().unit_id, "u1");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().unit_id, "u2");
    }

    #[tokio::test]
    async fn test_duplicate_unit_suppressed_until_ack() {
        let queue = InMemoryJobQueue::new();
        assert!(queue.enqueue(unit("u1")).await.unwrap());
        assert!(!queue.enqueue(unit("u1")).await.unwrap());

        queue.dequeue().await.unwrap().unwrap();
        // Still live while unacked
        assert!(!queue.enqueue(unit("u1")).await.unwrap());

        queue.ack("u1").await.unwrap();
        assert!(queue.enqueue(unit("u1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_recover_requeues_unacked_units() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(unit("u1")).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        // Nothing young enough to recover yet
        assert_eq!(queue.recover(Duration::from_secs(60)).await.unwrap(), 0);
        // Everything counts as expired at zero age
        assert_eq!(queue.recover(Duration::ZERO).await.unwrap(), 1);

        let redelivered = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(redelivered.unit_id, "u1");
    }

    #[tokio::test]
    async fn test_acked_units_are_not_recovered() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(unit("u1")).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.ack("u1").await.unwrap();

        assert_eq!(queue.recover(Duration::ZERO).await.unwrap(), 0);
    }
}
