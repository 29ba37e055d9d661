//! Built-in deterministic providers
//!
//! These back synthetic agents used for calibration matches, smoke tests,
//! and the match-runner binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ArenaError, Result};
use crate::game::BoardSnapshot;
use crate::provider::{MoveProvider, ProviderReply};
use crate::types::Direction;

/// Picks a uniformly random legal-looking move each round. Carries its own
/// seeded RNG so a match trace stays a function of the match seed.
pub struct RandomProvider {
    rng: Mutex<StdRng>,
}

impl RandomProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl MoveProvider for RandomProvider {
    async fn get_move(&self, board: &BoardSnapshot, slot: usize) -> Result<ProviderReply> {
        let mut rng = self.rng.lock().map_err(|_| ArenaError::InternalError {
            message: "random provider rng lock poisoned".to_string(),
        })?;
        let legal = board.legal_directions(slot);
        let choice = legal
            .choose(&mut *rng)
            .copied()
            // Boxed in: any move loses, pick one and let the simulator resolve it
            .unwrap_or(Direction::Up);
        Ok(ProviderReply::plain(choice.as_str()))
    }
}

/// Always answers with the same direction
pub struct FixedProvider {
    direction: Direction,
}

impl FixedProvider {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }
}

#[async_trait]
impl MoveProvider for FixedProvider {
    async fn get_move(&self, _board: &BoardSnapshot, _slot: usize) -> Result<ProviderReply> {
        Ok(ProviderReply::plain(self.direction.as_str()))
    }
}

/// Replays a fixed sequence of directions, repeating the last one when the
/// script runs out
pub struct ScriptedProvider {
    moves: Vec<Direction>,
    cursor: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(moves: Vec<Direction>) -> Self {
        Self {
            moves,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MoveProvider for ScriptedProvider {
    async fn get_move(&self, _board: &BoardSnapshot, _slot: usize) -> Result<ProviderReply> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        let choice = self
            .moves
            .get(index)
            .or_else(|| self.moves.last())
            .copied()
            .unwrap_or(Direction::Up);
        Ok(ProviderReply::plain(choice.as_str()))
    }
}
