//! Move providers
//!
//! A `MoveProvider` turns a board snapshot into a move for one slot. The
//! built-in providers are deterministic test agents; real model-backed
//! providers implement the same trait behind the `ProviderKind` factory.

pub mod builtin;
pub mod parse;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::game::BoardSnapshot;
use crate::types::ProviderKind;

pub use builtin::{FixedProvider, RandomProvider, ScriptedProvider};
pub use parse::parse_direction;

/// Raw reply from a provider before parsing
#[derive(Debug, Clone)]
pub struct ProviderReply {
    /// Free text ending in a direction keyword
    pub text: String,
    /// Cost attributed to producing this reply
    pub cost: f64,
}

impl ProviderReply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cost: 0.0,
        }
    }
}

/// Trait for turning board state into moves
#[async_trait]
pub trait MoveProvider: Send + Sync {
    /// Produce a move for `slot` given the current board.
    ///
    /// Errors are treated as transient by the simulator: the round proceeds
    /// with a random legal move for this slot.
    async fn get_move(&self, board: &BoardSnapshot, slot: usize) -> Result<ProviderReply>;
}

/// Build the provider backing one seat. `seed` feeds the random provider;
/// deterministic providers ignore it.
pub fn create_provider(kind: &ProviderKind, seed: u64) -> Arc<dyn MoveProvider> {
    match kind {
        ProviderKind::Random => Arc::new(RandomProvider::new(seed)),
        ProviderKind::Fixed { direction } => Arc::new(FixedProvider::new(*direction)),
        ProviderKind::Scripted { moves } => Arc::new(ScriptedProvider::new(moves.clone())),
    }
}
