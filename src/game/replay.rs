//! Replay trace types
//!
//! Every completed match carries a frame-by-frame trace: frame 0 is the
//! pre-move board, then one frame per simulated round with the moves that
//! produced it and any deaths resolved that round.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::board::BoardSnapshot;
use crate::types::{DeathCause, Direction};

/// One agent's move in a round, as recorded in the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedMove {
    pub direction: Direction,
    /// Free-text explanation returned by the provider, if any
    pub rationale: Option<String>,
    /// Cost attributed to producing this move
    pub cost: f64,
    /// True when the provider timed out or replied unparseably and a random
    /// legal move was substituted
    pub fallback: bool,
}

/// A death resolved during a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub slot: usize,
    pub cause: DeathCause,
    /// Round the death occurred (0-based)
    pub round: u32,
}

/// One frame of the replay trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub round: u32,
    /// Board state after this round's moves were committed
    pub board: BoardSnapshot,
    /// Moves submitted this round, keyed by slot; empty for frame 0
    pub moves: BTreeMap<usize, RecordedMove>,
    /// Deaths resolved this round
    pub deaths: Vec<DeathEvent>,
}

impl ReplayFrame {
    /// The initial frame: the pre-move board with no moves or deaths.
    pub fn initial(board: BoardSnapshot) -> Self {
        Self {
            round: 0,
            board,
            moves: BTreeMap::new(),
            deaths: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_frame_is_empty() {
        let board = BoardSnapshot {
            round: 0,
            width: 3,
            height: 3,
            bodies: vec![vec![(0, 0)]],
            alive: vec![true],
            scores: vec![0],
            apples: vec![],
        };
        let frame = ReplayFrame::initial(board);
        assert_eq!(frame.round, 0);
        assert!(frame.moves.is_empty());
        assert!(frame.deaths.is_empty());
    }

    #[test]
    fn test_frame_serialization_round_trip() {
        let board = BoardSnapshot {
            round: 1,
            width: 3,
            height: 3,
            bodies: vec![vec![(1, 0)]],
            alive: vec![true],
            scores: vec![1],
            apples: vec![(2, 2)],
        };
        let mut moves = BTreeMap::new();
        moves.insert(
            0,
            RecordedMove {
                direction: Direction::Right,
                rationale: Some("chasing the apple".to_string()),
                cost: 0.002,
                fallback: false,
            },
        );
        let frame = ReplayFrame {
            round: 1,
            board,
            moves,
            deaths: vec![],
        };

        let json = serde_json::to_string(&frame).unwrap();
        let parsed: ReplayFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, frame);
    }
}
