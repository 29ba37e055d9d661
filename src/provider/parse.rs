//! Move response parsing
//!
//! Providers may reply with reasoning before the move, so the parser takes
//! the LAST direction keyword in the text. Matching is case-insensitive.

use crate::error::{ArenaError, Result};
use crate::types::Direction;

/// Extract the intended direction from a provider reply.
pub fn parse_direction(text: &str) -> Result<Direction> {
    let upper = text.to_uppercase();

    let mut best: Option<(usize, Direction)> = None;
    for direction in Direction::ALL {
        if let Some(position) = upper.rfind(direction.as_str()) {
            if best.map_or(true, |(at, _)| position > at) {
                best = Some((position, direction));
            }
        }
    }

    best.map(|(_, direction)| direction).ok_or_else(|| {
        ArenaError::InvalidMoveResponse {
            response: truncate(text, 200),
        }
        .into()
    })
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
