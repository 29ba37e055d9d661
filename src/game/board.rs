//! Immutable board snapshots
//!
//! A `BoardSnapshot` is the single frozen view of the game handed to every
//! move provider in a round, and the unit stored per frame in the replay
//! trace. Coordinates put (0,0) at the bottom-left; Up is y + 1.

use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// A board cell as (x, y)
pub type Cell = (i32, i32);

/// A snapshot of the game at a specific point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Round this snapshot was taken at (0-based)
    pub round: u32,
    pub width: u32,
    pub height: u32,
    /// Per-slot body cells, head first
    pub bodies: Vec<Vec<Cell>>,
    /// Per-slot alive flags
    pub alive: Vec<bool>,
    /// Per-slot scores
    pub scores: Vec<u32>,
    /// All apples currently on the board
    pub apples: Vec<Cell>,
}

impl BoardSnapshot {
    pub fn in_bounds(&self, cell: Cell) -> bool {
        let (x, y) = cell;
        x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32
    }

    /// Head cell of a slot, if it has a body.
    pub fn head(&self, slot: usize) -> Option<Cell> {
        self.bodies.get(slot).and_then(|body| body.first().copied())
    }

    /// Where a slot's head would land after moving in `direction`.
    pub fn candidate_head(&self, slot: usize, direction: Direction) -> Option<Cell> {
        let (hx, hy) = self.head(slot)?;
        let (dx, dy) = direction.delta();
        Some((hx + dx, hy + dy))
    }

    /// Legal-looking directions for a slot: stay in bounds and avoid the
    /// slot's own body except the tail (which moves away this round).
    pub fn legal_directions(&self, slot: usize) -> Vec<Direction> {
        let body = match self.bodies.get(slot) {
            Some(body) if !body.is_empty() => body,
            _ => return Vec::new(),
        };
        let blocked: Vec<Cell> = body[..body.len().saturating_sub(1)].to_vec();

        Direction::ALL
            .into_iter()
            .filter(|direction| {
                let candidate = match self.candidate_head(slot, *direction) {
                    Some(cell) => cell,
                    None => return false,
                };
                self.in_bounds(candidate) && !blocked.contains(&candidate)
            })
            .collect()
    }

    /// ASCII rendering: `.` empty, `A` apple, slot digit for a head, `T` for
    /// body segments, rows printed top to bottom with (0,0) at bottom-left.
    pub fn render(&self) -> String {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut grid = vec![vec!['.'; width]; height];

        for &(x, y) in &self.apples {
            if self.in_bounds((x, y)) {
                grid[y as usize][x as usize] = 'A';
            }
        }

        for (slot, body) in self.bodies.iter().enumerate() {
            if !self.alive.get(slot).copied().unwrap_or(false) {
                continue;
            }
            for (segment, &(x, y)) in body.iter().enumerate() {
                if !self.in_bounds((x, y)) {
                    continue;
                }
                grid[y as usize][x as usize] = if segment == 0 {
                    char::from_digit(slot as u32 % 10, 10).unwrap_or('?')
                } else {
                    'T'
                };
            }
        }

        let mut lines = Vec::with_capacity(height + 1);
        for y in (0..height).rev() {
            let row: Vec<String> = grid[y].iter().map(|c| c.to_string()).collect();
            lines.push(format!("{:2} {}", y, row.join(" ")));
        }
        let labels: Vec<String> = (0..width).map(|x| x.to_string()).collect();
        lines.push(format!("   {}", labels.join(" ")));
        lines.join("\n")
    }
}
