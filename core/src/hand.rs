// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moves and the outcome relation between them

use crate::ParseMoveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One discrete choice in a round, or the unset sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    /// No move chosen yet in the current round
    #[default]
    Unset,
    /// Beats scissors
    Rock,
    /// Beats rock
    Paper,
    /// Beats paper
    Scissors,
}

impl Move {
    /// The three playable moves, in display order
    pub const PLAYABLE: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Whether a move has been chosen
    pub fn is_set(&self) -> bool {
        *self != Move::Unset
    }

    /// Returns true if `self` wins against `other`
    ///
    /// Equal moves and anything involving `Unset` never win.
    pub fn beats(&self, other: Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors) | (Move::Paper, Move::Rock) | (Move::Scissors, Move::Paper)
        )
    }

    /// Draw-aware outcome of `self` against `other`
    ///
    /// Returns `None` while either side is unset.
    pub fn against(&self, other: Move) -> Option<Outcome> {
        if !self.is_set() || !other.is_set() {
            return None;
        }

        if self.beats(other) {
            Some(Outcome::Win)
        } else if other.beats(*self) {
            Some(Outcome::Lose)
        } else {
            Some(Outcome::Draw)
        }
    }

    /// Lowercase name, also used as the wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Move::Unset => "unset",
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rock" | "r" => Ok(Move::Rock),
            "paper" | "p" => Ok(Move::Paper),
            "scissors" | "scissor" | "s" => Ok(Move::Scissors),
            other => Err(ParseMoveError(other.to_string())),
        }
    }
}

/// Result of a resolved round from the local player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}
