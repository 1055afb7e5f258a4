// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of interactive commands.

use rps_core::{Move, ParseMoveError};

/// One line typed by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Play(Move),
    NewGame,
    Quit,
}

/// Parse a line of user input
pub fn parse_input(line: &str) -> Result<Input, ParseMoveError> {
    match line.trim().to_lowercase().as_str() {
        "new" | "n" => Ok(Input::NewGame),
        "quit" | "q" | "exit" => Ok(Input::Quit),
        other => other.parse().map(Input::Play),
    }
}
