// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text rendering of session snapshots for the CLI.

use rps_core::{MatchState, Move, Outcome, SessionPhase};

/// Render a snapshot as a few lines of text
///
/// Everything shown is derived from the snapshot: the opponent's hand
/// stays hidden until the round is resolved.
pub fn render_state(state: &MatchState) -> String {
    let mut output = String::new();

    output.push_str(&format!("Status:   {}\n", phase_line(state.phase)));
    if state.phase != SessionPhase::Connected {
        return output;
    }

    output.push_str(&format!("You:      {}\n", hand_label(state.local_move)));

    let opponent = if state.show_result() {
        hand_label(state.remote_move)
    } else if state.hint_remote_move() {
        "ready"
    } else {
        "thinking..."
    };
    output.push_str(&format!("Opponent: {}\n", opponent));

    match state.outcome() {
        Some(Outcome::Win) => output.push_str("Result:   You win!\n"),
        Some(Outcome::Lose) => output.push_str("Result:   You lose.\n"),
        Some(Outcome::Draw) => output.push_str("Result:   Draw.\n"),
        None if state.lock_input() => output.push_str("Waiting for opponent...\n"),
        None => output.push_str("Choose: rock, paper or scissors\n"),
    }

    output
}

fn phase_line(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "not connected",
        SessionPhase::Hosting => "hosting, waiting for an opponent...",
        SessionPhase::Joining => "looking for a host...",
        SessionPhase::Connected => "connected",
    }
}

fn hand_label(mv: Move) -> &'static str {
    match mv {
        Move::Unset => "-",
        Move::Rock => "rock",
        Move::Paper => "paper",
        Move::Scissors => "scissors",
    }
}
