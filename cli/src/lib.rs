// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal front end for rock paper scissors sessions
//!
//! The binary drives a `SessionHandle`; this library holds the pieces
//! that do not need a terminal: snapshot rendering, input parsing and
//! the auto-restart timer.

pub mod input;
pub mod render;
pub mod restart;

pub use input::{parse_input, Input};
pub use render::render_state;
pub use restart::{RestartTimer, DEFAULT_RESTART_DELAY};
