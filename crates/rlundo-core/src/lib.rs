#![deny(unsafe_code)]

//! Core: checkpoint/restore process chain, output recording, and terminal rewind.
//!
//! A wrapped command loop signals "save" before every prompt and forks before
//! evaluating each line ([`checkpoint`]). The controlling process records the
//! session's output between saves ([`recorder`]) and, when the loop signals
//! "restore", erases what was drawn since the previous prompt ([`rewind`]).
//! The two sides meet over a loopback rendezvous ([`signal_channel`]).

pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod line_source;
pub mod logging;
pub mod process;
pub mod recorder;
pub mod rewind;
pub mod signal_channel;
pub mod terminal;

#[cfg(any(test, feature = "test-helpers"))]
pub mod virtual_terminal;

/// Exit status meaning "undo requested, restore already applied, unwind one level".
pub const UNDO_EXIT_CODE: i32 = 42;
