#![forbid(unsafe_code)]

//! rlundo: undo for interactive command loops.

pub mod calc;
pub mod cli;
pub mod repl;
pub mod wrap;
