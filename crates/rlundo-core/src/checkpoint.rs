//! Checkpoint coordinator: a process-per-prompt undo chain.
//!
//! Before a line is evaluated the command loop duplicates itself. The
//! duplicate (child) evaluates the line and carries on prompting; the
//! original (parent) blocks until the child is gone. Undo is the child
//! exiting with [`UNDO_EXIT_CODE`](crate::UNDO_EXIT_CODE): the parent still
//! holds the interpreter state from before the line ran and resumes there.
//!
//! ```text
//!  Root ──fork──▶ depth 1 ──fork──▶ depth 2 (reading input)
//!   │ waitpid      │ waitpid          │
//!   │              │ ◀── exit 42 ─────┘  "undo"
//!   │              ▼
//!   │         depth 1 reads input again
//! ```
//!
//! # Invariants
//!
//! 1. Exactly one process in the chain reads input; every ancestor is
//!    blocked in `wait_for`.
//! 2. A save is triggered before every prompt, a restore before every undo
//!    exit.
//! 3. An undo line is never evaluated.
//!
//! # Unwind policies
//!
//! | Policy | Parent sees 42 | Undo at depth `d` |
//! |--------|----------------|-------------------|
//! | `step` | resumes | one termination, depth `d-1` resumes |
//! | `root` | exits 42 unless Root | `d` terminations, Root resumes |

use std::io;

use crate::UNDO_EXIT_CODE;
use crate::config::UndoConfig;
use crate::line_source::LineSource;
use crate::process::{ChildExit, Duplicate, ProcessOps};
use crate::signal_channel::{SignalClient, SignalEvent};

/// How far an undo unwinds the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnwindPolicy {
    /// The nearest checkpoint resumes.
    #[default]
    Step,
    /// Every duplicate exits; only the Root resumes.
    Root,
}

impl UnwindPolicy {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "step" | "parent" => Some(Self::Step),
            "root" => Some(Self::Root),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Root => "root",
        }
    }
}

/// Position of the calling process in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The original process; never duplicated from anything.
    Root,
    /// Blocked waiting for its duplicate.
    DuplicateParent,
    /// A duplicate that is reading or evaluating input.
    DuplicateChild,
}

/// What the command loop should do after a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompted {
    /// Evaluate this line (terminator included).
    Line(String),
    /// Input ended; finish normally.
    EndOfInput,
    /// Terminate the process with this status.
    Exit(i32),
}

/// A parent's reaction to its duplicate's exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resume,
    Exit(i32),
}

/// Decide what a parent does once its duplicate finished.
#[must_use]
pub fn resolve(exit: ChildExit, policy: UnwindPolicy, is_root: bool) -> Resolution {
    match (exit, policy) {
        (ChildExit::Exited(UNDO_EXIT_CODE), UnwindPolicy::Step) => Resolution::Resume,
        (ChildExit::Exited(UNDO_EXIT_CODE), UnwindPolicy::Root) if is_root => Resolution::Resume,
        (other, _) => Resolution::Exit(other.exit_code()),
    }
}

/// Wraps a [`LineSource`] with checkpointing.
#[derive(Debug)]
pub struct CheckpointCoordinator<L, P> {
    lines: L,
    ops: P,
    signals: SignalClient,
    policy: UnwindPolicy,
    undo_command: String,
    depth: usize,
    role: Role,
    // Set when a prompt is repeated without an interval of its own.
    reprompt: bool,
}

impl<L: LineSource, P: ProcessOps> CheckpointCoordinator<L, P> {
    pub fn new(lines: L, ops: P, config: &UndoConfig) -> Self {
        Self {
            lines,
            ops,
            signals: SignalClient::from_config(config),
            policy: config.unwind,
            undo_command: config.undo_command.clone(),
            depth: 0,
            role: Role::Root,
            reprompt: false,
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Number of duplications between the Root and this process.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub const fn policy(&self) -> UnwindPolicy {
        self.policy
    }

    /// Prompt for the next line, checkpointing before it is evaluated.
    ///
    /// Returns in the process that should act on the result: a
    /// [`Prompted::Line`] is returned in the fresh duplicate, a
    /// [`Prompted::Exit`] in the process that has to terminate.
    ///
    /// # Errors
    ///
    /// Returns an error if input cannot be read (other than an interrupt) or
    /// if duplicating or waiting fails.
    pub fn next_line(&mut self, prompt: &str) -> io::Result<Prompted> {
        loop {
            if !std::mem::take(&mut self.reprompt) {
                self.signal(SignalEvent::Save);
            }

            let line = match self.lines.read_line(prompt) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!(depth = self.depth, "end of input");
                    return Ok(Prompted::EndOfInput);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    tracing::debug!(depth = self.depth, "input interrupted");
                    match self.undo() {
                        Some(exit) => return Ok(exit),
                        None => {
                            self.lines.abandon_line()?;
                            continue;
                        }
                    }
                }
                Err(err) => return Err(err),
            };

            if self.is_undo(&line) {
                match self.undo() {
                    Some(exit) => return Ok(exit),
                    None => continue,
                }
            }

            match self.ops.duplicate()? {
                Duplicate::Child => {
                    self.depth += 1;
                    self.role = Role::DuplicateChild;
                    tracing::debug!(depth = self.depth, "checkpoint taken");
                    return Ok(Prompted::Line(line));
                }
                Duplicate::Parent(child) => {
                    let reading_role = self.role;
                    self.role = Role::DuplicateParent;
                    let exit = self.ops.wait_for(child)?;
                    match resolve(exit, self.policy, self.depth == 0) {
                        Resolution::Resume => {
                            self.role = reading_role;
                            tracing::info!(depth = self.depth, "resumed at checkpoint");
                        }
                        Resolution::Exit(code) => {
                            tracing::debug!(depth = self.depth, code, "forwarding child status");
                            return Ok(Prompted::Exit(code));
                        }
                    }
                }
            }
        }
    }

    /// Like [`next_line`](Self::next_line), but terminates the process when
    /// the chain says so.
    ///
    /// # Errors
    ///
    /// See [`next_line`](Self::next_line).
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.next_line(prompt)? {
            Prompted::Line(line) => Ok(Some(line)),
            Prompted::EndOfInput => Ok(None),
            Prompted::Exit(code) => std::process::exit(code),
        }
    }

    fn is_undo(&self, line: &str) -> bool {
        line.trim_end_matches(['\r', '\n']) == self.undo_command
    }

    /// `None` when there is no checkpoint to return to.
    fn undo(&mut self) -> Option<Prompted> {
        if self.role == Role::Root {
            tracing::info!("nothing to undo");
            self.reprompt = true;
            return None;
        }
        tracing::info!(depth = self.depth, "undo requested");
        self.signal(SignalEvent::Restore);
        Some(Prompted::Exit(UNDO_EXIT_CODE))
    }

    fn signal(&self, event: SignalEvent) {
        if let Err(err) = self.signals.trigger(event) {
            tracing::warn!(%event, error = %err, "signal delivery failed");
        }
    }
}
