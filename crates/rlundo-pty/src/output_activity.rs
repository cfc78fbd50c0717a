//! When child output was last seen.
//!
//! The terminal driver echoes a line before the child can read it, so by the
//! time the child asks for a restore the echo is already on its way through
//! the output thread. A restore waits for output to go quiet first, otherwise
//! the late echo would be drawn below the rewound prompt.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct OutputActivity {
    last: Mutex<Option<Instant>>,
}

impl OutputActivity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that a chunk of output just arrived.
    pub fn record(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// Time since the last chunk, `None` if there was none.
    #[must_use]
    pub fn idle_for(&self) -> Option<Duration> {
        self.last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed())
    }

    /// Block until no output arrived for `quiet`, or until `limit` passed.
    /// The quiet period counts from the call at the earliest, so output that
    /// is pending but not yet read still gets a chance to arrive.
    ///
    /// Returns `false` if output was still flowing when `limit` ran out.
    pub fn wait_quiet(&self, quiet: Duration, limit: Duration) -> bool {
        let start = Instant::now();
        let deadline = start + limit;
        loop {
            let idle = self
                .idle_for()
                .map_or(start.elapsed(), |idle| idle.min(start.elapsed()));
            if idle >= quiet {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((quiet - idle).min(deadline - now));
        }
    }
}
