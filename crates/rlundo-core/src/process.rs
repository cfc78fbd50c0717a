//! Process duplication and reaping.
//!
//! The checkpoint coordinator only sees the [`ProcessOps`] trait. On Unix the
//! real implementation is [`ForkOps`]: `fork(2)` snapshots the whole
//! interpreter, `waitpid(2)` parks the parent until the duplicate is done.

use std::io;

/// Identifier of a duplicate, as returned to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildId(pub i32);

/// Which side of a duplication the caller ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplicate {
    Parent(ChildId),
    Child,
}

/// How a duplicate finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
}

impl ChildExit {
    /// Status to forward: the exit code, or `128 + signal` like a shell.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
        }
    }
}

/// Process effects used by the checkpoint coordinator.
pub trait ProcessOps {
    /// Duplicate the calling process.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the duplicate.
    fn duplicate(&mut self) -> io::Result<Duplicate>;

    /// Block until `child` terminates. Interrupted waits are retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be waited for.
    fn wait_for(&mut self, child: ChildId) -> io::Result<ChildExit>;
}

impl<P: ProcessOps + ?Sized> ProcessOps for &mut P {
    fn duplicate(&mut self) -> io::Result<Duplicate> {
        (**self).duplicate()
    }

    fn wait_for(&mut self, child: ChildId) -> io::Result<ChildExit> {
        (**self).wait_for(child)
    }
}

/// `fork` + `waitpid`.
///
/// Forking is only sound while the process is single-threaded; the command
/// loop side never spawns threads.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkOps;

#[cfg(unix)]
impl ProcessOps for ForkOps {
    fn duplicate(&mut self) -> io::Result<Duplicate> {
        use nix::unistd::{ForkResult, fork};
        use std::io::Write;

        // Pending output would otherwise be flushed by both processes.
        io::stdout().flush()?;
        io::stderr().flush()?;

        // SAFETY: the command loop process is single-threaded, so the child
        // does not inherit locks held by other threads.
        #[allow(unsafe_code)]
        let result = unsafe { fork() };
        match result.map_err(io::Error::from)? {
            ForkResult::Parent { child } => Ok(Duplicate::Parent(ChildId(child.as_raw()))),
            ForkResult::Child => Ok(Duplicate::Child),
        }
    }

    fn wait_for(&mut self, child: ChildId) -> io::Result<ChildExit> {
        use nix::errno::Errno;
        use nix::sys::wait::{WaitStatus, waitpid};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.0);
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ChildExit::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ChildExit::Signaled(signal as i32));
                }
                Ok(status) => tracing::trace!(?status, "ignoring non-terminal wait status"),
                Err(Errno::EINTR) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Make SIGINT interrupt blocking calls instead of killing the process.
///
/// The handler does nothing; it is installed without `SA_RESTART`, so a
/// pending `read` or `waitpid` fails with `EINTR`. The line reader turns that
/// into an undo request; the wait loop simply retries.
///
/// # Errors
///
/// Returns an error if the handler cannot be installed.
#[cfg(unix)]
pub fn install_interrupt_handler() -> io::Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    extern "C" fn on_interrupt(_: nix::libc::c_int) {}

    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler is async-signal-safe (it does nothing).
    #[allow(unsafe_code)]
    let previous = unsafe { sigaction(Signal::SIGINT, &action) };
    previous.map(|_| ()).map_err(io::Error::from)
}
