//! Where input lines come from.
//!
//! [`PromptedLines`] reads unbuffered, one byte at a time, so that no
//! typeahead is held in user-space memory when the process is duplicated:
//! whatever the child has not read yet stays in the terminal driver, and a
//! parent that resumes after an undo does not replay the child's input.

use std::io::{self, Read, Write};

/// Supplies the next input line.
pub trait LineSource {
    /// Show `prompt` and read one line.
    ///
    /// Returns `Ok(None)` at end of input. The line terminator is kept.
    ///
    /// # Errors
    ///
    /// An [`io::ErrorKind::Interrupted`] error means the read was cut short by
    /// SIGINT and must not be retried; callers treat it as an undo request.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Finish a line that was interrupted and is about to be prompted again.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt output cannot be written.
    fn abandon_line(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<L: LineSource + ?Sized> LineSource for &mut L {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        (**self).read_line(prompt)
    }

    fn abandon_line(&mut self) -> io::Result<()> {
        (**self).abandon_line()
    }
}

/// Prompt on `output`, read a line from `input`.
#[derive(Debug)]
pub struct PromptedLines<R, W> {
    input: R,
    output: W,
    pending: Vec<u8>,
}

impl<R: Read, W: Write> PromptedLines<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            pending: Vec::new(),
        }
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }
}

impl<R: Read, W: Write> LineSource for PromptedLines<R, W> {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.output.write_all(prompt.as_bytes())?;
        self.output.flush()?;

        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) if self.pending.is_empty() => return Ok(None),
                Ok(0) => break,
                Ok(_) => {
                    self.pending.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(err) => {
                    // An interrupted line is abandoned, not resumed.
                    self.pending.clear();
                    return Err(err);
                }
            }
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Ok(Some(line))
    }

    fn abandon_line(&mut self) -> io::Result<()> {
        self.output.write_all(b"\r\n")?;
        self.output.flush()
    }
}

/// Lines from the process's standard input, prompted on standard output.
#[cfg(unix)]
pub type StdinLines = PromptedLines<std::fs::File, io::Stdout>;

/// Open standard input for unbuffered line reading.
///
/// # Errors
///
/// Returns an error if the descriptor cannot be duplicated.
#[cfg(unix)]
pub fn stdin_lines() -> io::Result<StdinLines> {
    use std::os::fd::AsFd;

    let fd = io::stdin().as_fd().try_clone_to_owned()?;
    Ok(PromptedLines::new(std::fs::File::from(fd), io::stdout()))
}
