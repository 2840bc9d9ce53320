use std::fmt::Display;
use std::io::{self, BufRead, Stdin, Stdout, Write};

use crate::error::DobotError;

/// Operator console: questions go to `output`, answers come from `input`
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        Self::new(stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print one line
    pub fn say(&mut self, line: impl Display) -> Result<(), DobotError> {
        writeln!(self.output, "{}", line)?;
        Ok(())
    }

    /// Print an empty line
    pub fn blank(&mut self) -> Result<(), DobotError> {
        writeln!(self.output)?;
        Ok(())
    }

    fn ask(&mut self, prompt: &str) -> Result<String, DobotError> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(DobotError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "console input closed",
            )));
        }
        Ok(line)
    }

    /// Ask until the answer parses as an integer
    ///
    /// The sign is not checked here; callers that need a positive value
    /// validate it themselves.
    pub fn input_number(&mut self, message: &str) -> Result<i64, DobotError> {
        loop {
            let reply = self.ask(message)?;
            match reply.trim().parse::<i64>() {
                Ok(value) => return Ok(value),
                Err(_) => self.say("Not an integer! Try again.")?,
            }
        }
    }

    /// Ask a y/n question until the answer starts with `y` or `n`
    /// (case-insensitive)
    pub fn yes_or_no(&mut self, question: &str) -> Result<bool, DobotError> {
        let prompt = format!("{} (y/n): ", question.trim_end());
        loop {
            let reply = self.ask(&prompt)?.trim().to_lowercase();
            match reply.chars().next() {
                Some('y') => return Ok(true),
                Some('n') => return Ok(false),
                _ => continue,
            }
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}
