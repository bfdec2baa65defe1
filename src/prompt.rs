//! Operator interaction.
//!
//! Decision and zone-selection logic never touch the terminal directly; they
//! receive a [`Prompt`] so that batch runs and tests can answer without a TTY.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Mutex;

use log::warn;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("invalid choice: {0}")]
    InvalidChoice(String),
    #[error("choice out of range: {choice} (expected 1-{max})")]
    OutOfRange { choice: usize, max: usize },
    #[error("no options to choose from")]
    NoOptions,
    #[error("failed to read input: {0}")]
    Read(#[from] io::Error),
    #[error("interactive selection is not available: {0}")]
    NonInteractive(String),
}

/// Parsed answer to a yes/no question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
}

impl Confirmation {
    /// Accepts `y`/`yes` and `n`/`no` in any case; an empty answer means No.
    /// Anything else is `None` and should be asked again.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => Some(Self::Yes),
            "n" | "no" | "" => Some(Self::No),
            _ => None,
        }
    }

    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }
}

/// Parses a 1-based menu selection into a 0-based index.
pub fn parse_selection(input: &str, max: usize) -> Result<usize, PromptError> {
    let trimmed = input.trim();
    let choice: usize = trimmed
        .parse()
        .map_err(|_| PromptError::InvalidChoice(trimmed.to_string()))?;
    if choice < 1 || choice > max {
        return Err(PromptError::OutOfRange { choice, max });
    }
    Ok(choice - 1)
}

pub trait Prompt: Send + Sync {
    /// Blocking yes/no question. Read failures count as No.
    fn confirm(&self, message: &str) -> bool;

    /// Presents a numbered list and returns the 0-based index picked.
    fn choose(&self, header: &str, options: &[String]) -> Result<usize, PromptError>;
}

/// Prompt backed by a line reader and a writer, stdin/stdout by default.
pub struct TerminalPrompt {
    io: Mutex<(Box<dyn BufRead + Send>, Box<dyn Write + Send>)>,
}

impl TerminalPrompt {
    pub fn stdio() -> Self {
        Self::with_io(BufReader::new(io::stdin()), io::stdout())
    }

    pub fn with_io<R, W>(reader: R, writer: W) -> Self
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            io: Mutex::new((Box::new(reader), Box::new(writer))),
        }
    }

    fn ask(&self, text: &str) -> io::Result<String> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| io::Error::other("prompt lock poisoned"))?;
        let (reader, writer) = &mut *guard;
        write!(writer, "{text}")?;
        writer.flush()?;
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of input"));
        }
        Ok(line)
    }

    fn say(&self, text: &str) {
        if let Ok(mut guard) = self.io.lock() {
            let _ = writeln!(guard.1, "{text}");
        }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        loop {
            let answer = match self.ask(&format!("{message} [y/N]: ")) {
                Ok(answer) => answer,
                Err(err) => {
                    warn!("[prompt] error reading input: {err}");
                    return false;
                }
            };
            match Confirmation::parse(&answer) {
                Some(confirmation) => return confirmation.is_yes(),
                None => self.say("Please answer yes (y) or no (n)."),
            }
        }
    }

    fn choose(&self, header: &str, options: &[String]) -> Result<usize, PromptError> {
        if options.is_empty() {
            return Err(PromptError::NoOptions);
        }
        let mut menu = format!("\n{header}\n\n");
        for (idx, option) in options.iter().enumerate() {
            menu.push_str(&format!("  {}. {}\n", idx + 1, option));
        }
        self.say(&menu);
        let answer = self.ask("Please select an entry (enter number): ")?;
        parse_selection(&answer, options.len())
    }
}

/// Non-interactive prompt that gives the same answer to every question.
///
/// Menu selection is refused, since there is no sensible fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompt for FixedAnswer {
    fn confirm(&self, message: &str) -> bool {
        log::debug!("[prompt] auto-answering {} to: {message}", self.0);
        self.0
    }

    fn choose(&self, header: &str, _options: &[String]) -> Result<usize, PromptError> {
        Err(PromptError::NonInteractive(header.to_string()))
    }
}
