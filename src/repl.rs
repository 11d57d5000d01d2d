//! The read-complete-print loop.
//!
//! Reads one line per prompt, stops on `exit` or end of input, and prints
//! every completion followed by a single separator line.

use std::io::{self, BufRead, Write};

use gpt2_engine::CausalLm;
use gpt2_tokenizer::Tokenizer;

use crate::error::Error;
use crate::session::ModelSession;

pub const PROMPT: &str = "Enter an incomplete sentence (type exit to quit): ";
pub const EXIT_SENTINEL: &str = "exit";
pub const RESULT_PREFIX: &str = "Completed text: ";
pub const SEPARATOR_WIDTH: usize = 50;

/// Anything that turns a prompt line into completions.
pub trait Completer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn complete_prompt(&mut self, prompt: &str) -> Result<Vec<String>, Self::Error>;
}

impl<M: CausalLm, T: Tokenizer> Completer for ModelSession<M, T> {
    type Error = Error;

    fn complete_prompt(&mut self, prompt: &str) -> Result<Vec<String>, Error> {
        let options = *self.defaults();
        Ok(self.complete(prompt, &options)?.into_texts())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError<E: std::error::Error + 'static> {
    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Completion(E),
}

/// Counts from a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Prompts sent to the completer.
    pub prompts: usize,
    /// Completion lines printed.
    pub completions: usize,
}

pub struct InteractiveLoop<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractiveLoop<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prompt until the user types `exit` or input ends.
    ///
    /// Only the trailing newline is stripped; the sentinel must match
    /// exactly and every other line, including an empty one, is a prompt.
    pub fn run<C: Completer>(
        &mut self,
        completer: &mut C,
    ) -> Result<LoopSummary, LoopError<C::Error>> {
        let mut summary = LoopSummary::default();
        let mut line = String::new();

        loop {
            write!(self.output, "{PROMPT}")?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                tracing::debug!("input closed");
                break;
            }

            let prompt = trim_line_ending(&line);
            if prompt == EXIT_SENTINEL {
                break;
            }

            let texts = completer
                .complete_prompt(prompt)
                .map_err(LoopError::Completion)?;
            for text in &texts {
                writeln!(self.output, "{RESULT_PREFIX}{text}")?;
            }
            writeln!(self.output, "{}", "-".repeat(SEPARATOR_WIDTH))?;

            summary.prompts += 1;
            summary.completions += texts.len();
        }

        self.output.flush()?;
        Ok(summary)
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
