//! Interactive loop tests with an in-memory console.

use std::io::Cursor;

use gpt2_complete::repl::{PROMPT, SEPARATOR_WIDTH};
use gpt2_complete::{Completer, InteractiveLoop, LoopError, LoopSummary};

/// Records prompts and answers with a fixed number of echoes.
struct EchoCompleter {
    seen: Vec<String>,
    copies: usize,
}

impl EchoCompleter {
    fn new(copies: usize) -> Self {
        Self {
            seen: Vec::new(),
            copies,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("completer refused {0:?}")]
struct Refused(String);

impl Completer for EchoCompleter {
    type Error = Refused;

    fn complete_prompt(&mut self, prompt: &str) -> Result<Vec<String>, Refused> {
        if prompt == "boom" {
            return Err(Refused(prompt.to_string()));
        }
        self.seen.push(prompt.to_string());
        Ok((0..self.copies)
            .map(|i| format!("{prompt} #{i}"))
            .collect())
    }
}

fn run(input: &str, completer: &mut EchoCompleter) -> (LoopSummary, String) {
    let mut repl = InteractiveLoop::new(Cursor::new(input.as_bytes()), Vec::new());
    let summary = repl.run(completer).unwrap();
    let output = String::from_utf8(repl.into_output()).unwrap();
    (summary, output)
}

fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

#[test]
fn exit_first_makes_no_calls() {
    let mut completer = EchoCompleter::new(1);
    let (summary, output) = run("exit\n", &mut completer);

    assert_eq!(summary, LoopSummary::default());
    assert!(completer.seen.is_empty());
    assert_eq!(output, PROMPT);
}

#[test]
fn each_prompt_prints_results_then_one_separator() {
    let mut completer = EchoCompleter::new(1);
    let (summary, output) = run("Hello world\nThe cat\nexit\n", &mut completer);

    assert_eq!(summary.prompts, 2);
    assert_eq!(summary.completions, 2);
    assert_eq!(completer.seen, ["Hello world", "The cat"]);

    let expected = format!(
        "{PROMPT}Completed text: Hello world #0\n{sep}\n\
         {PROMPT}Completed text: The cat #0\n{sep}\n\
         {PROMPT}",
        sep = separator()
    );
    assert_eq!(output, expected);
}

#[test]
fn several_sequences_share_one_separator() {
    let mut completer = EchoCompleter::new(3);
    let (summary, output) = run("Once\nexit\n", &mut completer);

    assert_eq!(summary.completions, 3);
    assert_eq!(output.matches("Completed text: ").count(), 3);
    assert_eq!(output.matches(&separator()).count(), 1);
}

#[test]
fn end_of_input_ends_the_loop() {
    let mut completer = EchoCompleter::new(1);
    let (summary, output) = run("only line", &mut completer);

    assert_eq!(summary.prompts, 1);
    assert_eq!(completer.seen, ["only line"]);
    assert!(output.ends_with(&format!("{PROMPT}\n")));
}

#[test]
fn sentinel_must_match_exactly() {
    let mut completer = EchoCompleter::new(1);
    let (summary, _) = run("Exit\n exit\nexit \nexit\n", &mut completer);

    assert_eq!(summary.prompts, 3);
    assert_eq!(completer.seen, ["Exit", " exit", "exit "]);
}

#[test]
fn empty_line_is_still_a_prompt() {
    let mut completer = EchoCompleter::new(1);
    let (summary, _) = run("\r\nexit\r\n", &mut completer);

    assert_eq!(summary.prompts, 1);
    assert_eq!(completer.seen, [""]);
}

#[test]
fn completion_failure_stops_the_loop() {
    let mut completer = EchoCompleter::new(1);
    let mut repl = InteractiveLoop::new(Cursor::new("fine\nboom\nnever\n"), Vec::new());

    let err = repl.run(&mut completer).unwrap_err();
    assert!(matches!(err, LoopError::Completion(Refused(ref p)) if p == "boom"));
    assert_eq!(completer.seen, ["fine"]);
}
