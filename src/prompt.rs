use std::io::{BufRead, Write};

use anyhow::Result;
use colored::Colorize;

/// Line based questions on a reader, usually stdin.
///
/// A closed input is reported as `None` so the menu can wind down.
pub struct Prompt<R> {
    reader: R,
}

impl<R: BufRead> Prompt<R> {
    pub fn new(reader: R) -> Self {
        Prompt { reader }
    }

    /// Prints the question and reads one trimmed line.
    pub fn line(&mut self, question: &str) -> Result<Option<String>> {
        print!("{} ", question.bold());
        std::io::stdout().flush()?;
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            println!();
            return Ok(None);
        }
        Ok(Some(buf.trim().to_string()))
    }

    /// Like `line`, with a closed input read as an empty answer.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        Ok(self.line(question)?.unwrap_or_default())
    }

    /// Like `ask`, falling back to `default` on an empty answer.
    pub fn ask_or(&mut self, question: &str, default: &str) -> Result<String> {
        let answer = self.ask(&format!("{} [{}]", question, default))?;
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    /// Asks until the answer is one of `choices`. `None` once input is closed.
    pub fn choose(&mut self, question: &str, choices: &[&str]) -> Result<Option<String>> {
        let question = format!("{} [{}]", question, choices.join("/"));
        loop {
            let Some(answer) = self.line(&question)? else {
                return Ok(None);
            };
            if choices.contains(&answer.as_str()) {
                return Ok(Some(answer));
            }
            println!("{}", "Please select one of the available options".red());
        }
    }

    /// y/n question, defaulting to no.
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/n] (n)", question))?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }

    /// One-based list position turned into an index below `len`.
    pub fn pick_index(&mut self, question: &str, len: usize) -> Result<std::result::Result<usize, String>> {
        let answer = self.ask(question)?;
        Ok(parse_index(&answer, len))
    }
}

/// Parses a one-based position; the error is the message to show.
pub fn parse_index(answer: &str, len: usize) -> std::result::Result<usize, String> {
    let Ok(n) = answer.trim().parse::<usize>() else {
        return Err("Invalid input. Please enter a number.".to_string());
    };
    if n == 0 || n > len {
        return Err("Invalid number.".to_string());
    }
    Ok(n - 1)
}
