//! Line-based prompts for interactive commands.

use std::fmt;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationChoice {
    Yes,
    No,
}

#[derive(Debug, Clone)]
pub struct PromptError {
    message: String,
}

impl PromptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PromptError {}

impl From<io::Error> for PromptError {
    fn from(err: io::Error) -> Self {
        PromptError::new(format!("Failed to read input: {err}"))
    }
}

/// Print `label` and read one trimmed line from stdin.
pub fn prompt_line(label: &str) -> Result<String, PromptError> {
    print!("{label}");
    io::stdout().flush()?;

    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        return Err(PromptError::new("Input closed"));
    }
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Like [`prompt_line`] but rejects blank answers.
pub fn prompt_required(label: &str, field: &str) -> Result<String, PromptError> {
    let value = prompt_line(label)?;
    if value.trim().is_empty() {
        return Err(PromptError::new(format!("{field} cannot be empty")));
    }
    Ok(value.trim().to_string())
}

pub fn confirm(question: &str) -> Result<ConfirmationChoice, PromptError> {
    let answer = prompt_line(&format!("{question} (y/N): "))?;
    parse_confirmation(&answer)
}

pub fn parse_confirmation(input: &str) -> Result<ConfirmationChoice, PromptError> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Ok(ConfirmationChoice::No);
    }
    match trimmed.as_str() {
        "y" | "yes" => Ok(ConfirmationChoice::Yes),
        "n" | "no" => Ok(ConfirmationChoice::No),
        _ => Err(PromptError::new("Invalid confirmation response")),
    }
}
