//! Reporting and interaction seam.
//!
//! The reconciliation engine never talks to a terminal directly; it
//! goes through [`Report`], so the whole engine can run headless in
//! tests with a scripted implementation. [`ConsoleReport`] is the real
//! one, built on `dialoguer` prompts and `colored` status lines.
//! Cancelling a prompt (escape) surfaces as `Ok(None)` and is a normal
//! early return for callers, never an error.

use colored::Colorize;
use dialoguer::{Confirm, Input, MultiSelect, Select};

#[derive(Debug, thiserror::Error)]
#[error("Prompt failed: {0}")]
pub struct PromptError(#[from] dialoguer::Error);

/// Terminal-facing output and prompts.
pub trait Report {
  fn start(&self, message: &str);
  fn info(&self, message: &str);
  fn warn(&self, message: &str);
  fn error(&self, message: &str);
  fn success(&self, message: &str);

  /// Prints a list of items as an indented block.
  fn list(&self, items: &[String]);

  /// Yes/no question; `None` when the user cancels.
  fn confirm(&self, message: &str, default: bool) -> Result<Option<bool>, PromptError>;

  /// Single choice out of `options`; `None` on cancel.
  fn select(&self, message: &str, options: &[String]) -> Result<Option<usize>, PromptError>;

  /// Multiple choice, everything preselected; `None` on cancel.
  fn multi_select(&self, message: &str, options: &[String])
  -> Result<Option<Vec<usize>>, PromptError>;

  /// Free-text input with a default.
  fn input(&self, message: &str, default: &str) -> Result<String, PromptError>;
}

/// Interactive implementation for a real terminal.
#[derive(Debug, Default)]
pub struct ConsoleReport;

impl Report for ConsoleReport {
  fn start(&self, message: &str) {
    println!("{} {}", "◐".cyan(), message);
  }

  fn info(&self, message: &str) {
    println!("{} {}", "ℹ".blue(), message);
  }

  fn warn(&self, message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.yellow());
  }

  fn error(&self, message: &str) {
    eprintln!("{} {}", "✖".red(), message.red());
  }

  fn success(&self, message: &str) {
    println!("{} {}", "✔".green(), message);
  }

  fn list(&self, items: &[String]) {
    for item in items {
      println!("  - {}", item);
    }
  }

  fn confirm(&self, message: &str, default: bool) -> Result<Option<bool>, PromptError> {
    let answer = Confirm::new()
      .with_prompt(message)
      .default(default)
      .interact_opt()?;
    Ok(answer)
  }

  fn select(&self, message: &str, options: &[String]) -> Result<Option<usize>, PromptError> {
    let choice = Select::new()
      .with_prompt(message)
      .items(options)
      .default(0)
      .interact_opt()?;
    Ok(choice)
  }

  fn multi_select(
    &self,
    message: &str,
    options: &[String],
  ) -> Result<Option<Vec<usize>>, PromptError> {
    let preselected = vec![true; options.len()];
    let choices = MultiSelect::new()
      .with_prompt(message)
      .items(options)
      .defaults(&preselected)
      .interact_opt()?;
    Ok(choices)
  }

  fn input(&self, message: &str, default: &str) -> Result<String, PromptError> {
    let value = Input::new()
      .with_prompt(message)
      .default(default.to_string())
      .allow_empty(true)
      .interact_text()?;
    Ok(value)
  }
}
