//! Yes/no confirmation used before destructive changes

use anyhow::{Context, Result};

/// Asks the user to confirm an action
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Interactive prompt on the terminal, defaulting to "no"
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

/// Always gives the same answer (`--yes`, non-interactive runs, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        log::info!("{} {}", prompt, if self.0 { "yes" } else { "no" });
        Ok(self.0)
    }
}
