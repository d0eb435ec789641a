//! Terminal chooser

use async_trait::async_trait;
use dialoguer::Select;

use super::HumanChooser;
use crate::error::{CosmoError, Result};
use crate::management::ConnectionStringCandidate;

/// Arrow-key picker on the controlling terminal; Esc or `q` dismisses
///
/// Only descriptions are rendered, never the connection strings themselves.
#[derive(Debug, Clone, Default)]
pub struct DialoguerChooser {
    prompt: Option<String>,
}

impl DialoguerChooser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

#[async_trait]
impl HumanChooser for DialoguerChooser {
    async fn choose(&self, candidates: &[ConnectionStringCandidate], default_index: usize) -> Result<Option<usize>> {
        let items: Vec<String> = candidates.iter().map(|c| c.description.clone()).collect();
        let prompt = self.prompt.clone().unwrap_or_else(|| "Select a connection string".to_string());

        // dialoguer blocks on terminal input
        tokio::task::spawn_blocking(move || {
            Select::new()
                .with_prompt(prompt)
                .items(&items)
                .default(default_index)
                .interact_opt()
                .map_err(prompt_failed)
        })
        .await
        .map_err(prompt_failed)?
    }
}

// No terminal or a torn-down prompt means nobody can pick
fn prompt_failed(e: impl std::fmt::Display) -> CosmoError {
    CosmoError::missing_connection_string(format!("Connection string selection could not run: {e}"))
}
