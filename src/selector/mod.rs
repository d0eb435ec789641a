//! Connection String Selector
//!
//! Resolves the connection strings an account exposes down to exactly one.
//! A single candidate is taken as-is; several go to a human chooser with the
//! first candidate pre-selected. A dismissed prompt is shown again, at most
//! `PICK_MAX_ATTEMPTS` times in total.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{CosmoError, Result};
use crate::management::{ConnectionStringCandidate, ManagementPlane};

pub mod prompt;

pub use prompt::DialoguerChooser;

/// Chooser invocations before a selection counts as cancelled
pub const PICK_MAX_ATTEMPTS: usize = 3;

/// Asks a human to pick one of several candidates
///
/// A prompt that cannot run at all (no terminal, task aborted) fails with
/// `MissingConnectionString`, the same outcome as dismissing it.
#[async_trait]
pub trait HumanChooser: Send + Sync {
    /// Index of the chosen candidate, or `None` if the prompt was dismissed
    async fn choose(&self, candidates: &[ConnectionStringCandidate], default_index: usize) -> Result<Option<usize>>;
}

/// List the account's connection strings and resolve them to one
pub async fn select_connection_string(
    plane: &dyn ManagementPlane,
    chooser: &dyn HumanChooser,
    resource_group: &str,
    account_name: &str,
) -> Result<String> {
    let candidates = plane
        .list_connection_strings(resource_group, account_name)
        .await?
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            CosmoError::no_connection_strings_found(format!(
                "Account '{account_name}' in resource group '{resource_group}' exposes no connection strings"
            ))
        })?;

    let chosen = pick(&candidates, chooser).await?;
    info!(account_name, description = %chosen.description, "connection string selected");

    chosen.connection_string.clone().ok_or_else(|| {
        CosmoError::missing_connection_string(format!(
            "Candidate '{}' has no connection string",
            chosen.description
        ))
    })
}

/// Resolve a non-empty candidate list to one entry
pub async fn pick<'a>(
    candidates: &'a [ConnectionStringCandidate],
    chooser: &dyn HumanChooser,
) -> Result<&'a ConnectionStringCandidate> {
    if let [only] = candidates {
        return Ok(only);
    }

    for attempt in 1..=PICK_MAX_ATTEMPTS {
        match chooser.choose(candidates, 0).await? {
            Some(index) => {
                return candidates.get(index).ok_or_else(|| {
                    CosmoError::invalid_input(format!(
                        "Selection {index} is out of range for {} candidates",
                        candidates.len()
                    ))
                });
            }
            None => debug!(attempt, "selection dismissed"),
        }
    }

    Err(CosmoError::missing_connection_string(format!(
        "No connection string selected after {PICK_MAX_ATTEMPTS} attempts"
    )))
}
