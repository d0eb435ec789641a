//! Resource Identity
//!
//! Parses fully-qualified ARM resource paths of the form
//! `/subscriptions/{sub}/resourceGroups/{group}/providers/{namespace}/{type}/{account}`
//! into the three parts the pipeline needs.
//!
//! Splitting on `/` keeps the empty leading segment, so the subscription is
//! segment 2, the resource group segment 4 and the account name segment 8.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CosmoError, Result};

pub mod locator;

pub use locator::{ResourceGraphExecutor, ResourceLocator, ResourceQueryExecutor};

/// Minimum number of `/`-separated segments in an account resource path
pub const MIN_RESOURCE_SEGMENTS: usize = 9;

const SUBSCRIPTION_SEGMENT: usize = 2;
const RESOURCE_GROUP_SEGMENT: usize = 4;
const ACCOUNT_SEGMENT: usize = 8;

/// Subscription, resource group and account name of a database account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
    /// The path this identity was parsed from
    pub resource_id: String,
}

impl ResourceIdentity {
    /// Parse a resource path
    ///
    /// Fails with `MalformedResourceId` when the path has fewer than
    /// `MIN_RESOURCE_SEGMENTS` segments or one of the extracted segments is empty.
    pub fn parse(resource_path: &str) -> Result<Self> {
        let segments: Vec<&str> = resource_path.split('/').collect();
        if segments.len() < MIN_RESOURCE_SEGMENTS {
            return Err(CosmoError::malformed_resource_id(format!(
                "'{resource_path}' has {} segments, expected at least {MIN_RESOURCE_SEGMENTS}",
                segments.len()
            )));
        }

        let part = |index: usize, name: &str| -> Result<String> {
            let value = segments[index];
            if value.is_empty() {
                Err(CosmoError::malformed_resource_id(format!(
                    "'{resource_path}' has an empty {name}"
                )))
            } else {
                Ok(value.to_string())
            }
        };

        Ok(Self {
            subscription_id: part(SUBSCRIPTION_SEGMENT, "subscription id")?,
            resource_group: part(RESOURCE_GROUP_SEGMENT, "resource group")?,
            account_name: part(ACCOUNT_SEGMENT, "account name")?,
            resource_id: resource_path.to_string(),
        })
    }
}

impl FromStr for ResourceIdentity {
    type Err = CosmoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_id)
    }
}
