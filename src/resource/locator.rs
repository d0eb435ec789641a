//! Resource Locator
//!
//! Finds the fully-qualified id of a database account when only its name is known,
//! by running a resource-graph query over every subscription the token can see.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::ResourceIdentity;
use crate::credential::ArmCredentials;
use crate::error::{CosmoError, Result};
use crate::http;

/// Rows requested per resource-graph query
pub const RESOURCE_QUERY_PAGE_SIZE: u32 = 1000;

/// ARM resource type of a database account (resource graph compares it case-insensitively)
pub const DATABASE_ACCOUNT_TYPE: &str = "microsoft.documentdb/databaseaccounts";

const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";

/// Executes resource-graph queries
#[async_trait]
pub trait ResourceQueryExecutor: Send + Sync {
    /// Run `filter` and return at most `page_size` rows as JSON objects
    async fn query(
        &self,
        credentials: &ArmCredentials,
        filter: &str,
        page_size: u32,
    ) -> Result<Vec<serde_json::Value>>;
}

/// Build the query matching one database account by exact name
#[must_use]
pub fn account_query(account_name: &str) -> String {
    let escaped = account_name.replace('\'', "''");
    format!(
        "Resources | where type =~ '{DATABASE_ACCOUNT_TYPE}' | where name == '{escaped}' \
         | project id, name, resourceGroup, subscriptionId"
    )
}

/// Resolves account names to resource identities
#[derive(Clone)]
pub struct ResourceLocator {
    executor: Arc<dyn ResourceQueryExecutor>,
}

impl ResourceLocator {
    pub fn new(executor: Arc<dyn ResourceQueryExecutor>) -> Self {
        Self { executor }
    }

    /// Locate `account_name`; the first row wins
    pub async fn locate(&self, account_name: &str, credentials: &ArmCredentials) -> Result<ResourceIdentity> {
        let filter = account_query(account_name);
        debug!(account_name, "querying resource graph");

        let rows = self.executor.query(credentials, &filter, RESOURCE_QUERY_PAGE_SIZE).await?;
        let first = rows.first().ok_or_else(|| {
            CosmoError::azure_resource_not_found(format!("no database account named '{account_name}'"))
        })?;

        let resource_id = first.get("id").and_then(serde_json::Value::as_str).ok_or_else(|| {
            CosmoError::azure_resource_not_found(format!(
                "resource graph row for '{account_name}' has no id"
            ))
        })?;

        let identity = ResourceIdentity::parse(resource_id)?;
        info!(account_name, subscription = %identity.subscription_id, matches = rows.len(), "located database account");
        Ok(identity)
    }
}

/// Resource-graph executor over the ARM REST endpoint
pub struct ResourceGraphExecutor {
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ResourceGraphResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl ResourceGraphExecutor {
    pub fn new() -> Result<Self> {
        Ok(Self { http: http::client()? })
    }
}

#[async_trait]
impl ResourceQueryExecutor for ResourceGraphExecutor {
    async fn query(
        &self,
        credentials: &ArmCredentials,
        filter: &str,
        page_size: u32,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!(
            "{}/providers/Microsoft.ResourceGraph/resources?api-version={RESOURCE_GRAPH_API_VERSION}",
            credentials.arm_endpoint
        );
        let body = json!({
            "query": filter,
            "options": { "$top": page_size, "resultFormat": "objectArray" }
        });

        let request = http::authorize(self.http.post(url), &credentials.token).json(&body);
        let response: ResourceGraphResponse = http::send_json("resource graph", request).await?;
        Ok(response.data)
    }
}
