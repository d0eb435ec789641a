//! Management Client Factory
//!
//! Builds management-plane and metrics-plane clients bound to one subscription.
//! Both builders run the same fail-fast sequence:
//!
//! 1. resolve the account in the identity store
//! 2. resolve its ARM endpoint
//! 3. acquire a token
//! 4. locate the resource (only when no resource id was supplied)
//! 5. bind a client to (credentials, subscription, endpoint)
//!
//! Any failure returns before the connector is asked for a client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::credential::{AccountIdentity, ArmCredentials, CredentialProvider};
use crate::engine::ApiKind;
use crate::error::Result;
use crate::resource::{ResourceIdentity, ResourceLocator};

pub mod arm;
pub mod overview;

pub use arm::ArmConnector;

/// One connection string exposed by the management plane
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStringCandidate {
    /// Label shown to the user (e.g. "Primary MongoDB Connection String")
    pub description: String,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl std::fmt::Debug for ConnectionStringCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStringCandidate")
            .field("description", &self.description)
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Database account metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseAccount {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_endpoint: Option<String>,
}

/// A database under an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
}

/// A collection (Mongo) or container (NoSQL) under a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_key: Option<String>,
}

/// Provisioned or autoscale throughput in RU/s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    /// Manual throughput, or the current autoscale floor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<u64>,
    /// Autoscale ceiling, when autoscale is on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscale_max_throughput: Option<u64>,
}

/// One metric time series aggregated to a single value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub resource_uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Sum of the `total` (or `average`) data points across the timespan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Management-plane operations on database accounts
#[async_trait]
pub trait ManagementPlane: Send + Sync {
    /// `None` when the service returned no list at all
    async fn list_connection_strings(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Option<Vec<ConnectionStringCandidate>>>;

    async fn get_account(&self, resource_group: &str, account_name: &str) -> Result<DatabaseAccount>;

    async fn list_databases(&self, resource_group: &str, account_name: &str) -> Result<Vec<DatabaseInfo>>;

    async fn list_collections(
        &self,
        resource_group: &str,
        account_name: &str,
        database: &str,
    ) -> Result<Vec<CollectionInfo>>;

    /// Database-level throughput; fails with a 404 remote error when the database
    /// uses per-collection throughput or is serverless
    async fn get_throughput(&self, resource_group: &str, account_name: &str, database: &str) -> Result<Throughput>;
}

/// Metrics-plane operations
#[async_trait]
pub trait MetricsPlane: Send + Sync {
    async fn list_metrics(
        &self,
        resource_uri: &str,
        filter: Option<&str>,
        metric_names: &[&str],
    ) -> Result<Vec<MetricValue>>;
}

/// What a client is bound to
#[derive(Debug, Clone)]
pub struct ManagementBinding {
    pub credentials: ArmCredentials,
    pub subscription_id: String,
    /// ARM base URI, no trailing slash
    pub endpoint: String,
}

/// Constructs plane clients for a binding
pub trait ManagementConnector: Send + Sync {
    fn management(&self, binding: ManagementBinding, api: ApiKind) -> Result<Arc<dyn ManagementPlane>>;

    fn metrics(&self, binding: ManagementBinding) -> Result<Arc<dyn MetricsPlane>>;
}

/// A management client plus the resource it was resolved for
#[derive(Clone)]
pub struct BoundManagementClient {
    pub plane: Arc<dyn ManagementPlane>,
    pub resource: ResourceIdentity,
    pub account: AccountIdentity,
}

/// A metrics client plus the resource it was resolved for
#[derive(Clone)]
pub struct BoundMetricsClient {
    pub plane: Arc<dyn MetricsPlane>,
    pub resource: ResourceIdentity,
}

/// Builds bound clients from an account, tenant and (optional) resource id
#[derive(Clone)]
pub struct ManagementClientFactory {
    credentials: CredentialProvider,
    locator: ResourceLocator,
    connector: Arc<dyn ManagementConnector>,
}

impl ManagementClientFactory {
    pub fn new(
        credentials: CredentialProvider,
        locator: ResourceLocator,
        connector: Arc<dyn ManagementConnector>,
    ) -> Self {
        Self { credentials, locator, connector }
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }

    pub async fn build_management_client(
        &self,
        account_id: &str,
        tenant_id: &str,
        resource_id: Option<&str>,
        account_name: &str,
        api: ApiKind,
    ) -> Result<BoundManagementClient> {
        let (account, binding, resource) = self.bind(account_id, tenant_id, resource_id, account_name).await?;
        let plane = self.connector.management(binding, api)?;
        info!(account = %account.id, resource = %resource, %api, "management client ready");
        Ok(BoundManagementClient { plane, resource, account })
    }

    pub async fn build_metrics_client(
        &self,
        account_id: &str,
        tenant_id: &str,
        resource_id: Option<&str>,
        account_name: &str,
    ) -> Result<BoundMetricsClient> {
        let (_, binding, resource) = self.bind(account_id, tenant_id, resource_id, account_name).await?;
        let plane = self.connector.metrics(binding)?;
        Ok(BoundMetricsClient { plane, resource })
    }

    /// Run the credential and discovery stages only
    pub async fn resolve(
        &self,
        account_id: &str,
        tenant_id: &str,
        resource_id: Option<&str>,
        account_name: &str,
    ) -> Result<(AccountIdentity, ResourceIdentity)> {
        let (account, _, resource) = self.bind(account_id, tenant_id, resource_id, account_name).await?;
        Ok((account, resource))
    }

    async fn bind(
        &self,
        account_id: &str,
        tenant_id: &str,
        resource_id: Option<&str>,
        account_name: &str,
    ) -> Result<(AccountIdentity, ManagementBinding, ResourceIdentity)> {
        let account = self.credentials.find_account(account_id).await?;
        let endpoint = self.credentials.arm_endpoint(&account)?;
        let token = self.credentials.acquire_token(&account, tenant_id).await?;
        let credentials = ArmCredentials { token, arm_endpoint: endpoint.clone() };

        let resource = match resource_id {
            Some(id) => ResourceIdentity::parse(id)?,
            None => {
                debug!(account_name, "no resource id, locating account");
                self.locator.locate(account_name, &credentials).await?
            }
        };

        let binding = ManagementBinding {
            credentials,
            subscription_id: resource.subscription_id.clone(),
            endpoint,
        };
        Ok((account, binding, resource))
    }
}
