//! Data-Plane Engines and API Variants
//!
//! This module defines the two database APIs cosmolink can manage (Mongo-API and
//! NoSQL-API) and the data-plane abstraction used to open live connections.
//!
//! # API Variants
//! Everything that differs between the two APIs on the management plane (ARM child
//! resource names, shard-key extraction, labels) lives behind the `ApiVariant`
//! strategy. The shared ARM plumbing is written once and asks the variant for the
//! pieces it needs.
//!
//! # Data Plane
//! The wire protocol is owned by each engine's driver. A `DataPlaneClient` turns a
//! connection string into a `Connection`; the `ConnectionRegistry` owns the result.
//! `RoutingDataPlane` picks the engine from the connection string's shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{CosmoError, Result};

#[cfg(feature = "mongo")]
pub mod mongo;

#[cfg(feature = "nosql")]
pub mod nosql;

/// Supported database APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// Mongo-API (wire-compatible MongoDB)
    Mongo,
    /// NoSQL-API (document API with master-key or token auth)
    NoSql,
}

impl ApiKind {
    /// Get the API name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mongo => "mongo",
            Self::NoSql => "nosql",
        }
    }

    /// Variant-specific management-plane strategy
    #[must_use]
    pub fn variant(&self) -> &'static dyn ApiVariant {
        match self {
            Self::Mongo => &MongoApi,
            Self::NoSql => &NoSqlApi,
        }
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApiKind {
    type Err = CosmoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "nosql" | "sql" | "core" => Ok(Self::NoSql),
            other => Err(CosmoError::invalid_input(format!(
                "Unknown API '{other}', expected 'mongo' or 'nosql'"
            ))),
        }
    }
}

/// Per-API management-plane specifics
///
/// Implemented once per API; shared code in `management::arm` and
/// `management::overview` only talks to this trait.
pub trait ApiVariant: Send + Sync {
    /// Which API this variant describes
    fn kind(&self) -> ApiKind;

    /// Human-readable API label
    fn label(&self) -> &'static str;

    /// ARM child resource holding databases (e.g. `mongodbDatabases`)
    fn database_segment(&self) -> &'static str;

    /// ARM child resource under a database holding collections
    fn collection_segment(&self) -> &'static str;

    /// Extract the shard/partition key from a collection's ARM `properties.resource`
    fn shard_key(&self, resource: &serde_json::Value) -> Option<String>;
}

/// Mongo-API variant
pub struct MongoApi;

impl ApiVariant for MongoApi {
    fn kind(&self) -> ApiKind {
        ApiKind::Mongo
    }

    fn label(&self) -> &'static str {
        "Azure Cosmos DB for MongoDB"
    }

    fn database_segment(&self) -> &'static str {
        "mongodbDatabases"
    }

    fn collection_segment(&self) -> &'static str {
        "collections"
    }

    // shardKey is a map of field name to kind ("Hash"); Mongo-API allows one field
    fn shard_key(&self, resource: &serde_json::Value) -> Option<String> {
        resource.get("shardKey")?.as_object()?.keys().next().cloned()
    }
}

/// NoSQL-API variant
pub struct NoSqlApi;

impl ApiVariant for NoSqlApi {
    fn kind(&self) -> ApiKind {
        ApiKind::NoSql
    }

    fn label(&self) -> &'static str {
        "Azure Cosmos DB for NoSQL"
    }

    fn database_segment(&self) -> &'static str {
        "sqlDatabases"
    }

    fn collection_segment(&self) -> &'static str {
        "containers"
    }

    fn shard_key(&self, resource: &serde_json::Value) -> Option<String> {
        let paths = resource.get("partitionKey")?.get("paths")?.as_array()?;
        let joined: Vec<&str> = paths.iter().filter_map(serde_json::Value::as_str).collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined.join(","))
        }
    }
}

/// Connection information reported by an open data-plane connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// API spoken by this connection
    pub api: ApiKind,

    /// Host or account endpoint (never includes credentials)
    pub endpoint: String,

    /// Server version string, when the server reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}

/// A live data-plane connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Metadata captured when the connection was opened
    fn info(&self) -> &ConnectionInfo;

    /// List database names visible to this connection
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Release the underlying client resources
    async fn close(&self);
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("info", self.info()).finish()
    }
}

/// Opens data-plane connections from connection strings
#[async_trait]
pub trait DataPlaneClient: Send + Sync {
    /// Open and verify a connection; failures are `ConnectionFailed`
    async fn open(&self, connection_string: &str) -> Result<Arc<dyn Connection>>;
}

/// Detect the API from a connection string's shape
#[must_use]
pub fn detect_api(connection_string: &str) -> Option<ApiKind> {
    let trimmed = connection_string.trim_start();
    if trimmed.starts_with("mongodb://") || trimmed.starts_with("mongodb+srv://") {
        Some(ApiKind::Mongo)
    } else if trimmed.to_ascii_lowercase().starts_with("accountendpoint=") {
        Some(ApiKind::NoSql)
    } else {
        None
    }
}

/// Data-plane client that dispatches to the engine matching the connection string
pub struct RoutingDataPlane {
    #[cfg(feature = "nosql")]
    nosql: nosql::NoSqlDataPlane,
}

impl RoutingDataPlane {
    /// Fails with `ConfigError` when the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(feature = "nosql")]
            nosql: nosql::NoSqlDataPlane::new()?,
        })
    }
}

#[async_trait]
impl DataPlaneClient for RoutingDataPlane {
    async fn open(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        match detect_api(connection_string) {
            #[cfg(feature = "mongo")]
            Some(ApiKind::Mongo) => mongo::MongoDataPlane.open(connection_string).await,
            #[cfg(feature = "nosql")]
            Some(ApiKind::NoSql) => self.nosql.open(connection_string).await,
            #[allow(unreachable_patterns)]
            Some(api) => Err(CosmoError::connection_failed(format!(
                "Support for the {api} API is not compiled into this build"
            ))),
            None => Err(CosmoError::connection_failed(
                "Unrecognized connection string format (expected mongodb:// or AccountEndpoint=)",
            )),
        }
    }
}
