//! Mongo-API Data-Plane Engine
//!
//! Opens connections through the official `mongodb` driver. The driver owns the
//! wire protocol; this module only parses the connection string, verifies the
//! server with a `ping`, and exposes the few operations the registry needs.
//!
//! # Implementation Notes
//! - Driver errors are reported by kind only, the raw URI may contain a password
//! - Server selection is bounded so an unreachable host fails instead of hanging

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::engine::{ApiKind, Connection, ConnectionInfo, DataPlaneClient};
use crate::error::{CosmoError, Result};

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);
const APP_NAME: &str = "cosmolink";

/// Mongo-API data-plane client
pub struct MongoDataPlane;

#[async_trait]
impl DataPlaneClient for MongoDataPlane {
    async fn open(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        let mut options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| CosmoError::connection_failed(format!("Invalid Mongo connection string: {}", e.kind)))?;

        options.app_name = Some(APP_NAME.to_string());
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        }

        let endpoint = options.hosts.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");

        let client = Client::with_options(options).map_err(|e| {
            CosmoError::connection_failed(format!("Failed to create Mongo client: {}", e.kind))
        })?;

        let admin = client.database("admin");
        admin.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            CosmoError::connection_failed(format!("Failed to reach Mongo server at {endpoint}: {}", e.kind))
        })?;

        // buildInfo is optional on some managed offerings
        let server_version = match admin.run_command(doc! { "buildInfo": 1 }).await {
            Ok(info) => info.get_str("version").ok().map(String::from),
            Err(e) => {
                debug!(%endpoint, error = %e.kind, "buildInfo unavailable");
                None
            }
        };

        Ok(Arc::new(MongoConnection {
            client,
            info: ConnectionInfo { api: ApiKind::Mongo, endpoint, server_version },
        }))
    }
}

/// Live Mongo-API connection
pub struct MongoConnection {
    client: Client,
    info: ConnectionInfo,
}

#[async_trait]
impl Connection for MongoConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.client.list_database_names().await.map_err(|e| {
            CosmoError::connection_failed(format!("Failed to list Mongo databases: {}", e.kind))
        })
    }

    async fn close(&self) {
        // Client is a cheap handle; shutting down a clone closes the shared pool
        self.client.clone().shutdown().await;
        debug!(endpoint = %self.info.endpoint, "mongo connection closed");
    }
}
