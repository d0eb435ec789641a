//! Pipeline Orchestrator
//!
//! The two end-to-end connect flows:
//!
//! - direct: connection string → registry
//! - federated: account → token → resource id → management client →
//!   connection string → registry
//!
//! Every run re-derives its token and resource id. Only the registry caches
//! anything, and a failing stage leaves it untouched.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{FederatedTarget, ServerAuth, ServerProfile};
use crate::engine::{ApiKind, Connection};
use crate::error::{CosmoError, Result};
use crate::management::ManagementClientFactory;
use crate::registry::ConnectionRegistry;
use crate::selector::{select_connection_string, HumanChooser};

/// Composes the factory, chooser and registry into connect flows
#[derive(Clone)]
pub struct Pipeline {
    factory: ManagementClientFactory,
    chooser: Arc<dyn HumanChooser>,
    registry: Arc<ConnectionRegistry>,
}

impl Pipeline {
    pub fn new(
        factory: ManagementClientFactory,
        chooser: Arc<dyn HumanChooser>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self { factory, chooser, registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn factory(&self) -> &ManagementClientFactory {
        &self.factory
    }

    /// Connect with a connection string the caller already has
    #[instrument(skip(self, connection_string))]
    pub async fn connect_direct(&self, server_id: &str, connection_string: &str) -> Result<Arc<dyn Connection>> {
        if connection_string.trim().is_empty() {
            return Err(CosmoError::missing_connection_string(format!(
                "Server '{server_id}' has an empty connection string"
            )));
        }
        self.registry.connect(server_id, connection_string).await
    }

    /// Connect through a federated identity and the management plane
    #[instrument(skip(self, target), fields(account = %target.account_id, account_name = %target.account_name))]
    pub async fn connect_federated(
        &self,
        server_id: &str,
        target: &FederatedTarget,
        api: ApiKind,
    ) -> Result<Arc<dyn Connection>> {
        let client = self
            .factory
            .build_management_client(
                &target.account_id,
                &target.tenant_id,
                target.resource_id.as_deref(),
                &target.account_name,
                api,
            )
            .await?;

        let resource = &client.resource;
        info!(
            subscription = %resource.subscription_id,
            group = %resource.resource_group,
            "resolving connection string"
        );

        let connection_string = select_connection_string(
            client.plane.as_ref(),
            self.chooser.as_ref(),
            &resource.resource_group,
            &resource.account_name,
        )
        .await?;

        self.registry.connect(server_id, &connection_string).await
    }

    /// Connect a configured server using its auth mode
    pub async fn connect_profile(&self, server_id: &str, profile: &ServerProfile) -> Result<Arc<dyn Connection>> {
        match &profile.auth {
            ServerAuth::Direct { .. } => {
                let connection_string = profile.auth.direct_connection_string()?.ok_or_else(|| {
                    CosmoError::missing_connection_string(format!("Server '{server_id}' has no connection string"))
                })?;
                self.connect_direct(server_id, &connection_string).await
            }
            ServerAuth::Federated(target) => self.connect_federated(server_id, target, profile.api).await,
        }
    }
}
