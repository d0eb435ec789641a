//! Credential Provider
//!
//! Wraps the host identity store. The store knows which federated accounts exist
//! and how to exchange one for a bearer token; the provider adds lookup by id,
//! endpoint resolution and the error taxonomy on top.
//!
//! Tokens are acquired fresh for every pipeline run and never cached here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CosmoError, Result};
use crate::resource::ResourceIdentity;

pub mod client_secret;

pub use client_secret::ClientSecretAccountStore;

/// A federated identity registered with the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Stable account id
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Tenant used when the caller does not name one
    pub tenant_id: String,

    /// ARM base URI (e.g. `https://management.azure.com`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_endpoint: Option<String>,

    /// Portal base URI (e.g. `https://portal.azure.com`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_endpoint: Option<String>,
}

/// Short-lived bearer token
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    token_type: Option<String>,
}

impl Token {
    pub fn new(value: impl Into<String>, token_type: Option<String>) -> Self {
        Self { value: value.into(), token_type }
    }

    pub fn bearer(value: impl Into<String>) -> Self {
        Self::new(value, Some("Bearer".to_string()))
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// `Authorization` header value, defaulting the scheme to `Bearer`
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type.as_deref().unwrap_or("Bearer"), self.value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// A token together with the ARM endpoint it was issued for
#[derive(Debug, Clone)]
pub struct ArmCredentials {
    pub token: Token,
    pub arm_endpoint: String,
}

/// Host identity store
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All accounts registered with the host
    async fn list_accounts(&self) -> Result<Vec<AccountIdentity>>;

    /// Exchange an account for a token; `None` means the exchange produced nothing
    async fn get_token(&self, account: &AccountIdentity, tenant_id: &str, scope: &str) -> Result<Option<Token>>;
}

/// Account lookup and token exchange over an `AccountStore`
#[derive(Clone)]
pub struct CredentialProvider {
    store: Arc<dyn AccountStore>,
}

impl CredentialProvider {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountIdentity>> {
        self.store.list_accounts().await
    }

    /// Find an account by id; the first match wins
    pub async fn find_account(&self, account_id: &str) -> Result<AccountIdentity> {
        self.store
            .list_accounts()
            .await?
            .into_iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| CosmoError::account_not_found(account_id))
    }

    /// Acquire an ARM token for `account` in `tenant_id`
    pub async fn acquire_token(&self, account: &AccountIdentity, tenant_id: &str) -> Result<Token> {
        let scope = format!("{}/.default", self.arm_endpoint(account)?);
        debug!(account = %account.id, tenant_id, "acquiring token");

        match self.store.get_token(account, tenant_id, &scope).await {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(CosmoError::token_acquisition_failed(format!(
                "no token returned for account '{}' in tenant '{tenant_id}'",
                account.id
            ))),
            Err(e @ CosmoError::RemoteRequestFailed { .. }) => Err(CosmoError::token_acquisition_failed(
                format!("account '{}': {}", account.id, e.message()),
            )),
            Err(e) => Err(e),
        }
    }

    pub fn arm_endpoint(&self, account: &AccountIdentity) -> Result<String> {
        endpoint(account, account.arm_endpoint.as_deref(), "arm")
    }

    pub fn portal_endpoint(&self, account: &AccountIdentity) -> Result<String> {
        endpoint(account, account.portal_endpoint.as_deref(), "portal")
    }

    /// Portal deep link for a resource
    pub fn portal_resource_url(&self, account: &AccountIdentity, resource: &ResourceIdentity) -> Result<String> {
        Ok(format!(
            "{}/#@{}/resource{}",
            self.portal_endpoint(account)?,
            account.tenant_id,
            resource.resource_id
        ))
    }
}

fn endpoint(account: &AccountIdentity, value: Option<&str>, name: &str) -> Result<String> {
    value
        .map(|v| v.trim().trim_end_matches('/'))
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| CosmoError::endpoint_not_configured(&account.id, name))
}
