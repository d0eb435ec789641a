//! Account store backed by configured service principals
//!
//! Each configured account is an app registration; tokens come from the OAuth2
//! client-credentials grant. The client secret is read from the environment
//! variable named in the profile at exchange time and never stored.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{AccountIdentity, AccountStore, Token};
use crate::config::AccountProfile;
use crate::error::{CosmoError, Result};
use crate::http;

/// Default identity authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// `AccountStore` over `accounts` entries from configuration
pub struct ClientSecretAccountStore {
    accounts: BTreeMap<String, AccountProfile>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
}

impl ClientSecretAccountStore {
    pub fn new(accounts: impl IntoIterator<Item = (String, AccountProfile)>) -> Result<Self> {
        Ok(Self { accounts: accounts.into_iter().collect(), http: http::client()? })
    }

    /// Token endpoint for a tenant
    #[must_use]
    pub fn token_url(profile: &AccountProfile, tenant_id: &str) -> String {
        let authority = profile.authority.as_deref().unwrap_or(DEFAULT_AUTHORITY).trim_end_matches('/');
        format!("{authority}/{tenant_id}/oauth2/v2.0/token")
    }
}

#[async_trait]
impl AccountStore for ClientSecretAccountStore {
    async fn list_accounts(&self) -> Result<Vec<AccountIdentity>> {
        Ok(self.accounts.iter().map(|(id, profile)| profile.identity(id)).collect())
    }

    async fn get_token(&self, account: &AccountIdentity, tenant_id: &str, scope: &str) -> Result<Option<Token>> {
        let profile = self
            .accounts
            .get(&account.id)
            .ok_or_else(|| CosmoError::account_not_found(&account.id))?;

        // Note: the secret value itself is never logged
        let secret = std::env::var(&profile.client_secret_env).map_err(|_| {
            CosmoError::config_error(format!(
                "Environment variable {} not found for account '{}'",
                profile.client_secret_env, account.id
            ))
        })?;

        let url = Self::token_url(profile, tenant_id);
        debug!(account = %account.id, %url, "requesting client-credentials token");

        let request = self.http.post(url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", profile.client_id.as_str()),
            ("client_secret", secret.as_str()),
            ("scope", scope),
        ]);
        let response: TokenResponse = http::send_json("token endpoint", request).await?;

        match response.access_token.filter(|t| !t.is_empty()) {
            Some(value) => Ok(Some(Token::new(value, response.token_type))),
            None => {
                warn!(account = %account.id, "token endpoint answered without an access token");
                Ok(None)
            }
        }
    }
}
