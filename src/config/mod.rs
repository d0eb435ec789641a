//! Configuration Management
//!
//! This module loads and saves server profiles and the accounts they authenticate with.
//!
//! # Configuration Locations
//! - Local: `.cosmolink/config.json` (team-shareable, per-project)
//! - Global: `~/.config/cosmolink/servers.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit connection parameters (highest priority)
//! 2. Local config file (`.cosmolink/config.json`)
//! 3. Global config file (`~/.config/cosmolink/servers.json`)
//!
//! # Secrets
//! Connection strings and client secrets may be referenced through environment
//! variables (`connection_string_env`, `client_secret_env`) instead of being stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::credential::AccountIdentity;
use crate::engine::ApiKind;
use crate::error::{CosmoError, Result};

const LOCAL_DIR: &str = ".cosmolink";
const LOCAL_FILE: &str = "config.json";
const GLOBAL_FILE: &str = "servers.json";

/// Server catalog (the content of one config file)
///
/// ```json
/// {
///   "servers": {
///     "orders": { "api": "mongo", "auth": "federated", "account_id": "work",
///                 "tenant_id": "contoso", "account_name": "orders-db" },
///     "local": { "api": "mongo", "auth": "direct",
///                "connection_string_env": "LOCAL_MONGO_URI" }
///   },
///   "accounts": {
///     "work": { "tenant_id": "contoso", "client_id": "...",
///               "client_secret_env": "WORK_CLIENT_SECRET",
///               "arm_endpoint": "https://management.azure.com" }
///   },
///   "default": "orders"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCatalog {
    /// Named server profiles
    #[serde(default)]
    pub servers: BTreeMap<String, ServerProfile>,

    /// Federated accounts, keyed by account id
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountProfile>,

    /// Name of the default server (must exist in `servers`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One configured server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    /// Database API of this server
    pub api: ApiKind,

    /// How to authenticate
    #[serde(flatten)]
    pub auth: ServerAuth,
}

/// Authentication mode of a server profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth", rename_all = "lowercase")]
pub enum ServerAuth {
    /// Connection string supplied directly or through an environment variable
    Direct {
        /// WARNING: Sensitive data, do not log or include in error messages
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_string: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_string_env: Option<String>,
    },

    /// Federated identity resolved through the management plane
    Federated(FederatedTarget),
}

/// Everything the federated flow needs to find an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedTarget {
    /// Account id in the host identity store
    pub account_id: String,

    /// Tenant to request the token from
    pub tenant_id: String,

    /// Database account name (used for discovery when `resource_id` is absent)
    pub account_name: String,

    /// Fully-qualified resource id; skips discovery when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ServerAuth {
    /// Resolve the direct connection string (env indirection wins over inline)
    ///
    /// Returns `None` for federated profiles.
    pub fn direct_connection_string(&self) -> Result<Option<String>> {
        match self {
            Self::Direct { connection_string, connection_string_env } => {
                if let Some(env_var) = connection_string_env {
                    return std::env::var(env_var).map(Some).map_err(|_| {
                        CosmoError::config_error(format!(
                            "Environment variable {env_var} not found for connection string"
                        ))
                    });
                }
                connection_string.clone().map(Some).ok_or_else(|| {
                    CosmoError::config_error(
                        "Direct server needs 'connection_string' or 'connection_string_env'",
                    )
                })
            }
            Self::Federated(_) => Ok(None),
        }
    }
}

/// A federated account record (an app registration with a client secret)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Home tenant of the app registration
    pub tenant_id: String,

    /// Application (client) id
    pub client_id: String,

    /// Environment variable holding the client secret
    pub client_secret_env: String,

    /// Identity authority, defaults to the public cloud
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_endpoint: Option<String>,
}

impl AccountProfile {
    /// The identity-store view of this profile
    #[must_use]
    pub fn identity(&self, id: &str) -> AccountIdentity {
        AccountIdentity {
            id: id.to_string(),
            display_name: self.display_name.clone(),
            tenant_id: self.tenant_id.clone(),
            arm_endpoint: self.arm_endpoint.clone(),
            portal_endpoint: self.portal_endpoint.clone(),
        }
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.cosmolink/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/cosmolink/servers.json` (per-user)
    Global,
}

/// Get path to local config file (`.cosmolink/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        CosmoError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(LOCAL_DIR).join(LOCAL_FILE))
}

/// Get path to global config file (`~/.config/cosmolink/servers.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| CosmoError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("cosmolink").join(GLOBAL_FILE))
}

/// Path for a location
pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load a catalog from a config file; a missing file is an empty catalog
pub fn load_catalog(path: &Path) -> Result<ServerCatalog> {
    if !path.exists() {
        return Ok(ServerCatalog::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| CosmoError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| CosmoError::config_error(format!("Invalid config file format: {e}")))
}

/// Save a catalog, creating parent directories
pub fn save_catalog(path: &Path, catalog: &ServerCatalog) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            CosmoError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(catalog)
        .map_err(|e| CosmoError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| CosmoError::config_error(format!("Could not write config file: {e}")))
}

/// Merge `local` over `global`: same-named servers and accounts are replaced,
/// and a local default overrides the global one
#[must_use]
pub fn merge(global: ServerCatalog, local: ServerCatalog) -> ServerCatalog {
    let mut merged = global;
    merged.servers.extend(local.servers);
    merged.accounts.extend(local.accounts);
    if local.default.is_some() {
        merged.default = local.default;
    }
    merged
}

/// Load both config files with local taking precedence
pub fn load_with_precedence() -> Result<ServerCatalog> {
    let global = load_catalog(&global_config_path()?)?;
    let local = load_catalog(&local_config_path()?)?;
    Ok(merge(global, local))
}

impl ServerCatalog {
    /// Resolve a server by name, or the default server when `name` is `None`
    pub fn resolve_server(&self, name: Option<&str>) -> Result<(String, ServerProfile)> {
        let server_name = match name {
            Some(n) => n.to_string(),
            None => self.default.clone().ok_or_else(|| {
                let available: Vec<_> = self.servers.keys().collect();
                CosmoError::config_error(format!(
                    "No default server set. Available servers: {available:?}. \
                     Specify one with --server or set a default in the config."
                ))
            })?,
        };

        let profile = self.servers.get(&server_name).ok_or_else(|| {
            let available: Vec<_> = self.servers.keys().collect();
            let default_info = match &self.default {
                Some(d) => format!(" (default: '{d}')"),
                None => String::new(),
            };
            CosmoError::config_error(format!(
                "Server '{server_name}' not found. Available servers: {available:?}{default_info}"
            ))
        })?;

        Ok((server_name, profile.clone()))
    }

    /// Insert or replace a server; the first server becomes the default
    pub fn insert_server(&mut self, name: String, profile: ServerProfile) {
        let is_first = self.servers.is_empty();
        self.servers.insert(name.clone(), profile);
        if is_first || self.default.is_none() {
            self.default = Some(name);
        }
    }
}

/// Resolve a server from the merged configuration
pub fn resolve_server(name: Option<&str>) -> Result<(String, ServerProfile)> {
    load_with_precedence()?.resolve_server(name)
}

/// Save a server profile to a config file
pub fn save_server(name: String, profile: ServerProfile, location: ConfigLocation) -> Result<()> {
    let path = config_path(location)?;
    let mut catalog = load_catalog(&path)?;
    catalog.insert_server(name, profile);
    save_catalog(&path, &catalog)
}

/// List servers from the merged configuration as `(name, api, auth mode)`
pub fn list_servers() -> Result<Vec<(String, ApiKind, &'static str)>> {
    let catalog = load_with_precedence()?;
    let mut servers = Vec::new();
    for (name, profile) in catalog.servers {
        let mode = match &profile.auth {
            ServerAuth::Direct { connection_string: None, connection_string_env: None } => {
                warn!(server = %name, "direct server has no connection string configured");
                "direct"
            }
            ServerAuth::Direct { .. } => "direct",
            ServerAuth::Federated(_) => "federated",
        };
        servers.push((name, profile.api, mode));
    }
    Ok(servers)
}
