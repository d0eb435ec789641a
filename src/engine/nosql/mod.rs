//! NoSQL-API Data-Plane Engine
//!
//! Connects to a NoSQL-API account with a master-key connection string
//! (`AccountEndpoint=...;AccountKey=...;`). Every request is signed with the
//! account key (HMAC-SHA256 over verb, resource type, resource link and date), and
//! the connection is verified by reading the account root.
//!
//! # Implementation Notes
//! - The account key is decoded once and never logged or echoed in errors
//! - Only the handful of reads the registry needs are implemented

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::engine::{ApiKind, Connection, ConnectionInfo, DataPlaneClient};
use crate::error::{CosmoError, Result};

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2018-12-31";

/// Parsed master-key connection string
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKeyCredential {
    /// Account endpoint, always ending in `/`
    pub endpoint: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for AccountKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKeyCredential")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl AccountKeyCredential {
    /// Parse `AccountEndpoint=...;AccountKey=...;` (keys are case-insensitive)
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut endpoint = None;
        let mut key = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "accountendpoint" => endpoint = Some(value.trim().to_string()),
                "accountkey" => key = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let mut endpoint = endpoint.filter(|e| !e.is_empty()).ok_or_else(|| {
            CosmoError::connection_failed("NoSQL connection string is missing AccountEndpoint")
        })?;
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        let key = key.filter(|k| !k.is_empty()).ok_or_else(|| {
            CosmoError::connection_failed("NoSQL connection string is missing AccountKey")
        })?;
        let key = STANDARD
            .decode(key.as_bytes())
            .map_err(|_| CosmoError::connection_failed("NoSQL AccountKey is not valid base64"))?;

        Ok(Self { endpoint, key })
    }

    /// Build the `authorization` header value for one request
    pub fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.to_lowercase(),
            resource_link,
            date.to_lowercase()
        );

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| CosmoError::connection_failed("NoSQL AccountKey has an invalid length"))?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(urlencoding::encode(&format!("type=master&ver=1.0&sig={signature}")).into_owned())
    }
}

/// RFC 1123 date in the form the service expects
fn request_date() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// NoSQL-API data-plane client
pub struct NoSqlDataPlane {
    http: reqwest::Client,
}

impl NoSqlDataPlane {
    /// Build a client over the shared HTTP stack
    pub fn new() -> Result<Self> {
        Ok(Self { http: crate::http::client()? })
    }
}

#[async_trait]
impl DataPlaneClient for NoSqlDataPlane {
    async fn open(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        let credential = AccountKeyCredential::parse(connection_string)?;
        let mut connection = NoSqlConnection {
            http: self.http.clone(),
            info: ConnectionInfo {
                api: ApiKind::NoSql,
                endpoint: credential.endpoint.clone(),
                server_version: None,
            },
            credential,
            closed: AtomicBool::new(false),
        };

        let response = connection.get("", "").await?;
        let server_version = response
            .headers()
            .get("x-ms-serviceversion")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start_matches("version=").to_string());

        connection.info.server_version = server_version;
        Ok(Arc::new(connection))
    }
}

/// Live NoSQL-API connection
pub struct NoSqlConnection {
    http: reqwest::Client,
    credential: AccountKeyCredential,
    info: ConnectionInfo,
    closed: AtomicBool,
}

#[derive(Deserialize)]
struct DatabaseFeed {
    #[serde(rename = "Databases", default)]
    databases: Vec<DatabaseEntry>,
}

#[derive(Deserialize)]
struct DatabaseEntry {
    id: String,
}

impl NoSqlConnection {
    /// Signed GET against `{endpoint}{resource_type}`
    async fn get(&self, resource_type: &str, resource_link: &str) -> Result<reqwest::Response> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CosmoError::connection_failed("NoSQL connection is closed"));
        }

        let date = request_date();
        let authorization = self.credential.authorization("GET", resource_type, resource_link, &date)?;

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            "x-ms-date",
            HeaderValue::from_str(&date)
                .map_err(|e| CosmoError::connection_failed(format!("Invalid request date: {e}")))?,
        );
        headers.insert(
            "authorization",
            HeaderValue::from_str(&authorization)
                .map_err(|_| CosmoError::connection_failed("Invalid authorization header"))?,
        );

        let url = format!("{}{}", self.credential.endpoint, resource_type);
        let response = self.http.get(&url).headers(headers).send().await.map_err(|e| {
            CosmoError::connection_failed(format!(
                "Failed to reach NoSQL account at {}: {}",
                self.info.endpoint,
                e.without_url()
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CosmoError::connection_failed(format!(
                "NoSQL account at {} rejected the request ({status})",
                self.info.endpoint
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl Connection for NoSqlConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let feed: DatabaseFeed = self.get("dbs", "").await?.json().await.map_err(|e| {
            CosmoError::connection_failed(format!("Invalid database feed: {}", e.without_url()))
        })?;
        Ok(feed.databases.into_iter().map(|d| d.id).collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!(endpoint = %self.info.endpoint, "nosql connection closed");
    }
}
