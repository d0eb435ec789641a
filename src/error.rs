//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout cosmolink.
//! Every pipeline stage fails fast and hands its error to the caller unchanged,
//! so each variant maps to exactly one stable error code for JSON output.
//!
//! # Error Categories
//! - `MalformedResourceId`: resource path does not have the ARM shape
//! - `AccountNotFound`, `EndpointNotConfigured`, `TokenAcquisitionFailed`: identity problems
//! - `AzureResourceNotFound`: resource discovery returned nothing
//! - `NoConnectionStringsFound`, `MissingConnectionString`: no usable credential material
//! - `ConnectionFailed`: the data-plane connection could not be opened
//! - `RemoteRequestFailed`: a management, metrics or token endpoint answered with an error
//! - `InvalidInput`, `ConfigError`: caller or configuration mistakes

use thiserror::Error;

/// Main error type for cosmolink operations
#[derive(Error, Debug)]
pub enum CosmoError {
    /// Resource path is not a fully-qualified ARM identifier
    #[error("Malformed resource id: {0}")]
    MalformedResourceId(String),

    /// No registered account matches the requested id
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account metadata lacks the requested endpoint
    #[error("Endpoint '{endpoint}' is not configured for account '{account}'")]
    EndpointNotConfigured { account: String, endpoint: String },

    /// Token exchange returned no token
    #[error("Token acquisition failed: {0}")]
    TokenAcquisitionFailed(String),

    /// Resource-graph discovery returned zero rows
    #[error("Azure resource not found: {0}")]
    AzureResourceNotFound(String),

    /// Management plane returned no connection strings
    #[error("No connection strings found: {0}")]
    NoConnectionStringsFound(String),

    /// No connection string could be selected (including dismissed pickers)
    #[error("Missing connection string: {0}")]
    MissingConnectionString(String),

    /// Data-plane connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Remote endpoint returned an error response
    #[error("Remote request to {service} failed{}: {detail}", status_suffix(.status))]
    RemoteRequestFailed { service: String, status: Option<u16>, detail: String },

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CosmoError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedResourceId(_) => "MALFORMED_RESOURCE_ID",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::EndpointNotConfigured { .. } => "ENDPOINT_NOT_CONFIGURED",
            Self::TokenAcquisitionFailed(_) => "TOKEN_ACQUISITION_FAILED",
            Self::AzureResourceNotFound(_) => "AZURE_RESOURCE_NOT_FOUND",
            Self::NoConnectionStringsFound(_) => "NO_CONNECTION_STRINGS_FOUND",
            Self::MissingConnectionString(_) => "MISSING_CONNECTION_STRING",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::RemoteRequestFailed { .. } => "REMOTE_REQUEST_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Human-readable message, safe to print (never carries tokens or keys)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// True when a remote endpoint reported that the entity does not exist
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RemoteRequestFailed { status: Some(404), .. })
    }

    pub fn malformed_resource_id(message: impl Into<String>) -> Self {
        Self::MalformedResourceId(message.into())
    }

    pub fn account_not_found(account_id: impl Into<String>) -> Self {
        Self::AccountNotFound(account_id.into())
    }

    pub fn endpoint_not_configured(account: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::EndpointNotConfigured { account: account.into(), endpoint: endpoint.into() }
    }

    pub fn token_acquisition_failed(message: impl Into<String>) -> Self {
        Self::TokenAcquisitionFailed(message.into())
    }

    pub fn azure_resource_not_found(message: impl Into<String>) -> Self {
        Self::AzureResourceNotFound(message.into())
    }

    pub fn no_connection_strings_found(message: impl Into<String>) -> Self {
        Self::NoConnectionStringsFound(message.into())
    }

    pub fn missing_connection_string(message: impl Into<String>) -> Self {
        Self::MissingConnectionString(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a remote request error; `status` is `None` for transport failures
    pub fn remote(service: impl Into<String>, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::RemoteRequestFailed { service: service.into(), status, detail: detail.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result type alias for cosmolink operations
pub type Result<T> = std::result::Result<T, CosmoError>;
