//! JSON Output Envelope Types
//!
//! Every CLI command prints exactly one envelope on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "api": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "api": "...", "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! `api` is `mongo`, `nosql`, or empty when the command is not tied to one API.

use serde::{Deserialize, Serialize};

use crate::error::CosmoError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    pub api: String,

    /// Command that was executed (connect, locate, overview, ...)
    pub command: String,

    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(api: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, api: api.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub api: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(api: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, api: api.into(), command: command.into(), error }
    }

    pub fn from_error(api: impl Into<String>, command: impl Into<String>, err: &CosmoError) -> Self {
        Self::new(api, command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Stable error code plus a message free of secrets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// e.g. "ACCOUNT_NOT_FOUND", "CONNECTION_FAILED"
    pub code: String,

    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub execution_ms: u64,

    /// Number of listed items, for list-shaped results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, items: None }
    }

    pub fn with_items(execution_ms: u64, items: usize) -> Self {
        Self { execution_ms, items: Some(items) }
    }
}
