//! Cosmolink - credential and connection resolution for database accounts
//!
//! Turns a configured server into a live data-plane connection for Mongo-API and
//! NoSQL-API database accounts. A server is reached either with a connection
//! string the user already has, or through a federated identity:
//!
//! ```text
//! account -> token -> resource id -> management client -> connection string -> connection
//! ```
//!
//! # Module Organization
//! - [`error`] - Error taxonomy and `Result` alias
//! - [`output`] - JSON output envelopes
//! - [`engine`] - API variants and data-plane drivers
//! - [`resource`] - Resource id parsing and account discovery
//! - [`credential`] - Federated accounts and token exchange
//! - [`management`] - Management/metrics clients and account overview
//! - [`selector`] - Connection string selection
//! - [`registry`] - Live connection cache
//! - [`pipeline`] - End-to-end connect flows
//! - [`config`] - Server and account configuration

pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod http;
pub mod management;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod resource;
pub mod selector;

pub use config::{
    list_servers, load_with_precedence, resolve_server, save_server, ConfigLocation, FederatedTarget, ServerAuth,
    ServerCatalog, ServerProfile,
};
pub use credential::{AccountIdentity, AccountStore, CredentialProvider, Token};
pub use engine::{ApiKind, ApiVariant, Connection, ConnectionInfo, DataPlaneClient};
pub use error::{CosmoError, Result};
pub use management::{ManagementClientFactory, ManagementPlane, MetricsPlane};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use pipeline::Pipeline;
pub use registry::{ConnectionRegistry, ConnectionState};
pub use resource::ResourceIdentity;
pub use selector::{select_connection_string, HumanChooser, PICK_MAX_ATTEMPTS};
