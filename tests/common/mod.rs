//! Fakes for every collaborator seam, shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cosmolink::credential::{AccountIdentity, AccountStore, ArmCredentials, CredentialProvider, Token};
use cosmolink::engine::{ApiKind, Connection, ConnectionInfo, DataPlaneClient};
use cosmolink::management::{
    CollectionInfo, ConnectionStringCandidate, DatabaseAccount, DatabaseInfo, ManagementBinding,
    ManagementClientFactory, ManagementConnector, ManagementPlane, MetricValue, MetricsPlane, Throughput,
};
use cosmolink::registry::ConnectionRegistry;
use cosmolink::resource::{ResourceLocator, ResourceQueryExecutor};
use cosmolink::selector::HumanChooser;
use cosmolink::{CosmoError, Pipeline, Result};

pub const ACCOUNT_ID: &str = "work";
pub const TENANT_ID: &str = "contoso";
pub const RESOURCE_ID: &str =
    "/subscriptions/sub-1/resourceGroups/rg-data/providers/Microsoft.DocumentDB/databaseAccounts/orders";

// ============================================================================
// Identity store
// ============================================================================

pub struct FakeStore {
    pub accounts: Vec<AccountIdentity>,
    pub token: Option<&'static str>,
    pub token_calls: AtomicUsize,
}

impl FakeStore {
    pub fn with_account() -> Self {
        Self {
            accounts: vec![AccountIdentity {
                id: ACCOUNT_ID.to_string(),
                display_name: Some("Work".to_string()),
                tenant_id: TENANT_ID.to_string(),
                arm_endpoint: Some("https://management.azure.com".to_string()),
                portal_endpoint: Some("https://portal.azure.com".to_string()),
            }],
            token: Some("token-value"),
            token_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AccountStore for FakeStore {
    async fn list_accounts(&self) -> Result<Vec<AccountIdentity>> {
        Ok(self.accounts.clone())
    }

    async fn get_token(&self, _: &AccountIdentity, _: &str, _: &str) -> Result<Option<Token>> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.map(Token::bearer))
    }
}

// ============================================================================
// Resource graph
// ============================================================================

pub struct CountingExecutor {
    pub rows: Vec<Value>,
    pub calls: AtomicUsize,
}

impl CountingExecutor {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows, calls: AtomicUsize::new(0) }
    }

    pub fn one_row() -> Self {
        Self::new(vec![json!({ "id": RESOURCE_ID, "name": "orders" })])
    }
}

#[async_trait]
impl ResourceQueryExecutor for CountingExecutor {
    async fn query(&self, _: &ArmCredentials, _: &str, _: u32) -> Result<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

// ============================================================================
// Management plane
// ============================================================================

pub struct FakePlane {
    pub candidates: Option<Vec<ConnectionStringCandidate>>,
}

#[async_trait]
impl ManagementPlane for FakePlane {
    async fn list_connection_strings(&self, _: &str, _: &str) -> Result<Option<Vec<ConnectionStringCandidate>>> {
        Ok(self.candidates.clone())
    }

    async fn get_account(&self, _: &str, name: &str) -> Result<DatabaseAccount> {
        Ok(DatabaseAccount {
            id: RESOURCE_ID.to_string(),
            name: name.to_string(),
            location: None,
            kind: None,
            document_endpoint: None,
        })
    }

    async fn list_databases(&self, _: &str, _: &str) -> Result<Vec<DatabaseInfo>> {
        Ok(vec![])
    }

    async fn list_collections(&self, _: &str, _: &str, _: &str) -> Result<Vec<CollectionInfo>> {
        Ok(vec![])
    }

    async fn get_throughput(&self, _: &str, _: &str, _: &str) -> Result<Throughput> {
        Err(CosmoError::remote("management plane", Some(404), "NotFound"))
    }
}

pub struct NoMetrics;

#[async_trait]
impl MetricsPlane for NoMetrics {
    async fn list_metrics(&self, _: &str, _: Option<&str>, _: &[&str]) -> Result<Vec<MetricValue>> {
        Ok(vec![])
    }
}

/// Counts constructed clients and records the subscription they were bound to
pub struct FakeConnector {
    pub candidates: Option<Vec<ConnectionStringCandidate>>,
    pub built: AtomicUsize,
    pub subscriptions: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(candidates: Option<Vec<ConnectionStringCandidate>>) -> Self {
        Self { candidates, built: AtomicUsize::new(0), subscriptions: Mutex::new(Vec::new()) }
    }
}

impl ManagementConnector for FakeConnector {
    fn management(&self, binding: ManagementBinding, _: ApiKind) -> Result<Arc<dyn ManagementPlane>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().push(binding.subscription_id);
        Ok(Arc::new(FakePlane { candidates: self.candidates.clone() }))
    }

    fn metrics(&self, _: ManagementBinding) -> Result<Arc<dyn MetricsPlane>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(NoMetrics))
    }
}

pub fn candidate(description: &str, value: &str) -> ConnectionStringCandidate {
    ConnectionStringCandidate { description: description.to_string(), connection_string: Some(value.to_string()) }
}

// ============================================================================
// Chooser
// ============================================================================

pub struct ScriptedChooser {
    answers: Mutex<VecDeque<Option<usize>>>,
    pub calls: AtomicUsize,
}

impl ScriptedChooser {
    pub fn new(answers: &[Option<usize>]) -> Self {
        Self { answers: Mutex::new(answers.iter().copied().collect()), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl HumanChooser for ScriptedChooser {
    async fn choose(&self, _: &[ConnectionStringCandidate], _: usize) -> Result<Option<usize>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().pop_front().flatten())
    }
}

// ============================================================================
// Data plane
// ============================================================================

pub struct FakeConnection {
    pub info: ConnectionInfo,
    pub closed: AtomicBool,
}

#[async_trait]
impl Connection for FakeConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(vec!["sales".to_string()])
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connection strings containing "unreachable" fail to open
#[derive(Default)]
pub struct FakeDataPlane {
    pub opened: Mutex<Vec<Arc<FakeConnection>>>,
    pub attempts: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeDataPlane {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn opened(&self) -> Vec<Arc<FakeConnection>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl DataPlaneClient for FakeDataPlane {
    async fn open(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if connection_string.contains("unreachable") {
            return Err(CosmoError::connection_failed("no reachable servers"));
        }
        let connection = Arc::new(FakeConnection {
            info: ConnectionInfo { api: ApiKind::Mongo, endpoint: connection_string.to_string(), server_version: None },
            closed: AtomicBool::new(false),
        });
        self.opened.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// A pipeline over fakes, with handles to inspect every collaborator
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub executor: Arc<CountingExecutor>,
    pub connector: Arc<FakeConnector>,
    pub chooser: Arc<ScriptedChooser>,
    pub data_plane: Arc<FakeDataPlane>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(
        executor: CountingExecutor,
        candidates: Option<Vec<ConnectionStringCandidate>>,
        answers: &[Option<usize>],
    ) -> Self {
        Self::with_store(FakeStore::with_account(), executor, candidates, answers)
    }

    pub fn with_store(
        store: FakeStore,
        executor: CountingExecutor,
        candidates: Option<Vec<ConnectionStringCandidate>>,
        answers: &[Option<usize>],
    ) -> Self {
        let store = Arc::new(store);
        let executor = Arc::new(executor);
        let connector = Arc::new(FakeConnector::new(candidates));
        let chooser = Arc::new(ScriptedChooser::new(answers));
        let data_plane = Arc::new(FakeDataPlane::default());

        let factory = ManagementClientFactory::new(
            CredentialProvider::new(Arc::clone(&store) as Arc<dyn AccountStore>),
            ResourceLocator::new(Arc::clone(&executor) as Arc<dyn ResourceQueryExecutor>),
            Arc::clone(&connector) as Arc<dyn ManagementConnector>,
        );
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&data_plane) as Arc<dyn DataPlaneClient>));
        let pipeline = Pipeline::new(factory, Arc::clone(&chooser) as Arc<dyn HumanChooser>, registry);

        Self { store, executor, connector, chooser, data_plane, pipeline }
    }
}
