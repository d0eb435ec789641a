//! Connection Registry
//!
//! Caches one live data-plane connection per server id. Each key moves through
//! `Absent -> Connecting -> Connected -> Absent`.
//!
//! Connects for the same key are serialized by a per-key async mutex. A caller
//! that finds an attempt already in flight waits for it and reuses the result
//! when it succeeded. Connects that do not overlap simply overwrite.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::{Connection, DataPlaneClient};
use crate::error::{CosmoError, Result};

/// Observable per-key state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Absent,
    Connecting,
    Connected,
}

struct Entry {
    connection: Arc<dyn Connection>,
    generation: u64,
}

/// Shared cache of open connections keyed by server id
pub struct ConnectionRegistry {
    client: Arc<dyn DataPlaneClient>,
    entries: Mutex<HashMap<String, Entry>>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    connecting: Mutex<HashSet<String>>,
    generation: AtomicU64,
}

/// Marks a key as connecting for as long as it lives
struct ConnectingMark<'a> {
    set: &'a Mutex<HashSet<String>>,
    server_id: &'a str,
}

impl<'a> ConnectingMark<'a> {
    fn new(set: &'a Mutex<HashSet<String>>, server_id: &'a str) -> Self {
        set.lock().insert(server_id.to_string());
        Self { set, server_id }
    }
}

impl Drop for ConnectingMark<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(self.server_id);
    }
}

impl ConnectionRegistry {
    pub fn new(client: Arc<dyn DataPlaneClient>) -> Self {
        Self {
            client,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            connecting: Mutex::new(HashSet::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Open a connection for `server_id` and cache it
    ///
    /// Replaces (and then closes) any previous entry. On failure the registry is
    /// left unchanged and `ConnectionFailed` is returned.
    pub async fn connect(&self, server_id: &str, connection_string: &str) -> Result<Arc<dyn Connection>> {
        let lock = self.guard(server_id);
        let observed = self.entry_generation(server_id);

        let held = match lock.try_lock() {
            Ok(held) => held,
            Err(_) => {
                debug!(server_id, "connect already in flight, waiting");
                let held = lock.lock().await;
                if let Some(entry) = self.entries.lock().get(server_id) {
                    if Some(entry.generation) != observed {
                        debug!(server_id, "reusing connection from concurrent attempt");
                        return Ok(Arc::clone(&entry.connection));
                    }
                }
                held
            }
        };

        let opened = {
            let _mark = ConnectingMark::new(&self.connecting, server_id);
            self.client.open(connection_string).await
        };
        let connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                drop(held);
                drop(lock);
                self.prune_guard(server_id);
                return Err(match e {
                    CosmoError::ConnectionFailed(_) => e,
                    other => CosmoError::connection_failed(other.message()),
                });
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.entries.lock().insert(
            server_id.to_string(),
            Entry { connection: Arc::clone(&connection), generation },
        );
        info!(server_id, endpoint = %connection.info().endpoint, "connected");

        if let Some(previous) = previous {
            debug!(server_id, "closing replaced connection");
            previous.connection.close().await;
        }
        Ok(connection)
    }

    #[must_use]
    pub fn has_connection(&self, server_id: &str) -> bool {
        self.entries.lock().contains_key(server_id)
    }

    #[must_use]
    pub fn get(&self, server_id: &str) -> Option<Arc<dyn Connection>> {
        self.entries.lock().get(server_id).map(|e| Arc::clone(&e.connection))
    }

    #[must_use]
    pub fn state(&self, server_id: &str) -> ConnectionState {
        if self.connecting.lock().contains(server_id) {
            ConnectionState::Connecting
        } else if self.has_connection(server_id) {
            ConnectionState::Connected
        } else {
            ConnectionState::Absent
        }
    }

    /// Cached server ids, sorted
    #[must_use]
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove the entry and close it; no-op when absent
    pub async fn disconnect(&self, server_id: &str) {
        let removed = self.entries.lock().remove(server_id);
        self.prune_guard(server_id);

        match removed {
            Some(entry) => {
                entry.connection.close().await;
                info!(server_id, "disconnected");
            }
            None => debug!(server_id, "disconnect on absent key"),
        }
    }

    /// Close every cached connection
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Entry)> = self.entries.lock().drain().collect();
        self.in_flight.lock().retain(|_, g| Arc::strong_count(g) > 1);
        if !self.connecting.lock().is_empty() {
            warn!("shutting down with connects still in flight");
        }
        for (server_id, entry) in drained {
            entry.connection.close().await;
            debug!(server_id, "closed on shutdown");
        }
    }

    fn guard(&self, server_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.in_flight.lock().entry(server_id.to_string()).or_default())
    }

    // Guards are only cloned under the map lock, so a count of one means idle
    fn prune_guard(&self, server_id: &str) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(server_id).is_some_and(|g| Arc::strong_count(g) == 1) {
            in_flight.remove(server_id);
        }
    }

    fn entry_generation(&self, server_id: &str) -> Option<u64> {
        self.entries.lock().get(server_id).map(|e| e.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ApiKind, ConnectionInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    struct FakeConnection {
        info: ConnectionInfo,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn info(&self) -> &ConnectionInfo {
            &self.info
        }

        async fn list_databases(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeClient {
        opened: Mutex<Vec<Arc<FakeConnection>>>,
        attempts: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeClient {
        fn slow(delay: Duration) -> Self {
            Self { delay: Some(delay), ..Self::default() }
        }

        fn opened(&self) -> Vec<Arc<FakeConnection>> {
            self.opened.lock().clone()
        }
    }

    #[async_trait]
    impl DataPlaneClient for FakeClient {
        async fn open(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if connection_string.contains("unreachable") {
                return Err(CosmoError::connection_failed("server selection timed out"));
            }
            let connection = Arc::new(FakeConnection {
                info: ConnectionInfo {
                    api: ApiKind::Mongo,
                    endpoint: connection_string.to_string(),
                    server_version: None,
                },
                closed: AtomicBool::new(false),
            });
            self.opened.lock().push(Arc::clone(&connection));
            Ok(connection)
        }
    }

    fn registry(client: &Arc<FakeClient>) -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::clone(client) as Arc<dyn DataPlaneClient>)
    }

    #[tokio::test]
    async fn test_connect_then_get_same_connection() {
        let client = Arc::new(FakeClient::default());
        let registry = registry(&client);

        let connection = registry.connect("prod", "mongodb://a").await.unwrap();
        assert!(registry.has_connection("prod"));
        assert_eq!(registry.state("prod"), ConnectionState::Connected);
        assert!(Arc::ptr_eq(&connection, &registry.get("prod").unwrap()));
        assert!(Arc::ptr_eq(&connection, &registry.get("prod").unwrap()));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_and_closes_previous() {
        let client = Arc::new(FakeClient::default());
        let registry = registry(&client);

        registry.connect("prod", "mongodb://a").await.unwrap();
        let second = registry.connect("prod", "mongodb://b").await.unwrap();

        let opened = client.opened();
        assert_eq!(opened.len(), 2);
        assert!(opened[0].closed.load(Ordering::SeqCst));
        assert!(!opened[1].closed.load(Ordering::SeqCst));
        assert_eq!(registry.get("prod").unwrap().info().endpoint, "mongodb://b");
        assert_eq!(second.info().endpoint, "mongodb://b");
        assert_eq!(registry.server_ids(), vec!["prod"]);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_registry_unchanged() {
        let client = Arc::new(FakeClient::default());
        let registry = registry(&client);

        let err = registry.connect("prod", "mongodb://unreachable").await.unwrap_err();
        assert!(matches!(err, CosmoError::ConnectionFailed(_)));
        assert!(!registry.has_connection("prod"));
        assert_eq!(registry.state("prod"), ConnectionState::Absent);

        registry.connect("prod", "mongodb://a").await.unwrap();
        let _ = registry.connect("prod", "mongodb://unreachable").await.unwrap_err();
        assert_eq!(registry.get("prod").unwrap().info().endpoint, "mongodb://a");
        assert!(!client.opened()[0].closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let client = Arc::new(FakeClient::default());
        let registry = registry(&client);

        registry.disconnect("missing").await;

        registry.connect("prod", "mongodb://a").await.unwrap();
        registry.disconnect("prod").await;
        assert!(!registry.has_connection("prod"));
        assert!(registry.get("prod").is_none());
        assert!(client.opened()[0].closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrent_same_key_opens_once() {
        let client = Arc::new(FakeClient::slow(Duration::from_millis(20)));
        let registry = registry(&client);

        let (a, b) = tokio::join!(registry.connect("prod", "mongodb://a"), registry.connect("prod", "mongodb://a"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(client.attempts.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!client.opened()[0].closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_waiter_retries_after_failed_attempt() {
        let client = Arc::new(FakeClient::slow(Duration::from_millis(20)));
        let registry = registry(&client);

        let (first, second) = tokio::join!(
            registry.connect("prod", "mongodb://unreachable"),
            registry.connect("prod", "mongodb://a")
        );
        assert!(first.is_err());
        assert_eq!(second.unwrap().info().endpoint, "mongodb://a");
        assert_eq!(client.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_interfere() {
        let client = Arc::new(FakeClient::slow(Duration::from_millis(10)));
        let registry = registry(&client);

        let (a, b) = tokio::join!(registry.connect("a", "mongodb://a"), registry.connect("b", "mongodb://b"));
        assert!(!Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(registry.server_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_state_while_connecting() {
        let client = Arc::new(FakeClient::slow(Duration::from_millis(50)));
        let registry = registry(&client);

        let observe = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.state("prod")
        };
        let (connected, during) = tokio::join!(registry.connect("prod", "mongodb://a"), observe);
        connected.unwrap();
        assert_eq!(during, ConnectionState::Connecting);
        assert_eq!(registry.state("prod"), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let client = Arc::new(FakeClient::default());
        let registry = registry(&client);

        registry.connect("a", "mongodb://a").await.unwrap();
        registry.connect("b", "mongodb://b").await.unwrap();
        registry.shutdown().await;

        assert!(registry.server_ids().is_empty());
        assert!(client.opened().iter().all(|c| c.closed.load(Ordering::SeqCst)));
        assert!(registry.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_connects_leave_no_guards() {
        let client = Arc::new(FakeClient::default());
        let registry = registry(&client);

        for i in 0..10 {
            let _ = registry.connect(&format!("server-{i}"), "mongodb://unreachable").await.unwrap_err();
        }
        assert!(registry.in_flight.lock().is_empty());

        registry.connect("prod", "mongodb://a").await.unwrap();
        assert_eq!(registry.in_flight.lock().len(), 1);
        registry.disconnect("prod").await;
        assert!(registry.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_failures_leave_no_guards() {
        let client = Arc::new(FakeClient::slow(Duration::from_millis(20)));
        let registry = registry(&client);

        let (first, second) = tokio::join!(
            registry.connect("prod", "mongodb://unreachable"),
            registry.connect("prod", "mongodb://unreachable")
        );
        assert!(first.is_err() && second.is_err());
        assert_eq!(client.attempts.load(Ordering::SeqCst), 2);
        assert!(registry.in_flight.lock().is_empty());
    }
}
