//! Connection registry under concurrent use

mod common;

use common::FakeDataPlane;
use cosmolink::engine::DataPlaneClient;
use cosmolink::registry::ConnectionRegistry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn registry(data_plane: &Arc<FakeDataPlane>) -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::new(Arc::clone(data_plane) as Arc<dyn DataPlaneClient>))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_connects_open_once() {
    let data_plane = Arc::new(FakeDataPlane::slow(Duration::from_millis(50)));
    let registry = registry(&data_plane);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.connect("prod", "mongodb://a").await })
        })
        .collect();

    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap().unwrap());
    }

    assert_eq!(data_plane.attempts.load(Ordering::SeqCst), 1);
    assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
    assert!(Arc::ptr_eq(&connections[0], &registry.get("prod").unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_connect_independently() {
    let data_plane = Arc::new(FakeDataPlane::slow(Duration::from_millis(20)));
    let registry = registry(&data_plane);

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.connect(&format!("server-{i}"), &format!("mongodb://host-{i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(data_plane.attempts.load(Ordering::SeqCst), 5);
    assert_eq!(
        registry.server_ids(),
        (0..5).map(|i| format!("server-{i}")).collect::<Vec<_>>()
    );
    for i in 0..5 {
        assert_eq!(registry.get(&format!("server-{i}")).unwrap().info().endpoint, format!("mongodb://host-{i}"));
    }
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    let data_plane = Arc::new(FakeDataPlane::default());
    let registry = registry(&data_plane);

    registry.connect("prod", "mongodb://a").await.unwrap();
    registry.disconnect("prod").await;
    registry.disconnect("prod").await;
    let again = registry.connect("prod", "mongodb://b").await.unwrap();

    assert_eq!(again.info().endpoint, "mongodb://b");
    let opened = data_plane.opened();
    assert!(opened[0].closed.load(Ordering::SeqCst));
    assert!(!opened[1].closed.load(Ordering::SeqCst));
}
