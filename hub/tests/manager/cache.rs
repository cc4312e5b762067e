//! Cache bounds: TTL expiry and the size cap

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use mcp_hub::config::ManagerConfig;
use mcp_hub::mcp::McpClientManager;

use crate::fakes::{descriptor, FakeConnector, FakeServer};

const TTL: Duration = Duration::from_secs(60);

fn bounded(connector: &Arc<FakeConnector>, max_cache_size: usize) -> McpClientManager {
    let config = ManagerConfig {
        cache_ttl: TTL,
        max_cache_size,
        ..Default::default()
    };
    McpClientManager::with_connector(connector.clone(), config)
}

/// `a1` is cached at t0 by server `a`; `b` only starts listing after the TTL
/// has passed, at which point `a` stops answering.
async fn stale_then_fresh(max_cache_size: usize) -> (Arc<FakeConnector>, McpClientManager) {
    let b = FakeServer::with_tools(&["b1", "b2", "b3"]);
    b.fail_list.store(true, Ordering::SeqCst);
    let connector = Arc::new(
        FakeConnector::new()
            .server("a", FakeServer::with_tools(&["a1"]))
            .server("b", b),
    );
    let manager = bounded(&connector, max_cache_size);

    manager.add_server("a", descriptor()).await.unwrap();
    manager.add_server("b", descriptor()).await.unwrap();
    assert_eq!(manager.cached_tool_count().await, 1);

    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    connector.get("a").fail_list.store(true, Ordering::SeqCst);
    connector.get("b").fail_list.store(false, Ordering::SeqCst);

    let tools = manager.get_all_tools().await.unwrap();
    assert_eq!(tools.len(), 3);
    (connector, manager)
}

#[tokio::test(start_paused = true)]
async fn expired_entries_go_before_fresh_ones() {
    let (_connector, manager) = stale_then_fresh(3).await;

    assert_eq!(manager.cached_tool_count().await, 3);
    assert!(manager.get_tool_client("a1").await.is_none());
    for tool in ["b1", "b2", "b3"] {
        assert!(manager.get_tool_client(tool).await.is_some(), "{} evicted", tool);
    }
}

#[tokio::test(start_paused = true)]
async fn cap_applies_after_expiry() {
    let (_connector, manager) = stale_then_fresh(2).await;

    assert_eq!(manager.cached_tool_count().await, 2);
    assert!(manager.get_tool_client("a1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn oversized_listing_is_trimmed_to_cap() {
    let connector = Arc::new(
        FakeConnector::new().server("big", FakeServer::with_tools(&["t1", "t2", "t3", "t4", "t5"])),
    );
    let manager = bounded(&connector, 3);
    manager.add_server("big", descriptor()).await.unwrap();

    assert_eq!(manager.cached_tool_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_pruned_under_cap() {
    let connector = Arc::new(
        FakeConnector::new()
            .server("a", FakeServer::with_tools(&["a1"]))
            .server("b", FakeServer::with_tools(&["b1"])),
    );
    let manager = bounded(&connector, 100);
    manager.add_server("a", descriptor()).await.unwrap();
    manager.add_server("b", descriptor()).await.unwrap();

    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    connector.get("a").fail_list.store(true, Ordering::SeqCst);
    manager.get_all_tools().await.unwrap();

    assert_eq!(manager.cached_tool_count().await, 1);
    assert!(manager.get_tool_client("a1").await.is_none());
    assert!(manager.get_tool_client("b1").await.is_some());
}
