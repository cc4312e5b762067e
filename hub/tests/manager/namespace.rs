//! Tool aggregation, collisions and routing

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use mcp_hub::config::ManagerConfig;
use mcp_hub::mcp::{McpClientManager, McpError};
use mcp_hub::status::{self, ServerStatus};
use serde_json::json;

use crate::fakes::{descriptor, FakeConnector, FakeServer};

fn manager(connector: &Arc<FakeConnector>) -> McpClientManager {
    McpClientManager::with_connector(connector.clone(), ManagerConfig::default())
}

#[tokio::test]
async fn colliding_tools_are_qualified() {
    let connector = Arc::new(
        FakeConnector::new()
            .server("serverA", FakeServer::with_tools(&["search", "read"]))
            .server("serverB", FakeServer::with_tools(&["search"])),
    );
    let manager = manager(&connector);
    manager.add_server("serverA", descriptor()).await.unwrap();
    manager.add_server("serverB", descriptor()).await.unwrap();

    let tools = manager.get_all_tools().await.unwrap();

    let names: Vec<&str> = tools.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["read", "search", "serverB.search"]);
    assert_eq!(tools["search"].server, "serverA");
    assert_eq!(tools["serverB.search"].server, "serverB");
    assert_eq!(tools["serverB.search"].name, "search");
    assert_eq!(tools["read"].description, "read tool");
}

#[tokio::test]
async fn qualified_tool_routes_to_its_owner() {
    let connector = Arc::new(
        FakeConnector::new()
            .server("serverA", FakeServer::with_tools(&["search"]))
            .server("serverB", FakeServer::with_tools(&["search"])),
    );
    let manager = manager(&connector);
    manager.add_server("serverA", descriptor()).await.unwrap();
    manager.add_server("serverB", descriptor()).await.unwrap();

    let mut args = serde_json::Map::new();
    args.insert("q".to_string(), json!("rust"));
    let result = manager.execute_tool("serverB.search", Some(args)).await.unwrap();

    let b = connector.get("serverB");
    assert_eq!(FakeServer::count(&b.calls), 1);
    assert_eq!(b.last_call.lock().unwrap().as_deref(), Some("search"));
    assert_eq!(FakeServer::count(&connector.get("serverA").calls), 0);
    assert_eq!(result["arguments"]["q"], "rust");

    let owner = manager.get_tool_client("search").await.unwrap();
    assert_eq!(owner.name(), "serverA");
}

#[tokio::test]
async fn unknown_tool_client_is_none() {
    let connector = Arc::new(FakeConnector::new().server("fs", FakeServer::with_tools(&["read"])));
    let manager = manager(&connector);
    manager.add_server("fs", descriptor()).await.unwrap();

    assert!(manager.get_tool_client("never-registered").await.is_none());
}

#[tokio::test]
async fn unknown_tool_forces_exactly_one_refresh() {
    let connector = Arc::new(FakeConnector::new().server("fs", FakeServer::with_tools(&["read"])));
    let manager = manager(&connector);
    manager.add_server("fs", descriptor()).await.unwrap();
    let fs = connector.get("fs");
    let lists_before = FakeServer::count(&fs.lists);

    let err = manager.execute_tool("missing", None).await.unwrap_err();

    assert_eq!(err, McpError::NoClientForTool("missing".to_string()));
    assert_eq!(FakeServer::count(&fs.lists), lists_before + 1);
    assert_eq!(FakeServer::count(&fs.calls), 0);
}

#[tokio::test]
async fn tool_on_disconnected_owner_is_absent() {
    let connector = Arc::new(FakeConnector::new().server("fs", FakeServer::with_tools(&["read"])));
    let manager = manager(&connector);
    manager.add_server("fs", descriptor()).await.unwrap();
    assert!(manager.get_tool_client("read").await.is_some());

    connector.get("fs").fail_connect.store(true, Ordering::SeqCst);
    manager.get_client("fs").await.unwrap().disconnect().await.unwrap();
    manager.add_server("fs", descriptor()).await.unwrap_err();

    assert!(manager.get_tool_client("read").await.is_none());
    let err = manager.execute_tool("read", None).await.unwrap_err();
    assert_eq!(err, McpError::NoClientForTool("read".to_string()));
}

#[tokio::test]
async fn listing_failure_is_recorded_but_not_fatal() {
    let connector = Arc::new(
        FakeConnector::new()
            .server("good", FakeServer::with_tools(&["ok"]))
            .server("bad", FakeServer::with_tools(&["never"])),
    );
    let manager = manager(&connector);
    manager.add_server("good", descriptor()).await.unwrap();
    manager.add_server("bad", descriptor()).await.unwrap();
    connector.get("bad").fail_list.store(true, Ordering::SeqCst);

    let tools = manager.get_all_tools().await.unwrap();

    assert!(tools.contains_key("ok"));
    assert!(!tools.contains_key("never"));
    let failed = manager.get_failed_connections().await;
    assert!(failed["bad"].contains("listing broke"));
    let clients = manager.get_clients().await;
    assert!(clients["bad"].connected);
    assert_eq!(clients["bad"].failure_count, 1);
}

#[tokio::test]
async fn every_listing_failing_is_an_error() {
    let connector = Arc::new(
        FakeConnector::new()
            .server("a", FakeServer::with_tools(&["x"]))
            .server("b", FakeServer::with_tools(&["y"])),
    );
    let manager = manager(&connector);
    manager.add_server("a", descriptor()).await.unwrap();
    manager.add_server("b", descriptor()).await.unwrap();
    connector.get("a").fail_list.store(true, Ordering::SeqCst);
    connector.get("b").fail_list.store(true, Ordering::SeqCst);

    match manager.get_all_tools().await {
        Err(McpError::AllClientsFailed(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors[0].starts_with("a: "));
            assert!(errors[1].starts_with("b: "));
        }
        other => panic!("expected AllClientsFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn no_connected_servers_yields_empty_namespace() {
    let connector = Arc::new(FakeConnector::new());
    let manager = manager(&connector);

    assert!(manager.get_all_tools().await.unwrap().is_empty());
}

#[tokio::test]
async fn successful_listing_clears_earlier_failure() {
    let connector = Arc::new(FakeConnector::new().server("fs", FakeServer::with_tools(&["read"])));
    let manager = manager(&connector);
    manager.add_server("fs", descriptor()).await.unwrap();

    let fs = connector.get("fs");
    fs.fail_list.store(true, Ordering::SeqCst);
    manager.get_all_tools().await.unwrap_err();
    assert!(manager.get_failed_connections().await.contains_key("fs"));

    fs.fail_list.store(false, Ordering::SeqCst);
    let tools = manager.get_all_tools().await.unwrap();

    assert!(tools.contains_key("read"));
    assert!(manager.get_failed_connections().await.is_empty());
    let servers = BTreeMap::from([("fs".to_string(), descriptor())]);
    let rows = status::collect_rows(&servers, &manager).await;
    assert_eq!(rows[0].status, ServerStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn overlapping_refreshes_keep_the_newest_namespace() {
    // b's first listing is still in flight when a connects and refreshes
    let connector = Arc::new(
        FakeConnector::new()
            .server(
                "a",
                FakeServer {
                    connect_delay: Some(Duration::from_millis(10)),
                    ..FakeServer::with_tools(&["search"])
                },
            )
            .server(
                "b",
                FakeServer {
                    first_list_delay: Some(Duration::from_millis(50)),
                    ..FakeServer::with_tools(&["search"])
                },
            ),
    );
    let manager = manager(&connector);
    let servers: BTreeMap<_, _> = ["a", "b"]
        .into_iter()
        .map(|name| (name.to_string(), descriptor()))
        .collect();

    manager.initialize_from_config(&servers).await;

    assert_eq!(manager.get_tool_client("search").await.unwrap().name(), "a");
    assert_eq!(manager.get_tool_client("b.search").await.unwrap().name(), "b");
    assert_eq!(manager.cached_tool_count().await, 2);
}
