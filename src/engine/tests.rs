//! Tests for the scheduler's ordering and message types

use super::*;
use crate::streams::StreamDefinition;
use pretty_assertions::assert_eq;
use serde_json::json;

fn stream(name: &'static str) -> Arc<StreamDefinition> {
    Arc::new(StreamDefinition::new(name, "/x"))
}

fn child(name: &'static str, parent: &'static str) -> Arc<StreamDefinition> {
    Arc::new(StreamDefinition::new(name, "/x").with_parent(parent))
}

fn names(ordered: &[Arc<StreamDefinition>]) -> Vec<&'static str> {
    ordered.iter().map(|s| s.name).collect()
}

// ============================================================================
// Dependency Order
// ============================================================================

#[test]
fn test_order_keeps_catalog_order_for_roots() {
    let streams = vec![stream("a"), stream("b"), stream("c")];
    let ordered = dependency_order(&streams).unwrap();
    assert_eq!(names(&ordered), vec!["a", "b", "c"]);
}

#[test]
fn test_order_places_parent_before_child() {
    let streams = vec![child("images", "items"), stream("items")];
    let ordered = dependency_order(&streams).unwrap();
    assert_eq!(names(&ordered), vec!["items", "images"]);
}

#[test]
fn test_order_handles_grandchildren() {
    let streams = vec![
        child("c", "b"),
        child("b", "a"),
        stream("a"),
        stream("standalone"),
    ];
    let ordered = dependency_order(&streams).unwrap();
    let ordered = names(&ordered);

    let pos = |n: &str| ordered.iter().position(|x| *x == n).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("b") < pos("c"));
    assert_eq!(ordered.len(), 4);
}

#[test]
fn test_order_rejects_unknown_parent() {
    let streams = vec![child("images", "missing")];
    let err = dependency_order(&streams).unwrap_err();
    assert!(matches!(err, Error::StreamNotFound { stream } if stream == "missing"));
}

#[test]
fn test_order_rejects_cycle() {
    let streams = vec![child("a", "b"), child("b", "a")];
    let err = dependency_order(&streams).unwrap_err();
    assert!(matches!(err, Error::DependencyCycle { .. }));
}

// ============================================================================
// Messages
// ============================================================================

#[test]
fn test_record_message_json() {
    let message = Message::record("open_orders", json!({"NumOrderId": 1}));
    assert!(message.is_record());
    assert_eq!(
        message.to_json(),
        json!({
            "type": "RECORD",
            "stream": "open_orders",
            "record": {"NumOrderId": 1}
        })
    );
}

#[test]
fn test_state_message_json() {
    let message = Message::state(
        "open_orders",
        json!({"replication_key_value": "2024-05-01T10:00:00Z"}),
    );
    assert!(message.is_state());
    assert_eq!(
        message.to_json(),
        json!({
            "type": "STATE",
            "stream": "open_orders",
            "value": {"replication_key_value": "2024-05-01T10:00:00Z"}
        })
    );
}

#[test]
fn test_log_message_json() {
    let message = Message::warn("something odd");
    let rendered = message.to_json();
    assert_eq!(rendered["type"], "LOG");
    assert_eq!(rendered["level"], "WARN");
    assert_eq!(rendered["message"], "something odd");
}

// ============================================================================
// Sync Config
// ============================================================================

#[test]
fn test_sync_config_defaults() {
    let config = SyncConfig::default();
    assert!(!config.checkpoint_per_page);
    assert!(!config.fail_fast);
    assert_eq!(config.max_records, 0);
}

#[test]
fn test_sync_config_builder() {
    let config = SyncConfig::new()
        .with_checkpoint_per_page(true)
        .with_max_records(100)
        .with_fail_fast(true);
    assert!(config.checkpoint_per_page);
    assert!(config.fail_fast);
    assert_eq!(config.max_records, 100);
}

// ============================================================================
// Stats
// ============================================================================

#[test]
fn test_stats_accumulate() {
    let mut stats = SyncStats::new();
    stats.add_records(3);
    stats.add_records(2);
    stats.add_page();
    stats.add_partition();
    stats.add_stream();
    stats.add_error();

    assert_eq!(stats.records_synced, 5);
    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(stats.partitions_synced, 1);
    assert_eq!(stats.streams_synced, 1);
    assert_eq!(stats.errors, 1);
}
