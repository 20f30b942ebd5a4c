//! Tests for partitions and the resolver

use super::*;
use crate::state::BookmarkStore;
use crate::streams::StreamDefinition;
use crate::types::RequestContext;
use serde_json::json;

fn ctx(key: &str, value: &str) -> RequestContext {
    let mut context = RequestContext::new();
    context.insert(key.to_string(), json!(value));
    context
}

#[test]
fn test_root_partition() {
    let partition = Partition::root();
    assert!(partition.is_root());
    assert_eq!(partition.describe(), "<root>");
}

#[test]
fn test_partition_context_access() {
    let partition = Partition::new(ctx("stock_item_id", "a"));
    assert!(!partition.is_root());
    assert_eq!(partition.get("stock_item_id"), Some(&json!("a")));
    assert!(partition.describe().contains("stock_item_id"));
}

#[tokio::test]
async fn test_resolver_parentless_stream_gets_implicit_partition() {
    let resolver = PartitionResolver::new(BookmarkStore::in_memory());
    let stream = StreamDefinition::new("open_orders", "/Orders/GetOpenOrders");

    let partitions = resolver.resolve(&stream).await.unwrap();
    assert_eq!(partitions, vec![Partition::root()]);
}

#[tokio::test]
async fn test_resolver_child_stream_reads_store() {
    let store = BookmarkStore::in_memory();
    store
        .insert_partition("processed_order_details", ctx("processed_order_id", "o-1"))
        .await
        .unwrap();
    store
        .insert_partition("processed_order_details", ctx("processed_order_id", "o-2"))
        .await
        .unwrap();

    let resolver = PartitionResolver::new(store);
    let stream = StreamDefinition::new("processed_order_details", "/Orders/GetOrderById")
        .with_parent("processed_orders");

    let partitions = resolver.resolve(&stream).await.unwrap();
    assert_eq!(
        partitions,
        vec![
            Partition::new(ctx("processed_order_id", "o-1")),
            Partition::new(ctx("processed_order_id", "o-2")),
        ]
    );
}

#[tokio::test]
async fn test_resolver_child_stream_empty_store() {
    let resolver = PartitionResolver::new(BookmarkStore::in_memory());
    let stream = StreamDefinition::new("stock_item_images", "/Inventory/GetInventoryItemImages")
        .with_parent("stock_items");

    // Fresh run: nothing stored; the scheduler drives partitions live from
    // parent records instead
    let partitions = resolver.resolve(&stream).await.unwrap();
    assert!(partitions.is_empty());
}

#[tokio::test]
async fn test_resolver_propagates_duplicate_state() {
    let store = BookmarkStore::from_json(
        r#"{
            "streams": {
                "stock_item_images": {
                    "partitions": [
                        {"context": {"stock_item_id": "a"}},
                        {"context": {"stock_item_id": "a"}}
                    ]
                }
            }
        }"#,
    )
    .unwrap();

    let resolver = PartitionResolver::new(store);
    let stream = StreamDefinition::new("stock_item_images", "/Inventory/GetInventoryItemImages")
        .with_parent("stock_items");

    let err = resolver.resolve(&stream).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::Error::DuplicatePartitionState { .. }
    ));
}
