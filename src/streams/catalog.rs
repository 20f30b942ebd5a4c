//! The Linnworks stream catalog
//!
//! One definition per entity type, wiring the generic capabilities to the
//! endpoint-specific request bodies and response shapes.

use super::{
    ArrayFullTokens, JsonPathRecords, KeyChildContext, PageCountTokens, PayloadBuilder,
    StreamDefinition,
};
use crate::config::TapConfig;
use crate::error::{Error, Result};
use crate::types::{JsonValue, PageToken, RequestContext};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;

/// All streams the source can sync, parents before children
pub fn all_streams(config: &TapConfig) -> Vec<Arc<StreamDefinition>> {
    vec![
        Arc::new(open_orders(config)),
        Arc::new(processed_orders(config)),
        Arc::new(processed_order_details()),
        Arc::new(stock_items(config)),
        Arc::new(stock_item_images()),
    ]
}

fn open_orders(config: &TapConfig) -> StreamDefinition {
    StreamDefinition::new("open_orders", "/Orders/GetOpenOrders")
        .with_primary_keys(&["NumOrderId"])
        .with_replication_key("ReceivedDate")
        .with_payload(OpenOrdersPayload {
            entries_per_page: config.page_size,
        })
        .with_records(
            JsonPathRecords::new("$.Data[*]")
                .with_promoted_field("GeneralInfo.ReceivedDate", "ReceivedDate"),
        )
        .with_pages(PageCountTokens::top_level())
}

fn processed_orders(config: &TapConfig) -> StreamDefinition {
    StreamDefinition::new("processed_orders", "/ProcessedOrders/SearchProcessedOrders")
        .with_primary_keys(&["NumOrderId"])
        .with_replication_key("dProcessedOn")
        .with_payload(ProcessedOrdersPayload {
            results_per_page: config.page_size,
        })
        .with_records(JsonPathRecords::new("$.ProcessedOrders.Data[*]"))
        .with_pages(PageCountTokens::nested("ProcessedOrders"))
        .with_child_mapper(KeyChildContext::new("pkOrderID", "processed_order_id"))
}

fn processed_order_details() -> StreamDefinition {
    StreamDefinition::new("processed_order_details", "/Orders/GetOrderById")
        .with_primary_keys(&["OrderId"])
        .with_parent("processed_orders")
        .with_transient_partitions()
        .with_payload(OrderByIdPayload)
        .with_records(JsonPathRecords::new("$"))
}

fn stock_items(config: &TapConfig) -> StreamDefinition {
    StreamDefinition::new("stock_items", "/Stock/GetStockItemsFull")
        .with_primary_keys(&["StockItemId"])
        .with_payload(StockItemsPayload {
            entries_per_page: config.page_size,
        })
        .with_records(JsonPathRecords::new("$[*]"))
        .with_pages(ArrayFullTokens::new(config.page_size))
        .with_child_mapper(KeyChildContext::new("StockItemId", "stock_item_id"))
}

fn stock_item_images() -> StreamDefinition {
    StreamDefinition::new("stock_item_images", "/Inventory/GetInventoryItemImages")
        .with_primary_keys(&["pkRowId"])
        .with_parent("stock_items")
        .with_transient_partitions()
        .with_payload(StockItemImagesPayload)
        .with_records(JsonPathRecords::new("$[*]"))
}

// ============================================================================
// Payload Builders
// ============================================================================

/// Open-orders search body: date-range filter, descending by received date
#[derive(Debug, Clone)]
struct OpenOrdersPayload {
    entries_per_page: usize,
}

impl PayloadBuilder for OpenOrdersPayload {
    fn build_payload(
        &self,
        _context: &RequestContext,
        page_token: Option<PageToken>,
        starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        let mut body = json!({
            "entriesPerPage": self.entries_per_page,
            "pageNumber": page_token.map_or(1, PageToken::value),
            "sorting": [
                {
                    "FieldCode": "GENERAL_INFO_DATE",
                    "Direction": "Descending"
                }
            ]
        });

        if let Some(start) = starting {
            body["filters"] = json!({
                "DateFields": [
                    {
                        "DateFrom": start.to_rfc3339(),
                        "Type": "Range",
                        "FieldCode": "GENERAL_INFO_DATE"
                    }
                ]
            });
        }

        Ok(body)
    }
}

/// Processed-orders search body: from/to window on the processed date
#[derive(Debug, Clone)]
struct ProcessedOrdersPayload {
    results_per_page: usize,
}

impl PayloadBuilder for ProcessedOrdersPayload {
    fn build_payload(
        &self,
        _context: &RequestContext,
        page_token: Option<PageToken>,
        starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        let mut request = json!({
            "PageNumber": page_token.map_or(1, PageToken::value),
            "ResultsPerPage": self.results_per_page,
            "DateField": "processed",
            "SearchSorting": {
                "SortField": "dProcessedOn",
                "SortDirection": "DESC"
            }
        });

        if let Some(start) = starting {
            // The window reaches one day ahead so orders processed while the
            // sync runs still land inside it
            request["FromDate"] = json!(start.to_rfc3339());
            request["ToDate"] = json!((Utc::now() + Duration::days(1)).to_rfc3339());
        }

        Ok(json!({ "request": request }))
    }
}

/// Single-order lookup body, driven by the parent order's id
#[derive(Debug, Clone)]
struct OrderByIdPayload;

impl PayloadBuilder for OrderByIdPayload {
    fn build_payload(
        &self,
        context: &RequestContext,
        _page_token: Option<PageToken>,
        _starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        let id = context.get("processed_order_id").ok_or_else(|| {
            Error::partition(
                "processed_order_details",
                "context missing 'processed_order_id'",
            )
        })?;
        Ok(json!({ "pkOrderId": id }))
    }
}

/// Full stock-item listing body
#[derive(Debug, Clone)]
struct StockItemsPayload {
    entries_per_page: usize,
}

impl PayloadBuilder for StockItemsPayload {
    fn build_payload(
        &self,
        _context: &RequestContext,
        page_token: Option<PageToken>,
        _starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        Ok(json!({
            "keyword": "",
            "loadCompositeParents": false,
            "loadVariationParents": false,
            "entriesPerPage": self.entries_per_page,
            "pageNumber": page_token.map_or(1, PageToken::value),
            "dataRequirements": ["StockLevels"],
            "searchTypes": ["SKU", "Title", "Barcode"]
        }))
    }
}

/// Image listing body for one stock item
#[derive(Debug, Clone)]
struct StockItemImagesPayload;

impl PayloadBuilder for StockItemImagesPayload {
    fn build_payload(
        &self,
        context: &RequestContext,
        _page_token: Option<PageToken>,
        _starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        let id = context.get("stock_item_id").ok_or_else(|| {
            Error::partition("stock_item_images", "context missing 'stock_item_id'")
        })?;
        Ok(json!({ "inventoryItemId": id }))
    }
}
