//! Tests for stream capabilities and the catalog

use super::*;
use crate::config::TapConfig;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq as pretty_assert_eq;
use serde_json::json;
use test_case::test_case;

fn record(value: serde_json::Value) -> Record {
    match value {
        JsonValue::Object(map) => map,
        _ => panic!("test record must be an object"),
    }
}

fn test_config() -> TapConfig {
    TapConfig::from_json_str(
        r#"{
            "start_date": "2023-01-01T00:00:00Z",
            "application_id": "app",
            "application_secret": "secret",
            "installation_token": "install"
        }"#,
    )
    .unwrap()
}

// ============================================================================
// Record Extraction
// ============================================================================

#[test]
fn test_jsonpath_records_top_level_data() {
    let extractor = JsonPathRecords::new("$.Data[*]");
    let body = json!({
        "Data": [
            {"NumOrderId": 1},
            {"NumOrderId": 2}
        ],
        "PageNumber": 1,
        "TotalPages": 1
    });

    let records = extractor.extract_records(&body).unwrap();
    pretty_assert_eq!(records.len(), 2);
    pretty_assert_eq!(records[0]["NumOrderId"], 1);
    pretty_assert_eq!(records[1]["NumOrderId"], 2);
}

#[test]
fn test_jsonpath_records_nested_wrapper() {
    let extractor = JsonPathRecords::new("$.ProcessedOrders.Data[*]");
    let body = json!({
        "ProcessedOrders": {
            "Data": [{"pkOrderID": "o-1"}],
            "PageNumber": 1,
            "TotalPages": 3
        }
    });

    let records = extractor.extract_records(&body).unwrap();
    pretty_assert_eq!(records.len(), 1);
    pretty_assert_eq!(records[0]["pkOrderID"], "o-1");
}

#[test]
fn test_jsonpath_records_missing_path_is_empty() {
    let extractor = JsonPathRecords::new("$.Data[*]");
    let records = extractor.extract_records(&json!({"Other": []})).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_jsonpath_records_rejects_non_objects() {
    let extractor = JsonPathRecords::new("$.Data[*]");
    let err = extractor
        .extract_records(&json!({"Data": [1, 2, 3]}))
        .unwrap_err();
    assert!(matches!(err, crate::error::Error::RecordExtraction { .. }));
}

#[test]
fn test_promoted_field_reaches_top_level() {
    let extractor = JsonPathRecords::new("$.Data[*]")
        .with_promoted_field("GeneralInfo.ReceivedDate", "ReceivedDate");

    let rec = record(json!({
        "NumOrderId": 1,
        "GeneralInfo": {"ReceivedDate": "2024-05-01T10:00:00Z"}
    }));
    let processed = extractor.post_process(rec, &RequestContext::new()).unwrap();
    pretty_assert_eq!(processed["ReceivedDate"], "2024-05-01T10:00:00Z");
}

#[test]
fn test_promoted_field_missing_leaves_record_unchanged() {
    let extractor = JsonPathRecords::new("$.Data[*]")
        .with_promoted_field("GeneralInfo.ReceivedDate", "ReceivedDate");

    let rec = record(json!({"NumOrderId": 1}));
    let processed = extractor.post_process(rec, &RequestContext::new()).unwrap();
    assert!(!processed.contains_key("ReceivedDate"));
}

// ============================================================================
// Page Tokens
// ============================================================================

#[test_case(1, 2 => Some(2); "first of two pages")]
#[test_case(2, 2 => None; "last page")]
#[test_case(1, 1 => None; "single page")]
#[test_case(3, 10 => Some(4); "middle page")]
fn test_page_count_tokens_top_level(page: i64, total: i64) -> Option<i64> {
    let body = json!({"Data": [], "PageNumber": page, "TotalPages": total});
    PageCountTokens::top_level()
        .next_page_token(&body, None)
        .map(PageToken::value)
}

#[test]
fn test_page_count_tokens_nested() {
    let tokens = PageCountTokens::nested("ProcessedOrders");
    let body = json!({"ProcessedOrders": {"PageNumber": 1, "TotalPages": 2}});
    pretty_assert_eq!(
        tokens.next_page_token(&body, None),
        Some(PageToken::new(2))
    );

    // Counters at the wrong level mean no further pages
    let flat = json!({"PageNumber": 1, "TotalPages": 2});
    pretty_assert_eq!(tokens.next_page_token(&flat, None), None);
}

#[test]
fn test_page_count_tokens_missing_counters() {
    let tokens = PageCountTokens::top_level();
    pretty_assert_eq!(tokens.next_page_token(&json!({"Data": []}), None), None);
}

#[test]
fn test_array_full_tokens() {
    let tokens = ArrayFullTokens::new(2);

    let full = json!([{"a": 1}, {"a": 2}]);
    pretty_assert_eq!(tokens.next_page_token(&full, None), Some(PageToken::new(2)));
    pretty_assert_eq!(
        tokens.next_page_token(&full, Some(PageToken::new(2))),
        Some(PageToken::new(3))
    );

    let short = json!([{"a": 1}]);
    pretty_assert_eq!(tokens.next_page_token(&short, Some(PageToken::new(3))), None);

    let not_array = json!({"Data": []});
    pretty_assert_eq!(tokens.next_page_token(&not_array, None), None);
}

#[test]
fn test_single_page() {
    pretty_assert_eq!(SinglePage.next_page_token(&json!({"a": 1}), None), None);
}

// ============================================================================
// Child Contexts
// ============================================================================

#[test]
fn test_key_child_context_maps_field() {
    let mapper = KeyChildContext::new("pkOrderID", "processed_order_id");
    let rec = record(json!({"pkOrderID": "o-1", "NumOrderId": 7}));

    let context = mapper.child_context(&rec, &RequestContext::new()).unwrap();
    pretty_assert_eq!(context.get("processed_order_id"), Some(&json!("o-1")));
    pretty_assert_eq!(context.len(), 1);
}

#[test]
fn test_key_child_context_skips_missing_or_null() {
    let mapper = KeyChildContext::new("pkOrderID", "processed_order_id");

    let missing = record(json!({"NumOrderId": 7}));
    assert!(mapper.child_context(&missing, &RequestContext::new()).is_none());

    let null = record(json!({"pkOrderID": null}));
    assert!(mapper.child_context(&null, &RequestContext::new()).is_none());
}

// ============================================================================
// Catalog Payloads
// ============================================================================

#[test]
fn test_open_orders_payload_shape() {
    let config = test_config();
    let streams = all_streams(&config);
    let open_orders = streams.iter().find(|s| s.name == "open_orders").unwrap();

    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let body = open_orders
        .build_payload(&RequestContext::new(), None, Some(start))
        .unwrap();

    pretty_assert_eq!(body["pageNumber"], 1);
    pretty_assert_eq!(body["entriesPerPage"], 500);
    pretty_assert_eq!(
        body["filters"]["DateFields"][0]["FieldCode"],
        "GENERAL_INFO_DATE"
    );
    pretty_assert_eq!(
        body["filters"]["DateFields"][0]["DateFrom"],
        "2023-01-01T00:00:00+00:00"
    );
    pretty_assert_eq!(body["sorting"][0]["Direction"], "Descending");
}

#[test]
fn test_open_orders_payload_threads_page_token() {
    let config = test_config();
    let streams = all_streams(&config);
    let open_orders = streams.iter().find(|s| s.name == "open_orders").unwrap();

    let body = open_orders
        .build_payload(&RequestContext::new(), Some(PageToken::new(3)), None)
        .unwrap();
    pretty_assert_eq!(body["pageNumber"], 3);
}

#[test]
fn test_processed_orders_payload_shape() {
    let config = test_config();
    let streams = all_streams(&config);
    let processed = streams.iter().find(|s| s.name == "processed_orders").unwrap();

    let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let body = processed
        .build_payload(&RequestContext::new(), Some(PageToken::new(2)), Some(start))
        .unwrap();

    pretty_assert_eq!(body["request"]["PageNumber"], 2);
    pretty_assert_eq!(body["request"]["DateField"], "processed");
    pretty_assert_eq!(body["request"]["FromDate"], "2024-05-01T10:00:00+00:00");
    pretty_assert_eq!(body["request"]["SearchSorting"]["SortField"], "dProcessedOn");
    // The window reaches ahead of now
    let to = body["request"]["ToDate"].as_str().unwrap();
    assert!(crate::types::parse_datetime(to).unwrap() > Utc::now());
}

#[test]
fn test_child_payloads_require_context() {
    let config = test_config();
    let streams = all_streams(&config);

    let details = streams
        .iter()
        .find(|s| s.name == "processed_order_details")
        .unwrap();
    assert!(details
        .build_payload(&RequestContext::new(), None, None)
        .is_err());

    let mut context = RequestContext::new();
    context.insert("processed_order_id".to_string(), json!("o-1"));
    let body = details.build_payload(&context, None, None).unwrap();
    pretty_assert_eq!(body, json!({"pkOrderId": "o-1"}));

    let images = streams
        .iter()
        .find(|s| s.name == "stock_item_images")
        .unwrap();
    let mut context = RequestContext::new();
    context.insert("stock_item_id".to_string(), json!("s-1"));
    let body = images.build_payload(&context, None, None).unwrap();
    pretty_assert_eq!(body, json!({"inventoryItemId": "s-1"}));
}

#[test]
fn test_catalog_graph_shape() {
    let config = test_config();
    let streams = all_streams(&config);

    pretty_assert_eq!(streams.len(), 5);

    let details = streams
        .iter()
        .find(|s| s.name == "processed_order_details")
        .unwrap();
    pretty_assert_eq!(details.parent, Some("processed_orders"));
    assert!(details.transient_partitions);

    let images = streams
        .iter()
        .find(|s| s.name == "stock_item_images")
        .unwrap();
    pretty_assert_eq!(images.parent, Some("stock_items"));
    assert!(images.transient_partitions);

    let open_orders = streams.iter().find(|s| s.name == "open_orders").unwrap();
    pretty_assert_eq!(open_orders.replication_key, Some("ReceivedDate"));
    assert!(open_orders.parent.is_none());
}

// ============================================================================
// Validator Override
// ============================================================================

#[test]
fn test_stream_validator_override() {
    use crate::http::{FailureClassifier, ResponseOutcome, ResponseValidator};

    struct AlwaysEmpty;
    impl ResponseValidator for AlwaysEmpty {
        fn validate(&self, _status: u16, _body: &str) -> ResponseOutcome {
            ResponseOutcome::BenignEmpty
        }
    }

    let default = FailureClassifier::default();

    let plain = StreamDefinition::new("plain", "/x");
    pretty_assert_eq!(
        plain.validate_response(200, "", &default),
        ResponseOutcome::Ok
    );

    let overridden = StreamDefinition::new("custom", "/x").with_validator(AlwaysEmpty);
    pretty_assert_eq!(
        overridden.validate_response(200, "", &default),
        ResponseOutcome::BenignEmpty
    );
}
