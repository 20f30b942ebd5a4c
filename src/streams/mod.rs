//! Stream definitions and the capability contract
//!
//! Each stream supplies a small capability set the engine composes rather
//! than inherits: a payload builder, a record extractor, a page-token
//! extractor, a child-context mapper, and optionally a response validator
//! overriding the default classification rules. The engine never looks
//! inside a record; everything entity-specific lives behind these traits.

mod catalog;

pub use catalog::all_streams;

use crate::error::{Error, Result};
use crate::http::{FailureClassifier, ResponseOutcome, ResponseValidator};
use crate::types::{JsonValue, Method, PageToken, Record, RequestContext};
use chrono::{DateTime, Utc};
use jsonpath_rust::JsonPath;
use once_cell::sync::OnceCell;

// ============================================================================
// Capability Traits
// ============================================================================

/// Builds the JSON request body for one page of one partition
pub trait PayloadBuilder: Send + Sync {
    /// Build the request body from the partition context, the current page
    /// token, and the starting replication value
    fn build_payload(
        &self,
        context: &RequestContext,
        page_token: Option<PageToken>,
        starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue>;
}

/// Locates records inside a response body
pub trait RecordExtractor: Send + Sync {
    /// Extract the records from one response body
    fn extract_records(&self, body: &JsonValue) -> Result<Vec<Record>>;

    /// Stream-specific record fix-up applied after extraction
    fn post_process(&self, record: Record, context: &RequestContext) -> Result<Record> {
        let _ = context;
        Ok(record)
    }
}

/// Computes the next page token from a response
pub trait PageTokenExtractor: Send + Sync {
    /// The token for the next page, or None when pagination is finished
    fn next_page_token(&self, body: &JsonValue, previous: Option<PageToken>) -> Option<PageToken>;
}

/// Maps a parent record to the context handed to child streams
pub trait ChildContextMapper: Send + Sync {
    /// The context seeding one child-partition sync, or None if this record
    /// spawns no children
    fn child_context(&self, record: &Record, context: &RequestContext) -> Option<RequestContext>;
}

// ============================================================================
// Stream Definition
// ============================================================================

/// Immutable description of one entity type
///
/// Declared once at startup and composed by the engine; never mutated.
pub struct StreamDefinition {
    /// Stream identifier, also the state key
    pub name: &'static str,
    /// Endpoint path relative to the API base URL
    pub path: &'static str,
    /// HTTP method for list requests
    pub method: Method,
    /// Primary-key field set
    pub primary_keys: &'static [&'static str],
    /// Replication-key field name, when the stream syncs incrementally
    pub replication_key: Option<&'static str>,
    /// Parent stream id, when partitions derive from parent records
    pub parent: Option<&'static str>,
    /// Whether partitions are re-derived from the parent every run; such
    /// streams keep only the single most-recent partition in state
    pub transient_partitions: bool,
    payload: Box<dyn PayloadBuilder>,
    records: Box<dyn RecordExtractor>,
    pages: Box<dyn PageTokenExtractor>,
    child_mapper: Box<dyn ChildContextMapper>,
    validator: Option<Box<dyn ResponseValidator>>,
}

impl StreamDefinition {
    /// Create a stream definition with default capabilities
    pub fn new(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            method: Method::POST,
            primary_keys: &[],
            replication_key: None,
            parent: None,
            transient_partitions: false,
            payload: Box::new(EmptyPayload),
            records: Box::new(JsonPathRecords::new("$[*]")),
            pages: Box::new(SinglePage),
            child_mapper: Box::new(NoChildContext),
            validator: None,
        }
    }

    /// Set the primary-key field set
    #[must_use]
    pub fn with_primary_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.primary_keys = keys;
        self
    }

    /// Set the replication-key field name
    #[must_use]
    pub fn with_replication_key(mut self, key: &'static str) -> Self {
        self.replication_key = Some(key);
        self
    }

    /// Declare a parent stream
    #[must_use]
    pub fn with_parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Keep only the most recently seen partition in state
    #[must_use]
    pub fn with_transient_partitions(mut self) -> Self {
        self.transient_partitions = true;
        self
    }

    /// Set the payload builder
    #[must_use]
    pub fn with_payload(mut self, payload: impl PayloadBuilder + 'static) -> Self {
        self.payload = Box::new(payload);
        self
    }

    /// Set the record extractor
    #[must_use]
    pub fn with_records(mut self, records: impl RecordExtractor + 'static) -> Self {
        self.records = Box::new(records);
        self
    }

    /// Set the page-token extractor
    #[must_use]
    pub fn with_pages(mut self, pages: impl PageTokenExtractor + 'static) -> Self {
        self.pages = Box::new(pages);
        self
    }

    /// Set the child-context mapper
    #[must_use]
    pub fn with_child_mapper(mut self, mapper: impl ChildContextMapper + 'static) -> Self {
        self.child_mapper = Box::new(mapper);
        self
    }

    /// Override the default response classification for this stream
    #[must_use]
    pub fn with_validator(mut self, validator: impl ResponseValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Build the request body for one page
    pub fn build_payload(
        &self,
        context: &RequestContext,
        page_token: Option<PageToken>,
        starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        self.payload.build_payload(context, page_token, starting)
    }

    /// Extract records from a response body
    pub fn extract_records(&self, body: &JsonValue) -> Result<Vec<Record>> {
        self.records.extract_records(body)
    }

    /// Apply the stream's record fix-up
    pub fn post_process(&self, record: Record, context: &RequestContext) -> Result<Record> {
        self.records.post_process(record, context)
    }

    /// Compute the next page token
    pub fn next_page_token(
        &self,
        body: &JsonValue,
        previous: Option<PageToken>,
    ) -> Option<PageToken> {
        self.pages.next_page_token(body, previous)
    }

    /// Map a record to a child context
    pub fn child_context(&self, record: &Record, context: &RequestContext) -> Option<RequestContext> {
        self.child_mapper.child_context(record, context)
    }

    /// Classify a response, using the stream's validator when present
    pub fn validate_response(
        &self,
        status: u16,
        body: &str,
        default: &FailureClassifier,
    ) -> ResponseOutcome {
        match &self.validator {
            Some(validator) => validator.validate(status, body),
            None => default.classify(status, body),
        }
    }
}

impl std::fmt::Debug for StreamDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDefinition")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("parent", &self.parent)
            .field("replication_key", &self.replication_key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Payload Builders
// ============================================================================

/// Payload builder emitting an empty JSON object
#[derive(Debug, Clone, Default)]
pub struct EmptyPayload;

impl PayloadBuilder for EmptyPayload {
    fn build_payload(
        &self,
        _context: &RequestContext,
        _page_token: Option<PageToken>,
        _starting: Option<DateTime<Utc>>,
    ) -> Result<JsonValue> {
        Ok(serde_json::json!({}))
    }
}

// ============================================================================
// Record Extractors
// ============================================================================

/// JSONPath-based record extractor with optional nested-field promotion
///
/// Promotion copies a nested field (e.g. `GeneralInfo.ReceivedDate`) to the
/// record's top level so replication tracking can see it.
pub struct JsonPathRecords {
    path: String,
    compiled: OnceCell<JsonPath>,
    promote: Option<(&'static str, &'static str)>,
}

impl JsonPathRecords {
    /// Create an extractor for the given JSONPath expression
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            compiled: OnceCell::new(),
            promote: None,
        }
    }

    /// Promote a dotted nested field to a top-level field after extraction
    #[must_use]
    pub fn with_promoted_field(mut self, from: &'static str, to: &'static str) -> Self {
        self.promote = Some((from, to));
        self
    }

    fn jsonpath(&self) -> Result<&JsonPath> {
        self.compiled.get_or_try_init(|| {
            JsonPath::try_from(self.path.as_str()).map_err(|e| Error::JsonPath {
                message: format!("Invalid JSONPath '{}': {e}", self.path),
            })
        })
    }
}

impl RecordExtractor for JsonPathRecords {
    fn extract_records(&self, body: &JsonValue) -> Result<Vec<Record>> {
        let found = self.jsonpath()?.find(body);

        let matches = match found {
            JsonValue::Array(arr) => arr,
            JsonValue::Null => Vec::new(),
            other => vec![other],
        };

        matches
            .into_iter()
            .map(|value| match value {
                JsonValue::Object(record) => Ok(record),
                other => Err(Error::RecordExtraction {
                    path: self.path.clone(),
                    message: format!("expected an object, got {other}"),
                }),
            })
            .collect()
    }

    fn post_process(&self, mut record: Record, _context: &RequestContext) -> Result<Record> {
        if let Some((from, to)) = self.promote {
            let mut segments = from.split('.');
            let mut current = segments.next().and_then(|first| record.get(first));
            for part in segments {
                current = current.and_then(|v| v.get(part));
            }
            if let Some(value) = current.cloned() {
                record.insert(to.to_string(), value);
            }
        }
        Ok(record)
    }
}

impl std::fmt::Debug for JsonPathRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonPathRecords")
            .field("path", &self.path)
            .field("promote", &self.promote)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Page Token Extractors
// ============================================================================

/// Page counters read from the response body
///
/// Emits `current + 1` while `PageNumber` is below `TotalPages`; the
/// counters optionally nest under a named wrapper object.
#[derive(Debug, Clone, Default)]
pub struct PageCountTokens {
    wrapper: Option<&'static str>,
}

impl PageCountTokens {
    /// Counters at the top level of the response
    pub fn top_level() -> Self {
        Self { wrapper: None }
    }

    /// Counters nested under a wrapper object
    pub fn nested(wrapper: &'static str) -> Self {
        Self {
            wrapper: Some(wrapper),
        }
    }
}

impl PageTokenExtractor for PageCountTokens {
    fn next_page_token(&self, body: &JsonValue, _previous: Option<PageToken>) -> Option<PageToken> {
        let root = match self.wrapper {
            Some(wrapper) => body.get(wrapper)?,
            None => body,
        };

        let page = root.get("PageNumber")?.as_i64()?;
        let total = root.get("TotalPages")?.as_i64()?;

        if page < total {
            Some(PageToken::new(page + 1))
        } else {
            None
        }
    }
}

/// Continues while the response array fills a whole page
///
/// For endpoints that return a bare array with no page counters: a short
/// page means there is nothing further to fetch.
#[derive(Debug, Clone)]
pub struct ArrayFullTokens {
    page_size: usize,
}

impl ArrayFullTokens {
    /// Create an extractor for the given page size
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }
}

impl PageTokenExtractor for ArrayFullTokens {
    fn next_page_token(&self, body: &JsonValue, previous: Option<PageToken>) -> Option<PageToken> {
        let len = body.as_array().map(Vec::len)?;
        if len >= self.page_size {
            Some(PageToken::new(previous.map_or(1, PageToken::value) + 1))
        } else {
            None
        }
    }
}

/// Single-request streams; never a next page
#[derive(Debug, Clone, Default)]
pub struct SinglePage;

impl PageTokenExtractor for SinglePage {
    fn next_page_token(&self, _body: &JsonValue, _previous: Option<PageToken>) -> Option<PageToken> {
        None
    }
}

// ============================================================================
// Child Context Mappers
// ============================================================================

/// Streams without children
#[derive(Debug, Clone, Default)]
pub struct NoChildContext;

impl ChildContextMapper for NoChildContext {
    fn child_context(&self, _record: &Record, _context: &RequestContext) -> Option<RequestContext> {
        None
    }
}

/// Maps one record field to one child-context key
#[derive(Debug, Clone)]
pub struct KeyChildContext {
    record_field: &'static str,
    context_key: &'static str,
}

impl KeyChildContext {
    /// Create a mapper copying `record_field` into `context_key`
    pub fn new(record_field: &'static str, context_key: &'static str) -> Self {
        Self {
            record_field,
            context_key,
        }
    }
}

impl ChildContextMapper for KeyChildContext {
    fn child_context(&self, record: &Record, _context: &RequestContext) -> Option<RequestContext> {
        let value = record.get(self.record_field)?;
        if value.is_null() {
            return None;
        }

        let mut context = RequestContext::new();
        context.insert(self.context_key.to_string(), value.clone());
        Some(context)
    }
}

#[cfg(test)]
mod tests;
