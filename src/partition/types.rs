//! Partition types
//!
//! A partition is a sync scope narrower than a whole stream, identified by
//! an opaque context object. Parentless streams have exactly one implicit
//! partition with an empty context.

use crate::types::{JsonValue, RequestContext};

/// A single sync scope for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Context object identifying this partition; also the keys handed to
    /// the stream's payload builder
    pub context: RequestContext,
}

impl Partition {
    /// The implicit partition of a parentless stream
    pub fn root() -> Self {
        Self {
            context: RequestContext::new(),
        }
    }

    /// Create a partition from a context object
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    /// Whether this is the implicit empty partition
    pub fn is_root(&self) -> bool {
        self.context.is_empty()
    }

    /// Get a context value by key
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.context.get(key)
    }

    /// Render the context for log lines
    pub fn describe(&self) -> String {
        if self.is_root() {
            "<root>".to_string()
        } else {
            JsonValue::Object(self.context.clone()).to_string()
        }
    }
}
