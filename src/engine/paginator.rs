//! The page loop
//!
//! Drives one partition of one stream to completion: authorize, build the
//! request body, issue the classified call, extract and post-process the
//! records, then thread the next page token into the following request.
//! Pages are strictly sequential because the token is a causal dependency
//! of the next request.
//!
//! Records are pushed to the scheduler through a channel rather than
//! returned, which decouples production from consumption and makes
//! backpressure explicit.

use crate::auth::TokenCache;
use crate::error::{Error, Result};
use crate::http::{ApiPage, FailureClassifier, HttpClient, RequestConfig, ResponseOutcome, ResponseValidator};
use crate::partition::Partition;
use crate::streams::StreamDefinition;
use crate::types::{newer_than, replication_value, Record, RequestContext};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One event from the page loop
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// A record, in upstream order, with the context it seeds for child
    /// streams (if any)
    Record {
        /// The post-processed record
        record: Record,
        /// Context for one child-partition sync
        child_context: Option<RequestContext>,
    },
    /// A page finished; bookmarks may advance now
    PageComplete {
        /// Highest replication-key value seen on this page
        max_replication_value: Option<String>,
    },
}

/// Totals from one partition sync
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionSummary {
    /// Pages fetched
    pub pages: usize,
    /// Records pushed
    pub records: usize,
}

/// Adapts a stream definition's validation to the client's validator seam
struct StreamValidator<'a> {
    stream: &'a StreamDefinition,
    default: &'a FailureClassifier,
}

impl ResponseValidator for StreamValidator<'_> {
    fn validate(&self, status: u16, body: &str) -> ResponseOutcome {
        self.stream.validate_response(status, body, self.default)
    }
}

/// Drives the request/response/next-token loop for one partition
#[derive(Debug, Clone)]
pub struct Paginator {
    client: HttpClient,
    tokens: TokenCache,
    classifier: FailureClassifier,
}

impl Paginator {
    /// Create a paginator
    pub fn new(client: HttpClient, tokens: TokenCache, classifier: FailureClassifier) -> Self {
        Self {
            client,
            tokens,
            classifier,
        }
    }

    /// Sync one partition, pushing events to the scheduler
    ///
    /// The sequence is finite and not restartable; resuming goes back
    /// through the bookmark store.
    pub async fn run(
        &self,
        stream: Arc<StreamDefinition>,
        partition: Partition,
        starting: Option<DateTime<Utc>>,
        tx: mpsc::Sender<PageEvent>,
    ) -> Result<PartitionSummary> {
        let bearer = self.tokens.bearer().await?;
        let validator = StreamValidator {
            stream: &stream,
            default: &self.classifier,
        };

        let mut page_token = None;
        let mut summary = PartitionSummary::default();

        loop {
            let payload = stream.build_payload(&partition.context, page_token, starting)?;
            let request = RequestConfig::new()
                .header("Authorization", bearer.clone())
                .header("Content-Type", "application/json")
                .json(payload);

            let page = self
                .client
                .request_classified(stream.method, stream.path, request, &validator)
                .await?;

            let body = match page {
                ApiPage::EndOfData => break,
                ApiPage::Body(body) => body,
            };

            summary.pages += 1;

            let raw = stream.extract_records(&body)?;
            debug!(
                stream = stream.name,
                partition = %partition.describe(),
                page = summary.pages,
                records = raw.len(),
                "Fetched page"
            );

            let mut max_value: Option<String> = None;
            for record in raw {
                let record = stream.post_process(record, &partition.context)?;

                if let Some(key) = stream.replication_key {
                    if let Some(value) = record.get(key).and_then(replication_value) {
                        max_value = match max_value {
                            Some(current) if !newer_than(&value, &current) => Some(current),
                            _ => Some(value),
                        };
                    }
                }

                let child_context = stream.child_context(&record, &partition.context);
                summary.records += 1;
                send(&tx, PageEvent::Record {
                    record,
                    child_context,
                })
                .await?;
            }

            send(&tx, PageEvent::PageComplete {
                max_replication_value: max_value,
            })
            .await?;

            page_token = stream.next_page_token(&body, page_token);
            if page_token.is_none() {
                break;
            }
        }

        Ok(summary)
    }
}

async fn send(tx: &mpsc::Sender<PageEvent>, event: PageEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| Error::Other("record consumer dropped".to_string()))
}
