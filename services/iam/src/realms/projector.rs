//! At-least-once journal tail that keeps the read index fresh.
//!
//! # Purpose
//! Follows the `realm`-tagged event stream in batches and refreshes the index
//! entry of every realm a batch touches. Exactly-once is not required: the
//! index's last-writer-wins by revision makes projection idempotent, so the
//! persisted offset is only a resume hint and replaying from any older
//! offset, including 0, is safe.

use crate::error::IamError;
use crate::journal::{EventJournal, ProgressStore, REALM_TAG, label_of};
use crate::realms::aggregate::RealmAggregate;
use crate::realms::index::RealmIndex;
use keygate_realm::Label;
use keygate_realm::retry::{self, RetryStrategy};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Offset key of the realm index view.
pub const VIEW_ID: &str = "realms-index";

/// Projection settings (`indexing.*` in the configuration).
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Maximum events pulled per journal query.
    pub batch: usize,
    /// Idle wait between polls when the journal has nothing new.
    pub batch_timeout: Duration,
    pub retry: RetryStrategy,
    /// Persist the offset after this many processed events...
    pub persist_after_processed: u64,
    /// ...or after this much wallclock, whichever comes first.
    pub progress_max_time_window: Duration,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch: 25,
            batch_timeout: Duration::from_millis(500),
            retry: RetryStrategy::exponential(
                Duration::from_millis(100),
                Duration::from_secs(2),
                3,
            ),
            persist_after_processed: 100,
            progress_max_time_window: Duration::from_secs(30),
        }
    }
}

pub struct RealmProjector {
    journal: Arc<dyn EventJournal>,
    aggregate: RealmAggregate,
    index: Arc<RealmIndex>,
    progress: Arc<dyn ProgressStore>,
    config: IndexingConfig,
}

impl RealmProjector {
    pub fn new(
        journal: Arc<dyn EventJournal>,
        aggregate: RealmAggregate,
        index: Arc<RealmIndex>,
        progress: Arc<dyn ProgressStore>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            journal,
            aggregate,
            index,
            progress,
            config,
        }
    }

    /// Run until aborted, resuming from the persisted offset.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut offset = match self.progress.load_offset(VIEW_ID).await {
            Ok(offset) => offset,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load projection offset, starting at 0");
                0
            }
        };
        let mut processed_since_persist = 0u64;
        let mut last_persist = Instant::now();
        tracing::info!(offset, "realm projector started");

        loop {
            let batch = match retry::retry(&self.config.retry, |_| true, || {
                self.journal
                    .events_by_tag(REALM_TAG, offset, self.config.batch)
            })
            .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(error = %err, "journal tag query failed");
                    tokio::time::sleep(self.config.batch_timeout).await;
                    continue;
                }
            };

            if batch.is_empty() {
                tokio::time::sleep(self.config.batch_timeout).await;
                continue;
            }

            let labels: BTreeSet<Label> = batch
                .iter()
                .filter_map(|envelope| label_of(&envelope.persistence_id))
                .collect();
            for label in labels {
                if let Err(err) = self.refresh(&label).await {
                    // The next event for this realm (or a restart from the
                    // persisted offset) will repair the entry.
                    tracing::error!(realm = %label, error = %err, "realm index refresh failed");
                }
            }

            offset = batch.last().map(|envelope| envelope.offset).unwrap_or(offset);
            processed_since_persist += batch.len() as u64;
            metrics::counter!("keygate_projector_events_total").increment(batch.len() as u64);

            if processed_since_persist >= self.config.persist_after_processed
                || last_persist.elapsed() >= self.config.progress_max_time_window
            {
                // Best-effort checkpoint; replay from an older offset is safe.
                match self.progress.save_offset(VIEW_ID, offset).await {
                    Ok(()) => {
                        processed_since_persist = 0;
                        last_persist = Instant::now();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to persist projection offset");
                    }
                }
            }
        }
    }

    async fn refresh(&self, label: &Label) -> Result<(), IamError> {
        retry::retry(
            &self.config.retry,
            |err| {
                matches!(
                    err,
                    IamError::OperationTimedOut(_) | IamError::InternalError(_)
                )
            },
            || async move {
                let resource = self.aggregate.current_resource(label).await?;
                self.index.put(resource).await
            },
        )
        .await
    }
}
