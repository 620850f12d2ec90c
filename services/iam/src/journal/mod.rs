//! Semantic persistence seams: event journal, snapshot store, and projection
//! progress.
//!
//! # Purpose
//! The aggregate and projector depend on these traits only; `memory` provides
//! the in-process implementation used for development and tests. A durable
//! backend plugs in behind the same contract: strictly sequenced appends per
//! persistence id, per-entity replay, and a tag query over a global offset.

use async_trait::async_trait;
use keygate_realm::Label;
use serde_json::Value;
use thiserror::Error;

pub mod memory;

/// Tag attached to every realm event, the projector's filter.
pub const REALM_TAG: &str = "realm";

/// Persistence-id scheme for realm aggregates.
pub fn persistence_id(label: &Label) -> String {
    format!("realms-{label}")
}

/// The label back out of a persistence id, `None` for foreign ids.
pub fn label_of(persistence_id: &str) -> Option<Label> {
    persistence_id
        .strip_prefix("realms-")
        .and_then(|raw| Label::new(raw).ok())
}

/// One persisted event: the per-entity sequence number plus the global
/// journal offset assigned at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub persistence_id: String,
    pub sequence_nr: u64,
    pub offset: u64,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("sequence conflict for '{persistence_id}': expected {expected}, got {attempted}")]
    SequenceConflict {
        persistence_id: String,
        expected: u64,
        attempted: u64,
    },
    #[error("journal i/o failure: {0}")]
    Io(String),
}

#[async_trait]
pub trait EventJournal: Send + Sync {
    /// Append a tagged event. `sequence_nr` must be exactly one past the last
    /// persisted sequence for `persistence_id`, starting at 1.
    async fn append(
        &self,
        persistence_id: &str,
        sequence_nr: u64,
        tag: &str,
        payload: Value,
    ) -> Result<(), JournalError>;

    /// Events of one entity with `sequence_nr > from`, oldest first.
    async fn replay(
        &self,
        persistence_id: &str,
        from: u64,
    ) -> Result<Vec<EventEnvelope>, JournalError>;

    /// Up to `max` events carrying `tag` with a global offset beyond
    /// `offset`, oldest first.
    async fn events_by_tag(
        &self,
        tag: &str,
        offset: u64,
        max: usize,
    ) -> Result<Vec<EventEnvelope>, JournalError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(
        &self,
        persistence_id: &str,
        sequence_nr: u64,
        state: Value,
    ) -> Result<(), JournalError>;

    /// The latest snapshot with its sequence number, if any.
    async fn load(&self, persistence_id: &str) -> Result<Option<(u64, Value)>, JournalError>;
}

/// Offset checkpoints for journal-tailing views. Persistence is best-effort:
/// consumers must stay correct when resumed from any older offset.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn save_offset(&self, view_id: &str, offset: u64) -> Result<(), JournalError>;
    async fn load_offset(&self, view_id: &str) -> Result<u64, JournalError>;
}
