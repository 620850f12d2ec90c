//! In-memory implementations of the persistence seams.
//!
//! # Purpose
//! Backs development and tests without external dependencies. State is lost
//! on restart; consistency is single-process, with writes serialized behind
//! a write lock the same way the rest of the in-memory stores work.

use super::{EventEnvelope, EventJournal, JournalError, ProgressStore, SnapshotStore};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Row {
    persistence_id: String,
    sequence_nr: u64,
    tag: String,
    payload: Value,
}

#[derive(Debug, Default)]
struct JournalInner {
    /// Global append order; a row's offset is its index + 1.
    rows: Vec<Row>,
    /// Highest persisted sequence number per persistence id.
    last_sequence: HashMap<String, u64>,
}

/// Append-only in-memory journal with strict per-entity sequencing.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    inner: RwLock<JournalInner>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventJournal for MemoryJournal {
    async fn append(
        &self,
        persistence_id: &str,
        sequence_nr: u64,
        tag: &str,
        payload: Value,
    ) -> Result<(), JournalError> {
        let mut inner = self.inner.write().await;
        let expected = inner.last_sequence.get(persistence_id).copied().unwrap_or(0) + 1;
        if sequence_nr != expected {
            return Err(JournalError::SequenceConflict {
                persistence_id: persistence_id.to_string(),
                expected,
                attempted: sequence_nr,
            });
        }
        inner.rows.push(Row {
            persistence_id: persistence_id.to_string(),
            sequence_nr,
            tag: tag.to_string(),
            payload,
        });
        inner
            .last_sequence
            .insert(persistence_id.to_string(), sequence_nr);
        Ok(())
    }

    async fn replay(
        &self,
        persistence_id: &str,
        from: u64,
    ) -> Result<Vec<EventEnvelope>, JournalError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.persistence_id == persistence_id && row.sequence_nr > from)
            .map(|(index, row)| EventEnvelope {
                persistence_id: row.persistence_id.clone(),
                sequence_nr: row.sequence_nr,
                offset: index as u64 + 1,
                payload: row.payload.clone(),
            })
            .collect())
    }

    async fn events_by_tag(
        &self,
        tag: &str,
        offset: u64,
        max: usize,
    ) -> Result<Vec<EventEnvelope>, JournalError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .enumerate()
            .filter(|(index, row)| *index as u64 + 1 > offset && row.tag == tag)
            .take(max)
            .map(|(index, row)| EventEnvelope {
                persistence_id: row.persistence_id.clone(),
                sequence_nr: row.sequence_nr,
                offset: index as u64 + 1,
                payload: row.payload.clone(),
            })
            .collect())
    }
}

/// Latest-only snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, (u64, Value)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(
        &self,
        persistence_id: &str,
        sequence_nr: u64,
        state: Value,
    ) -> Result<(), JournalError> {
        self.snapshots
            .write()
            .await
            .insert(persistence_id.to_string(), (sequence_nr, state));
        Ok(())
    }

    async fn load(&self, persistence_id: &str) -> Result<Option<(u64, Value)>, JournalError> {
        Ok(self.snapshots.read().await.get(persistence_id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    offsets: RwLock<HashMap<String, u64>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn save_offset(&self, view_id: &str, offset: u64) -> Result<(), JournalError> {
        self.offsets
            .write()
            .await
            .insert(view_id.to_string(), offset);
        Ok(())
    }

    async fn load_offset(&self, view_id: &str) -> Result<u64, JournalError> {
        Ok(self.offsets.read().await.get(view_id).copied().unwrap_or(0))
    }
}
