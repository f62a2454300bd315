//! Durable queue of events awaiting retry.
//!
//! Records are create-then-delete only: nothing ever rewrites an existing
//! record, so concurrent persist / list / delete need no record-level locks.

use crate::{DeliveryError, DeliveryResult, Event};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use ulid::Ulid;

/// File name prefix for persisted records.
const RECORD_PREFIX: &str = "event_";

/// File name suffix for persisted records.
const RECORD_SUFFIX: &str = ".json";

/// Identifier of one persisted record (its file name for [`FileQueue`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Fresh identifier derived from the current time.
    ///
    /// ULIDs carry a millisecond timestamp plus 80 random bits, so concurrent
    /// persists never collide.
    pub fn generate() -> Self {
        Self(format!("{}{}{}", RECORD_PREFIX, Ulid::new(), RECORD_SUFFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_file_name(name: &str) -> Option<Self> {
        (name.starts_with(RECORD_PREFIX) && name.ends_with(RECORD_SUFFIX))
            .then(|| Self(name.to_string()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage backend for events pending retry.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Durably store `event` under `record`. The record only becomes visible
    /// to [`list_pending`](Self::list_pending) once it is complete.
    async fn persist_as(&self, record: &RecordId, event: &Event) -> DeliveryResult<()>;

    /// Durably store `event` under a fresh record.
    async fn persist(&self, event: &Event) -> DeliveryResult<RecordId> {
        let record = RecordId::generate();
        self.persist_as(&record, event).await?;
        Ok(record)
    }

    /// All records currently stored, in no particular order.
    async fn list_pending(&self) -> DeliveryResult<Vec<RecordId>>;

    /// Decode a record. Corrupt bodies yield [`DeliveryError::Decode`].
    async fn read(&self, record: &RecordId) -> DeliveryResult<Event>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete(&self, record: &RecordId) -> DeliveryResult<()>;
}

/// One-file-per-record queue under a directory.
#[derive(Debug, Clone)]
pub struct FileQueue {
    dir: PathBuf,
}

impl FileQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, record: &RecordId) -> PathBuf {
        self.dir.join(record.as_str())
    }
}

#[async_trait]
impl DurableQueue for FileQueue {
    async fn persist_as(&self, record: &RecordId, event: &Event) -> DeliveryResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_of(record);
        let tmp_path = self.dir.join(format!(".{}.tmp", record));
        let body = event.to_json()?;

        let write_result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)
                .await?;
            file.write_all(body.as_bytes()).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(record = %record, "Persisted event");
        Ok(())
    }

    async fn list_pending(&self) -> DeliveryResult<Vec<RecordId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.dir).await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(record) = entry.file_name().to_str().and_then(RecordId::from_file_name) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn read(&self, record: &RecordId) -> DeliveryResult<Event> {
        let body = tokio::fs::read_to_string(self.path_of(record)).await?;
        Event::from_json(&body).map_err(|source| DeliveryError::Decode {
            record: record.to_string(),
            source,
        })
    }

    async fn delete(&self, record: &RecordId) -> DeliveryResult<()> {
        match tokio::fs::remove_file(self.path_of(record)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory queue. Nothing survives the process; useful for embedding
/// without a writable directory and for tests.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    records: Mutex<BTreeMap<RecordId, String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw body as-is, bypassing serialization.
    pub fn insert_raw(&self, body: impl Into<String>) -> RecordId {
        let record = RecordId::generate();
        self.records.lock().insert(record.clone(), body.into());
        record
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn contains(&self, record: &RecordId) -> bool {
        self.records.lock().contains_key(record)
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn persist_as(&self, record: &RecordId, event: &Event) -> DeliveryResult<()> {
        let body = event.to_json()?;
        self.records.lock().insert(record.clone(), body);
        Ok(())
    }

    async fn list_pending(&self) -> DeliveryResult<Vec<RecordId>> {
        Ok(self.records.lock().keys().cloned().collect())
    }

    async fn read(&self, record: &RecordId) -> DeliveryResult<Event> {
        let body = self.records.lock().get(record).cloned().ok_or_else(|| {
            DeliveryError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("record {record} not found"),
            ))
        })?;
        Event::from_json(&body).map_err(|source| DeliveryError::Decode {
            record: record.to_string(),
            source,
        })
    }

    async fn delete(&self, record: &RecordId) -> DeliveryResult<()> {
        self.records.lock().remove(record);
        Ok(())
    }
}
