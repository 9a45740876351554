//! Resumable state of multipart transfers.
//!
//! One record per (source, destination) pair lives in the checkpoint directory, named after
//! the SHA-1 of the pair. A record is written when the first part of a transfer completes,
//! rewritten after every further part, and removed when the transfer completes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::types::sha1_hex;

const RECORD_EXTENSION: &str = "cp";

/// The properties of a source a checkpoint is only valid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub source: String,
    pub dest: String,
    pub size: u64,
    pub last_modified: i64,
    pub part_size: u64,
    pub part_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub fingerprint: SourceFingerprint,
    /// The multipart upload the parts belong to. Downloads have none.
    pub upload_id: Option<String>,
    /// Completed part number to ETag. Downloads record an empty ETag.
    pub completed_parts: BTreeMap<i32, String>,
}

impl CheckpointRecord {
    pub fn new(fingerprint: SourceFingerprint, upload_id: Option<String>) -> Self {
        Self {
            fingerprint,
            upload_id,
            completed_parts: BTreeMap::new(),
        }
    }

    pub fn is_valid_for(&self, fingerprint: &SourceFingerprint) -> bool {
        self.fingerprint == *fingerprint
    }

    pub fn is_part_completed(&self, part_number: i32) -> bool {
        self.completed_parts.contains_key(&part_number)
    }

    pub fn missing_parts(&self) -> Vec<i32> {
        (1..=self.fingerprint.part_count as i32)
            .filter(|part_number| !self.is_part_completed(*part_number))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, source: &str, dest: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{RECORD_EXTENSION}",
            sha1_hex(&format!("{source}==>{dest}"))
        ))
    }

    /// The stored record of the pair, if it can be read. An unreadable record is discarded.
    pub async fn load(&self, source: &str, dest: &str) -> Option<CheckpointRecord> {
        let path = self.record_path(source, dest);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                let path = path.to_string_lossy().to_string();
                let error = e.to_string();
                warn!(path = path, error = error, "failed to read checkpoint.");
                return None;
            }
        };

        match serde_json::from_slice::<CheckpointRecord>(&body) {
            Ok(record) if record.fingerprint.source == source && record.fingerprint.dest == dest => {
                Some(record)
            }
            Ok(_) => None,
            Err(e) => {
                let path = path.to_string_lossy().to_string();
                let error = e.to_string();
                warn!(path = path, error = error, "corrupted checkpoint has been discarded.");
                None
            }
        }
    }

    pub async fn save(&self, record: &CheckpointRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .context("tokio::fs::create_dir_all() failed.")?;

        let body = serde_json::to_vec(record).context("serde_json::to_vec() failed.")?;
        let dir = self.dir.clone();
        let path = self.record_path(&record.fingerprint.source, &record.fingerprint.dest);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp_file =
                NamedTempFile::new_in(dir).context("NamedTempFile::new_in failed.")?;
            temp_file
                .write_all(&body)
                .context("NamedTempFile::write_all() failed.")?;
            temp_file
                .persist(path)
                .context("NamedTempFile::persist() failed.")?;
            Ok(())
        })
        .await
        .context("spawn_blocking() failed.")?
    }

    pub async fn remove(&self, source: &str, dest: &str) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(source, dest)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("tokio::fs::remove_file() failed."),
        }
    }

    /// Removes the checkpoint directory when no record is left in it.
    pub async fn remove_dir_if_empty(&self) {
        if tokio::fs::remove_dir(&self.dir).await.is_ok() {
            let dir = self.dir.to_string_lossy().to_string();
            debug!(dir = dir, "checkpoint directory removed.");
        }
    }
}

/// A record shared by the workers transferring the parts of one object.
///
/// Part completions are serialized so that no update of the completed part set is lost,
/// and each completion is on disk before `record_part` returns.
pub struct CheckpointSession {
    store: CheckpointStore,
    record: Mutex<CheckpointRecord>,
}

impl CheckpointSession {
    pub fn new(store: CheckpointStore, record: CheckpointRecord) -> Self {
        Self {
            store,
            record: Mutex::new(record),
        }
    }

    pub async fn record_part(&self, part_number: i32, e_tag: &str) -> Result<()> {
        let mut record = self.record.lock().await;
        record
            .completed_parts
            .insert(part_number, e_tag.to_string());
        self.store.save(&record).await?;

        trace!(
            dest = record.fingerprint.dest,
            part_number = part_number,
            "checkpoint updated."
        );
        Ok(())
    }

    pub async fn snapshot(&self) -> CheckpointRecord {
        self.record.lock().await.clone()
    }

    pub async fn finalize(&self) -> Result<()> {
        let record = self.record.lock().await;
        self.store
            .remove(&record.fingerprint.source, &record.fingerprint.dest)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    fn fingerprint() -> SourceFingerprint {
        SourceFingerprint {
            source: "/tmp/src/large.dat".to_string(),
            dest: "oss://bucket1/large.dat".to_string(),
            size: 30,
            last_modified: 1_600_000_000,
            part_size: 10,
            part_count: 3,
        }
    }

    #[tokio::test]
    async fn save_load_and_remove() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(&dir.path().join("cp"));
        let fingerprint = fingerprint();

        assert!(store.load(&fingerprint.source, &fingerprint.dest).await.is_none());

        let mut record = CheckpointRecord::new(fingerprint.clone(), Some("UPLOAD1".to_string()));
        record.completed_parts.insert(2, "etag2".to_string());
        store.save(&record).await.unwrap();

        let loaded = store
            .load(&fingerprint.source, &fingerprint.dest)
            .await
            .unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.missing_parts(), vec![1, 3]);

        store
            .remove(&fingerprint.source, &fingerprint.dest)
            .await
            .unwrap();
        assert!(store.load(&fingerprint.source, &fingerprint.dest).await.is_none());
        store
            .remove(&fingerprint.source, &fingerprint.dest)
            .await
            .unwrap();

        store.remove_dir_if_empty().await;
        assert!(!store.dir().exists());
    }

    #[test]
    fn fingerprint_mismatch_invalidates() {
        init_dummy_tracing_subscriber();

        let record = CheckpointRecord::new(fingerprint(), None);
        assert!(record.is_valid_for(&fingerprint()));

        let mut changed = fingerprint();
        changed.size = 31;
        assert!(!record.is_valid_for(&changed));

        let mut changed = fingerprint();
        changed.last_modified += 1;
        assert!(!record.is_valid_for(&changed));

        let mut changed = fingerprint();
        changed.part_size = 5;
        assert!(!record.is_valid_for(&changed));
    }

    #[tokio::test]
    async fn corrupted_record_is_discarded() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let fingerprint = fingerprint();
        std::fs::write(
            store.record_path(&fingerprint.source, &fingerprint.dest),
            b"{not json",
        )
        .unwrap();

        assert!(store.load(&fingerprint.source, &fingerprint.dest).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_part_completions_are_not_lost() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut fingerprint = fingerprint();
        fingerprint.part_count = 16;
        let session = Arc::new(CheckpointSession::new(
            store.clone(),
            CheckpointRecord::new(fingerprint.clone(), Some("UPLOAD1".to_string())),
        ));

        let mut handles = vec![];
        for part_number in 1..=16 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session
                    .record_part(part_number, &format!("etag{part_number}"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let loaded = store
            .load(&fingerprint.source, &fingerprint.dest)
            .await
            .unwrap();
        assert_eq!(loaded.completed_parts.len(), 16);
        assert!(loaded.missing_parts().is_empty());
        assert_eq!(session.snapshot().await, loaded);

        session.finalize().await.unwrap();
        assert!(store.load(&fingerprint.source, &fingerprint.dest).await.is_none());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
