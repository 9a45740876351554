//! Fingerprints of items transferred by earlier runs.
//!
//! The store is an append-only JSON lines log inside the snapshot directory. The last
//! line written for a key wins. Unreadable lines are ignored, so a damaged log only makes
//! items transfer again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SNAPSHOT_FILE: &str = "snapshot.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub last_modified: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    key: String,
    fingerprint: Fingerprint,
    recorded_at: DateTime<Utc>,
}

pub struct SnapshotStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Fingerprint>>,
}

impl SnapshotStore {
    /// Opens the store in `dir`, creating the directory if necessary.
    ///
    /// `dir` naming something other than a directory is an error.
    pub async fn open(dir: &Path) -> Result<Self> {
        match tokio::fs::metadata(dir).await {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(anyhow!(
                    "--snapshot-path {} is not a directory",
                    dir.display()
                ));
            }
            Ok(_) => {}
            Err(_) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("failed to create snapshot directory: {}", dir.display()))?;
            }
        }

        let path = dir.join(SNAPSHOT_FILE);
        let entries = load_entries(&path).await;

        let entry_count = entries.len();
        debug!(entry_count = entry_count, "snapshot loaded.");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn should_skip(&self, key: &str, fingerprint: &Fingerprint) -> bool {
        self.entries.lock().await.get(key) == Some(fingerprint)
    }

    pub async fn record(&self, key: &str, fingerprint: Fingerprint) -> Result<()> {
        let entry = SnapshotEntry {
            key: key.to_string(),
            fingerprint,
            recorded_at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&entry).context("serde_json::to_vec() failed.")?;
        line.push(b'\n');

        let mut entries = self.entries.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("failed to open snapshot.")?;
        file.write_all(&line)
            .await
            .context("failed to write snapshot.")?;
        file.flush().await.context("failed to flush snapshot.")?;

        entries.insert(entry.key, entry.fingerprint);
        Ok(())
    }
}

async fn load_entries(path: &Path) -> HashMap<String, Fingerprint> {
    let mut entries = HashMap::new();
    let body = match tokio::fs::read_to_string(path).await {
        Ok(body) => body,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                let error = e.to_string();
                warn!(error = error, "failed to read snapshot, every item will be transferred.");
            }
            return entries;
        }
    };

    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        match serde_json::from_str::<SnapshotEntry>(line) {
            Ok(entry) => {
                entries.insert(entry.key, entry.fingerprint);
            }
            Err(e) => {
                let error = e.to_string();
                warn!(error = error, "corrupted snapshot entry has been ignored.");
            }
        }
    }

    entries
}

/// The key an upload is remembered by.
pub fn upload_snapshot_key(absolute_path: &str, cloud_url: &str) -> String {
    format!("{absolute_path}==>{cloud_url}")
}

/// The key a download is remembered by.
pub fn download_snapshot_key(cloud_url: &str, absolute_path: &str) -> String {
    format!("{cloud_url}==>{absolute_path}")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const FINGERPRINT: Fingerprint = Fingerprint {
        size: 5,
        last_modified: 1_600_000_000,
    };

    #[tokio::test]
    async fn record_and_skip_across_opens() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let snapshot_dir = dir.path().join("snapshot");
        let key = upload_snapshot_key("/data/a.txt", "oss://bucket1/a.txt");
        assert_eq!(key, "/data/a.txt==>oss://bucket1/a.txt");
        assert_eq!(
            download_snapshot_key("oss://bucket1/a.txt", "/data/a.txt"),
            "oss://bucket1/a.txt==>/data/a.txt"
        );

        let store = SnapshotStore::open(&snapshot_dir).await.unwrap();
        assert!(!store.should_skip(&key, &FINGERPRINT).await);
        store.record(&key, FINGERPRINT).await.unwrap();
        assert!(store.should_skip(&key, &FINGERPRINT).await);

        let store = SnapshotStore::open(&snapshot_dir).await.unwrap();
        assert!(store.should_skip(&key, &FINGERPRINT).await);

        let changed = Fingerprint {
            size: 5,
            last_modified: 1_600_000_001,
        };
        assert!(!store.should_skip(&key, &changed).await);
    }

    #[tokio::test]
    async fn last_record_wins() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();
        let changed = Fingerprint {
            size: 6,
            last_modified: 1_600_000_100,
        };
        store.record("key1", FINGERPRINT).await.unwrap();
        store.record("key1", changed.clone()).await.unwrap();

        let store = SnapshotStore::open(dir.path()).await.unwrap();
        assert!(store.should_skip("key1", &changed).await);
        assert!(!store.should_skip("key1", &FINGERPRINT).await);
    }

    #[tokio::test]
    async fn corrupted_lines_are_ignored() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        {
            let store = SnapshotStore::open(dir.path()).await.unwrap();
            store.record("key1", FINGERPRINT).await.unwrap();
        }
        let path = dir.path().join(SNAPSHOT_FILE);
        let mut body = std::fs::read_to_string(&path).unwrap();
        body.push_str("garbage\n{\"key\":\n");
        std::fs::write(&path, body).unwrap();

        let store = SnapshotStore::open(dir.path()).await.unwrap();
        assert!(store.should_skip("key1", &FINGERPRINT).await);
        assert!(!store.should_skip("key2", &FINGERPRINT).await);
    }

    #[tokio::test]
    async fn plain_file_is_rejected() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();

        assert!(SnapshotStore::open(&file).await.is_err());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
