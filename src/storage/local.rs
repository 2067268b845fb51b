//! Local filesystem storage implementation.
//!
//! Every write goes to a hidden temporary file in the same directory
//! and is renamed over the target, so a reader never observes a
//! partially written list.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ChangeSet, Manifest, ManifestEntry, Snapshot, SnapshotFile, SyntaxKind};
use crate::services::SourceRegistry;
use crate::services::validator::count_rules;
use crate::storage::{MANIFEST_FILE, SnapshotStorage, WriteMetadata};
use crate::utils::is_safe_filename;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        let tmp = self.path(&format!(".{key}.tmp"));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::storage(&path, e));
        }
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read a previously published list as text.
    async fn read_list(&self, filename: &str) -> Option<String> {
        match self.read_bytes(filename).await {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(content) => Some(content),
                Err(_) => {
                    log::warn!("Ignoring previous {}: not valid UTF-8", filename);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Ignoring previous {}: {}", filename, e);
                None
            }
        }
    }

    async fn modified_at(&self, filename: &str) -> DateTime<Utc> {
        tokio::fs::metadata(self.path(filename))
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl SnapshotStorage for LocalStorage {
    async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|e| AppError::storage(&self.root_dir, e))?;

        let probe = ".listmirror-probe";
        self.write_bytes(probe, b"").await?;
        tokio::fs::remove_file(self.path(probe))
            .await
            .map_err(|e| AppError::storage(&self.path(probe), e))?;
        Ok(())
    }

    async fn load_snapshot(&self, registry: &SourceRegistry) -> Result<Snapshot> {
        let manifest = self.load_manifest().await?;
        let mut snapshot = Snapshot::new();

        for source in registry.list_sources() {
            let Some(content) = self.read_list(&source.filename).await else {
                continue;
            };

            let entry = manifest.get(&source.filename);
            let updated_at = match entry {
                Some(entry) => entry.updated_at,
                None => self.modified_at(&source.filename).await,
            };
            // Validators only apply to the URL they were issued for.
            let validators = entry.filter(|e| e.url == source.url);

            let file = SnapshotFile {
                rule_count: count_rules(source.syntax, &content),
                content,
                updated_at,
                etag: validators.and_then(|e| e.etag.clone()),
                last_modified: validators.and_then(|e| e.last_modified.clone()),
                ..SnapshotFile::new(source, String::new(), 0)
            };
            snapshot.insert(source.filename.clone(), file);
        }

        for (filename, entry) in &manifest {
            if registry.by_filename(filename).is_some() || !is_safe_filename(filename) {
                continue;
            }
            if let Some(content) = self.read_list(filename).await {
                snapshot.insert(
                    filename.clone(),
                    SnapshotFile {
                        source: entry.name.clone(),
                        url: entry.url.clone(),
                        syntax: SyntaxKind::default(),
                        content,
                        rule_count: entry.rule_count,
                        updated_at: entry.updated_at,
                        etag: None,
                        last_modified: None,
                    },
                );
            }
        }

        log::info!(
            "Loaded previous snapshot: {} files, {} rules",
            snapshot.len(),
            snapshot.total_rules()
        );
        Ok(snapshot)
    }

    async fn write_files(&self, snapshot: &Snapshot, changes: &ChangeSet) -> Result<WriteMetadata> {
        let mut metadata = WriteMetadata::default();

        for filename in changes.added.iter().chain(&changes.updated) {
            let Some(file) = snapshot.get(filename) else {
                continue;
            };
            match self.write_bytes(filename, file.content.as_bytes()).await {
                Ok(()) => {
                    log::debug!("Wrote {} ({} rules)", filename, file.rule_count);
                    metadata.written.push(filename.clone());
                }
                Err(e) => {
                    log::error!("Failed to write {}: {}", filename, e);
                    metadata.failures.push((filename.clone(), e.to_string()));
                }
            }
        }

        if !changes.removed.is_empty() {
            let manifest = self.load_manifest().await?;
            for filename in &changes.removed {
                if !manifest.contains_key(filename) || !is_safe_filename(filename) {
                    continue;
                }
                match tokio::fs::remove_file(self.path(filename)).await {
                    Ok(()) => {
                        log::info!("Removed orphaned {}", filename);
                        metadata.removed.push(filename.clone());
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        metadata.removed.push(filename.clone());
                    }
                    Err(e) => log::warn!("Failed to remove {}: {}", filename, e),
                }
            }
        }

        Ok(metadata)
    }

    async fn write_manifest(&self, snapshot: &Snapshot) -> Result<()> {
        let manifest: Manifest = snapshot
            .iter()
            .map(|(filename, file)| (filename.clone(), ManifestEntry::from(file)))
            .collect();
        self.write_json(MANIFEST_FILE, &manifest).await
    }

    async fn load_manifest(&self) -> Result<Manifest> {
        match self.read_json::<Manifest>(MANIFEST_FILE).await {
            Ok(manifest) => Ok(manifest.unwrap_or_default()),
            Err(AppError::Json(e)) => {
                log::warn!("Ignoring unreadable {}: {}", MANIFEST_FILE, e);
                Ok(Manifest::new())
            }
            Err(e) => Err(e),
        }
    }

    fn index_path(&self, filename: &str) -> PathBuf {
        self.path(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceSpec;
    use crate::pipeline::calculate_diff;
    use tempfile::TempDir;

    fn registry(names: &[&str]) -> SourceRegistry {
        SourceRegistry::new(
            names
                .iter()
                .map(|name| {
                    SourceSpec::new(
                        *name,
                        format!("https://lists.example.org/{name}.txt"),
                        format!("{name}.txt"),
                        SyntaxKind::Adblock,
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    fn snapshot_for(registry: &SourceRegistry, content: &str) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for source in registry.list_sources() {
            snapshot.insert(
                source.filename.clone(),
                SnapshotFile::new(source, content.to_string(), count_rules(source.syntax, content)),
            );
        }
        snapshot
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!tmp.path().join(".test.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.read_bytes("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prepare_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("out");
        let storage = LocalStorage::new(&root);

        storage.prepare().await.unwrap();
        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("occupied");
        std::fs::write(&root, b"not a directory").unwrap();

        let storage = LocalStorage::new(&root);
        assert!(storage.prepare().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_directory_is_empty_snapshot() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let snapshot = storage.load_snapshot(&registry(&["a"])).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_keeps_metadata() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let registry = registry(&["a", "b"]);

        let mut snapshot = snapshot_for(&registry, "||one^\n||two^\n");
        if let Some(file) = snapshot.files.get_mut("a.txt") {
            file.etag = Some("\"e1\"".into());
        }
        let changes = calculate_diff(&Snapshot::new(), &snapshot);

        let written = storage.write_files(&snapshot, &changes).await.unwrap();
        assert_eq!(written.written, vec!["a.txt", "b.txt"]);
        storage.write_manifest(&snapshot).await.unwrap();

        let loaded = storage.load_snapshot(&registry).await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.get("a.txt").unwrap().rule_count, 2);
    }

    #[tokio::test]
    async fn test_validators_dropped_when_url_changes() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let original = registry(&["a"]);

        let mut snapshot = snapshot_for(&original, "rule\n");
        if let Some(file) = snapshot.files.get_mut("a.txt") {
            file.etag = Some("\"e1\"".into());
        }
        let changes = calculate_diff(&Snapshot::new(), &snapshot);
        storage.write_files(&snapshot, &changes).await.unwrap();
        storage.write_manifest(&snapshot).await.unwrap();

        let moved = SourceRegistry::new(vec![SourceSpec::new(
            "a",
            "https://mirror.example.net/a.txt",
            "a.txt",
            SyntaxKind::Adblock,
        )])
        .unwrap();
        let loaded = storage.load_snapshot(&moved).await.unwrap();
        assert_eq!(loaded.get("a.txt").unwrap().etag, None);
        assert_eq!(loaded.get("a.txt").unwrap().content, "rule\n");
    }

    #[tokio::test]
    async fn test_orphans_removed_only_when_in_manifest() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let both = registry(&["keep", "drop"]);

        let snapshot = snapshot_for(&both, "rule\n");
        storage
            .write_files(&snapshot, &calculate_diff(&Snapshot::new(), &snapshot))
            .await
            .unwrap();
        storage.write_manifest(&snapshot).await.unwrap();
        std::fs::write(tmp.path().join("foreign.txt"), "not ours\n").unwrap();

        let remaining = registry(&["keep"]);
        let previous = storage.load_snapshot(&remaining).await.unwrap();
        assert!(previous.contains("drop.txt"));
        assert!(!previous.contains("foreign.txt"));

        let mut current = previous.clone();
        current.remove("drop.txt");
        let changes = calculate_diff(&previous, &current);
        assert_eq!(changes.removed, vec!["drop.txt"]);

        let written = storage.write_files(&current, &changes).await.unwrap();
        assert_eq!(written.removed, vec!["drop.txt"]);
        assert!(!tmp.path().join("drop.txt").exists());
        assert!(tmp.path().join("foreign.txt").exists());
        assert!(tmp.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), b"{ nope").unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.load_manifest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_per_file() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let registry = registry(&["a", "b"]);
        let snapshot = snapshot_for(&registry, "rule\n");

        // A directory squatting on the target makes the rename fail.
        std::fs::create_dir(tmp.path().join("a.txt")).unwrap();
        std::fs::write(tmp.path().join("a.txt").join("x"), b"x").unwrap();

        let changes = calculate_diff(&Snapshot::new(), &snapshot);
        let written = storage.write_files(&snapshot, &changes).await.unwrap();
        assert_eq!(written.written, vec!["b.txt"]);
        assert!(written.failure("a.txt").is_some());
        assert!(!tmp.path().join(".a.txt.tmp").exists());
    }
}
