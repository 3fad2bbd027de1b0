use crate::error::Result;
use crate::models::DocumentRecord;
use crate::vector_store::write_json_atomically;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Uploaded documents by id, optionally mirrored to a JSON manifest.
pub struct DocumentRegistry {
    documents: RwLock<HashMap<String, DocumentRecord>>,
    manifest_path: Option<PathBuf>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            manifest_path: None,
        }
    }

    pub async fn with_manifest(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: Vec<DocumentRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        log::info!("Loaded {} documents from {}", records.len(), path.display());

        Ok(Self {
            documents: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
            manifest_path: Some(path),
        })
    }

    async fn persist(&self, documents: &HashMap<String, DocumentRecord>) -> Result<()> {
        if let Some(path) = &self.manifest_path {
            write_json_atomically(path, &sorted(documents.values().cloned().collect())).await?;
        }
        Ok(())
    }

    /// Adds or replaces a record. Nothing changes if the manifest cannot be
    /// written.
    pub async fn insert(&self, record: DocumentRecord) -> Result<()> {
        let mut documents = self.documents.write().await;
        let id = record.id.clone();
        let previous = documents.insert(id.clone(), record);

        if let Err(e) = self.persist(&documents).await {
            match previous {
                Some(previous) => documents.insert(id, previous),
                None => documents.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.documents.read().await.get(id).cloned()
    }

    /// Oldest upload first.
    pub async fn list(&self) -> Vec<DocumentRecord> {
        sorted(self.documents.read().await.values().cloned().collect())
    }

    pub async fn remove(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let mut documents = self.documents.write().await;
        let Some(removed) = documents.remove(id) else {
            return Ok(None);
        };

        if let Err(e) = self.persist(&documents).await {
            documents.insert(id.to_string(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Removes every record and returns them.
    pub async fn clear(&self) -> Result<Vec<DocumentRecord>> {
        let mut documents = self.documents.write().await;
        let removed = std::mem::take(&mut *documents);

        if let Err(e) = self.persist(&documents).await {
            *documents = removed;
            return Err(e);
        }
        Ok(sorted(removed.into_values().collect()))
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    records.sort_by(|a, b| {
        a.upload_time
            .cmp(&b.upload_time)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;
    use chrono::{Duration, Utc};

    fn record(id: &str, filename: &str, minutes_ago: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            filename: filename.to_string(),
            file_size: 10,
            file_type: "txt".to_string(),
            upload_time: Utc::now() - Duration::minutes(minutes_ago),
            status: DocumentStatus::Processed,
            chunk_count: 1,
            stored_path: PathBuf::from(format!("uploads/{}_{}", id, filename)),
        }
    }

    #[tokio::test]
    async fn list_is_ordered_by_upload_time() {
        let registry = DocumentRegistry::new();
        registry.insert(record("new", "b.txt", 1)).await.unwrap();
        registry.insert(record("old", "a.txt", 10)).await.unwrap();
        let ids: Vec<String> = registry.list().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[tokio::test]
    async fn remove_returns_the_record_once() {
        let registry = DocumentRegistry::new();
        registry.insert(record("a", "a.txt", 0)).await.unwrap();
        assert!(registry.remove("a").await.unwrap().is_some());
        assert!(registry.remove("a").await.unwrap().is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");

        let registry = DocumentRegistry::with_manifest(&path).await.unwrap();
        registry.insert(record("a", "a.txt", 2)).await.unwrap();
        registry.insert(record("b", "b.txt", 1)).await.unwrap();
        registry.remove("a").await.unwrap();

        let reloaded = DocumentRegistry::with_manifest(&path).await.unwrap();
        assert_eq!(reloaded.len().await, 1);
        assert_eq!(reloaded.get("b").await.unwrap().filename, "b.txt");
    }

    #[tokio::test]
    async fn clear_returns_everything_in_order() {
        let registry = DocumentRegistry::new();
        registry.insert(record("new", "b.txt", 1)).await.unwrap();
        registry.insert(record("old", "a.txt", 5)).await.unwrap();
        let ids: Vec<String> = registry.clear().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["old", "new"]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn failed_manifest_write_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");
        let registry = DocumentRegistry::with_manifest(&path).await.unwrap();
        registry.insert(record("kept", "kept.txt", 3)).await.unwrap();

        std::fs::create_dir(dir.path().join("documents.json.tmp")).unwrap();

        assert!(registry.insert(record("new", "new.txt", 0)).await.is_err());
        assert!(registry.get("new").await.is_none());

        assert!(registry.remove("kept").await.is_err());
        assert!(registry.get("kept").await.is_some());

        assert!(registry.clear().await.is_err());
        assert_eq!(registry.len().await, 1);
    }
}
