// src/bot/ledger.rs - Durable per-user warning points

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Warning points per user, rewritten to a JSON document after every mutation.
///
/// All read-modify-write sequences run under one mutex that is held until the
/// file write finishes, so a returned total is always on disk unless the write
/// itself failed (which is logged and leaves memory authoritative).
pub struct WarningLedger {
    path: PathBuf,
    entries: Mutex<HashMap<String, u32>>,
}

impl WarningLedger {
    /// Empty ledger that will persist to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Load the ledger from `path`. A missing file is a fresh ledger. A file
    /// that cannot be read or parsed is moved aside to `<path>.corrupt` so the
    /// first write does not replace it, and the ledger starts empty.
    pub async fn load<P: AsRef<Path>>(path: P) -> Self {
        let ledger = Self::new(path);

        let content = match fs::read_to_string(&ledger.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No warnings file at {}, starting with an empty ledger", ledger.path.display());
                return ledger;
            }
            Err(e) => {
                error!("Failed to read warnings from {}, starting empty: {}", ledger.path.display(), e);
                ledger.set_aside().await;
                return ledger;
            }
        };

        match Self::parse_document(&content) {
            Ok(entries) => {
                info!("Loaded warning points for {} users from {}", entries.len(), ledger.path.display());
                *ledger.entries.lock().await = entries;
            }
            Err(e) => {
                error!("Failed to load warnings from {}, starting empty: {:#}", ledger.path.display(), e);
                ledger.set_aside().await;
            }
        }

        ledger
    }

    fn parse_document(content: &str) -> Result<HashMap<String, u32>> {
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let entries: HashMap<String, u32> = serde_json::from_str(content)
            .context("Invalid warnings document")?;
        Ok(entries)
    }

    async fn set_aside(&self) {
        let target = self.sibling(".corrupt");
        match fs::rename(&self.path, &target).await {
            Ok(()) => warn!("Moved unreadable warnings file to {}", target.display()),
            Err(e) => warn!("Could not move {} aside: {}", self.path.display(), e),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Current points, 0 for unknown users
    pub async fn get(&self, user_id: &str) -> u32 {
        self.entries.lock().await.get(user_id).copied().unwrap_or(0)
    }

    /// Add `delta` points and persist before returning the new total
    pub async fn add(&self, user_id: &str, delta: u32) -> u32 {
        let mut entries = self.entries.lock().await;
        let total = {
            let points = entries.entry(user_id.to_string()).or_insert(0);
            *points = points.saturating_add(delta);
            *points
        };

        debug!("User {} +{} warning points (total {})", user_id, delta, total);
        self.persist_logged(&entries).await;
        total
    }

    /// Drop the user's points and persist. Returns the points they had.
    pub async fn reset(&self, user_id: &str) -> u32 {
        let mut entries = self.entries.lock().await;
        let previous = entries.remove(user_id).unwrap_or(0);

        if previous > 0 {
            info!("Reset {} warning points for {}", previous, user_id);
        }
        self.persist_logged(&entries).await;
        previous
    }

    /// Users by points descending, ties by user id, truncated to `limit`
    pub async fn top(&self, limit: usize) -> Vec<(String, u32)> {
        let entries = self.entries.lock().await;
        let mut sorted: Vec<(String, u32)> = entries
            .iter()
            .filter(|(_, points)| **points > 0)
            .map(|(user, points)| (user.clone(), *points))
            .collect();
        drop(entries);

        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted.truncate(limit);
        sorted
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist_logged(&self, entries: &HashMap<String, u32>) {
        if let Err(e) = self.persist(entries).await {
            warn!("Warning points not persisted, in-memory ledger stays authoritative: {:#}", e);
        }
    }

    /// Write the whole document to a sibling temp file, then rename over the target
    async fn persist(&self, entries: &HashMap<String, u32>) -> Result<()> {
        let document: BTreeMap<&str, u32> = entries.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let tmp_path = self.sibling(".tmp");

        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Persisted {} ledger entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn on_disk(path: &Path) -> HashMap<String, u32> {
        let content = fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let temp_dir = tempdir().unwrap();
        let ledger = WarningLedger::load(temp_dir.path().join("warnings.json")).await;

        assert!(ledger.is_empty().await);
        assert_eq!(ledger.get("nobody").await, 0);
    }

    #[tokio::test]
    async fn test_add_persists_before_returning() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("warnings.json");
        let ledger = WarningLedger::load(&path).await;

        assert_eq!(ledger.add("u1", 1).await, 1);
        assert_eq!(ledger.add("u1", 2).await, 3);

        let stored = on_disk(&path).await;
        assert_eq!(stored.get("u1"), Some(&3));

        let reloaded = WarningLedger::load(&path).await;
        assert_eq!(reloaded.get("u1").await, 3);
    }

    #[tokio::test]
    async fn test_reset_is_safe_for_unknown_users() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("warnings.json");
        let ledger = WarningLedger::load(&path).await;

        assert_eq!(ledger.reset("ghost").await, 0);
        assert_eq!(ledger.get("ghost").await, 0);

        ledger.add("u1", 4).await;
        assert_eq!(ledger.reset("u1").await, 4);
        assert_eq!(ledger.get("u1").await, 0);
        assert!(on_disk(&path).await.get("u1").is_none());
    }

    #[tokio::test]
    async fn test_top_orders_by_points() {
        let temp_dir = tempdir().unwrap();
        let ledger = WarningLedger::new(temp_dir.path().join("warnings.json"));

        ledger.add("a", 5).await;
        ledger.add("b", 3).await;
        ledger.add("c", 5).await;

        let top = ledger.top(10).await;
        assert_eq!(top.len(), 3);
        assert_eq!(top[2], ("b".to_string(), 3));
        assert!(top[..2].iter().all(|(_, p)| *p == 5));

        assert_eq!(ledger.top(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_file_starts_empty() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("warnings.json");
        fs::write(&path, "{not json").await.unwrap();

        let ledger = WarningLedger::load(&path).await;
        assert!(ledger.is_empty().await);

        // The broken document survives the next write
        ledger.add("u1", 1).await;
        let kept = fs::read_to_string(temp_dir.path().join("warnings.json.corrupt")).await.unwrap();
        assert_eq!(kept, "{not json");
        assert_eq!(on_disk(&path).await.get("u1"), Some(&1));
    }

    #[tokio::test]
    async fn test_unreadable_target_is_moved_aside() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("warnings.json");
        std::fs::create_dir_all(&path).unwrap();

        let ledger = WarningLedger::load(&path).await;
        assert!(ledger.is_empty().await);
        assert!(temp_dir.path().join("warnings.json.corrupt").is_dir());

        ledger.add("u1", 2).await;
        assert_eq!(on_disk(&path).await.get("u1"), Some(&2));
    }

    #[tokio::test]
    async fn test_resets_interleaved_with_adds_stay_consistent() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("warnings.json");
        let ledger = Arc::new(WarningLedger::new(&path));

        let mut handles = Vec::new();
        for i in 0..30u32 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                if i % 5 == 4 {
                    ledger.reset("u1").await;
                } else {
                    ledger.add("u1", 1).await;
                }
                ledger.add("u2", 1).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // The last reset wins; at most the adds after it remain
        let points = ledger.get("u1").await;
        assert!(points <= 24);
        assert_eq!(ledger.get("u2").await, 30);

        let stored = on_disk(&path).await;
        assert_eq!(stored.get("u1").copied().unwrap_or(0), points);
        assert_eq!(stored.get("u2"), Some(&30));
        assert_eq!(stored.len(), ledger.len().await);
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("warnings.json");
        let ledger = Arc::new(WarningLedger::new(&path));

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let user = if i % 2 == 0 { "even" } else { "odd" };
                ledger.add(user, 1 + i % 3).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let expected_even: u32 = (0..20u32).filter(|i| i % 2 == 0).map(|i| 1 + i % 3).sum();
        let expected_odd: u32 = (0..20u32).filter(|i| i % 2 == 1).map(|i| 1 + i % 3).sum();

        assert_eq!(ledger.get("even").await, expected_even);
        assert_eq!(ledger.get("odd").await, expected_odd);

        let stored = on_disk(&path).await;
        assert_eq!(stored.get("even"), Some(&expected_even));
        assert_eq!(stored.get("odd"), Some(&expected_odd));
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_authoritative() {
        let temp_dir = tempdir().unwrap();
        // A directory in place of the file makes the rename fail
        let path = temp_dir.path().join("warnings.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let ledger = WarningLedger::new(&path);
        assert_eq!(ledger.add("u1", 2).await, 2);
        assert_eq!(ledger.get("u1").await, 2);
    }
}
