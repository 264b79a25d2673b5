use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Subtree holding in-progress downloads. Staging files live outside the
/// entry namespace so a remote file whose own name looks like a staging
/// artifact can never collide with one, and a concurrent lookup never opens
/// a half-written file.
const PARTIAL_DIR: &str = ".partial";

/// Read-through disk cache keyed by remote path.
///
/// Entries live at `<root>/<remote_path>`, mirroring the remote directory
/// structure; there is no separate index or manifest. An entry exists only
/// once a transfer has fully completed: writers stage under
/// `<root>/.partial/` and commit with an atomic rename. Entries are never
/// expired or evicted.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local path backing a remote path. The remote path has already passed
    /// the allow-list, which rejects `..` components, so joining is safe.
    pub fn entry_path(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path.trim_start_matches('/'))
    }

    fn partial_path(&self, remote_path: &str) -> PathBuf {
        self.root
            .join(PARTIAL_DIR)
            .join(remote_path.trim_start_matches('/'))
    }

    /// Returns a readable handle and size for a finalized entry, or `None`
    /// on a miss. Partially written files live under the staging subtree and
    /// are invisible here by construction.
    pub async fn lookup(&self, remote_path: &str) -> Option<(File, u64)> {
        let path = self.entry_path(remote_path);
        let file = File::open(&path).await.ok()?;
        let metadata = file.metadata().await.ok()?;
        if !metadata.is_file() {
            return None;
        }
        debug!("Cache hit for {} ({} bytes)", remote_path, metadata.len());
        Some((file, metadata.len()))
    }

    /// Starts a staged write for a remote path, creating parent directories
    /// as needed. A pre-existing non-directory component surfaces as the
    /// underlying filesystem error instead of being overwritten.
    pub async fn begin_write(&self, remote_path: &str) -> io::Result<CacheWriter> {
        let final_path = self.entry_path(remote_path);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial_path = self.partial_path(remote_path);
        if let Some(parent) = partial_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial_path)
            .await?;

        Ok(CacheWriter {
            file: Some(file),
            partial_path,
            final_path,
        })
    }
}

/// Staged write for one cache entry.
///
/// Exactly one of `commit` or `abort` should end the writer's life; dropping
/// it without either leaves a stale staging file behind, which a later write
/// for the same path truncates.
#[derive(Debug)]
pub struct CacheWriter {
    file: Option<File>,
    partial_path: PathBuf,
    final_path: PathBuf,
}

impl CacheWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "cache writer already finished",
            )),
        }
    }

    /// Atomically publishes the staged file at its final path.
    pub async fn commit(mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        fs::rename(&self.partial_path, &self.final_path).await?;
        debug!("Committed cache entry {}", self.final_path.display());
        Ok(())
    }

    /// Discards the staged file. A failed download must not leave a
    /// truncated entry behind.
    pub async fn abort(mut self) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.partial_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove partial cache file {}: {}",
                    self.partial_path.display(),
                    e
                );
            }
        }
    }
}

/// Per-path coordination for cache misses.
///
/// At most one FTP fetch per distinct remote path is in flight at a time;
/// later requesters for the same path wait on the holder and then re-check
/// the cache, so one RETR feeds any number of concurrent clients. Entries
/// are retained for the process lifetime; the reachable path set is bounded
/// by the allow-list.
#[derive(Debug, Default)]
pub struct InflightRegistry {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InflightRegistry {
    pub fn lock_for(&self, remote_path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(remote_path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn scratch_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rouilleproxy-cache-{}-{}", tag, std::process::id()))
    }

    async fn read_all(mut file: File) -> Vec<u8> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn commit_then_lookup_round_trips() {
        let root = scratch_root("roundtrip");
        let store = CacheStore::new(&root);
        let payload = b"The quick brown fox jumps over the lazy dog";

        let mut writer = store.begin_write("music/album/track.flac").await.unwrap();
        writer.write_chunk(&payload[..10]).await.unwrap();
        writer.write_chunk(&payload[10..]).await.unwrap();
        writer.commit().await.unwrap();

        let (file, size) = store.lookup("music/album/track.flac").await.unwrap();
        assert_eq!(size, payload.len() as u64);
        assert_eq!(read_all(file).await, payload);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn in_progress_write_is_not_a_hit() {
        let root = scratch_root("inprogress");
        let store = CacheStore::new(&root);

        let mut writer = store.begin_write("music/partial.bin").await.unwrap();
        writer.write_chunk(b"half of the").await.unwrap();
        assert!(store.lookup("music/partial.bin").await.is_none());

        writer.abort().await;
        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn abort_leaves_nothing_behind() {
        let root = scratch_root("abort");
        let store = CacheStore::new(&root);

        let mut writer = store.begin_write("music/doomed.bin").await.unwrap();
        writer.write_chunk(b"some bytes").await.unwrap();
        let partial = store.partial_path("music/doomed.bin");
        writer.abort().await;

        assert!(store.lookup("music/doomed.bin").await.is_none());
        assert!(!partial.exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn staging_never_shadows_a_look_alike_entry() {
        let root = scratch_root("shadow");
        let store = CacheStore::new(&root);

        // A remote file genuinely named like a staging artifact.
        let mut writer = store.begin_write("music/a.bin.part").await.unwrap();
        writer.write_chunk(b"real entry").await.unwrap();
        writer.commit().await.unwrap();

        // While a.bin is mid-download, its staging file must be invisible to
        // lookups of any path, and aborting it must not touch the real entry.
        let mut writer = store.begin_write("music/a.bin").await.unwrap();
        writer.write_chunk(b"half of a.bin").await.unwrap();

        let (file, size) = store.lookup("music/a.bin.part").await.unwrap();
        assert_eq!(size, b"real entry".len() as u64);
        assert_eq!(read_all(file).await, b"real entry");
        assert!(store.lookup("music/a.bin").await.is_none());

        writer.abort().await;
        assert!(store.lookup("music/a.bin.part").await.is_some());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn registry_hands_out_one_lock_per_path() {
        let registry = InflightRegistry::default();
        let a = registry.lock_for("music/a.mp3");
        let b = registry.lock_for("music/a.mp3");
        let other = registry.lock_for("music/b.mp3");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(other.try_lock().is_ok());
    }
}
