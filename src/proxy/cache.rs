//! Local copies of remote media, downloaded on first access.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use streamctl_common::{Error, Result, ServerId};
use streamctl_remote::{ConnectionManager, HostSpec, RemoteStat};
use tokio::sync::Mutex;

pub struct MediaCache {
    dir: PathBuf,
    /// One lock per key so concurrent first requests download once.
    fetching: DashMap<String, Arc<Mutex<()>>>,
}

impl MediaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fetching: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(server_id: ServerId, remote_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(server_id.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(remote_path.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.meta"))
    }

    /// Size and modification time the cached copy was taken at.
    fn validator(stat: &RemoteStat) -> String {
        format!("{} {}", stat.size, stat.modified.unwrap_or_default())
    }

    async fn is_current(&self, key: &str, stat: &RemoteStat) -> Result<bool> {
        let target = self.dir.join(key);
        let len = match tokio::fs::metadata(&target).await {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if len != stat.size {
            return Ok(false);
        }
        match tokio::fs::read_to_string(self.meta_path(key)).await {
            Ok(meta) => Ok(meta.trim() == Self::validator(stat)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Local copy of `remote_path` matching `stat`, downloading it if absent
    /// or if the remote file changed since it was cached.
    ///
    /// The download lands in a temporary sibling and is renamed into place,
    /// so a cached file is always complete.
    pub async fn fetch(
        &self,
        manager: &ConnectionManager,
        host: &HostSpec,
        remote_path: &str,
        stat: &RemoteStat,
    ) -> Result<PathBuf> {
        let key = Self::key(host.server_id, remote_path);
        let target = self.dir.join(&key);
        if self.is_current(&key, stat).await? {
            return Ok(target);
        }

        let lock = self
            .fetching
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if self.is_current(&key, stat).await? {
            return Ok(target);
        }
        if self.evict(host.server_id, remote_path).await? {
            tracing::debug!(remote = remote_path, "Cached copy is stale, downloading again");
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let partial = self
            .dir
            .join(format!("{key}.part-{}", uuid::Uuid::new_v4().simple()));
        let result = manager.download(host, remote_path, &partial).await;
        match result {
            Ok(()) => {
                tokio::fs::rename(&partial, &target).await?;
                tokio::fs::write(self.meta_path(&key), Self::validator(stat)).await?;
                tracing::debug!(remote = remote_path, local = %target.display(), "Cached remote media");
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                self.fetching.remove(&key);
                return Err(e);
            }
        }
        self.fetching.remove(&key);

        Ok(target)
    }

    /// Drop the cached copy and its validator.
    pub async fn evict(&self, server_id: ServerId, remote_path: &str) -> Result<bool> {
        let key = Self::key(server_id, remote_path);
        let _ = tokio::fs::remove_file(self.meta_path(&key)).await;
        match tokio::fs::remove_file(self.dir.join(&key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use streamctl_remote::{LocalTransport, ManagerOptions};

    fn host() -> HostSpec {
        HostSpec {
            server_id: ServerId::new(),
            name: "local".into(),
            host: "localhost".into(),
            port: 22,
            user: "root".into(),
            password: None,
            key_path: None,
        }
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(LocalTransport::new()),
            ManagerOptions {
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
        )
    }

    fn stat(size: u64, modified: i64) -> RemoteStat {
        RemoteStat {
            exists: true,
            size,
            modified: Some(modified),
        }
    }

    #[tokio::test]
    async fn downloads_once_then_serves_local_copy() {
        let remote = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let source = remote.path().join("clip.mp4");
        std::fs::write(&source, b"0123456789").unwrap();

        let manager = manager();
        let cache = MediaCache::new(cache_dir.path());
        let host = host();
        let remote_path = source.to_str().unwrap();
        let st = stat(10, 100);

        let first = cache.fetch(&manager, &host, remote_path, &st).await.unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), b"0123456789");

        std::fs::remove_file(&source).unwrap();
        let second = cache.fetch(&manager, &host, remote_path, &st).await.unwrap();
        assert_eq!(first, second);

        assert!(cache.evict(host.server_id, remote_path).await.unwrap());
        assert!(cache.fetch(&manager, &host, remote_path, &st).await.is_err());
        // No partial or validator files left behind.
        assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn changed_remote_file_is_downloaded_again() {
        let remote = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let source = remote.path().join("clip.mp4");
        std::fs::write(&source, b"short").unwrap();

        let manager = manager();
        let cache = MediaCache::new(cache_dir.path());
        let host = host();
        let remote_path = source.to_str().unwrap();

        let local = cache
            .fetch(&manager, &host, remote_path, &stat(5, 100))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"short");

        std::fs::write(&source, b"much longer").unwrap();
        let local = cache
            .fetch(&manager, &host, remote_path, &stat(11, 200))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"much longer");

        // Same size, newer timestamp.
        std::fs::write(&source, b"MUCH LONGER").unwrap();
        let local = cache
            .fetch(&manager, &host, remote_path, &stat(11, 300))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"MUCH LONGER");
    }
}
