//! Polling loader for the configuration file.
//!
//! The file is re-read at most once per polling interval and compared by
//! SHA-256 digest, so rewriting identical bytes never triggers a reload.

use super::ConfigError;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct ConfigLoader {
    path: PathBuf,
    interval: Duration,
    last_read: Option<Instant>,
    content: Option<Bytes>,
    digest: Option<String>,
    dirty: bool,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_interval(path, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_read: None,
            content: None,
            digest: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Latest successfully read bytes, reading the file on first use
    pub fn load(&mut self) -> Result<Bytes, ConfigError> {
        if let Some(content) = &self.content {
            return Ok(content.clone());
        }
        let content = self.read_file()?;
        self.digest = Some(digest(&content));
        self.content = Some(content.clone());
        Ok(content)
    }

    /// Re-read the file if the polling interval has elapsed and mark the
    /// loader dirty when its content hash changed. A failed read leaves the
    /// cached content, hash and dirty flag untouched.
    pub fn poll(&mut self) -> Result<(), ConfigError> {
        let due = self
            .last_read
            .map_or(true, |last| last.elapsed() >= self.interval);
        if !due {
            return Ok(());
        }

        let content = self.read_file()?;
        let new_digest = digest(&content);
        if self.digest.as_deref() != Some(new_digest.as_str()) {
            debug!(
                "Config file '{}' content hash changed to {}",
                self.path.display(),
                new_digest
            );
            self.dirty = true;
            self.digest = Some(new_digest);
            self.content = Some(content);
        }
        Ok(())
    }

    /// Return the dirty flag and clear it
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn read_file(&mut self) -> Result<Bytes, ConfigError> {
        self.last_read = Some(Instant::now());
        std::fs::read(&self.path)
            .map(Bytes::from)
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader_for(dir: &tempfile::TempDir, content: &[u8]) -> ConfigLoader {
        let path = dir.path().join("cap.yml");
        std::fs::write(&path, content).unwrap();
        ConfigLoader::with_interval(path, Duration::ZERO)
    }

    #[test]
    fn test_load_reads_once_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_for(&dir, b"servers: []");
        assert_eq!(loader.load().unwrap().as_ref(), b"servers: []");

        std::fs::write(loader.path(), b"changed").unwrap();
        assert_eq!(loader.load().unwrap().as_ref(), b"servers: []");
    }

    #[test]
    fn test_unchanged_content_never_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_for(&dir, b"a: 1");
        loader.load().unwrap();

        for _ in 0..3 {
            loader.poll().unwrap();
            assert!(!loader.consume_dirty());
        }

        // Rewriting identical bytes is not a change either
        std::fs::write(loader.path(), b"a: 1").unwrap();
        loader.poll().unwrap();
        assert!(!loader.consume_dirty());
    }

    #[test]
    fn test_change_sets_dirty_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_for(&dir, b"a: 1");
        loader.load().unwrap();

        std::fs::write(loader.path(), b"a: 2").unwrap();
        loader.poll().unwrap();
        loader.poll().unwrap();
        assert!(loader.consume_dirty());
        assert!(!loader.consume_dirty());
        assert_eq!(loader.load().unwrap().as_ref(), b"a: 2");
    }

    #[test]
    fn test_first_poll_without_load_is_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_for(&dir, b"a: 1");
        loader.poll().unwrap();
        assert!(loader.consume_dirty());
    }

    #[test]
    fn test_interval_limits_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.yml");
        std::fs::write(&path, b"a: 1").unwrap();
        let mut loader = ConfigLoader::with_interval(&path, Duration::from_secs(3600));
        loader.poll().unwrap();
        assert!(loader.consume_dirty());

        std::fs::write(&path, b"a: 2").unwrap();
        loader.poll().unwrap();
        assert!(!loader.consume_dirty());
        assert_eq!(loader.load().unwrap().as_ref(), b"a: 1");
    }

    #[test]
    fn test_read_failure_reported_and_state_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_for(&dir, b"a: 1");
        loader.load().unwrap();

        std::fs::remove_file(loader.path()).unwrap();
        let err = loader.poll().unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(!loader.consume_dirty());
        assert_eq!(loader.load().unwrap().as_ref(), b"a: 1");
    }

    #[test]
    fn test_missing_file_on_load() {
        let mut loader = ConfigLoader::new("/nonexistent/cap.yml");
        assert_eq!(loader.interval(), DEFAULT_POLL_INTERVAL);
        assert!(loader.load().is_err());
    }
}
