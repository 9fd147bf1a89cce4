//! Destinations for serialized request records.

use super::RequestLogError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};

/// Standard output shared by every request of a generation
pub struct ConsoleSink {
    out: tokio::sync::Mutex<Stdout>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            out: tokio::sync::Mutex::new(tokio::io::stdout()),
        }
    }

    pub async fn write(&self, text: &str) -> Result<(), RequestLogError> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes())
            .await
            .map_err(|source| RequestLogError::Io {
                path: PathBuf::from("<stdout>"),
                source,
            })?;
        out.flush().await.map_err(|source| RequestLogError::Io {
            path: PathBuf::from("<stdout>"),
            source,
        })
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-mode log files, one handle per distinct path, opened on first use.
/// Writes to one path are serialized; different paths do not contend.
#[derive(Default)]
pub struct FileSinks {
    files: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<Option<File>>>>>,
}

impl FileSinks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, path: &Path) -> Arc<tokio::sync::Mutex<Option<File>>> {
        let mut files = self.files.lock();
        Arc::clone(files.entry(path.to_path_buf()).or_default())
    }

    pub async fn append(&self, path: &Path, text: &str) -> Result<(), RequestLogError> {
        let io_error = |source| RequestLogError::Io {
            path: path.to_path_buf(),
            source,
        };

        let slot = self.slot(path);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(io_error)?;
            *guard = Some(file);
        }

        if let Some(file) = guard.as_mut() {
            file.write_all(text.as_bytes()).await.map_err(io_error)?;
            file.flush().await.map_err(io_error)?;
        }
        Ok(())
    }

    /// Number of paths opened so far
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_keeps_order_and_shares_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let sinks = FileSinks::new();

        sinks.append(&path, "one\n").await.unwrap();
        sinks.append(&path, "two\n").await.unwrap();

        assert_eq!(sinks.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_append_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        std::fs::write(&path, "earlier\n").unwrap();

        FileSinks::new().append(&path, "later\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }

    #[tokio::test]
    async fn test_unwritable_path_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("requests.log");
        let err = FileSinks::new().append(&path, "x\n").await.unwrap_err();
        assert!(matches!(err, RequestLogError::Io { .. }));
    }
}
