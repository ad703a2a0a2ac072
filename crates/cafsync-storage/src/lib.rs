//! Persistence and HTTP plumbing for cafsync: the relational store adapters, the dialect
//! query builder, the extranet HTTP client and the run report store.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub mod dialect;
pub mod http;
pub mod mysql;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use dialect::{Dialect, Upsert};
pub use http::{FetchError, FetchedResponse, HttpClientConfig, HttpFetcher};
pub use mysql::{MySqlCredentials, MySqlStore};
pub use sqlite::SqliteStore;
pub use store::{
    open_store, select_backend, Backend, BackendChoice, DbRow, DbValue, ExecOutcome, Store,
    StoreError,
};

pub const CRATE_NAME: &str = "cafsync-storage";

/// Directory of JSON run reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` to `file_name` under the report directory through a temp file and an
    /// atomic rename, so readers never observe a partial report. An existing file with the
    /// same name is replaced.
    pub async fn write_atomic(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating report directory {}", self.root.display()))?;

        let target = self.root.join(file_name);
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp report file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp report file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp report file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp report {} -> {}",
                    temp_path.display(),
                    target.display()
                )
            });
        }
        Ok(target)
    }

    pub async fn write_json(
        &self,
        file_name: &str,
        value: &serde_json::Value,
    ) -> anyhow::Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value).context("serializing report")?;
        self.write_atomic(file_name, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn atomic_report_write_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let store = ReportStore::new(dir.path().join("reports"));

        let path = store
            .write_json("import_1.json", &serde_json::json!({"ok": true}))
            .await
            .expect("write report");
        let path_again = store
            .write_json("import_1.json", &serde_json::json!({"ok": false}))
            .await
            .expect("overwrite report");
        assert_eq!(path, path_again);

        let body = std::fs::read_to_string(&path).expect("read report");
        assert!(body.contains("false"));

        let names: Vec<String> = std::fs::read_dir(store.root())
            .expect("list reports")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["import_1.json".to_string()]);
    }
}
