//! Sync orchestration: configuration, importers, commission linking and the run
//! coordinator.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cafsync_adapters::DEFAULT_GRID_URL;
use cafsync_core::DEFAULT_CLUB_PREFIXES;
use cafsync_storage::MySqlCredentials;

pub mod import;
pub mod importers;
pub mod linker;
pub mod patterns;
pub mod pipeline;

pub use import::{run_import, EntityImporter, ImportError, ImportOutcome, Persisted, Verdict};
pub use importers::{
    CertificationImporter, CompetencyImporter, SkillLevelImporter, TrainingImporter,
};
pub use linker::{CommissionLinker, LinkTarget};
pub use patterns::{dev_commission, family_key, relational_commissions, seed_pattern_table};
pub use pipeline::{
    run_sync_once_from_env, SyncError, SyncOptions, SyncPipeline, SyncRunSummary,
};

pub const CRATE_NAME: &str = "cafsync-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub session_id: String,
    pub base_url: String,
    pub rows_per_page: u32,
    pub api_delay: Duration,
    pub phase_pause: Duration,
    pub club_prefixes: Vec<String>,
    pub data_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub mysql: Option<MySqlCredentials>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            base_url: DEFAULT_GRID_URL.to_string(),
            rows_per_page: 150,
            api_delay: Duration::from_millis(300),
            phase_pause: Duration::from_secs(2),
            club_prefixes: DEFAULT_CLUB_PREFIXES.iter().map(|p| p.to_string()).collect(),
            data_dir: PathBuf::from("./data"),
            user_agent: "cafsync/0.1".to_string(),
            http_timeout_secs: 30,
            mysql: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let number = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        Self {
            session_id: std::env::var("FFCAM_SESSION_ID")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            base_url: std::env::var("FFCAM_BASE_URL").unwrap_or(defaults.base_url),
            rows_per_page: std::env::var("FFCAM_ROWS_PER_PAGE")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.rows_per_page),
            api_delay: number("CAFSYNC_API_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.api_delay),
            phase_pause: number("CAFSYNC_PHASE_PAUSE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.phase_pause),
            club_prefixes: std::env::var("CAFSYNC_CLUB_PREFIXES")
                .ok()
                .map(|v| parse_prefixes(&v))
                .filter(|prefixes| !prefixes.is_empty())
                .unwrap_or(defaults.club_prefixes),
            data_dir: std::env::var("CAFSYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            user_agent: std::env::var("CAFSYNC_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: number("CAFSYNC_HTTP_TIMEOUT_SECS")
                .unwrap_or(defaults.http_timeout_secs),
            mysql: MySqlCredentials::from_env(),
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("local.db")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.reports_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Splits a comma-separated prefix list, dropping blanks.
pub fn parse_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
