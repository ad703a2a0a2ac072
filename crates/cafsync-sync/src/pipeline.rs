//! Run coordinator: startup checks, the four import phases, last-sync bookkeeping and the
//! run report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cafsync_adapters::{
    scrape, CertificationScraper, CompetencyScraper, GridTransport, HttpGridTransport,
    PaginatedFetcher, SkillLevelScraper, TrainingScraper,
};
use cafsync_core::{EntityKind, RULESET_VERSION};
use cafsync_storage::{
    open_store, select_backend, BackendChoice, HttpClientConfig, HttpFetcher, ReportStore, Store,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::import::{run_import, ImportOutcome};
use crate::importers::{
    CertificationImporter, CompetencyImporter, SkillLevelImporter, TrainingImporter,
};
use crate::linker::CommissionLinker;
use crate::SyncConfig;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "FFCAM_SESSION_ID is not set: log in to the extranet and copy the session id of the \
         browser session into the environment or .env"
    )]
    MissingSession,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Entity kinds to run; empty means all of them.
    pub only: Vec<EntityKind>,
    pub backend: BackendChoice,
}

impl SyncOptions {
    /// Selected kinds in canonical phase order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| self.only.is_empty() || self.only.contains(kind))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: &'static str,
    pub backend: Option<&'static str>,
    pub ruleset_version: u32,
    pub outcomes: Vec<ImportOutcome>,
    pub catalog_sizes: BTreeMap<EntityKind, usize>,
    #[serde(skip)]
    pub report_path: Option<PathBuf>,
}

impl SyncRunSummary {
    pub fn outcome(&self, kind: EntityKind) -> Option<&ImportOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    fetcher: PaginatedFetcher,
    reports: ReportStore,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let transport = HttpGridTransport::new(
            http,
            config.base_url.clone(),
            config.session_id.clone(),
            config.rows_per_page,
        );
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Pipeline reading grid pages from `transport` instead of the extranet.
    pub fn with_transport(config: SyncConfig, transport: Arc<dyn GridTransport>) -> Self {
        let fetcher = PaginatedFetcher::new(transport, config.api_delay);
        let reports = ReportStore::new(config.reports_dir());
        Self {
            config,
            fetcher,
            reports,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self, options: &SyncOptions) -> Result<SyncRunSummary> {
        if self.config.session_id.trim().is_empty() {
            return Err(SyncError::MissingSession.into());
        }
        self.config.ensure_directories().await?;

        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let kinds = options.kinds();
        info!(%run_id, dry_run = options.dry_run, kinds = ?kinds, "sync run starting");

        let (store, backend) = if options.dry_run {
            (None, None)
        } else {
            let backend = select_backend(options.backend, self.config.mysql.as_ref())
                .context("selecting the store backend")?;
            let store = open_store(&backend, &self.config.sqlite_path())
                .await
                .context("opening the store")?;
            (Some(store), Some(backend.dialect().name()))
        };

        let result = self.run_phases(&kinds, store.as_deref()).await;
        if let Some(store) = &store {
            store.close().await;
        }
        let outcomes = result?;

        let catalog_sizes = outcomes
            .iter()
            .map(|outcome| (outcome.kind, outcome.catalog_size()))
            .collect();
        let mut summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            mode: if options.dry_run { "dry-run" } else { "live" },
            backend,
            ruleset_version: RULESET_VERSION,
            outcomes,
            catalog_sizes,
            report_path: None,
        };

        let file_name = format!("import_{}.json", started_at.format("%Y-%m-%d_%H-%M-%S"));
        let report = serde_json::to_value(&summary).context("serializing run report")?;
        summary.report_path = Some(self.reports.write_json(&file_name, &report).await?);

        log_summary(&summary);
        Ok(summary)
    }

    async fn run_phases(
        &self,
        kinds: &[EntityKind],
        store: Option<&dyn Store>,
    ) -> Result<Vec<ImportOutcome>> {
        let mut linker = CommissionLinker::new(store);
        let mut outcomes = Vec::with_capacity(kinds.len());

        for (idx, kind) in kinds.iter().enumerate() {
            if idx > 0 && !self.config.phase_pause.is_zero() {
                tokio::time::sleep(self.config.phase_pause).await;
            }
            let outcome = self
                .run_phase(*kind, store, &mut linker)
                .await
                .with_context(|| format!("importing {}", kind.label()))?;
            outcomes.push(outcome);
        }

        if let Some(store) = store {
            let now = Utc::now();
            for outcome in &outcomes {
                let imported = outcome.stats.counters().imported;
                if let Err(err) = store.record_last_sync(outcome.kind, now, imported).await {
                    warn!(kind = %outcome.kind, error = %err, "could not record last sync");
                }
            }
        }
        Ok(outcomes)
    }

    async fn run_phase(
        &self,
        kind: EntityKind,
        store: Option<&dyn Store>,
        linker: &mut CommissionLinker<'_>,
    ) -> Result<ImportOutcome> {
        let prefixes = &self.config.club_prefixes;
        let outcome = match kind {
            EntityKind::Training => {
                let paged = scrape(&self.fetcher, &TrainingScraper, prefixes).await?;
                run_import(&mut TrainingImporter, &paged.items, store, linker).await
            }
            EntityKind::Certification => {
                let paged = scrape(&self.fetcher, &CertificationScraper, prefixes).await?;
                run_import(&mut CertificationImporter, &paged.items, store, linker).await
            }
            EntityKind::SkillLevel => {
                let scraped = SkillLevelScraper
                    .scrape_with_metadata(&self.fetcher, prefixes)
                    .await?;
                let mut importer = SkillLevelImporter::new(scraped.metadata);
                run_import(&mut importer, &scraped.records, store, linker).await
            }
            EntityKind::Competency => {
                let paged = scrape(&self.fetcher, &CompetencyScraper, prefixes).await?;
                run_import(&mut CompetencyImporter, &paged.items, store, linker).await
            }
        };
        Ok(outcome)
    }
}

fn log_summary(summary: &SyncRunSummary) {
    for outcome in &summary.outcomes {
        let counters = outcome.stats.counters();
        info!(
            kind = %outcome.kind,
            total = counters.total,
            imported = counters.imported,
            ignored = counters.ignored,
            errors = counters.errors,
            "summary"
        );
    }
    info!(
        run_id = %summary.run_id,
        mode = summary.mode,
        report = ?summary.report_path,
        "sync run finished"
    );
}

pub async fn run_sync_once_from_env(options: &SyncOptions) -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::new(config)?;
    pipeline.run_once(options).await
}
