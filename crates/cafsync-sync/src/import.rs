//! The generic import loop shared by every entity kind.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use cafsync_core::{EntityCounters, EntityKind, EntityStats};
use cafsync_storage::{Store, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::linker::CommissionLinker;

/// Detailed log lines per phase before errors are only counted.
pub const DETAILED_ERRORS: usize = 3;
pub const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("referential row for `{key}` not found in {table} after upsert")]
    MissingReferential { table: &'static str, key: String },
}

impl ImportError {
    /// Bucket used in the per-phase error tally: the vendor code when the database
    /// reported one, otherwise the start of the message.
    pub fn category(&self) -> String {
        if let ImportError::Store(err) = self {
            if let Some(code) = err.code() {
                return format!("SQL-{code}");
            }
        }
        self.to_string().chars().take(50).collect()
    }
}

/// Outcome of the validation hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// Not imported and not an error; the importer has counted the anomaly.
    Skip,
    /// Counted as an error.
    Reject(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Imported,
    MemberNotFound,
}

/// Entity-specific hooks driven by [`run_import`].
#[async_trait]
pub trait EntityImporter: Send {
    type Record: Send + Sync;
    type Stats: EntityCounters + Default + Into<EntityStats> + Send;

    fn kind(&self) -> EntityKind;

    /// Identifier of the record's referential entry, `None` when it has none.
    fn referential_key(&self, record: &Self::Record) -> Option<String>;

    fn record_id<'r>(&self, record: &'r Self::Record) -> &'r str;

    fn member<'r>(&self, record: &'r Self::Record) -> &'r str;

    /// Checks the record and counts its anomalies.
    fn validate(&self, record: &Self::Record, stats: &mut Self::Stats) -> Verdict;

    /// Upserts the referential entry, links it and upserts the member's validation.
    async fn persist(
        &mut self,
        record: &Self::Record,
        store: &dyn Store,
        linker: &mut CommissionLinker<'_>,
    ) -> Result<Persisted, ImportError>;

    fn report(&self, outcome: &ImportOutcome) {
        let counters = outcome.stats.counters();
        info!(
            kind = %self.kind(),
            total = counters.total,
            imported = counters.imported,
            ignored = counters.ignored,
            errors = counters.errors,
            catalog = outcome.catalog.len(),
            missing_members = outcome.missing_members.len(),
            "import finished"
        );
        for (anomaly, count) in outcome.stats.anomalies() {
            if count > 0 {
                info!(kind = %self.kind(), anomaly, count, "anomaly");
            }
        }
    }
}

/// Everything one phase produced, as written to the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub kind: EntityKind,
    pub stats: EntityStats,
    pub error_types: BTreeMap<String, usize>,
    pub catalog: BTreeSet<String>,
    pub missing_members: BTreeSet<String>,
}

impl ImportOutcome {
    pub fn catalog_size(&self) -> usize {
        self.catalog.len()
    }
}

/// Runs `records` through `importer`. Without a store (dry run) valid records are counted
/// as imported and nothing is written. A failing record never stops the loop.
pub async fn run_import<I: EntityImporter>(
    importer: &mut I,
    records: &[I::Record],
    store: Option<&dyn Store>,
    linker: &mut CommissionLinker<'_>,
) -> ImportOutcome {
    let kind = importer.kind();
    let mut stats = I::Stats::default();
    let mut error_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut catalog = BTreeSet::new();
    let mut missing_members = BTreeSet::new();
    let mut logged_errors = 0usize;

    info!(kind = %kind, records = records.len(), dry_run = store.is_none(), "import starting");

    for record in records {
        stats.counters_mut().total += 1;

        let failure = match importer.validate(record, &mut stats) {
            Verdict::Skip => None,
            Verdict::Reject(reason) => Some(reason),
            Verdict::Proceed => {
                if let Some(key) = importer.referential_key(record) {
                    catalog.insert(key);
                }
                match store {
                    None => {
                        stats.counters_mut().imported += 1;
                        None
                    }
                    Some(store) => match importer.persist(record, store, linker).await {
                        Ok(Persisted::Imported) => {
                            stats.counters_mut().imported += 1;
                            None
                        }
                        Ok(Persisted::MemberNotFound) => {
                            stats.counters_mut().ignored += 1;
                            missing_members.insert(importer.member(record).to_string());
                            None
                        }
                        Err(err) => {
                            *error_types.entry(err.category()).or_default() += 1;
                            Some(err.to_string())
                        }
                    },
                }
            }
        };

        if let Some(reason) = failure {
            stats.counters_mut().errors += 1;
            if logged_errors < DETAILED_ERRORS {
                warn!(
                    kind = %kind,
                    record = importer.record_id(record),
                    error = %reason,
                    "record failed"
                );
            } else if logged_errors == DETAILED_ERRORS {
                warn!(kind = %kind, "further record errors are counted but not logged");
            }
            logged_errors += 1;
        }

        let total = stats.counters().total;
        if total % PROGRESS_EVERY == 0 {
            info!(kind = %kind, processed = total, of = records.len(), "progress");
        }
    }

    let outcome = ImportOutcome {
        kind,
        stats: stats.into(),
        error_types,
        catalog,
        missing_members,
    };
    importer.report(&outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafsync_core::CompetencyStats;

    /// Accepts odd numbers, rejects multiples of ten, skips the rest.
    struct Numbers;

    #[async_trait]
    impl EntityImporter for Numbers {
        type Record = (String, u32);
        type Stats = CompetencyStats;

        fn kind(&self) -> EntityKind {
            EntityKind::Competency
        }

        fn referential_key(&self, record: &Self::Record) -> Option<String> {
            Some(format!("K{}", record.1 % 3))
        }

        fn record_id<'r>(&self, record: &'r Self::Record) -> &'r str {
            &record.0
        }

        fn member<'r>(&self, record: &'r Self::Record) -> &'r str {
            &record.0
        }

        fn validate(&self, record: &Self::Record, stats: &mut Self::Stats) -> Verdict {
            if record.1 % 10 == 0 {
                Verdict::Reject("round number".into())
            } else if record.1 % 2 == 0 {
                stats.missing_title += 1;
                Verdict::Skip
            } else {
                Verdict::Proceed
            }
        }

        async fn persist(
            &mut self,
            _record: &Self::Record,
            _store: &dyn Store,
            _linker: &mut CommissionLinker<'_>,
        ) -> Result<Persisted, ImportError> {
            unreachable!("dry run never persists")
        }
    }

    #[tokio::test]
    async fn dry_run_counts_without_a_store() {
        let records: Vec<(String, u32)> = (1..=20).map(|n| (format!("r{n}"), n)).collect();
        let mut linker = CommissionLinker::new(None);

        let outcome = run_import(&mut Numbers, &records, None, &mut linker).await;

        let counters = outcome.stats.counters();
        assert_eq!(counters.total, 20);
        assert_eq!(counters.imported, 10);
        assert_eq!(counters.errors, 2);
        assert_eq!(counters.ignored, 0);
        assert_eq!(outcome.stats.anomalies(), vec![("missing_title", 8)]);
        assert_eq!(outcome.catalog.len(), 3);
        assert!(outcome.error_types.is_empty(), "validation rejects are not store errors");
    }

    #[test]
    fn error_categories_use_codes_or_message_prefixes() {
        let err = ImportError::MissingReferential {
            table: "formation_referentiel_brevet",
            key: "X".repeat(80),
        };
        assert_eq!(err.category().chars().count(), 50);
        assert!(err.category().starts_with("referential row for"));
    }
}
