//! Relational rendering of the commission rule table.

use cafsync_core::{CodeFamily, Commission, RULESET_VERSION};
use cafsync_storage::{Dialect, Store, StoreError, Upsert};
use tracing::{debug, info};

const PATTERN_TABLE: &str = "formation_brevet_pattern_commission_mapping";

/// Value of the `famille` column for a code family.
pub fn family_key(family: CodeFamily) -> &'static str {
    match family {
        CodeFamily::Training => "formation",
        CodeFamily::Certification => "brevet",
    }
}

/// Commission behind a development id, as written by [`seed_pattern_table`] on SQLite.
pub fn dev_commission(id: i64) -> Option<Commission> {
    Commission::ALL.into_iter().find(|c| c.dev_id() == id)
}

async fn commission_id(
    store: &dyn Store,
    commission: Commission,
) -> Result<Option<i64>, StoreError> {
    if store.dialect() == Dialect::Sqlite {
        return Ok(Some(commission.dev_id()));
    }
    let rows = store
        .query(
            "SELECT id_commission FROM caf_commission WHERE code_commission = ? LIMIT 1",
            &[commission.slug().into()],
        )
        .await?;
    Ok(rows.first().and_then(|row| row.get_i64("id_commission")))
}

/// Replaces both families' rows with the canonical rules and returns how many rows were
/// written. SQLite stores get development commission ids; on MySQL rules whose commission
/// is unknown are left out.
pub async fn seed_pattern_table(store: &dyn Store) -> Result<usize, StoreError> {
    let sql = store.dialect().upsert(&Upsert {
        table: PATTERN_TABLE,
        columns: &[
            "famille",
            "code_pattern",
            "exclude_pattern",
            "commission_id",
            "priorite",
            "actif",
            "ruleset_version",
        ],
        conflict: &["famille", "code_pattern", "commission_id"],
        update: &["exclude_pattern", "priorite", "actif", "ruleset_version"],
        touch: &["updated_at"],
    });

    let mut written = 0;
    for family in [CodeFamily::Training, CodeFamily::Certification] {
        store
            .execute(
                &format!("DELETE FROM {PATTERN_TABLE} WHERE famille = ?"),
                &[family_key(family).into()],
            )
            .await?;
        for rule in family.rules() {
            let Some(id) = commission_id(store, rule.commission).await? else {
                debug!(
                    commission = %rule.commission,
                    pattern = rule.pattern,
                    "commission unknown, rule not seeded"
                );
                continue;
            };
            store
                .execute(
                    &sql,
                    &[
                        family_key(family).into(),
                        rule.pattern.into(),
                        rule.exclude.into(),
                        id.into(),
                        i64::from(rule.priority).into(),
                        true.into(),
                        i64::from(RULESET_VERSION).into(),
                    ],
                )
                .await?;
            written += 1;
        }
    }
    info!(rows = written, ruleset_version = RULESET_VERSION, "pattern table seeded");
    Ok(written)
}

/// Commission ids whose active rows match `code`, highest priority first then by id.
pub async fn relational_commissions(
    store: &dyn Store,
    family: CodeFamily,
    code: &str,
) -> Result<Vec<i64>, StoreError> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Ok(Vec::new());
    }
    let rows = store
        .query(
            &format!(
                "SELECT commission_id, MAX(priorite) AS priorite FROM {PATTERN_TABLE} \
                 WHERE famille = ? AND actif = 1 AND ? LIKE code_pattern \
                 AND (exclude_pattern IS NULL OR ? NOT LIKE exclude_pattern) \
                 GROUP BY commission_id \
                 ORDER BY priorite DESC, commission_id ASC"
            ),
            &[
                family_key(family).into(),
                code.as_str().into(),
                code.as_str().into(),
            ],
        )
        .await?;
    rows.iter().map(|row| row.require_i64("commission_id")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafsync_core::commission::classify_code;
    use cafsync_core::commission::{CERTIFICATION_RULES, TRAINING_RULES};
    use cafsync_storage::SqliteStore;
    use tempfile::tempdir;

    const CORPUS: &[(CodeFamily, &str)] = &[
        (CodeFamily::Certification, "BF1-ES-01"),
        (CodeFamily::Certification, "BF2-AL-CG"),
        (CodeFamily::Certification, "BF1-RA-TR"),
        (CodeFamily::Certification, "BF1-AL-ES-X"),
        (CodeFamily::Certification, "BF-CA-01"),
        (CodeFamily::Certification, "BFM-ES-01"),
        (CodeFamily::Certification, "BF1-SN-SW"),
        (CodeFamily::Certification, "BF1-SN-SWA"),
        (CodeFamily::Certification, "brv-nivo1"),
        (CodeFamily::Certification, "UNKNOWN"),
        (CodeFamily::Training, "STG-UFCAR1"),
        (CodeFamily::Training, "STG-UFCA1"),
        (CodeFamily::Training, "FOR-IICO"),
        (CodeFamily::Training, "FOR-IIC1"),
        (CodeFamily::Training, "STG-PSC1"),
        (CodeFamily::Training, "STG-FCO-2024"),
        (CodeFamily::Training, "STG-FSM-A"),
        (CodeFamily::Training, " stg-fea1 "),
        (CodeFamily::Training, ""),
    ];

    async fn seeded() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::open(dir.path().join("local.db")).await.expect("open");
        store.bootstrap().await.expect("bootstrap");
        seed_pattern_table(&store).await.expect("seed");
        (dir, store)
    }

    #[tokio::test]
    async fn both_renderings_agree() {
        let (_dir, store) = seeded().await;
        for (family, code) in CORPUS {
            let mut relational = relational_commissions(&store, *family, code)
                .await
                .expect("relational");
            let mut in_process: Vec<i64> = classify_code(*family, code)
                .into_iter()
                .map(Commission::dev_id)
                .collect();
            relational.sort_unstable();
            in_process.sort_unstable();
            assert_eq!(relational, in_process, "{family:?} {code:?}");
        }
    }

    #[tokio::test]
    async fn reseeding_replaces_rows() {
        let (_dir, store) = seeded().await;
        let again = seed_pattern_table(&store).await.expect("reseed");
        assert_eq!(again, TRAINING_RULES.len() + CERTIFICATION_RULES.len());

        let rows = store
            .query(
                &format!("SELECT COUNT(*) AS n, MIN(ruleset_version) AS v FROM {PATTERN_TABLE}"),
                &[],
            )
            .await
            .expect("count");
        assert_eq!(rows[0].get_i64("n"), Some(again as i64));
        assert_eq!(rows[0].get_i64("v"), Some(i64::from(RULESET_VERSION)));
    }

    #[tokio::test]
    async fn equal_priorities_sort_by_commission_id() {
        let (_dir, store) = seeded().await;
        let ids = relational_commissions(&store, CodeFamily::Certification, "BF1-RA-TR")
            .await
            .expect("relational");
        assert_eq!(ids.len(), 2);
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "equal priority sorts by id");
        assert_eq!(dev_commission(ids[0]), Some(Commission::Randonnee));
    }
}
