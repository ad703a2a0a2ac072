use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cafsync_adapters::{GridQuery, GridTransport};
use cafsync_core::EntityKind;
use cafsync_storage::{BackendChoice, FetchError, SqliteStore, Store};
use cafsync_sync::{SyncConfig, SyncError, SyncOptions, SyncPipeline};
use tempfile::tempdir;

const MEMBER: &str = "690012345678";

/// Serves one canned body per grid definition.
struct Grids(HashMap<&'static str, String>);

#[async_trait]
impl GridTransport for Grids {
    async fn fetch_page(&self, query: &GridQuery, page: u32) -> Result<String, FetchError> {
        assert_eq!(page, 1, "every canned grid has a single page");
        self.0
            .get(query.def)
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("no canned grid for {}", query.def)))
    }
}

struct Unreachable;

#[async_trait]
impl GridTransport for Unreachable {
    async fn fetch_page(&self, _query: &GridQuery, _page: u32) -> Result<String, FetchError> {
        panic!("no request may be sent without a session id");
    }
}

fn config(data_dir: &std::path::Path, session_id: &str) -> SyncConfig {
    SyncConfig {
        session_id: session_id.to_string(),
        api_delay: Duration::ZERO,
        phase_pause: Duration::ZERO,
        data_dir: data_dir.to_path_buf(),
        ..SyncConfig::default()
    }
}

fn training_grid() -> String {
    format!(
        r#"{{"page":1,"total":1,"records":2,"rows":[
            {{"id":"1","cell":{{"col_0":"{MEMBER}","col_1":"DUPONT Jean","col_2":"X1",
              "col_3":"Stage X1","col_4":"14/03/2023","col_5":"N1","col_6":"MARTIN",
              "col_7":"Lyon","col_8":"77","col_9":"10/03/2023","col_10":"14/03/2023"}}}},
            {{"id":"2","cell":{{"col_0":"740000000001","col_2":"X2"}}}}
        ]}}"#
    )
}

async fn seed_member(path: &std::path::Path) {
    let store = SqliteStore::open(path).await.expect("open");
    store.bootstrap().await.expect("bootstrap");
    store
        .execute(
            "INSERT INTO caf_user (cafnum_user) VALUES (?)",
            &[MEMBER.into()],
        )
        .await
        .expect("member");
    store.close().await;
}

#[tokio::test]
async fn single_training_row_end_to_end() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path(), "sid-123");
    seed_member(&config.sqlite_path()).await;

    let grids = Grids(HashMap::from([("adh_formations", training_grid())]));
    let pipeline = SyncPipeline::with_transport(config.clone(), Arc::new(grids));
    let options = SyncOptions {
        only: vec![EntityKind::Training],
        backend: BackendChoice::Sqlite,
        ..SyncOptions::default()
    };

    let summary = pipeline.run_once(&options).await.expect("run");

    assert_eq!(summary.mode, "live");
    assert_eq!(summary.backend, Some("sqlite"));
    let outcome = summary.outcome(EntityKind::Training).expect("training outcome");
    let counters = outcome.stats.counters();
    assert_eq!(
        (counters.total, counters.imported, counters.ignored, counters.errors),
        (1, 1, 0, 0)
    );
    assert!(outcome.catalog.contains("X1"));
    assert_eq!(summary.catalog_sizes[&EntityKind::Training], 1);

    let report_path = summary.report_path.clone().expect("report written");
    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report_path).expect("report")).expect("json");
    assert_eq!(report["mode"], "live");
    assert_eq!(report["outcomes"][0]["stats"]["imported"], 1);
    assert!(report_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("import_") && n.ends_with(".json")));

    let store = SqliteStore::open(config.sqlite_path()).await.expect("reopen");
    let validations = store
        .query(
            "SELECT date_validation, date_debut, lieu FROM formation_validation_formation",
            &[],
        )
        .await
        .expect("validations");
    assert_eq!(validations.len(), 1);
    assert_eq!(validations[0].get_str("date_validation"), Some("2023-03-14"));
    assert_eq!(validations[0].get_str("date_debut"), Some("2023-03-10"));
    assert_eq!(validations[0].get_str("lieu"), Some("Lyon"));

    let last_sync = store
        .query("SELECT type, records_count FROM formation_last_sync", &[])
        .await
        .expect("last sync");
    assert_eq!(last_sync.len(), 1);
    assert_eq!(last_sync[0].get_str("type"), Some("formations"));
    assert_eq!(last_sync[0].get_i64("records_count"), Some(1));
}

#[tokio::test]
async fn dry_run_leaves_the_store_alone() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path(), "sid-123");

    let grids = Grids(HashMap::from([("adh_formations", training_grid())]));
    let pipeline = SyncPipeline::with_transport(config.clone(), Arc::new(grids));
    let options = SyncOptions {
        dry_run: true,
        only: vec![EntityKind::Training],
        // never selected in a dry run, so missing credentials do not matter
        backend: BackendChoice::MySql,
    };

    let summary = pipeline.run_once(&options).await.expect("dry run");

    assert_eq!(summary.mode, "dry-run");
    assert_eq!(summary.backend, None);
    let counters = *summary.outcomes[0].stats.counters();
    assert_eq!((counters.total, counters.imported), (1, 1));
    assert!(!config.sqlite_path().exists());
}

#[tokio::test]
async fn empty_session_id_stops_before_any_request() {
    let dir = tempdir().expect("tempdir");
    let pipeline = SyncPipeline::with_transport(config(dir.path(), "  "), Arc::new(Unreachable));

    let err = pipeline
        .run_once(&SyncOptions::default())
        .await
        .expect_err("missing session");

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::MissingSession)
    ));
    assert!(!dir.path().join("local.db").exists());
}

#[tokio::test]
async fn expired_session_aborts_the_run() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path(), "stale");
    let grids = Grids(HashMap::from([(
        "adh_formations",
        "<html><body>Connexion</body></html>".to_string(),
    )]));
    let pipeline = SyncPipeline::with_transport(config, Arc::new(grids));
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };

    let err = pipeline.run_once(&options).await.expect_err("expired");

    let expired = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<FetchError>(),
            Some(FetchError::SessionExpired)
        )
    });
    assert!(expired, "{err:#}");
}

#[tokio::test]
async fn forced_mysql_without_credentials_is_fatal() {
    let dir = tempdir().expect("tempdir");
    let pipeline = SyncPipeline::with_transport(config(dir.path(), "sid"), Arc::new(Unreachable));
    let options = SyncOptions {
        backend: BackendChoice::MySql,
        ..SyncOptions::default()
    };

    let err = pipeline.run_once(&options).await.expect_err("no credentials");

    assert!(format!("{err:#}").contains("MYSQL_ADDON_HOST"));
}
