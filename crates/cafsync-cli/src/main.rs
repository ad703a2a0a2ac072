use anyhow::{Context, Result};
use cafsync_core::commission::classify_code;
use cafsync_core::{CodeFamily, EntityKind, RULESET_VERSION};
use cafsync_storage::{open_store, select_backend, Backend, BackendChoice, Dialect, Store};
use cafsync_sync::{
    dev_commission, relational_commissions, run_sync_once_from_env, seed_pattern_table,
    SyncConfig, SyncOptions,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Codes shown after seeding, one per rule family shape.
const SAMPLE_CODES: &[(CodeFamily, &str)] = &[
    (CodeFamily::Certification, "BF1-ES-01"),
    (CodeFamily::Certification, "BF1-RA-TR"),
    (CodeFamily::Certification, "BFM-ES-01"),
    (CodeFamily::Training, "STG-UFCAR1"),
    (CodeFamily::Training, "FOR-IIC1"),
    (CodeFamily::Training, "STG-PSC1"),
];

#[derive(Debug, Parser)]
#[command(name = "cafsync")]
#[command(about = "Imports club members' training records from the federation extranet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape the extranet and import every selected entity kind (default)
    Sync(SyncArgs),
    /// Create (SQLite) or verify (MySQL) the schema
    Migrate(BackendArgs),
    /// Rewrite the relational pattern table from the built-in rules
    SeedPatterns(BackendArgs),
    /// Show the commissions a code maps to
    Classify(ClassifyArgs),
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Fetch and validate without writing to the database
    #[arg(long)]
    dry_run: bool,
    /// Comma-separated subset: formations, brevets, niveaux, competences
    #[arg(long, value_delimiter = ',')]
    only: Vec<EntityKind>,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Default, Args)]
struct BackendArgs {
    /// Force the local SQLite store
    #[arg(long, conflicts_with = "mysql")]
    sqlite: bool,
    /// Force MySQL (fails when MYSQL_ADDON_* is incomplete)
    #[arg(long)]
    mysql: bool,
}

#[derive(Debug, Default, Args)]
struct ClassifyArgs {
    code: String,
    /// Skip the pattern table lookup
    #[arg(long)]
    builtin_only: bool,
    #[command(flatten)]
    backend: BackendArgs,
}

impl BackendArgs {
    fn choice(&self) -> BackendChoice {
        match (self.sqlite, self.mysql) {
            (true, _) => BackendChoice::Sqlite,
            (_, true) => BackendChoice::MySql,
            _ => BackendChoice::Auto,
        }
    }
}

fn backend_for(config: &SyncConfig, args: &BackendArgs) -> Result<Backend> {
    select_backend(args.choice(), config.mysql.as_ref()).context("selecting the store backend")
}

async fn open(config: &SyncConfig, backend: &Backend) -> Result<Box<dyn Store>> {
    config.ensure_directories().await?;
    open_store(backend, &config.sqlite_path())
        .await
        .context("opening the store")
}

async fn connect(config: &SyncConfig, args: &BackendArgs) -> Result<Box<dyn Store>> {
    let backend = backend_for(config, args)?;
    open(config, &backend).await
}

/// Store to match the pattern table against. `None` with `--builtin-only`, or when the
/// local database does not exist yet: a lookup never creates it.
fn classify_backend(config: &SyncConfig, args: &ClassifyArgs) -> Result<Option<Backend>> {
    if args.builtin_only {
        return Ok(None);
    }
    let backend = backend_for(config, &args.backend)?;
    if matches!(backend, Backend::Sqlite) && !config.sqlite_path().exists() {
        return Ok(None);
    }
    Ok(Some(backend))
}

fn describe(dialect: Dialect, ids: &[i64]) -> String {
    let names: Vec<String> = ids
        .iter()
        .map(|id| match (dialect, dev_commission(*id)) {
            (Dialect::Sqlite, Some(commission)) => commission.slug().to_string(),
            _ => format!("#{id}"),
        })
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

async fn print_relational(store: &dyn Store, family: CodeFamily, code: &str) -> Result<()> {
    let ids = relational_commissions(store, family, code)
        .await
        .with_context(|| format!("matching {code} against the pattern table"))?;
    println!("  {family:?} (table):     {}", describe(store.dialect(), &ids));
    Ok(())
}

async fn seed_and_sample(store: &dyn Store) -> Result<()> {
    let rows = seed_pattern_table(store)
        .await
        .context("seeding the pattern table")?;
    println!("seeded {rows} pattern rows (ruleset v{RULESET_VERSION})");
    for (family, code) in SAMPLE_CODES {
        println!("{code}");
        print_relational(store, *family, code).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cafsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => {
            let options = SyncOptions {
                dry_run: args.dry_run,
                only: args.only,
                backend: args.backend.choice(),
            };
            let summary = run_sync_once_from_env(&options).await?;
            for outcome in &summary.outcomes {
                let counters = outcome.stats.counters();
                println!(
                    "{:<18} total={} imported={} ignored={} errors={} catalog={}",
                    outcome.kind.label(),
                    counters.total,
                    counters.imported,
                    counters.ignored,
                    counters.errors,
                    outcome.catalog_size()
                );
            }
            println!(
                "sync complete: run_id={} mode={} report={}",
                summary.run_id,
                summary.mode,
                summary
                    .report_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }
        Commands::Migrate(args) => {
            let store = connect(&SyncConfig::from_env(), &args).await?;
            println!("schema ready ({})", store.dialect().name());
            store.close().await;
        }
        Commands::SeedPatterns(args) => {
            let store = connect(&SyncConfig::from_env(), &args).await?;
            let result = seed_and_sample(store.as_ref()).await;
            store.close().await;
            result?;
        }
        Commands::Classify(args) => {
            let code = &args.code;
            for family in [CodeFamily::Training, CodeFamily::Certification] {
                let commissions: Vec<&str> = classify_code(family, code)
                    .into_iter()
                    .map(|c| c.slug())
                    .collect();
                let rendered = if commissions.is_empty() {
                    "-".to_string()
                } else {
                    commissions.join(", ")
                };
                println!("  {family:?} (built-in):  {rendered}");
            }
            let config = SyncConfig::from_env();
            let Some(backend) = classify_backend(&config, &args)? else {
                println!("  pattern table not consulted");
                return Ok(());
            };
            let store = open(&config, &backend).await?;
            for family in [CodeFamily::Training, CodeFamily::Certification] {
                if let Err(err) = print_relational(store.as_ref(), family, code).await {
                    eprintln!("  {family:?} (table):     unavailable: {err:#}");
                }
            }
            store.close().await;
        }
    }

    Ok(())
}
