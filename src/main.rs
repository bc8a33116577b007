use anyhow::Result;
use clap::{Parser, ValueEnum};
use redarc::coordinate::{self, Ledger};
use redarc::db::{init_schema, open_connection, Store};
use redarc::ingest::{LogSink, RecordKind};
use redarc::Config;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Submissions,
    Comments,
    All,
}

#[derive(Parser, Debug)]
#[command(name = "redarc")]
#[command(about = "Ingest zstd Reddit archive dumps into the database, claiming files via the shared progress ledger")]
struct Args {
    /// Which archive kind to process
    #[arg(short, long, value_enum, default_value = "all")]
    kind: KindArg,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();

    log::info!("Starting redarc worker");

    // Load configuration
    let config = Config::load()?;
    log::info!("Archive base: {}", config.base_dir().display());
    log::info!("Database path: {}", config.db_path().display());

    // Initialize database
    let conn = open_connection(config.db_path())?;
    init_schema(&conn)?;
    let mut store = Store::new(conn)?;
    log::info!("Database initialized");

    let kinds: &[RecordKind] = match args.kind {
        KindArg::Submissions => &[RecordKind::Submission],
        KindArg::Comments => &[RecordKind::Comment],
        KindArg::All => &[RecordKind::Submission, RecordKind::Comment],
    };

    let mut sink = LogSink;
    for &kind in kinds {
        let dir = config.kind_dir(kind);
        let ledger = Ledger::new(config.ledger_path(kind));
        ledger.ensure_exists().await?;

        log::info!("Processing {} from {}", kind, dir.display());
        coordinate::run(&dir, &ledger, kind, &mut store, &config, &mut sink).await?;
    }

    log::info!("Worker finished: no unclaimed files remain");
    Ok(())
}
