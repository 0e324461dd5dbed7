use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use novalnet_bridge::application::engine::{EngineSettings, ReconciliationEngine};
use novalnet_bridge::config::Settings;
use novalnet_bridge::domain::ports::{CallbackStoreBox, GatewayBox, LedgerStoreBox};
use novalnet_bridge::infrastructure::http_gateway::HttpGateway;
use novalnet_bridge::infrastructure::in_memory::{InMemoryCallbackStore, InMemoryLedgerStore};
use novalnet_bridge::infrastructure::notifier::LogNotifier;
use novalnet_bridge::infrastructure::offline::OfflineGateway;
use novalnet_bridge::interfaces::csv::ledger_writer::LedgerWriter;
use novalnet_bridge::interfaces::http;
use novalnet_bridge::interfaces::jsonl::journal_reader::{JournalReader, JournalRecord};
use novalnet_bridge::logger;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (optional). Environment variables `NNB__*` override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replays a JSON Lines journal offline and prints the final ledgers as CSV.
    Replay {
        /// Input journal file
        input: PathBuf,
    },
    /// Serves the webhook, redirect and status endpoints.
    Serve,
}

fn stores(db_path: Option<&Path>) -> Result<(LedgerStoreBox, CallbackStoreBox)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = novalnet_bridge::infrastructure::rocksdb::RocksDBStore::open(db_path)
            .into_diagnostic()?;
        return Ok((Box::new(store.clone()), Box::new(store)));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok((
        Box::new(InMemoryLedgerStore::new()),
        Box::new(InMemoryCallbackStore::new()),
    ))
}

async fn replay(engine: &ReconciliationEngine, input: &Path) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = JournalReader::new(file);
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "Error reading journal record");
                continue;
            }
        };
        let outcome = match &record {
            JournalRecord::Ledger { .. } => match record.draft() {
                Some(draft) => engine.create_ledger(draft).await.map(|_| ()),
                None => Ok(()),
            },
            JournalRecord::Details { reference, body } => engine
                .record_transaction_details(reference, body)
                .await
                .map(|_| ()),
            JournalRecord::Webhook { body } => engine.receive_webhook(body).await.map(|_| ()),
            JournalRecord::Redirect { params } => engine.handle_redirect(params).await.map(|_| ()),
            JournalRecord::Drain { reference } => engine.finalize(reference).await.map(|_| ()),
        };
        if let Err(e) = outcome {
            tracing::error!(error = %e, "Error processing journal record");
        }
    }

    let ledgers = engine.ledgers().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    writer.write_ledgers(&ledgers).into_diagnostic()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    if cli.db_path.is_some() {
        settings.storage.db_path = cli.db_path.clone();
    }
    logger::setup(&settings.log);

    let (ledgers, callbacks) = stores(settings.storage.db_path.as_deref())?;
    let notifier = Box::new(LogNotifier);
    let engine_settings = EngineSettings::from_settings(&settings);

    match cli.command {
        Command::Replay { input } => {
            let gateway: GatewayBox = Box::new(OfflineGateway);
            let engine =
                ReconciliationEngine::new(ledgers, callbacks, gateway, notifier, engine_settings);
            replay(&engine, &input).await
        }
        Command::Serve => {
            let gateway: GatewayBox = Box::new(HttpGateway::new(&settings.gateway).into_diagnostic()?);
            let engine = Arc::new(ReconciliationEngine::new(
                ledgers,
                callbacks,
                gateway,
                notifier,
                engine_settings,
            ));
            let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
                .parse()
                .into_diagnostic()?;
            http::serve(engine, addr).await.into_diagnostic()
        }
    }
}
