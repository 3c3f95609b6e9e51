use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use rup_config::LoadedConfig;
use rup_ingest::BankFeedItem;
use rup_pipeline::Pipeline;
use rup_portfolio::PortfolioSnapshot;
use rup_resolve::{verify_audit_log, HttpInferenceClient, ResolutionAuditWriter, VerifyResult};
use rup_schemas::ReceiptPayload;
use rup_store::{MemStore, Store};

#[derive(Parser)]
#[command(name = "rup")]
#[command(about = "Round-up micro-investing pipeline", long_about = None)]
struct Cli {
    /// JSON state snapshot; created on first write.
    #[arg(long, global = true, default_value = "rup-state.json")]
    state: PathBuf,

    /// Platform config file (JSON); built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSONL resolution audit log; inference attempts are appended here.
    /// Defaults to `<state>.audit.jsonl` next to the state snapshot.
    #[arg(long = "audit-log", global = true)]
    audit_log: Option<PathBuf>,

    /// Inference endpoint base URL.  Without it, resolution starts at the
    /// brand fallback table.
    #[arg(long = "inference-url", global = true)]
    inference_url: Option<String>,

    /// API key for the inference endpoint.
    #[arg(long = "inference-api-key", global = true)]
    inference_api_key: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a bulk CSV of purchases
    Import {
        #[arg(long)]
        owner: Uuid,

        /// CSV file; header row declares the columns
        #[arg(long)]
        file: PathBuf,
    },

    /// Ingest a bank-feed pull (JSON array of feed items)
    Sync {
        #[arg(long)]
        owner: Uuid,

        #[arg(long)]
        feed: PathBuf,
    },

    /// Ingest one captured receipt (JSON payload)
    Receipt {
        #[arg(long)]
        owner: Uuid,

        #[arg(long)]
        file: PathBuf,

        /// Capture date (YYYY-MM-DD); today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Retry resolution for transactions without a ticker
    Resolve {
        #[arg(long)]
        owner: Uuid,
    },

    /// Print the owner's portfolio snapshot
    Portfolio {
        #[arg(long)]
        owner: Uuid,
    },

    /// Print the effective config hash + canonical JSON
    ConfigHash,

    /// Check the resolution audit log for gaps or damage
    AuditVerify,
}

/// Everything a mutating subcommand needs to wire a [`Pipeline`].
struct Wiring {
    state: PathBuf,
    audit_log: Option<PathBuf>,
    inference_url: Option<String>,
    inference_api_key: Option<String>,
}

impl Wiring {
    /// Audit records are not optional once inference runs, so the log always
    /// has a home: the explicit `--audit-log`, or a file next to the state
    /// snapshot.
    fn audit_path(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.state.with_extension("audit.jsonl"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let Cli {
        state,
        config,
        audit_log,
        inference_url,
        inference_api_key,
        cmd,
    } = Cli::parse();

    let loaded = match &config {
        Some(path) => rup_config::load_file(path)?,
        None => rup_config::load_defaults()?,
    };
    let wiring = Wiring {
        state,
        audit_log,
        inference_url,
        inference_api_key,
    };

    match cmd {
        Commands::ConfigHash => {
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }

        Commands::AuditVerify => {
            let path = wiring.audit_path();
            match verify_audit_log(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("audit_ok=true lines={lines}");
                    Ok(())
                }
                VerifyResult::Broken { line, reason } => {
                    bail!("audit log broken at line {line}: {reason}")
                }
            }
        }

        Commands::Portfolio { owner } => {
            let store = open_store(&wiring.state)?;
            let holdings = store.holdings_for_owner(owner).await?;
            print_json(&PortfolioSnapshot::from_holdings(&holdings))
        }

        Commands::Import { owner, file } => {
            tracing::info!(%owner, file = %file.display(), "bulk import");
            let src = fs::read_to_string(&file)
                .with_context(|| format!("read csv '{}'", file.display()))?;
            let store = open_store(&wiring.state)?;
            let mut pipeline = build_pipeline(&wiring, &loaded, store.clone())?;
            let summary = pipeline.run_bulk_import(owner, &src).await?;
            store.save_snapshot(&wiring.state)?;
            print_json(&summary)
        }

        Commands::Sync { owner, feed } => {
            tracing::info!(%owner, feed = %feed.display(), "bank sync");
            let raw = fs::read_to_string(&feed)
                .with_context(|| format!("read feed '{}'", feed.display()))?;
            let items: Vec<BankFeedItem> =
                serde_json::from_str(&raw).context("feed json parse failed")?;
            let store = open_store(&wiring.state)?;
            let mut pipeline = build_pipeline(&wiring, &loaded, store.clone())?;
            let summary = pipeline.run_bank_sync(owner, &items).await?;
            store.save_snapshot(&wiring.state)?;
            print_json(&summary)
        }

        Commands::Receipt { owner, file, date } => {
            tracing::info!(%owner, file = %file.display(), "receipt capture");
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("read receipt '{}'", file.display()))?;
            let payload: ReceiptPayload =
                serde_json::from_str(&raw).context("receipt json parse failed")?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let store = open_store(&wiring.state)?;
            let mut pipeline = build_pipeline(&wiring, &loaded, store.clone())?;
            let summary = pipeline.run_receipt(owner, &payload, date).await?;
            store.save_snapshot(&wiring.state)?;
            print_json(&summary)
        }

        Commands::Resolve { owner } => {
            tracing::info!(%owner, "re-resolution sweep");
            let store = open_store(&wiring.state)?;
            let mut pipeline = build_pipeline(&wiring, &loaded, store.clone())?;
            let summary = pipeline.run_re_resolution(owner).await?;
            store.save_snapshot(&wiring.state)?;
            print_json(&summary)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

fn open_store(state: &Path) -> Result<Arc<MemStore>> {
    let store = if state.exists() {
        MemStore::load_snapshot(state)
            .with_context(|| format!("load state snapshot '{}'", state.display()))?
    } else {
        MemStore::new()
    };
    Ok(Arc::new(store))
}

fn build_pipeline(wiring: &Wiring, loaded: &LoadedConfig, store: Arc<MemStore>) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(store, loaded.config.clone());

    if let Some(url) = &wiring.inference_url {
        let mut client = HttpInferenceClient::new(
            url,
            Duration::from_secs(loaded.config.inference_timeout_secs),
        );
        if let Some(key) = &wiring.inference_api_key {
            client = client.with_api_key(key);
        }
        pipeline = pipeline.with_inference_client(Arc::new(client));
    }

    pipeline = pipeline.with_audit_writer(ResolutionAuditWriter::new(wiring.audit_path())?);

    Ok(pipeline)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
