//! `docshard-walkthrough`: runs the walkthrough from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Against the in-memory emulator
//! docshard-walkthrough
//!
//! # Against the hosted service (DOCSHARD_ENDPOINT / DOCSHARD_KEY, or .env)
//! docshard-walkthrough --backend rest --throughput-delta 200 --keep-database
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use docshard_store::{DocumentStore, MemoryStore, Workspace};
use docshard_store_rest::RestStore;
use docshard_walkthrough::{
    Report, WalkthroughConfig, WalkthroughError,
    config::{self, DEFAULT_CONTAINER, DEFAULT_DATABASE, DEFAULT_THROUGHPUT_DELTA},
};

#[derive(Parser)]
#[command(name = "docshard-walkthrough")]
#[command(author, version, about = "Walk through database, container and item operations")]
struct Cli {
    /// Store to run against
    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    /// Database to provision
    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,

    /// Container to provision
    #[arg(long, default_value = DEFAULT_CONTAINER)]
    container: String,

    /// RU/s added to the container's throughput
    #[arg(long, default_value_t = DEFAULT_THROUGHPUT_DELTA)]
    throughput_delta: u32,

    /// Leave the database in place afterwards
    #[arg(long)]
    keep_database: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-memory emulator
    Memory,
    /// Hosted service over REST
    Rest,
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(report) => {
            tracing::info!(
                created = report.created.iter().filter(|item| item.created).count(),
                queried = report.andersen.len(),
                request_charge = report.request_charge,
                "end of walkthrough"
            );
            ExitCode::SUCCESS
        },
        Err(err) => {
            tracing::error!(status = err.status().map(|s| s.as_u16()), error = %err, "walkthrough failed");
            ExitCode::FAILURE
        },
    }
}

async fn execute(cli: Cli) -> Result<Report, WalkthroughError> {
    let config = WalkthroughConfig::builder()
        .database(cli.database)
        .container(cli.container)
        .throughput_delta(cli.throughput_delta)
        .keep_database(cli.keep_database)
        .build()?;

    match cli.backend {
        Backend::Memory => walk(MemoryStore::new(), &config).await,
        Backend::Rest => {
            let store = RestStore::new(config::rest_config_from_env()?)?;
            tracing::info!(endpoint = %store.endpoint(), "connecting to service");
            walk(store, &config).await
        },
    }
}

async fn walk<S: DocumentStore>(store: S, config: &WalkthroughConfig) -> Result<Report, WalkthroughError> {
    Ok(docshard_walkthrough::run(Workspace::new(store), config).await?)
}
