use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feature_lens::api;
use feature_lens::config::Config;
use feature_lens::db::Database;
use feature_lens::models::ModelImport;
use feature_lens::protocol::Dispatcher;

#[derive(Parser)]
#[command(name = "flens")]
#[command(about = "Feature model graphs, history series and edits for a visualization")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one request string and print the response
    Query {
        /// e.g. "tree" or "moveFeature,A.B,C"
        request: String,
    },
    /// Replace the stored feature model with a JSON model file
    Import {
        file: PathBuf,
    },
}

/// Initialize tracing with output to stderr (for one-shot queries) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "feature_lens=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // stdout carries only the response payload
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = match &config.db_path {
        Some(path) => Database::open(path.clone()),
        None => Database::open_default(),
    }
    .context("Failed to open database")?;
    db.migrate().context("Failed to migrate database")?;
    Ok(db)
}

fn dispatcher(config: &Config, db: Database) -> Dispatcher<Database> {
    Dispatcher::new(db)
        .with_project_root(config.project_root.clone())
        .with_history_schema(config.history_schema)
}

async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting feature-lens server on port {}", port);

    let db = open_database(config)?;
    let app = api::create_router(dispatcher(config, db));

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("feature-lens server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = matches!(cli.command, Some(Commands::Query { .. }));
    init_tracing(use_stderr);

    let config = Config::load();

    match cli.command {
        Some(Commands::Serve { port }) => {
            serve(&config, port.unwrap_or(config.port)).await?;
        }
        Some(Commands::Query { request }) => {
            let db = open_database(&config)?;
            let dispatcher = dispatcher(&config, db.clone());
            let result = dispatcher.dispatch(&request).await;
            db.flush_edits().context("Failed to apply queued edits")?;

            match result {
                Ok(payload) => println!("{}", payload),
                Err(failure) => {
                    println!("{}", serde_json::to_string(&failure)?);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Import { file }) => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let model: ModelImport =
                serde_json::from_str(&content).context("Failed to parse model file")?;

            let db = open_database(&config)?;
            db.import_model(&model)?;
            println!("Imported model '{}'", model.root);
        }
        None => {
            serve(&config, config.port).await?;
        }
    }

    Ok(())
}
