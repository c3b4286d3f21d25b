mod api_handlers;
mod engine;
mod entities;
mod error;
mod filter;
mod query;
mod search_backend;
mod store;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use poem::{listener::TcpListener, middleware::Cors, EndpointExt, Route, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine::EntityQueryEngine;
use entities::{EntityKind, EntityRegistry};
use search_backend::{HttpSearchBackend, SearchBackend};
use store::MemoryStore;

#[derive(Parser)]
#[command(name = "api-server")]
#[command(about = "Scholarly Metadata API Server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
}

struct AppContext {
    engine: Arc<EntityQueryEngine>,
}

async fn setup_app_context() -> Result<AppContext, std::io::Error> {
    let store = Arc::new(MemoryStore::new());

    let snapshot_dir =
        PathBuf::from(env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "./snapshots".to_string()));
    if snapshot_dir.is_dir() {
        match store.load_snapshot_dir(&snapshot_dir) {
            Ok(()) => tracing::info!("loaded snapshots from {}", snapshot_dir.display()),
            Err(e) => {
                tracing::error!("failed to load snapshots from {}: {}", snapshot_dir.display(), e);
                return Err(std::io::Error::other(format!("snapshot load failed: {}", e)));
            }
        }
    } else {
        tracing::warn!(
            "snapshot directory {} not found, serving empty collections",
            snapshot_dir.display()
        );
    }

    // The external search index is optional; without it, search runs against
    // the primary store's text matching.
    let search_backend: Option<Arc<dyn SearchBackend>> = match env::var("SEARCH_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let prefix =
                env::var("SEARCH_INDEX_PREFIX").unwrap_or_else(|_| "scholarly".to_string());
            match HttpSearchBackend::new(url.clone(), prefix) {
                Ok(backend) => {
                    let backend = Arc::new(backend);
                    let collections: Vec<&str> =
                        EntityKind::ALL.iter().map(|k| k.collection()).collect();
                    if let Err(e) = backend.initialize_indices(&collections).await {
                        tracing::warn!("search index initialization failed: {}", e);
                    }
                    tracing::info!("search backend configured at {}", url);
                    Some(backend as Arc<dyn SearchBackend>)
                }
                Err(e) => {
                    tracing::error!("failed to configure search backend: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    let engine = Arc::new(EntityQueryEngine::new(
        store,
        search_backend,
        EntityRegistry::standard(),
    ));

    Ok(AppContext { engine })
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let cli = Cli::parse();

    // Load .env file if it exists
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve => serve_command().await,
    }
}

async fn serve_command() -> Result<(), std::io::Error> {
    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);

    let ctx = setup_app_context().await?;

    tracing::info!("Starting scholarly metadata API server on {}", addr);

    let app = Route::new()
        .at("/", poem::get(api_handlers::api_info))
        .at("/api/v1/health", poem::get(api_handlers::health))
        .at("/:entity", poem::get(api_handlers::list_entities))
        .at("/:entity/search", poem::get(api_handlers::search_entities))
        .at(
            "/:entity/group_by/:field",
            poem::get(api_handlers::group_entities),
        )
        .at("/:entity/:entity_id", poem::get(api_handlers::get_entity))
        .data(ctx.engine)
        .with(Cors::new());

    Server::new(TcpListener::bind(&addr)).run(app).await
}
