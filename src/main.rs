use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use overlapr::{
    Config,
    boundary::{BoundaryIndex, BoundaryIndexBuilder, BoundaryOptions},
    catalog::Catalog,
    config::{Command, ServeArgs},
    handlers::{AppState, create_router},
    query::QueryEngine,
    storage::{HttpStorage, LocalStorage, Storage},
    subset::{StorePool, SubsetIndexer, SubsetOptions},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Track files and catalog tables come from a local mirror or over HTTP
    let storage: Arc<dyn Storage> = match &config.data_dir {
        Some(dir) => {
            info!("Data directory: {:?}", dir);
            Arc::new(LocalStorage::new(dir.clone()))
        }
        None => Arc::new(HttpStorage::new(config.fetch_timeout())?),
    };

    let catalog = Catalog::load(
        storage.as_ref(),
        &config.catalog_url,
        Some(&config.formats_url),
    )
    .await?;

    match &config.command {
        Command::Serve(args) => serve(&config, args, storage, catalog).await,
        Command::BuildBoundaries(args) => {
            let summary = BoundaryIndexBuilder::new(storage, BoundaryOptions::from(args))
                .run(catalog.tracks(), &config.boundary_index)
                .await?;
            info!(
                "Boundary index: {} tracks ({} new, {} failed, {} already indexed)",
                summary.total, summary.indexed, summary.failed, summary.already_indexed
            );
            Ok(())
        }
        Command::BuildSubset(args) => {
            let summary = SubsetIndexer::new(storage, SubsetOptions::from(args))
                .run(&catalog, &config.subset_store)
                .await?;
            info!(
                "Spatial store: {} intervals from {} of {} tracks",
                summary.intervals_stored, summary.tracks_sampled, summary.tracks_selected
            );
            Ok(())
        }
    }
}

async fn serve(
    config: &Config,
    args: &ServeArgs,
    storage: Arc<dyn Storage>,
    catalog: Catalog,
) -> anyhow::Result<()> {
    let boundaries = BoundaryIndex::load(&config.boundary_index)
        .inspect_err(|e| warn!("Streaming overlaps disabled: {}", e))
        .ok();
    let store = StorePool::open(&config.subset_store)
        .inspect_err(|e| warn!("Indexed overlaps disabled: {}", e))
        .ok();
    if boundaries.is_none() && store.is_none() {
        anyhow::bail!(
            "neither {} nor {} is available; run build-boundaries or build-subset first",
            config.boundary_index.display(),
            config.subset_store.display()
        );
    }

    let options = args.query_options(config.fetch_timeout());
    let mut engine = QueryEngine::new(catalog, storage, options);
    if let Some(boundaries) = boundaries {
        info!("Boundary index covers {} tracks", boundaries.len());
        engine = engine.with_boundaries(boundaries);
    }
    if let Some(store) = store {
        engine = engine.with_store(store);
    }

    let state = AppState {
        engine: Arc::new(engine),
    };
    let app = create_router(state);
    let app = if args.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    let addr = args.bind_addr();
    info!("Starting overlapr server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
