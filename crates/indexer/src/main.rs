//! Indexer entry point: ingestion pipeline plus read-only API server.

use std::error::Error;
use std::sync::Arc;

use indexer::config::{Config, LogFormat};
use indexer::{AppState, create_app};
use ingestion::{IngestionPipeline, NdjsonFeed};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::{InMemoryRecordStore, PostgresRecordStore, RecordReader, RecordStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Runs the pipeline (if a feed is configured) and the API until shutdown.
async fn serve<S>(config: Config, store: S, metrics_handle: PrometheusHandle) -> Result<(), BoxError>
where
    S: RecordStore + Clone + 'static,
{
    let reader: Arc<dyn RecordReader> = Arc::new(store.clone());
    let mut state = AppState::new(reader);

    let mut ingestion = None;
    if let Some(path) = &config.feed_path {
        let feed = NdjsonFeed::open(config.source_id.clone(), path).await?;
        let pipeline = IngestionPipeline::new(store, feed, config.pipeline.clone());
        let handle = pipeline.handle();
        state = state.with_pipeline(handle.clone());

        tracing::info!(
            source_id = %config.source_id,
            feed = %path.display(),
            contracts = ?config.contract_addresses,
            starting_block = ?config.pipeline.starting_block,
            "starting ingestion pipeline"
        );
        let task = tokio::spawn(async move {
            match pipeline.run().await {
                Ok(report) => tracing::info!(
                    batches = report.batches,
                    applied = report.totals.applied,
                    last_committed = ?report.last_committed,
                    "ingestion finished"
                ),
                Err(err) => tracing::error!(
                    error = %err,
                    source_id = %err.source_id(),
                    last_committed = ?err.last_committed(),
                    "ingestion stopped"
                ),
            }
        });
        ingestion = Some((handle, task));
    } else {
        tracing::info!("no FEED_PATH set, serving records read-only");
    }

    let app = create_app(Arc::new(state), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((handle, task)) = ingestion {
        handle.stop();
        task.await?;
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the record store and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let store = PostgresRecordStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL record store");
            serve(config, store, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory record store");
            serve(config, InMemoryRecordStore::new(), metrics_handle).await
        }
    }
}
