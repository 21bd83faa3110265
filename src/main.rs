use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dura_bulk_sorter::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        classifier::ImageClassifier, matcher::FuzzyMatcher, ocr::WorkersAiClient,
        source::download_client, storage::OutputStore,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing dura-bulk-sorter server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("batch_jobs_submitted_total", "Total batches submitted");
    metrics::describe_counter!("batch_jobs_completed_total", "Total batches that finished");
    metrics::describe_counter!("batch_jobs_failed_total", "Total batches that ended in error");
    metrics::describe_counter!(
        "images_classified_total",
        "Images sorted into a partition, labelled by verdict"
    );
    metrics::describe_counter!("images_unreadable_total", "Images that could not be decoded");
    metrics::describe_histogram!(
        "image_classification_seconds",
        "Time to detect, read and match one image"
    );

    // Prepare output partitions
    tracing::info!(output_dir = %config.output_dir.display(), "Opening output store");
    let store = OutputStore::open(&config.output_dir)
        .await
        .expect("Failed to create output directories");

    // Initialize Workers AI client (shared by detection and OCR)
    tracing::info!("Initializing Cloudflare Workers AI client");
    let workers_ai = Arc::new(
        WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token)
            .expect("Failed to initialize Workers AI client"),
    );

    let matcher = FuzzyMatcher::new(&config.target_phrase, config.match_mode);
    tracing::info!(
        phrase = %config.target_phrase,
        mode = %config.match_mode,
        vessel_labels = ?config.vessel_labels,
        "Classifier configured"
    );
    let classifier = ImageClassifier::new(workers_ai.clone(), workers_ai, matcher)
        .with_vessel_labels(config.vessel_labels.clone())
        .with_min_score(config.min_detection_score);

    // Client for remote image downloads
    let downloads = download_client(Duration::from_secs(config.download_timeout_secs))
        .expect("Failed to build download client");

    // Create shared application state
    let state = AppState::new(classifier, store, downloads)
        .with_max_download_bytes(config.max_download_bytes);

    // Build API routes
    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting dura-bulk-sorter on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
