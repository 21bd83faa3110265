//! Offline classifier for a directory of already-downloaded images.
//!
//! Copies every readable image into `<CLASSIFY_OUTPUT_DIR>/dura_bulk` or
//! `<CLASSIFY_OUTPUT_DIR>/non_dura_bulk` and writes a per-image report to
//! `CLASSIFY_RESULTS_FILE`. Workers AI credentials and matcher settings come
//! from the same environment as the server.

use dura_bulk_sorter::{
    config::{AppConfig, ClassifyConfig},
    models::job::Partition,
    services::{
        classifier::ImageClassifier, matcher::FuzzyMatcher, ocr::WorkersAiClient,
        source::has_image_extension, storage::OutputStore,
    },
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct ImageReport {
    dura_bulk: bool,
    details: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;
    let classify = ClassifyConfig::from_env()?;

    let images = list_images(&classify.input_dir).await?;
    if images.is_empty() {
        tracing::warn!(input_dir = %classify.input_dir.display(), "No images found");
        return Ok(());
    }

    let store = OutputStore::open(&classify.output_dir).await?;
    let workers_ai = Arc::new(WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token)?);
    let classifier = ImageClassifier::new(
        workers_ai.clone(),
        workers_ai,
        FuzzyMatcher::new(&config.target_phrase, config.match_mode),
    )
    .with_vessel_labels(config.vessel_labels.clone())
    .with_min_score(config.min_detection_score);

    tracing::info!(count = images.len(), mode = %config.match_mode, "Analyzing images");

    let reports = sort_images(&classifier, &store, &images).await;
    let total = reports.len();
    let matched = reports.values().filter(|r| r.dura_bulk).count();

    let json = serde_json::to_string_pretty(&reports)?;
    tokio::fs::write(&classify.results_file, json).await?;

    tracing::info!(
        dura_bulk = matched,
        other = total - matched,
        results_file = %classify.results_file.display(),
        output_dir = %store.root().display(),
        "Done"
    );
    Ok(())
}

/// Classify and copy each image in order. Per-image failures end up in the
/// report instead of stopping the run.
async fn sort_images(
    classifier: &ImageClassifier,
    store: &OutputStore,
    images: &[PathBuf],
) -> BTreeMap<String, ImageReport> {
    let total = images.len();
    let mut reports = BTreeMap::new();

    for (index, path) in images.iter().enumerate() {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => {
                tracing::warn!(image = %path.display(), "Skipping entry without a file name");
                continue;
            }
        };

        let (is_match, mut details, copy) = match classifier.classify(path).await {
            Ok(result) => (result.is_match, result.detail, !result.unreadable),
            Err(e) => {
                tracing::error!(image = %name, error = %e, "Classification failed");
                (false, format!("error: {}", e), true)
            }
        };

        if copy {
            if let Err(e) = store.place(path, Partition::for_verdict(is_match), &name).await {
                tracing::error!(image = %name, error = %e, "Failed to copy image into output");
                details = format!("{}; copy failed: {}", details, e);
            }
        }

        tracing::info!(
            progress = %format!("{}/{}", index + 1, total),
            image = %name,
            label = if is_match { "DURA BULK" } else { "other" },
            details = %details,
            "Image analyzed"
        );
        reports.insert(name, ImageReport { dura_bulk: is_match, details });
    }

    reports
}

async fn list_images(dir: &std::path::Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if has_image_extension(&path) && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
