//! Test helper utilities: pipeline wiring and HTTP polling.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use dura_bulk_sorter::app_state::AppState;
use dura_bulk_sorter::models::job::{JobRecord, Partition, Phase};
use dura_bulk_sorter::routes;
use dura_bulk_sorter::services::pipeline::BatchPipeline;
use dura_bulk_sorter::services::registry::JobRegistry;
use dura_bulk_sorter::services::storage::OutputStore;

use crate::fixtures::{classifier, ScriptedDetector, ScriptedReader};

/// Pipeline writing into `output_root`, backed by the scripted doubles.
pub async fn pipeline(
    output_root: &Path,
    detector: Arc<ScriptedDetector>,
    reader: Arc<ScriptedReader>,
) -> BatchPipeline {
    let store = OutputStore::open(output_root).await.expect("Failed to open output store");
    BatchPipeline::new(
        Arc::new(JobRegistry::new()),
        Arc::new(classifier(detector, reader)),
        Arc::new(store),
    )
}

/// Where a batch's outputs for `partition` land under `output_root`.
pub fn batch_dir(output_root: &Path, job_id: &Uuid, partition: Partition) -> PathBuf {
    output_root.join(partition.to_string()).join(job_id.to_string())
}

/// Poll the registry until `check` holds for the record (with timeout).
pub async fn wait_until<F>(registry: &JobRegistry, job_id: &Uuid, check: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    for _ in 0..200 {
        let record = registry.get(job_id).expect("Job not found");
        if check(&record) {
            return record;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("Job {} never reached the expected state", job_id);
}

/// Serve the API on an ephemeral local port and return its base URL.
pub async fn spawn_app(
    output_root: &Path,
    detector: Arc<ScriptedDetector>,
    reader: Arc<ScriptedReader>,
) -> String {
    let store = OutputStore::open(output_root).await.expect("Failed to open output store");
    let state = AppState::new(classifier(detector, reader), store, reqwest::Client::new());
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });

    format!("http://{}", addr)
}

/// Poll job status until done or error (with timeout).
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &Uuid,
    timeout_secs: u64,
) -> Result<JobRecord, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 20; // Poll every 50ms

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Status check failed: {}", response.status()).into());
        }

        let record = response.json::<JobRecord>().await?;
        match record.phase {
            Phase::Done | Phase::Error => return Ok(record),
            Phase::Queued | Phase::Scraping | Phase::Detecting => {
                sleep(Duration::from_millis(50)).await;
            }
        }
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}
