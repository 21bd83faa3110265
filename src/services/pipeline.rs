use std::sync::Arc;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::models::job::{JobError, Partition, Phase};
use crate::services::classifier::{ClassifyError, ImageClassifier};
use crate::services::registry::{JobHandle, JobRegistry};
use crate::services::source::{AcquisitionError, ImageSource};
use crate::services::storage::{BatchNamer, OutputStore, StorageError};

/// Counts reported when a batch completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub matched: usize,
    pub other: usize,
    pub unreadable: usize,
}

impl BatchSummary {
    fn detail(&self) -> String {
        let mut detail = format!("Done! {} Dura Bulk, {} other.", self.matched, self.other);
        if self.unreadable > 0 {
            detail.push_str(&format!(" {} unreadable.", self.unreadable));
        }
        detail
    }
}

/// Drives batches through acquisition, classification and partitioning.
///
/// Each submitted batch runs on its own task; the caller gets the job id
/// back immediately and polls the [`JobRegistry`]. Images are processed one
/// at a time in the order the source produced them.
#[derive(Clone)]
pub struct BatchPipeline {
    registry: Arc<JobRegistry>,
    classifier: Arc<ImageClassifier>,
    store: Arc<OutputStore>,
}

impl BatchPipeline {
    pub fn new(registry: Arc<JobRegistry>, classifier: Arc<ImageClassifier>, store: Arc<OutputStore>) -> Self {
        Self {
            registry,
            classifier,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Register a job for `source` and start it in the background.
    pub fn submit(&self, source: Box<dyn ImageSource>) -> Uuid {
        let job = self.registry.create();
        let job_id = job.id();
        metrics::counter!("batch_jobs_submitted_total").increment(1);
        info!(job_id = %job_id, source = %source.describe(), "Batch submitted");

        let pipeline = self.clone();
        // Detached: completion is observed through the record.
        tokio::spawn(
            async move {
                pipeline.run(job, source.as_ref()).await;
                // the source (and any scratch directory it owns) is dropped here
                drop(source);
            }
            .instrument(tracing::info_span!("batch", job_id = %job_id)),
        );
        job_id
    }

    /// Run a batch to a terminal phase. Never returns an error: failures end
    /// up in the job record.
    pub async fn run(&self, job: JobHandle, source: &dyn ImageSource) {
        match self.execute(&job, source).await {
            Ok(summary) => {
                let detail = if summary == BatchSummary::default() {
                    "No images to classify.".to_string()
                } else {
                    summary.detail()
                };
                info!(
                    matched = summary.matched,
                    other = summary.other,
                    unreadable = summary.unreadable,
                    "Batch completed"
                );
                if let Err(e) = job.finish(detail) {
                    error!(error = %e, "Could not mark batch as done");
                    metrics::counter!("batch_jobs_failed_total").increment(1);
                } else {
                    metrics::counter!("batch_jobs_completed_total").increment(1);
                }
            }
            Err(e) => {
                error!(error = %e, "Batch failed");
                metrics::counter!("batch_jobs_failed_total").increment(1);
                if let Err(e) = job.fail(e.to_string()) {
                    error!(error = %e, "Could not mark batch as failed");
                }
            }
        }
    }

    async fn execute(&self, job: &JobHandle, source: &dyn ImageSource) -> Result<BatchSummary, PipelineError> {
        let live = source.requires_fetch();
        if live {
            job.enter(Phase::Scraping, format!("Fetching images from {}...", source.describe()))?;
        }

        let report = |message: String| {
            if let Err(e) = job.set_detail(message) {
                tracing::warn!(error = %e, "Dropped progress update");
            }
        };
        let paths = source.acquire(&report).await?;

        if paths.is_empty() {
            if live {
                return Err(PipelineError::NoImages(source.describe()));
            }
            return Ok(BatchSummary::default());
        }

        let total = paths.len();
        job.set_total(total)?;
        job.enter(Phase::Detecting, format!("Processing {} images...", total))?;

        let mut namer = BatchNamer::new(source.naming());
        let mut summary = BatchSummary::default();

        for (index, path) in paths.iter().enumerate() {
            job.set_detail(format!("Processing image {}/{}", index + 1, total))?;

            let result = self.classifier.classify(path).await?;
            if result.unreadable {
                summary.unreadable += 1;
                job.record_image(None)?;
                continue;
            }

            let partition = Partition::for_verdict(result.is_match);
            let name = namer.name_for(index, path);
            self.store.place_for_batch(path, &job.id(), partition, &name).await?;

            metrics::counter!("images_classified_total", "verdict" => partition.to_string()).increment(1);
            info!(
                image = %path.display(),
                output = %name,
                is_match = result.is_match,
                detail = %result.detail,
                "Image sorted"
            );

            match partition {
                Partition::DuraBulk => summary.matched += 1,
                Partition::NonDuraBulk => summary.other += 1,
            }
            job.record_image(Some((partition, name)))?;
        }

        Ok(summary)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("No images found from {0}.")]
    NoImages(String),

    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Could not store result: {0}")]
    Storage(#[from] StorageError),

    #[error("Job state error: {0}")]
    Job(#[from] JobError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_detail() {
        let summary = BatchSummary { matched: 2, other: 1, unreadable: 0 };
        assert_eq!(summary.detail(), "Done! 2 Dura Bulk, 1 other.");

        let summary = BatchSummary { matched: 0, other: 1, unreadable: 2 };
        assert_eq!(summary.detail(), "Done! 0 Dura Bulk, 1 other. 2 unreadable.");
    }

    #[test]
    fn test_error_messages_are_readable() {
        let err = PipelineError::NoImages("3 remote URLs".into());
        assert_eq!(err.to_string(), "No images found from 3 remote URLs.");
    }
}
