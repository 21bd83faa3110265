use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Phase;

/// Maximum number of images accepted in one JSON submission.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Request to classify a batch of images that are either already on local
/// storage or reachable by URL. Exactly one of the two lists may be non-empty.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmitBatchRequest {
    #[serde(default)]
    #[garde(length(max = 1000), inner(length(min = 1, max = 4096)))]
    pub image_paths: Vec<String>,

    #[serde(default)]
    #[garde(length(max = 1000), inner(length(min = 1, max = 4096)))]
    pub image_urls: Vec<String>,
}

/// Response after submitting a batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub phase: Phase,
    pub message: String,
}
