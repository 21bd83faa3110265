use reqwest::Client;
use std::sync::Arc;

use crate::services::{
    classifier::ImageClassifier, pipeline::BatchPipeline, registry::JobRegistry,
    source::DEFAULT_MAX_DOWNLOAD_BYTES, storage::OutputStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub store: Arc<OutputStore>,
    pub pipeline: BatchPipeline,
    /// Client used to download remote images.
    pub http: Client,
    /// Size cap for one downloaded image.
    pub max_download_bytes: usize,
}

impl AppState {
    pub fn new(classifier: ImageClassifier, store: OutputStore, http: Client) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let store = Arc::new(store);
        let pipeline = BatchPipeline::new(registry.clone(), Arc::new(classifier), store.clone());
        Self {
            registry,
            store,
            pipeline,
            http,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }

    pub fn with_max_download_bytes(mut self, max_download_bytes: usize) -> Self {
        self.max_download_bytes = max_download_bytes;
        self
    }
}
