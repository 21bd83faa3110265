use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::models::classification::Region;
use crate::services::ocr::{WorkersAiClient, WorkersAiError};

const DETR_MODEL: &str = "@cf/facebook/detr-resnet-50";

/// Locates objects in an image. Implementations return every detection;
/// filtering by label and score happens in the image classifier.
#[async_trait]
pub trait RegionClassifier: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Region>, DetectionError>;
}

#[async_trait]
impl RegionClassifier for WorkersAiClient {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Region>, DetectionError> {
        let mut encoded = Vec::new();
        image.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;

        let request_body = serde_json::json!({ "image": encoded });
        let regions: Vec<Region> = self.run(DETR_MODEL, &request_body).await?;

        tracing::debug!(detections = regions.len(), "Object detection complete");
        Ok(regions)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Object detection failed: {0}")]
    WorkersAi(#[from] WorkersAiError),

    #[error("Failed to encode image for detection: {0}")]
    Encode(#[from] image::ImageError),
}
