use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::models::classification::{ClassificationResult, Region};
use crate::services::detection::{DetectionError, RegionClassifier};
use crate::services::matcher::FuzzyMatcher;
use crate::services::ocr::TextReader;

/// Separator placed between the texts of different regions.
pub const REGION_SEPARATOR: &str = " | ";

/// Decides whether a single image shows the target brand.
///
/// Detection finds vessel regions, each region is cropped to a scratch file
/// and transcribed, and the matcher runs once over the text of all regions
/// joined together. Matching on the combined text catches names split
/// across two boxes.
pub struct ImageClassifier {
    detector: Arc<dyn RegionClassifier>,
    reader: Arc<dyn TextReader>,
    matcher: FuzzyMatcher,
    vessel_labels: Vec<String>,
    min_score: f32,
}

impl ImageClassifier {
    pub fn new(
        detector: Arc<dyn RegionClassifier>,
        reader: Arc<dyn TextReader>,
        matcher: FuzzyMatcher,
    ) -> Self {
        Self {
            detector,
            reader,
            matcher,
            vessel_labels: vec!["boat".to_string()],
            min_score: 0.0,
        }
    }

    pub fn with_vessel_labels(mut self, labels: Vec<String>) -> Self {
        self.vessel_labels = labels.into_iter().map(|l| l.trim().to_lowercase()).collect();
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn matcher(&self) -> &FuzzyMatcher {
        &self.matcher
    }

    fn is_vessel(&self, region: &Region) -> bool {
        region.score >= self.min_score
            && self
                .vessel_labels
                .iter()
                .any(|label| region.label.eq_ignore_ascii_case(label))
    }

    /// Classify one image file.
    ///
    /// Undecodable files and per-region read failures are folded into the
    /// result. Only a detector failure is returned as an error, since no
    /// verdict can be reached without it.
    pub async fn classify(&self, path: &Path) -> Result<ClassificationResult, ClassifyError> {
        let start = Instant::now();

        let image = match load_rgb(path).await? {
            Ok(image) => image,
            Err(e) => {
                warn!(image = %path.display(), error = %e, "Could not open image");
                metrics::counter!("images_unreadable_total").increment(1);
                return Ok(ClassificationResult::unreadable(e));
            }
        };

        let regions: Vec<Region> = self
            .detector
            .detect(&image)
            .await?
            .into_iter()
            .filter(|r| self.is_vessel(r))
            .collect();

        let mut texts = Vec::new();
        for (index, region) in regions.iter().enumerate() {
            if let Some(text) = self.read_region(path, &image, index, region).await {
                texts.push(text);
            }
        }

        let combined = texts.join(REGION_SEPARATOR);
        let is_match = !combined.is_empty() && self.matcher.matches(&combined);
        let result = ClassificationResult::classified(is_match, regions.len(), &combined);

        metrics::histogram!("image_classification_seconds").record(start.elapsed().as_secs_f64());
        debug!(
            image = %path.display(),
            regions = regions.len(),
            is_match,
            "Image classified"
        );

        Ok(result)
    }

    /// Crop a region to a scratch file and transcribe it. Any failure is
    /// logged and treated as "no text". The scratch file is deleted when the
    /// `NamedTempFile` drops, on every path out of this function.
    async fn read_region(
        &self,
        path: &Path,
        image: &DynamicImage,
        index: usize,
        region: &Region,
    ) -> Option<String> {
        let (x, y, w, h) = match region.bbox.to_crop_rect(image.width(), image.height()) {
            Some(rect) => rect,
            None => {
                debug!(image = %path.display(), region = index, "Region lies outside the image");
                return None;
            }
        };

        let crop = image.crop_imm(x, y, w, h);
        let crop_file = match tokio::task::spawn_blocking(move || write_crop(&crop)).await {
            Ok(Ok(file)) => file,
            Ok(Err(e)) => {
                warn!(image = %path.display(), region = index, error = %e, "Failed to write crop");
                return None;
            }
            Err(e) => {
                warn!(image = %path.display(), region = index, error = %e, "Crop task failed");
                return None;
            }
        };

        let fragments = match self.reader.read(crop_file.path()).await {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!(image = %path.display(), region = index, error = %e, "Text recognition failed");
                return None;
            }
        };

        let text = fragments
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Decode off the async runtime. The outer error is a failed blocking task,
/// the inner one an unreadable file.
async fn load_rgb(path: &Path) -> Result<Result<DynamicImage, image::ImageError>, ClassifyError> {
    let path = path.to_path_buf();
    let decoded = tokio::task::spawn_blocking(move || -> Result<DynamicImage, image::ImageError> {
        let image = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    })
    .await?;
    Ok(decoded)
}

fn write_crop(crop: &DynamicImage) -> Result<NamedTempFile, CropError> {
    let file = tempfile::Builder::new()
        .prefix("dura_bulk_crop_")
        .suffix(".jpg")
        .tempfile()?;
    crop.save_with_format(file.path(), ImageFormat::Jpeg)?;
    Ok(file)
}

#[derive(Debug, thiserror::Error)]
enum CropError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("Image task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}
