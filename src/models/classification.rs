use serde::{Deserialize, Serialize};

/// Detector box in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Integer crop rectangle `(x, y, width, height)` clamped to the image.
    /// `None` when nothing of the box lies inside the image.
    pub fn to_crop_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f32, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as u32).min(max)
            }
        };
        let x1 = clamp(self.xmin, width);
        let y1 = clamp(self.ymin, height);
        let x2 = clamp(self.xmax, width);
        let y2 = clamp(self.ymax, height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// One object detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub label: String,
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// A piece of text recognized inside a region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub confidence: Option<f32>,
}

impl TextFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// Verdict for a single image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub is_match: bool,
    /// `boats=N` plus `ocr_text="…"` when any text was read, or the decode
    /// failure for unreadable images.
    pub detail: String,
    /// Number of vessel regions considered.
    pub regions: usize,
    /// The file could not be opened or decoded; it belongs to no partition.
    #[serde(default)]
    pub unreadable: bool,
}

impl ClassificationResult {
    pub fn unreadable(reason: impl std::fmt::Display) -> Self {
        Self {
            is_match: false,
            detail: format!("Could not open image: {}", reason),
            regions: 0,
            unreadable: true,
        }
    }

    pub fn classified(is_match: bool, regions: usize, combined_text: &str) -> Self {
        let mut detail = format!("boats={}", regions);
        if !combined_text.is_empty() {
            detail.push_str(&format!(", ocr_text=\"{}\"", combined_text));
        }
        Self {
            is_match,
            detail,
            regions,
            unreadable: false,
        }
    }
}
