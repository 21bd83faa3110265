//! Test doubles for the detection / recognition collaborators and image fixtures.
//!
//! Images are told apart by their pixel dimensions: the scripted detector
//! answers by image size, the scripted reader by crop size.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use dura_bulk_sorter::models::classification::{BoundingBox, Region, TextFragment};
use dura_bulk_sorter::services::classifier::ImageClassifier;
use dura_bulk_sorter::services::detection::{DetectionError, RegionClassifier};
use dura_bulk_sorter::services::matcher::FuzzyMatcher;
use dura_bulk_sorter::services::ocr::{OcrError, TextReader, WorkersAiError};
use dura_bulk_sorter::services::source::{AcquisitionError, ImageSource, Report};

/// A fixture image and what the doubles should say about it.
#[derive(Debug, Clone)]
pub struct TestImageFixture {
    pub filename: &'static str,
    pub size: (u32, u32),
    /// Boat box `(xmin, ymin, xmax, ymax)` and the text the reader finds in it.
    pub boats: &'static [((f32, f32, f32, f32), &'static str)],
    pub description: &'static str,
}

pub const SHIPPING_HULL: TestImageFixture = TestImageFixture {
    filename: "image1.png",
    size: (120, 80),
    boats: &[((10.0, 10.0, 110.0, 50.0), "DURA BULK SHIPPING")],
    description: "Bulk carrier with the company name on the hull",
};

pub const COMPANY_SIGN: TestImageFixture = TestImageFixture {
    filename: "image2.png",
    size: (140, 90),
    boats: &[((20.0, 30.0, 110.0, 60.0), "Dura-Bulk Co")],
    description: "Tug with hyphenated lettering",
};

pub const OPEN_SEA: TestImageFixture = TestImageFixture {
    filename: "image3.png",
    size: (160, 100),
    boats: &[],
    description: "No vessel in frame",
};

pub const OTHER_OPERATOR: TestImageFixture = TestImageFixture {
    filename: "image4.png",
    size: (180, 110),
    boats: &[((0.0, 0.0, 70.0, 35.0), "MAERSK LINE")],
    description: "Vessel of a different operator",
};

pub const SPLIT_NAME: TestImageFixture = TestImageFixture {
    filename: "image5.png",
    size: (200, 120),
    boats: &[
        ((0.0, 0.0, 55.0, 25.0), "DURA"),
        ((100.0, 0.0, 165.0, 25.0), "BULK"),
    ],
    description: "Name split across two detected boxes",
};

/// Write the fixture as a PNG into `dir`.
pub fn write_fixture(dir: &Path, fixture: &TestImageFixture) -> PathBuf {
    let path = dir.join(fixture.filename);
    let (w, h) = fixture.size;
    RgbImage::from_pixel(w, h, Rgb([30, 60, 120])).save(&path).unwrap();
    path
}

/// Write a file that no decoder accepts.
pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x00\x01 this is not an image").unwrap();
    path
}

/// Detector answering by image dimensions. Unknown sizes have no detections.
#[derive(Default)]
pub struct ScriptedDetector {
    regions: HashMap<(u32, u32), Vec<Region>>,
    failing: Vec<(u32, u32)>,
    gate: Option<(usize, Arc<Semaphore>)>,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn from_fixtures(fixtures: &[&TestImageFixture]) -> Self {
        let mut detector = Self::default();
        for fixture in fixtures {
            let regions = fixture
                .boats
                .iter()
                .map(|((xmin, ymin, xmax, ymax), _)| Region {
                    label: "boat".to_string(),
                    score: 0.9,
                    bbox: BoundingBox {
                        xmin: *xmin,
                        ymin: *ymin,
                        xmax: *xmax,
                        ymax: *ymax,
                    },
                })
                .collect();
            detector.regions.insert(fixture.size, regions);
        }
        detector
    }

    /// Make detection fail for images of this fixture's size.
    pub fn failing_on(mut self, fixture: &TestImageFixture) -> Self {
        self.failing.push(fixture.size);
        self
    }

    /// Block the `call`-th detection (0-based) until a permit is added.
    pub fn gated_at(mut self, call: usize, gate: Arc<Semaphore>) -> Self {
        self.gate = Some((call, gate));
        self
    }
}

#[async_trait]
impl RegionClassifier for ScriptedDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Region>, DetectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((at, gate)) = &self.gate {
            if *at == call {
                let _permit = gate.acquire().await.expect("gate closed");
            }
        }

        let size = (image.width(), image.height());
        if self.failing.contains(&size) {
            return Err(DetectionError::WorkersAi(WorkersAiError::Api {
                status: 503,
                message: "detector unavailable".to_string(),
            }));
        }
        Ok(self.regions.get(&size).cloned().unwrap_or_default())
    }
}

/// Reader answering by crop dimensions. Records the crop paths it was given.
#[derive(Default)]
pub struct ScriptedReader {
    texts: HashMap<(u32, u32), &'static str>,
    failing: Vec<(u32, u32)>,
    pub crops: Mutex<Vec<PathBuf>>,
}

impl ScriptedReader {
    pub fn from_fixtures(fixtures: &[&TestImageFixture]) -> Self {
        let mut reader = Self::default();
        for fixture in fixtures {
            for ((xmin, ymin, xmax, ymax), text) in fixture.boats {
                let size = ((xmax - xmin) as u32, (ymax - ymin) as u32);
                reader.texts.insert(size, *text);
            }
        }
        reader
    }

    /// Make reading fail for every crop of this fixture.
    pub fn failing_on(mut self, fixture: &TestImageFixture) -> Self {
        for ((xmin, ymin, xmax, ymax), _) in fixture.boats {
            self.failing.push(((xmax - xmin) as u32, (ymax - ymin) as u32));
        }
        self
    }
}

#[async_trait]
impl TextReader for ScriptedReader {
    async fn read(&self, crop: &Path) -> Result<Vec<TextFragment>, OcrError> {
        self.crops.lock().unwrap().push(crop.to_path_buf());
        let size = image::image_dimensions(crop)
            .map_err(|e| OcrError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        if self.failing.contains(&size) {
            return Err(OcrError::Io(std::io::Error::other("recognizer crashed")));
        }
        Ok(self
            .texts
            .get(&size)
            .map(|text| vec![TextFragment::new(*text)])
            .unwrap_or_default())
    }
}

pub fn classifier(detector: Arc<ScriptedDetector>, reader: Arc<ScriptedReader>) -> ImageClassifier {
    ImageClassifier::new(detector, reader, FuzzyMatcher::default()).with_vessel_labels(vec!["boat".to_string()])
}

/// A live source whose fetch fails, e.g. rejected credentials.
pub struct FailingSource;

#[async_trait]
impl ImageSource for FailingSource {
    fn requires_fetch(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "@durabulk".to_string()
    }

    async fn acquire(&self, report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError> {
        report("Logging in...".to_string());
        Err(AcquisitionError::Status {
            url: "https://example.invalid/login".to_string(),
            status: 401,
        })
    }
}

/// A live source that finds nothing.
pub struct EmptyFeed;

#[async_trait]
impl ImageSource for EmptyFeed {
    fn requires_fetch(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "#durabulk".to_string()
    }

    async fn acquire(&self, _report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError> {
        Ok(Vec::new())
    }
}

/// A live source that yields already-written files, as a scraper would.
pub struct PrefetchedFeed(pub Vec<PathBuf>);

#[async_trait]
impl ImageSource for PrefetchedFeed {
    fn requires_fetch(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "prefetched feed".to_string()
    }

    async fn acquire(&self, report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError> {
        report(format!("Downloaded {} images", self.0.len()));
        Ok(self.0.clone())
    }
}
