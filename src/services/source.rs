//! Where a batch's images come from.
//!
//! Sources hand the pipeline an ordered list of local files. Sources that
//! have to fetch over the network first run in the `scraping` phase.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::services::storage::OutputNaming;

/// File extensions accepted from upload directories.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Progress callback used while acquiring; receives a human-readable status line.
pub type Report<'a> = &'a (dyn Fn(String) + Send + Sync);

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Whether acquisition is a live fetch, which runs as the `scraping` phase.
    fn requires_fetch(&self) -> bool;

    /// Short label used in status messages.
    fn describe(&self) -> String;

    /// How classified images are named in the output partitions.
    fn naming(&self) -> OutputNaming {
        OutputNaming::Preserve
    }

    async fn acquire(&self, report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError>;
}

/// Files already on local storage, processed in the given order.
pub struct LocalFiles {
    paths: Vec<PathBuf>,
}

impl LocalFiles {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl ImageSource for LocalFiles {
    fn requires_fetch(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("{} local files", self.paths.len())
    }

    async fn acquire(&self, _report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError> {
        Ok(self.paths.clone())
    }
}

/// A scratch directory of uploaded files. The directory is removed when the
/// source is dropped at the end of the batch.
///
/// Files are stored as `<NNNN>_<name>` in arrival order, so uploads sharing a
/// client-side name are all kept and processed in the order they were sent.
pub struct UploadDir {
    dir: TempDir,
    received: AtomicUsize,
}

impl UploadDir {
    pub fn create() -> Result<Self, AcquisitionError> {
        let dir = tempfile::Builder::new().prefix("dura_bulk_upload_").tempdir()?;
        Ok(Self {
            dir,
            received: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store one uploaded file. Returns `None` when the client-supplied name
    /// has no usable file name component.
    pub async fn save(&self, file_name: &str, data: &[u8]) -> Result<Option<PathBuf>, AcquisitionError> {
        let base = match Path::new(file_name).file_name() {
            Some(base) => base.to_string_lossy(),
            None => return Ok(None),
        };
        let index = self.received.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.path().join(format!("{:04}_{}", index, base));
        tokio::fs::write(&path, data).await?;
        Ok(Some(path))
    }
}

#[async_trait]
impl ImageSource for UploadDir {
    fn requires_fetch(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        "uploaded images".to_string()
    }

    fn naming(&self) -> OutputNaming {
        OutputNaming::Indexed {
            prefix: "upload".to_string(),
        }
    }

    async fn acquire(&self, _report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError> {
        let mut entries = tokio::fs::read_dir(self.dir.path()).await?;
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
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Default cap on a single downloaded image.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: usize = 25 * 1024 * 1024;

/// HTTP client for image downloads. Every request, body included, must
/// finish within `timeout`.
pub fn download_client(timeout: Duration) -> Result<Client, AcquisitionError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("dura-bulk-sorter/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Images downloaded from a list of URLs into a scratch directory.
///
/// A URL that fails to download, times out, exceeds the size cap or does not
/// hold an image is skipped.
pub struct RemoteImages {
    http: Client,
    urls: Vec<String>,
    dir: TempDir,
    max_bytes: usize,
}

impl RemoteImages {
    pub fn new(http: Client, urls: Vec<String>) -> Result<Self, AcquisitionError> {
        let dir = tempfile::Builder::new().prefix("dura_bulk_").tempdir()?;
        Ok(Self {
            http,
            urls,
            dir,
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn download(&self, index: usize, url: &str) -> Result<PathBuf, AcquisitionError> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let too_large = || AcquisitionError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes as u64) {
            return Err(too_large());
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        let format = image::guess_format(&bytes).map_err(|_| AcquisitionError::NotAnImage(url.to_string()))?;
        let ext = format.extensions_str().first().copied().unwrap_or("img");

        let path = self.dir.path().join(format!("remote_{:04}.{}", index, ext));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

#[async_trait]
impl ImageSource for RemoteImages {
    fn requires_fetch(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("{} remote URLs", self.urls.len())
    }

    async fn acquire(&self, report: Report<'_>) -> Result<Vec<PathBuf>, AcquisitionError> {
        let total = self.urls.len();
        let mut paths = Vec::with_capacity(total);
        let mut failed = 0;

        for (index, url) in self.urls.iter().enumerate() {
            match self.download(index, url).await {
                Ok(path) => paths.push(path),
                Err(e) => {
                    failed += 1;
                    warn!(url = %url, error = %e, "Skipping image that could not be downloaded");
                }
            }
            report(format!(
                "Downloading images: {} of {} ({} failed)",
                paths.len(),
                total,
                failed
            ));
        }

        info!(downloaded = paths.len(), failed, "Remote acquisition finished");
        Ok(paths)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{0} is not a supported image")]
    NotAnImage(String),

    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },
}
