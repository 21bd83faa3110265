use serde::Deserialize;
use std::path::PathBuf;

use crate::services::matcher::MatchMode;
use crate::services::source::DEFAULT_MAX_DOWNLOAD_BYTES;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5001"). Unused by the offline classifier.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// Root directory holding the `dura_bulk/` and `non_dura_bulk/` partitions
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Phrase the fuzzy matcher looks for in recognized text
    #[serde(default = "default_target_phrase")]
    pub target_phrase: String,

    /// `exact` or `partial`
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Detector labels treated as vessels (comma-separated in the environment)
    #[serde(default = "default_vessel_labels")]
    pub vessel_labels: Vec<String>,

    /// Detections scoring below this are ignored
    #[serde(default = "default_min_detection_score")]
    pub min_detection_score: f32,

    /// Request body limit for multipart uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Per-request timeout for remote image downloads
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Size cap for a single remote image
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_target_phrase() -> String {
    "Dura Bulk".to_string()
}

fn default_vessel_labels() -> Vec<String> {
    vec!["boat".to_string()]
}

fn default_min_detection_score() -> f32 {
    0.5
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_download_timeout_secs() -> u64 {
    30
}

fn default_max_download_bytes() -> usize {
    DEFAULT_MAX_DOWNLOAD_BYTES
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

/// Settings for the offline `classify` binary, read from `CLASSIFY_*` variables.
#[derive(Debug, Deserialize)]
pub struct ClassifyConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_results_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("results.json")
}

impl ClassifyConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("CLASSIFY_").from_env()
    }
}
