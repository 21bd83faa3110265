use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::classification::TextFragment;

const API_BASE: &str = "https://api.cloudflare.com/client/v4/accounts";
const LLAVA_MODEL: &str = "@cf/llava-hf/llava-1.5-7b-hf";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

const TRANSCRIBE_PROMPT: &str = concat!(
    "Transcribe all text painted or printed in this image (hull lettering, ",
    "company names, signs). Put each separate piece of text on its own line. ",
    "Reply with the text only. If there is no readable text, reply with nothing."
);

/// Reads text out of a cropped image region stored on disk.
#[async_trait]
pub trait TextReader: Send + Sync {
    async fn read(&self, crop: &Path) -> Result<Vec<TextFragment>, OcrError>;
}

/// Client for Cloudflare Workers AI. One instance serves both object
/// detection and text transcription and is shared across batches.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct LlavaResult {
    description: String,
}

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str) -> Result<Self, WorkersAiError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// Run a model and unwrap the `{result, success, errors}` envelope.
    pub(crate) async fn run<T: DeserializeOwned>(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<T, WorkersAiError> {
        let url = format!("{}/{}/ai/run/{}", API_BASE, self.account_id, model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        parse_envelope(status.as_u16(), &text)
    }

    /// Send an image to LLaVA and return its transcription.
    pub async fn transcribe(&self, image_bytes: &[u8]) -> Result<Vec<TextFragment>, WorkersAiError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image_bytes),
            "prompt": TRANSCRIBE_PROMPT,
            "max_tokens": 256
        });

        let result: LlavaResult = self.run(LLAVA_MODEL, &request_body).await?;
        Ok(fragments_from_description(&result.description))
    }
}

#[async_trait]
impl TextReader for WorkersAiClient {
    async fn read(&self, crop: &Path) -> Result<Vec<TextFragment>, OcrError> {
        let bytes = tokio::fs::read(crop).await?;
        Ok(self.transcribe(&bytes).await?)
    }
}

fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, WorkersAiError> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Err(WorkersAiError::Api {
                status,
                message: format!("unreadable response: {}", e),
            })
        }
    };

    match envelope.result {
        Some(result) if envelope.success && (200..300).contains(&status) => Ok(result),
        _ => {
            let message = if envelope.errors.is_empty() {
                "request was not successful".to_string()
            } else {
                envelope
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            Err(WorkersAiError::Api { status, message })
        }
    }
}

/// One fragment per non-empty output line.
fn fragments_from_description(description: &str) -> Vec<TextFragment> {
    description
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(TextFragment::new)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum WorkersAiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Workers AI returned status {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Text recognition failed: {0}")]
    WorkersAi(#[from] WorkersAiError),

    #[error("Failed to read crop: {0}")]
    Io(#[from] std::io::Error),
}
