//! Image Provider Abstraction
//!
//! The image model is an opaque `generate(prompt) -> image bytes` collaborator.
//! [`ImageGenerator`] is that seam; [`OpenAIImageClient`] talks to the OpenAI
//! images API or any server exposing the same `/images/generations` endpoint.
//!
//! Every provider failure, including a content-safety refusal, surfaces as
//! [`ApiError::GenerationRejected`]. Nothing here retries: a generation is
//! billable and callers may resubmit.

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Image bytes returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Image generation client trait
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image from `prompt`
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ApiError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    /// OpenAI-compatible local or self-hosted server
    Local,
}

/// Image provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProviderConfig {
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to `OPENAI_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL, e.g. `https://api.openai.com/v1`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Requested image size
    #[serde(default = "default_size")]
    pub size: String,

    /// HTTP request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_provider_type() -> ProviderType {
    ProviderType::OpenAI
}

fn default_model() -> String {
    "dall-e-3".to_string()
}

fn default_size() -> String {
    "1024x1024".to_string()
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for ImageProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            size: default_size(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ImageProviderConfig {
    /// Validate provider configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid endpoint URL: {}", endpoint));
            }
        }
        if self.provider_type == ProviderType::Local && self.endpoint.is_none() {
            return Err("Local provider requires an endpoint".to_string());
        }
        if !is_valid_size(&self.size) {
            return Err(format!("Invalid image size '{}' (expected WIDTHxHEIGHT)", self.size));
        }
        if self.request_timeout_ms == 0 {
            return Err("Request timeout must be positive".to_string());
        }
        Ok(())
    }

    /// Build the configured client
    pub fn to_client(&self) -> Result<Arc<dyn ImageGenerator>, ApiError> {
        self.validate().map_err(ApiError::ConfigError)?;
        let timeout = Duration::from_millis(self.request_timeout_ms);
        let client = match self.provider_type {
            ProviderType::OpenAI => {
                let api_key = self.api_key.clone().ok_or_else(|| {
                    ApiError::ConfigError(
                        "OpenAI provider requires an API key (set provider.api_key or OPENAI_API_KEY)"
                            .to_string(),
                    )
                })?;
                OpenAIImageClient::new(
                    "openai",
                    self.model.clone(),
                    Some(api_key),
                    self.endpoint.clone(),
                    self.size.clone(),
                    timeout,
                )?
            }
            ProviderType::Local => OpenAIImageClient::new(
                "local",
                self.model.clone(),
                self.api_key.clone(),
                self.endpoint.clone(),
                self.size.clone(),
                timeout,
            )?,
        };
        Ok(Arc::new(client))
    }
}

fn is_valid_size(size: &str) -> bool {
    match size.split_once('x') {
        Some((w, h)) => w.parse::<u32>().is_ok() && h.parse::<u32>().is_ok(),
        None => false,
    }
}

// OpenAI images API request/response structures
#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// Extract `error.message` from a provider error body, or the raw body.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Map a non-success provider status to a rejection.
///
/// A 400 is the provider declining the prompt (typically safety filtering);
/// its message is passed through verbatim.
fn rejection_for_status(status: StatusCode, body: &str) -> ApiError {
    let message = provider_error_message(body);
    match status.as_u16() {
        400 => ApiError::GenerationRejected(message),
        401 | 403 => {
            ApiError::GenerationRejected(format!("Provider authentication failed: {}", message))
        }
        404 => ApiError::GenerationRejected(format!("Provider model not found: {}", message)),
        429 => ApiError::GenerationRejected(format!("Provider rate limit exceeded: {}", message)),
        _ => ApiError::GenerationRejected(format!(
            "Provider request failed with status {}: {}",
            status, message
        )),
    }
}

// Helper function to map HTTP transport errors
fn map_http_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::GenerationRejected(format!("Provider request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::GenerationRejected(format!("Provider connection error: {}", error))
    } else {
        ApiError::GenerationRejected(format!("Provider HTTP error: {}", error))
    }
}

fn build_provider_http_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

/// OpenAI-compatible image client
pub struct OpenAIImageClient {
    client: Client,
    provider_name: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
    size: String,
}

impl OpenAIImageClient {
    pub fn new(
        provider_name: &str,
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        size: String,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = build_provider_http_client(timeout)?;
        let base_url = base_url
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            provider_name: provider_name.to_string(),
            model,
            api_key,
            base_url,
            size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn download(&self, url: &str) -> Result<GeneratedImage, ApiError> {
        let response = self.client.get(url).send().await.map_err(map_http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::GenerationRejected(format!(
                "Failed to download generated image (status {})",
                status
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await.map_err(map_http_error)?;
        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAIImageClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ApiError> {
        let request = ImageGenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
        };

        let mut builder = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(map_http_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection_for_status(status, &body));
        }

        let parsed: ImageGenerationResponse = response.json().await.map_err(|e| {
            ApiError::GenerationRejected(format!("Failed to parse provider response: {}", e))
        })?;
        let url = parsed
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| {
                ApiError::GenerationRejected("Provider returned no image URL".to_string())
            })?;

        self.download(&url).await
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Stand-in used when no provider could be configured.
///
/// Read-only operations keep working; generation is rejected with the reason.
pub struct UnconfiguredGenerator {
    reason: String,
}

impl UnconfiguredGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, ApiError> {
        Err(ApiError::GenerationRejected(format!(
            "Image provider not configured: {}",
            self.reason
        )))
    }

    fn provider_name(&self) -> &str {
        "unconfigured"
    }

    fn model_name(&self) -> &str {
        "none"
    }
}
