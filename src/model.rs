//! External vision/text model interaction.
//!
//! The pipeline consumes the model through the narrow [`ModelClient`] trait:
//! one prompt, optionally one page image, a token budget, text back. All
//! prompt engineering lives in [`crate::prompts`] so it can change without
//! touching transport or error classification here.
//!
//! ## Why a bespoke client instead of a provider framework?
//!
//! The retry contract keys on the API's *overload* status (HTTP 529), which
//! must be distinguishable from ordinary failures: overload is transient and
//! retried, everything else degrades the stage immediately. Generic provider
//! abstractions flatten that distinction away, so the crate talks to the
//! messages endpoint directly and keeps the classification in
//! [`ModelError`].

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::retry::Transient;

/// The HTTP status the API uses to signal overload.
const OVERLOADED_STATUS: u16 = 529;

/// Default messages-endpoint base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// A page image attached to a vision request, already base64-encoded.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// MIME type, "image/png" or "image/jpeg".
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// One request to the external model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<ImageAttachment>,
    pub max_tokens: u32,
}

impl ModelRequest {
    /// Text-only request.
    pub fn text(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            max_tokens,
        }
    }

    /// Vision request carrying one page image.
    pub fn with_image(
        prompt: impl Into<String>,
        image: ImageAttachment,
        max_tokens: u32,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
            max_tokens,
        }
    }
}

/// Errors from a model call, classified for the retry policy.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The API reported overload (HTTP 529) — transient, retry with backoff.
    #[error("Model API overloaded (status {OVERLOADED_STATUS})")]
    Overloaded,

    /// The API returned a non-success, non-overload status. Not retryable.
    #[error("Model API error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never completed (connection, TLS, timeout). Transient.
    #[error("Model transport error: {0}")]
    Transport(String),

    /// The response body did not contain the expected text content.
    #[error("Malformed model response: {0}")]
    Malformed(String),

    /// No API key available at construction time.
    #[error("Missing API key: set ANTHROPIC_API_KEY or pass a key explicitly")]
    MissingApiKey,
}

impl Transient for ModelError {
    fn is_transient(&self) -> bool {
        matches!(self, ModelError::Overloaded | ModelError::Transport(_))
    }
}

/// The external vision/text model, as the pipeline sees it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Issue one completion request and return the generated text.
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// [`ModelClient`] over the Anthropic messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    /// Build a client with an explicit API key.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Build a client from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env(model: impl Into<String>, timeout_secs: u64) -> Result<Self, ModelError> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| ModelError::MissingApiKey)?;
        Self::new(key, model, timeout_secs)
    }

    /// Override the endpoint base URL (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut content = Vec::new();
        if let Some(ref image) = request.image {
            content.push(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.data,
                }
            }));
        }
        content.push(json!({ "type": "text", "text": request.prompt }));

        json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if status == OVERLOADED_STATUS {
            return Err(ModelError::Overloaded);
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, message });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let text = body
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::Malformed("no content[0].text in response".into()))?;

        debug!("Model returned {} bytes of text", text.len());
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_and_transport_are_transient() {
        assert!(ModelError::Overloaded.is_transient());
        assert!(ModelError::Transport("reset".into()).is_transient());
        assert!(!ModelError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!ModelError::Malformed("oops".into()).is_transient());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            AnthropicClient::new("  ", "claude-3-5-haiku-20241022", 60),
            Err(ModelError::MissingApiKey)
        ));
    }

    #[test]
    fn vision_request_body_orders_image_before_text() {
        let client = AnthropicClient::new("key", "m", 60).unwrap();
        let request = ModelRequest::with_image(
            "extract",
            ImageAttachment {
                media_type: "image/png".into(),
                data: "aGk=".into(),
            },
            4000,
        );
        let body = client.request_body(&request);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(body["max_tokens"], 4000);
    }

    #[test]
    fn text_request_body_has_single_text_block() {
        let client = AnthropicClient::new("key", "m", 60).unwrap();
        let body = client.request_body(&ModelRequest::text("hello", 100));
        let content = &body["messages"][0]["content"];
        assert_eq!(content.as_array().unwrap().len(), 1);
        assert_eq!(content[0]["text"], "hello");
    }
}
