//! HTTP client for the Google Generative Language REST APIs.
//!
//! Chat and document answers use the SSE `streamGenerateContent` endpoint;
//! image batches use the synchronous `predict` endpoint. Every request is a
//! single attempt: failures surface immediately as [`ProviderError`] and the
//! caller decides what to record.

use std::pin::Pin;

use anyhow::{Context, Result};
use futures_util::Stream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{GENERATED_IMAGE_MIME, ImageOptions, Message, Part, Role};

/// Boxed stream of response text fragments, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_LIMIT: usize = 500;

// === Types ===

/// One image returned from a batch generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64-encoded image bytes, as returned by the provider.
    pub data: String,
}

/// Provider seam: text streaming for chat and document analysis, plus batch
/// image generation.
#[allow(async_fn_in_trait)]
pub trait GenerationClient {
    /// Stream a chat response given the prior conversation and the new user
    /// message.
    async fn stream_chat(
        &self,
        history: &[Message],
        new_message: &Message,
    ) -> Result<FragmentStream, ProviderError>;

    /// Generate a batch of images from a text prompt.
    async fn generate_images(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<Vec<GeneratedImage>, ProviderError>;

    /// Stream an answer to a question about a loaded document.
    async fn stream_document_answer(
        &self,
        document: &str,
        question: &str,
    ) -> Result<FragmentStream, ProviderError>;
}

/// Client for the Gemini generateContent / Imagen predict APIs.
#[derive(Debug, Clone)]
#[must_use]
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    chat_model: String,
    image_model: String,
}

// === GeminiClient ===

impl GeminiClient {
    /// Create a Gemini client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_value =
            HeaderValue::from_str(&api_key).context("API key contains invalid header bytes")?;
        key_value.set_sensitive(true);
        headers.insert(GOOGLE_API_KEY_HEADER, key_value);

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        tracing::info!(base_url = %config.base_url(), "Gemini base URL");

        Ok(Self {
            http_client,
            base_url: config.base_url(),
            chat_model: config.chat_model(),
            image_model: config.image_model(),
        })
    }

    async fn open_sse_stream(&self, body: Value) -> Result<FragmentStream, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.chat_model
        );

        let response = self.http_client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: truncate(&message, ERROR_BODY_LIMIT),
            });
        }

        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let mut line_buf = String::new();
            let mut byte_buf = Vec::new();
            let mut byte_stream = std::pin::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ProviderError::Stream(e.to_string()));
                        break;
                    }
                };

                byte_buf.extend_from_slice(&chunk);

                // Process complete SSE lines from the buffer
                while let Some(line) = next_line(&mut byte_buf) {
                    if line.is_empty() {
                        // Empty line = event boundary, process accumulated data
                        if !line_buf.is_empty() {
                            let data = std::mem::take(&mut line_buf);
                            if let Ok(event) = serde_json::from_str::<Value>(&data) {
                                if let Some(text) = chunk_text(&event) {
                                    if !text.is_empty() {
                                        yield Ok(text);
                                    }
                                }
                            }
                        }
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        line_buf.push_str(data);
                    }
                    // Ignore other SSE fields (event:, id:, retry:)
                }
            }
        };

        Ok(Pin::from(Box::new(stream)
            as Box<
                dyn Stream<Item = Result<String, ProviderError>> + Send,
            >))
    }
}

// === Trait Implementations ===

impl GenerationClient for GeminiClient {
    async fn stream_chat(
        &self,
        history: &[Message],
        new_message: &Message,
    ) -> Result<FragmentStream, ProviderError> {
        let body = json!({
            "contents": build_contents(history, new_message),
        });
        self.open_sse_stream(body).await
    }

    async fn generate_images(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<Vec<GeneratedImage>, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:predict",
            self.base_url.trim_end_matches('/'),
            self.image_model
        );
        let body = build_predict_body(prompt, options);

        let response = self.http_client.post(&url).json(&body).send().await?;
        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: truncate(&response_text, ERROR_BODY_LIMIT),
            });
        }

        let value: Value = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_predictions(&value)
    }

    async fn stream_document_answer(
        &self,
        document: &str,
        question: &str,
    ) -> Result<FragmentStream, ProviderError> {
        let prompt = document_prompt(document, question);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        });
        self.open_sse_stream(body).await
    }
}

/// Pop the next complete line from the buffer, if one is present. Splits on
/// the raw newline byte so undecodable bytes in the buffer cannot skew the
/// offset, and leaves a trailing partial line (including a split multibyte
/// sequence) in place for the next chunk.
fn next_line(byte_buf: &mut Vec<u8>) -> Option<String> {
    let newline_pos = byte_buf.iter().position(|&b| b == b'\n')?;
    let line = String::from_utf8_lossy(&byte_buf[..newline_pos])
        .trim_end_matches('\r')
        .to_string();
    byte_buf.drain(..=newline_pos);
    Some(line)
}

// === Request Builders ===

/// Build the `contents` array for a generateContent request from the prior
/// conversation plus the new user message.
fn build_contents(history: &[Message], new_message: &Message) -> Vec<Value> {
    history
        .iter()
        .chain(std::iter::once(new_message))
        .map(message_to_content)
        .collect()
}

fn message_to_content(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "model",
    };
    let parts: Vec<Value> = message
        .parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => json!({ "text": text }),
            Part::Attachment { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
        })
        .collect();
    json!({ "role": role, "parts": parts })
}

/// Build the prompt for a document question, embedding the full document
/// text between delimiters.
fn document_prompt(document: &str, question: &str) -> String {
    format!("Document Content:\n---\n{document}\n---\n\nUser's question:\n{question}")
}

fn build_predict_body(prompt: &str, options: &ImageOptions) -> Value {
    json!({
        "instances": [{ "prompt": prompt }],
        "parameters": {
            "sampleCount": options.count,
            "aspectRatio": options.aspect_ratio.as_str(),
            "outputMimeType": GENERATED_IMAGE_MIME,
        },
    })
}

// === Response Parsers ===

/// Extract the text of one streamGenerateContent SSE event.
fn chunk_text(event: &Value) -> Option<String> {
    let parts = event
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

fn parse_predictions(payload: &Value) -> Result<Vec<GeneratedImage>, ProviderError> {
    let predictions = payload
        .get("predictions")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Parse("response missing predictions".to_string()))?;

    let images: Vec<GeneratedImage> = predictions
        .iter()
        .filter_map(|prediction| {
            let data = prediction
                .get("bytesBase64Encoded")
                .and_then(Value::as_str)?;
            let mime_type = prediction
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or(GENERATED_IMAGE_MIME);
            Some(GeneratedImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            })
        })
        .collect();

    if images.is_empty() {
        return Err(ProviderError::Parse(
            "response contained no images".to_string(),
        ));
    }
    Ok(images)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
