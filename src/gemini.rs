//! Gemini API client: the model invocation seam.
//!
//! [`ModelClient`] is what the pipeline depends on. [`GeminiClient`] is the
//! production implementation talking to the Generative Language REST API.

use crate::config::{ModelConfig, UploadMode};
use crate::prompts::Prompt;
use crate::staging::StagedFile;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const SYSTEM_INSTRUCTION: &str = r#"You are a highly accurate and adaptable data extraction expert specializing in arabic invoice images.
Given an invoice image, meticulously extract and return all relevant data in JSON format.
Your response must be a valid JSON object with all the extracted information.
Do not include any explanatory text or markdown - only output valid JSON.
Ensure the output is comprehensive, error-free, and properly formatted JSON, regardless of the image's layout or format.
Adapt to different styles and structures to provide the most accurate and complete data extraction.
If the image quality is poor, apply image enhancement techniques to improve clarity."#;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Failed to read staged document: {0}")]
    ReadStaged(#[source] std::io::Error),

    #[error("Request to Gemini failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Gemini file upload failed: {0}")]
    Upload(String),

    #[error("Gemini returned no text: {0}")]
    EmptyResponse(String),
}

/// Submit a staged document plus prompt, receive the model's raw text.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, staged: &StagedFile, prompt: &Prompt)
        -> Result<String, InvocationError>;
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    upload_mode: UploadMode,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, InvocationError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            upload_mode: config.upload_mode,
        })
    }

    /// Reference the document in the request, uploading it first if needed.
    async fn document_part(&self, staged: &StagedFile) -> Result<Part, InvocationError> {
        let data = tokio::fs::read(staged.path())
            .await
            .map_err(InvocationError::ReadStaged)?;
        let mime_type = staged.content_type().mime().to_string();

        match self.upload_mode {
            UploadMode::Inline => Ok(Part::InlineData {
                inline_data: Blob {
                    mime_type,
                    data: BASE64.encode(&data),
                },
            }),
            UploadMode::Files => {
                let file = self.upload_file(&staged.file_name(), &mime_type, data).await?;
                Ok(Part::FileData {
                    file_data: FileData {
                        mime_type: file.mime_type.unwrap_or(mime_type),
                        file_uri: file.uri,
                    },
                })
            }
        }
    }

    /// Upload bytes through the Files API resumable protocol.
    async fn upload_file(
        &self,
        display_name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadedFile, InvocationError> {
        info!(
            "Uploading {} ({} bytes, {}) to Gemini Files API",
            display_name,
            data.len(),
            mime_type
        );

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| InvocationError::Upload("missing x-goog-upload-url header".into()))?;

        let finish = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;
        let finish = check_status(finish).await?;

        let uploaded: FileUploadResponse = finish.json().await?;
        info!("Uploaded to Gemini as {}", uploaded.file.name);
        Ok(uploaded.file)
    }

    fn build_request(&self, document: Part, prompt: &Prompt) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    document,
                    Part::Text {
                        text: "\n\n".to_string(),
                    },
                    Part::Text {
                        text: prompt.as_str().to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait::async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        staged: &StagedFile,
        prompt: &Prompt,
    ) -> Result<String, InvocationError> {
        let document = self.document_part(staged).await?;
        let request = self.build_request(document, prompt);

        debug!(
            "Sending generateContent: model={} prompt={}",
            self.model, prompt.name
        );

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let response: GenerateContentResponse = response.json().await?;

        if let Some(usage) = &response.usage_metadata {
            info!(
                "Gemini response: {} tokens (prompt: {}, completion: {})",
                usage.total_token_count, usage.prompt_token_count, usage.candidates_token_count
            );
        }

        response.into_text()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InvocationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InvocationError::Api { status, body })
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: Blob,
    },
    #[serde(rename_all = "camelCase")]
    FileData {
        file_data: FileData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Result<String, InvocationError> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);

        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = block_reason
                .map(|r| format!("prompt blocked ({})", r))
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(InvocationError::EmptyResponse(reason));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            let reason = candidate
                .finish_reason
                .map(|r| format!("finish reason {}", r))
                .unwrap_or_else(|| "empty candidate".to_string());
            return Err(InvocationError::EmptyResponse(reason));
        }

        Ok(text)
    }
}
