//! Gemini REST client (generateContent + predictLongRunning)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::app_settings::ProviderSettings;
use crate::infrastructure::ports::{
    ConsistencyRequest, GeneratedImage, ImageGenerationRequest, OperationHandle, ProviderError,
    ProviderPort, ReferenceImage, VideoGenerationRequest, VideoOperation, MAX_REFERENCE_IMAGES,
};

pub const BACKEND: &str = "gemini";

/// Price of one generated image.
pub const IMAGE_COST: f64 = 0.039;

const SAFETY_BLOCK_MESSAGE: &str = "Generation blocked by safety filter";
const PROTECTED_CONTENT_MESSAGE: &str =
    "Generation refused: possibly protected content (trademark or likeness)";
const RECITATION_MESSAGE: &str = "Generation refused: copyrighted material detected";
const GENERIC_BLOCK_MESSAGE: &str = "Generation blocked by the provider";

/// Client for the Gemini generative language API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    text_model: String,
    image_model: String,
    video_model: String,
}

impl GeminiClient {
    /// Build a client from the current provider settings.
    pub fn new(client: Client, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::from_backend(
                    BACKEND,
                    "configure",
                    Some(401),
                    "GEMINI_API_KEY is not configured",
                )
            })?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            text_model: settings.text_model.clone(),
            image_model: settings.image_model.clone(),
            video_model: settings.video_model.clone(),
        })
    }

    /// Shared HTTP client with a timeout suited to image generation.
    pub fn http_client() -> Client {
        Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_backend(
                BACKEND,
                operation,
                Some(status.as_u16()),
                api_error_message(&body, status.canonical_reason()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| {
                ProviderError::extraction(BACKEND, operation, format!("Invalid response body: {e}"))
            })
    }

    async fn generate_content(
        &self,
        operation: &'static str,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let request = self
            .client
            .post(self.model_url(model, "generateContent"))
            .json(body);
        self.send_json(operation, request).await
    }
}

#[async_trait]
impl ProviderPort for GeminiClient {
    async fn enrich_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(user_prompt)])],
            system_instruction: Some(Content::system(system_prompt)),
            generation_config: None,
            safety_settings: None,
        };
        let response = self
            .generate_content("enrich_prompt", &self.text_model, &body)
            .await?;
        extract_text("enrich_prompt", response)
    }

    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content::user(build_image_parts(&request))],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
            safety_settings: Some(default_safety_settings()),
        };
        let response = self
            .generate_content("generate_image", &self.image_model, &body)
            .await?;
        extract_image(response)
    }

    async fn generate_video_from_image(
        &self,
        request: VideoGenerationRequest,
    ) -> Result<OperationHandle, ProviderError> {
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: request.prompt,
                image: VideoImage {
                    bytes_base64_encoded: BASE64.encode(&request.image.bytes),
                    mime_type: request.image.mime_type,
                },
            }],
            parameters: VideoParameters {
                aspect_ratio: request.aspect_ratio,
                duration_seconds: request.duration_seconds,
            },
        };
        let http = self
            .client
            .post(self.model_url(&self.video_model, "predictLongRunning"))
            .json(&body);
        let operation: OperationResponse = self.send_json("generate_video", http).await?;
        tracing::info!(operation = %operation.name, "Video operation submitted");
        Ok(OperationHandle::new(operation.name))
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<VideoOperation, ProviderError> {
        let url = format!("{}/{}", self.api_base, handle.as_str().trim_start_matches('/'));
        let operation: OperationResponse =
            self.send_json("poll_operation", self.client.get(url)).await?;
        Ok(convert_operation(handle, operation))
    }

    async fn download_video(&self, operation: &VideoOperation) -> Result<Vec<u8>, ProviderError> {
        let uri = operation.video_uri.as_deref().ok_or_else(|| {
            ProviderError::extraction(BACKEND, "download_video", "Operation has no video URI")
        })?;

        let response = self
            .client
            .get(uri)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error("download_video", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_backend(
                BACKEND,
                "download_video",
                Some(status.as_u16()),
                api_error_message(&body, status.canonical_reason()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error("download_video", &e))?;
        Ok(bytes.to_vec())
    }

    async fn analyze_image_consistency(
        &self,
        request: ConsistencyRequest,
    ) -> Result<String, ProviderError> {
        let mut parts = vec![Part::text("Generated image:"), Part::image(&request.generated)];
        for (idx, reference) in request.references.iter().take(MAX_REFERENCE_IMAGES).enumerate() {
            parts.push(Part::text(reference_caption(idx, reference)));
            parts.push(Part::image(reference));
        }
        parts.push(Part::text(request.instructions));

        let body = GenerateContentRequest {
            contents: vec![Content::user(parts)],
            system_instruction: None,
            generation_config: None,
            safety_settings: None,
        };
        let response = self
            .generate_content("analyze_image_consistency", &self.text_model, &body)
            .await?;
        extract_text("analyze_image_consistency", response)
    }
}

// =============================================================================
// Request building and response extraction
// =============================================================================

fn transport_error(operation: &'static str, error: &reqwest::Error) -> ProviderError {
    let message = if error.is_timeout() {
        format!("Request timeout: {error}")
    } else {
        error.to_string()
    };
    ProviderError::from_backend(BACKEND, operation, error.status().map(|s| s.as_u16()), message)
}

/// `"<status words>: <message>"` from a Gemini error body, falling back to
/// the raw body or the HTTP reason phrase.
fn api_error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        let status = envelope
            .error
            .status
            .map(|s| s.replace('_', " ").to_lowercase())
            .unwrap_or_default();
        return if status.is_empty() {
            envelope.error.message
        } else {
            format!("{status}: {}", envelope.error.message)
        };
    }
    if body.trim().is_empty() {
        reason.unwrap_or("Unknown error").to_string()
    } else {
        body.trim().to_string()
    }
}

fn reference_caption(idx: usize, reference: &ReferenceImage) -> String {
    let label = reference
        .label
        .as_deref()
        .map(|l| format!(" ({l})"))
        .unwrap_or_default();
    if reference.verbatim {
        format!(
            "Reference {}{label}: canvas motif. Reproduce this artwork exactly as shown, \
             without altering, cropping or reinterpreting it.",
            idx + 1
        )
    } else {
        format!("Reference {}{label}:", idx + 1)
    }
}

/// Source image first, then at most [`MAX_REFERENCE_IMAGES`] references,
/// then the instruction text.
fn build_image_parts(request: &ImageGenerationRequest) -> Vec<Part> {
    let mut parts = Vec::new();
    if let Some(source) = &request.source_image {
        parts.push(Part::text("Image to refine:"));
        parts.push(Part::image(source));
    }
    for (idx, reference) in request.references.iter().take(MAX_REFERENCE_IMAGES).enumerate() {
        parts.push(Part::text(reference_caption(idx, reference)));
        parts.push(Part::image(reference));
    }
    parts.push(Part::text(request.prompt.clone()));
    parts
}

fn default_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category: category.to_string(),
        threshold: "BLOCK_ONLY_HIGH".to_string(),
    })
    .collect()
}

/// User-facing message for a prompt block reason or blocking finish reason.
fn block_message(reason: &str) -> &'static str {
    match reason.trim().to_ascii_uppercase().as_str() {
        "SAFETY" | "IMAGE_SAFETY" => SAFETY_BLOCK_MESSAGE,
        "PROHIBITED_CONTENT" | "IMAGE_PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => {
            PROTECTED_CONTENT_MESSAGE
        }
        "RECITATION" | "IMAGE_RECITATION" => RECITATION_MESSAGE,
        _ => GENERIC_BLOCK_MESSAGE,
    }
}

fn is_blocking_finish(reason: &str) -> bool {
    !matches!(
        reason.trim().to_ascii_uppercase().as_str(),
        "STOP" | "MAX_TOKENS" | "FINISH_REASON_UNSPECIFIED" | ""
    )
}

/// First candidate of a response, or the mapped block error.
fn first_candidate(
    operation: &'static str,
    response: GenerateContentResponse,
) -> Result<Candidate, ProviderError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::safety_blocked(
            BACKEND,
            operation,
            block_message(&reason),
        ));
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        ProviderError::safety_blocked(BACKEND, operation, GENERIC_BLOCK_MESSAGE)
    })?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if is_blocking_finish(reason) {
            return Err(ProviderError::safety_blocked(
                BACKEND,
                operation,
                block_message(reason),
            ));
        }
    }
    Ok(candidate)
}

fn extract_text(
    operation: &'static str,
    response: GenerateContentResponse,
) -> Result<String, ProviderError> {
    let candidate = first_candidate(operation, response)?;
    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ProviderError::extraction(BACKEND, operation, "Response contained no text"));
    }
    Ok(text.trim().to_string())
}

fn extract_image(response: GenerateContentResponse) -> Result<GeneratedImage, ProviderError> {
    let candidate = first_candidate("generate_image", response)?;
    let inline = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.inline_data)
        .find(|d| !d.data.is_empty())
        .ok_or_else(|| {
            ProviderError::extraction(BACKEND, "generate_image", "Response contained no image data")
        })?;

    let bytes = BASE64.decode(inline.data.as_bytes()).map_err(|e| {
        ProviderError::extraction(
            BACKEND,
            "generate_image",
            format!("Image base64 decode failed: {e}"),
        )
    })?;

    Ok(GeneratedImage {
        bytes,
        mime_type: inline.mime_type,
        cost: IMAGE_COST,
    })
}

fn convert_operation(handle: &OperationHandle, operation: OperationResponse) -> VideoOperation {
    let mut result = VideoOperation::pending(handle.clone());
    result.done = operation.done;
    if let Some(error) = operation.error {
        result.error = Some(error.message);
    }

    if let Some(video) = operation.response.and_then(|r| r.generate_video_response) {
        result.video_uri = video
            .generated_samples
            .into_iter()
            .filter_map(|s| s.video.and_then(|v| v.uri))
            .next();
        if result.done && result.video_uri.is_none() && result.error.is_none() {
            result.error = Some(if video.rai_media_filtered_reasons.is_empty() {
                "Video operation finished without a video".to_string()
            } else {
                video.rai_media_filtered_reasons.join("; ")
            });
        }
    }
    result
}

// =============================================================================
// Gemini API types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_settings: Option<Vec<SafetySetting>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn image(image: &ReferenceImage) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: BASE64.encode(&image.bytes),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
struct VideoInstance {
    prompt: String,
    image: VideoImage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
    duration_seconds: u32,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResult>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}
