//! Generative backend port.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;

/// Backends accept at most this many reference images per request.
pub const MAX_REFERENCE_IMAGES: usize = 14;

// =============================================================================
// Image Types
// =============================================================================

/// An image sent to the backend alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Short caption placed before the image, e.g. the material name
    pub label: Option<String>,
    /// Canvas artwork the backend must reproduce exactly
    pub verbatim: bool,
}

impl ReferenceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            label: None,
            verbatim: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn verbatim(mut self) -> Self {
        self.verbatim = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    /// Previous render to refine, sent before any reference
    pub source_image: Option<ReferenceImage>,
    pub references: Vec<ReferenceImage>,
}

impl ImageGenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            source_image: None,
            references: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub cost: f64,
}

// =============================================================================
// Video Types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct VideoGenerationRequest {
    pub prompt: String,
    /// First frame of the video
    pub image: ReferenceImage,
    pub duration_seconds: u32,
    pub aspect_ratio: String,
}

/// Opaque backend token for a long-running operation, passed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a long-running video operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOperation {
    pub handle: OperationHandle,
    pub done: bool,
    /// Backend error reported for a finished operation
    pub error: Option<String>,
    /// Location of the generated video once done
    pub video_uri: Option<String>,
}

impl VideoOperation {
    pub fn pending(handle: OperationHandle) -> Self {
        Self {
            handle,
            done: false,
            error: None,
            video_uri: None,
        }
    }
}

// =============================================================================
// Analysis Types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyRequest {
    pub instructions: String,
    pub generated: ReferenceImage,
    pub references: Vec<ReferenceImage>,
}

// =============================================================================
// Provider Port
// =============================================================================

/// Capability set of a generative backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderPort: Send + Sync {
    async fn enrich_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError>;

    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ProviderError>;

    async fn generate_video_from_image(
        &self,
        request: VideoGenerationRequest,
    ) -> Result<OperationHandle, ProviderError>;

    async fn poll_operation(&self, handle: &OperationHandle)
        -> Result<VideoOperation, ProviderError>;

    async fn download_video(&self, operation: &VideoOperation) -> Result<Vec<u8>, ProviderError>;

    /// Free-text report comparing a generated image with its references.
    async fn analyze_image_consistency(
        &self,
        request: ConsistencyRequest,
    ) -> Result<String, ProviderError>;
}
