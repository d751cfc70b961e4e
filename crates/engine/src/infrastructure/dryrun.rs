//! Offline provider producing deterministic placeholder artifacts.
//!
//! Used when no credentials are configured so the whole pipeline can run
//! locally. Every output is a pure function of the request.

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::infrastructure::ports::{
    ConsistencyRequest, GeneratedImage, ImageGenerationRequest, OperationHandle, ProviderError,
    ProviderPort, VideoGenerationRequest, VideoOperation,
};

pub const BACKEND: &str = "dryrun";

pub const DRYRUN_IMAGE_WIDTH: u32 = 768;
pub const DRYRUN_IMAGE_HEIGHT: u32 = 512;
pub const DRYRUN_SCORE: u8 = 100;

const OPERATION_PREFIX: &str = "dryrun/operations/";
const VIDEO_PLACEHOLDER: &[u8] = b"VITRINE-DRYRUN-VIDEO";

#[derive(Debug, Clone, Default)]
pub struct DryrunProvider;

impl DryrunProvider {
    pub fn new() -> Self {
        Self
    }
}

/// FNV-1a over the prompt bytes.
fn fingerprint(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn color_for(prompt: &str) -> Rgb<u8> {
    let [r, g, b, ..] = fingerprint(prompt).to_le_bytes();
    Rgb([r, g, b])
}

fn solid_png(color: Rgb<u8>, width: u32, height: u32) -> Result<Vec<u8>, ProviderError> {
    let img = RgbImage::from_pixel(width, height, color);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).map_err(|e| {
        ProviderError::from_backend(
            BACKEND,
            "generate_image",
            None,
            format!("PNG encode failed: {e}"),
        )
    })?;
    Ok(buf.into_inner())
}

#[async_trait]
impl ProviderPort for DryrunProvider {
    async fn enrich_prompt(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        Ok(user_prompt.trim().to_string())
    }

    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        let bytes = solid_png(
            color_for(&request.prompt),
            DRYRUN_IMAGE_WIDTH,
            DRYRUN_IMAGE_HEIGHT,
        )?;
        Ok(GeneratedImage {
            bytes,
            mime_type: "image/png".to_string(),
            cost: 0.0,
        })
    }

    async fn generate_video_from_image(
        &self,
        request: VideoGenerationRequest,
    ) -> Result<OperationHandle, ProviderError> {
        Ok(OperationHandle::new(format!(
            "{OPERATION_PREFIX}{:016x}",
            fingerprint(&request.prompt)
        )))
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<VideoOperation, ProviderError> {
        if !handle.as_str().starts_with(OPERATION_PREFIX) {
            return Err(ProviderError::from_backend(
                BACKEND,
                "poll_operation",
                Some(404),
                format!("Unknown operation: {handle}"),
            ));
        }
        Ok(VideoOperation {
            handle: handle.clone(),
            done: true,
            error: None,
            video_uri: Some(format!("dryrun://{handle}.mp4")),
        })
    }

    async fn download_video(&self, operation: &VideoOperation) -> Result<Vec<u8>, ProviderError> {
        if operation.video_uri.is_none() {
            return Err(ProviderError::extraction(
                BACKEND,
                "download_video",
                "Operation has no video URI",
            ));
        }
        Ok(VIDEO_PLACEHOLDER.to_vec())
    }

    async fn analyze_image_consistency(
        &self,
        request: ConsistencyRequest,
    ) -> Result<String, ProviderError> {
        Ok(format!(
            "Dry-run consistency report for {} reference(s).\nAll materials preserved.\nScore: {DRYRUN_SCORE}/100",
            request.references.len()
        ))
    }
}
