//! Motif compositing onto generated backgrounds.
//!
//! Motifs are placed in slot order: each is aspect-fitted inside its pixel
//! slot, centered, and alpha-blended over the background.

mod motif;

pub use motif::{white_border_fraction, MotifClassifier, TEMPLATE_WHITE_FRACTION};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use vitrine_domain::{fit_within, NormalizedSlot, DEFAULT_LAYOUT};

use crate::infrastructure::ports::FileStore;
use crate::use_cases::error::GenerationError;

pub const COMPOSITE_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeOutput {
    #[serde(skip)]
    pub image: Vec<u8>,
    pub mime_type: String,
    pub placed: usize,
}

pub struct Compositor {
    files: Arc<dyn FileStore>,
}

impl Compositor {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }

    /// Composite motifs onto `background`.
    ///
    /// `layout` defaults to the five-slot layout. Motifs beyond the slot
    /// count are ignored. A motif that cannot be loaded is skipped and its
    /// slot stays empty. `edge_blend` is accepted but currently has no
    /// visual effect.
    pub async fn composite(
        &self,
        background: &[u8],
        motif_paths: &[String],
        layout: Option<&[NormalizedSlot]>,
        edge_blend: bool,
    ) -> Result<CompositeOutput, GenerationError> {
        if motif_paths.is_empty() {
            return Ok(CompositeOutput {
                image: background.to_vec(),
                mime_type: mime_type_of(background),
                placed: 0,
            });
        }

        let slots: Vec<NormalizedSlot> = match layout {
            Some(slots) => {
                for slot in slots {
                    slot.validate()?;
                }
                slots.to_vec()
            }
            None => DEFAULT_LAYOUT.to_vec(),
        };

        let mut motifs = Vec::with_capacity(slots.len().min(motif_paths.len()));
        for path in motif_paths.iter().take(slots.len()) {
            match self.files.read(path).await {
                Ok(bytes) => motifs.push(Some(bytes)),
                Err(e) => {
                    tracing::warn!(motif = %path, error = %e, "Skipping unreadable motif");
                    motifs.push(None);
                }
            }
        }

        if edge_blend {
            tracing::debug!("Edge blending requested; motifs are composited with hard edges");
        }

        let background = background.to_vec();
        let (image, placed) =
            tokio::task::spawn_blocking(move || composite_images(&background, &motifs, &slots))
                .await
                .map_err(|e| GenerationError::image(format!("compositing task failed: {e}")))??;

        tracing::info!(placed, requested = motif_paths.len(), "Composited motifs");
        Ok(CompositeOutput {
            image,
            mime_type: COMPOSITE_MIME_TYPE.to_string(),
            placed,
        })
    }
}

/// Place decoded motifs into `slots` and encode the result as PNG.
///
/// `motifs[i]` goes into `slots[i]`; `None` entries and undecodable bytes
/// leave their slot empty. Returns the encoded image and the placed count.
pub fn composite_images(
    background: &[u8],
    motifs: &[Option<Vec<u8>>],
    slots: &[NormalizedSlot],
) -> Result<(Vec<u8>, usize), GenerationError> {
    let mut canvas = image::load_from_memory(background)
        .map_err(|e| GenerationError::image(format!("background could not be decoded: {e}")))?
        .to_rgba8();
    let (bg_width, bg_height) = canvas.dimensions();

    let mut placed = 0;
    for (index, (motif, slot)) in motifs.iter().zip(slots).enumerate() {
        let Some(bytes) = motif else { continue };
        let pixel_slot = slot.to_pixels(bg_width, bg_height);
        if pixel_slot.is_empty() {
            tracing::warn!(slot = index, "Skipping motif for empty slot");
            continue;
        }

        let decoded = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(slot = index, error = %e, "Skipping undecodable motif");
                continue;
            }
        };

        let (width, height) = fit_within(
            decoded.width(),
            decoded.height(),
            pixel_slot.width,
            pixel_slot.height,
        );
        if width == 0 || height == 0 {
            tracing::warn!(slot = index, "Skipping motif with zero fitted size");
            continue;
        }

        let resized = imageops::resize(&decoded.to_rgba8(), width, height, FilterType::Lanczos3);
        let (x, y) = pixel_slot.centered_origin(width, height);
        imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));
        placed += 1;
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut out, ImageFormat::Png)?;
    Ok((out.into_inner(), placed))
}

fn mime_type_of(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        encode(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    pub fn encode(img: RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }
}
