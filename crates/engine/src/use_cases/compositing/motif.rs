//! Motif display-mode classification from the whiteness of the border.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use vitrine_domain::MotifDisplayMode;

use crate::infrastructure::ports::FileStore;

/// Border white fraction at or above which a motif counts as a template.
pub const TEMPLATE_WHITE_FRACTION: f64 = 0.55;

const MAX_ANALYSIS_SIDE: u32 = 400;
const WHITE_THRESHOLD: u8 = 230;
const BORDER_RATIO: f64 = 0.10;

pub struct MotifClassifier {
    files: Arc<dyn FileStore>,
}

impl MotifClassifier {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }

    /// Classify one motif. Unreadable or undecodable motifs are treated as
    /// stretched.
    pub async fn classify(&self, path: &str) -> MotifDisplayMode {
        let bytes = match self.files.read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(motif = %path, error = %e, "Motif unreadable, assuming stretched");
                return MotifDisplayMode::Stretched;
            }
        };

        let analysis = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|img| white_border_fraction(&img))
        })
        .await;

        match analysis {
            Ok(Ok(fraction)) => {
                let mode = if fraction >= TEMPLATE_WHITE_FRACTION {
                    MotifDisplayMode::Template
                } else {
                    MotifDisplayMode::Stretched
                };
                tracing::debug!(motif = %path, fraction, mode = %mode, "Classified motif");
                mode
            }
            Ok(Err(e)) => {
                tracing::warn!(motif = %path, error = %e, "Motif undecodable, assuming stretched");
                MotifDisplayMode::Stretched
            }
            Err(e) => {
                tracing::warn!(motif = %path, error = %e, "Motif analysis task failed");
                MotifDisplayMode::Stretched
            }
        }
    }

    /// Template as soon as any motif is a template.
    pub async fn classify_any(&self, paths: &[String]) -> MotifDisplayMode {
        for path in paths {
            if self.classify(path).await == MotifDisplayMode::Template {
                return MotifDisplayMode::Template;
            }
        }
        MotifDisplayMode::Stretched
    }
}

/// Fraction of white pixels in the outer 10% band on each side.
///
/// The image is first downscaled so its longest side is at most 400 px.
/// Corners belong to two bands and are counted twice.
pub fn white_border_fraction(img: &DynamicImage) -> f64 {
    let img = if img.width().max(img.height()) > MAX_ANALYSIS_SIDE {
        img.resize(MAX_ANALYSIS_SIDE, MAX_ANALYSIS_SIDE, FilterType::Triangle)
    } else {
        img.clone()
    };

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let is_white: Box<dyn Fn(u32, u32) -> bool> = if img.color().channel_count() <= 2 {
        let luma = img.to_luma8();
        Box::new(move |x, y| luma.get_pixel(x, y).0[0] >= WHITE_THRESHOLD)
    } else {
        let rgb = img.to_rgb8();
        Box::new(move |x, y| rgb.get_pixel(x, y).0.iter().all(|&c| c >= WHITE_THRESHOLD))
    };

    let band_w = band(width);
    let band_h = band(height);

    let mut total: u64 = 0;
    let mut white: u64 = 0;
    let mut sample = |x: u32, y: u32| {
        total += 1;
        if is_white(x, y) {
            white += 1;
        }
    };

    for y in (0..band_h).chain(height - band_h..height) {
        for x in 0..width {
            sample(x, y);
        }
    }
    for x in (0..band_w).chain(width - band_w..width) {
        for y in 0..height {
            sample(x, y);
        }
    }

    white as f64 / total as f64
}

fn band(extent: u32) -> u32 {
    ((f64::from(extent) * BORDER_RATIO).floor() as u32).clamp(1, extent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryStore;
    use crate::use_cases::compositing::fixtures::encode;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const DARK: Rgba<u8> = Rgba([30, 30, 30, 255]);

    /// White canvas whose right 10 columns are dark: 70% white border.
    fn mostly_white_border() -> RgbaImage {
        RgbaImage::from_fn(100, 100, |x, _| if x >= 90 { DARK } else { WHITE })
    }

    /// Dark canvas whose top 10 rows are white: 30% white border.
    fn mostly_dark_border() -> RgbaImage {
        RgbaImage::from_fn(100, 100, |_, y| if y < 10 { WHITE } else { DARK })
    }

    async fn classifier_with(images: &[(&str, Vec<u8>)]) -> MotifClassifier {
        let store = Arc::new(InMemoryStore::new());
        for (path, bytes) in images {
            store.write(path, bytes).await.unwrap();
        }
        MotifClassifier::new(store)
    }

    #[test]
    fn fractions_count_corners_twice() {
        let white = white_border_fraction(&DynamicImage::ImageRgba8(mostly_white_border()));
        let dark = white_border_fraction(&DynamicImage::ImageRgba8(mostly_dark_border()));
        assert!((white - 0.70).abs() < 1e-9, "{white}");
        assert!((dark - 0.30).abs() < 1e-9, "{dark}");
    }

    #[test]
    fn grayscale_uses_single_channel() {
        let img = GrayImage::from_pixel(50, 50, Luma([240]));
        assert_eq!(white_border_fraction(&DynamicImage::ImageLuma8(img)), 1.0);
    }

    #[test]
    fn large_images_are_downscaled_first() {
        let img = RgbaImage::from_pixel(1200, 800, WHITE);
        assert_eq!(white_border_fraction(&DynamicImage::ImageRgba8(img)), 1.0);
    }

    #[tokio::test]
    async fn classifies_by_threshold_and_is_stable() {
        let classifier = classifier_with(&[
            ("m/template.png", encode(mostly_white_border())),
            ("m/stretched.png", encode(mostly_dark_border())),
        ])
        .await;

        assert_eq!(classifier.classify("m/template.png").await, MotifDisplayMode::Template);
        assert_eq!(classifier.classify("m/template.png").await, MotifDisplayMode::Template);
        assert_eq!(classifier.classify("m/stretched.png").await, MotifDisplayMode::Stretched);
    }

    #[tokio::test]
    async fn unreadable_or_corrupt_motifs_are_stretched() {
        let classifier = classifier_with(&[("m/corrupt.png", b"garbage".to_vec())]).await;

        assert_eq!(classifier.classify("m/missing.png").await, MotifDisplayMode::Stretched);
        assert_eq!(classifier.classify("m/corrupt.png").await, MotifDisplayMode::Stretched);
    }

    #[tokio::test]
    async fn any_template_wins() {
        let classifier = classifier_with(&[
            ("m/template.png", encode(mostly_white_border())),
            ("m/stretched.png", encode(mostly_dark_border())),
        ])
        .await;

        let mixed = vec![
            "m/missing.png".to_string(),
            "m/stretched.png".to_string(),
            "m/template.png".to_string(),
        ];
        assert_eq!(classifier.classify_any(&mixed).await, MotifDisplayMode::Template);
        assert_eq!(
            classifier.classify_any(&["m/missing.png".to_string()]).await,
            MotifDisplayMode::Stretched
        );
        assert_eq!(classifier.classify_any(&[]).await, MotifDisplayMode::Stretched);
    }
}
