//! Compositing layout math: normalized slots, pixel slots and aspect fitting.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A rectangle expressed as fractions of the background size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSlot {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Default layout: two large slots on top, three smaller ones below.
pub const DEFAULT_LAYOUT: [NormalizedSlot; 5] = [
    NormalizedSlot {
        x: 0.05,
        y: 0.08,
        width: 0.40,
        height: 0.50,
    },
    NormalizedSlot {
        x: 0.55,
        y: 0.08,
        width: 0.40,
        height: 0.50,
    },
    NormalizedSlot {
        x: 0.05,
        y: 0.62,
        width: 0.27,
        height: 0.30,
    },
    NormalizedSlot {
        x: 0.365,
        y: 0.62,
        width: 0.27,
        height: 0.30,
    },
    NormalizedSlot {
        x: 0.68,
        y: 0.62,
        width: 0.27,
        height: 0.30,
    },
];

pub fn default_layout() -> Vec<NormalizedSlot> {
    DEFAULT_LAYOUT.to_vec()
}

impl NormalizedSlot {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, DomainError> {
        let slot = Self { x, y, width, height };
        slot.validate()?;
        Ok(slot)
    }

    /// Every component must be a finite fraction in `[0, 1]`.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (name, value) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(DomainError::validation(format!(
                    "Slot {name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Convert to pixels, clamped so the slot never leaves the background.
    pub fn to_pixels(&self, bg_width: u32, bg_height: u32) -> PixelSlot {
        let (x, width) = axis_to_pixels(self.x, self.width, bg_width);
        let (y, height) = axis_to_pixels(self.y, self.height, bg_height);
        PixelSlot { x, y, width, height }
    }
}

fn axis_to_pixels(offset: f64, extent: f64, total: u32) -> (u32, u32) {
    let total_f = f64::from(total);
    let start = (offset.clamp(0.0, 1.0) * total_f).floor() as u32;
    let start = start.min(total);
    let size = (extent.clamp(0.0, 1.0) * total_f).round() as u32;
    (start, size.min(total - start))
}

/// A slot in background pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSlot {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelSlot {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Top-left position that centers a `w`×`h` image inside this slot.
    pub fn centered_origin(&self, w: u32, h: u32) -> (u32, u32) {
        (
            self.x + self.width.saturating_sub(w) / 2,
            self.y + self.height.saturating_sub(h) / 2,
        )
    }
}

/// Largest size with the source aspect ratio that fits inside the slot.
///
/// The binding axis is picked by comparing aspect ratios; if rounding makes
/// the other axis overflow it is clamped to the slot and the binding axis
/// rescaled. Any zero dimension yields `(0, 0)`.
pub fn fit_within(
    src_width: u32,
    src_height: u32,
    slot_width: u32,
    slot_height: u32,
) -> (u32, u32) {
    if src_width == 0 || src_height == 0 || slot_width == 0 || slot_height == 0 {
        return (0, 0);
    }
    let src_ratio = f64::from(src_width) / f64::from(src_height);
    let slot_ratio = f64::from(slot_width) / f64::from(slot_height);

    if src_ratio >= slot_ratio {
        let height = scaled(f64::from(slot_width) / src_ratio);
        if height <= slot_height {
            (slot_width, height)
        } else {
            (scaled(f64::from(slot_height) * src_ratio).min(slot_width), slot_height)
        }
    } else {
        let width = scaled(f64::from(slot_height) * src_ratio);
        if width <= slot_width {
            (width, slot_height)
        } else {
            (slot_width, scaled(f64::from(slot_width) / src_ratio).min(slot_height))
        }
    }
}

fn scaled(value: f64) -> u32 {
    (value.round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: [(u32, u32); 8] = [
        (1, 1),
        (7, 3),
        (100, 100),
        (640, 480),
        (1024, 1024),
        (1920, 1080),
        (1080, 1920),
        (4001, 2999),
    ];

    #[test]
    fn default_layout_stays_inside_any_background() {
        for (w, h) in SIZES {
            for slot in DEFAULT_LAYOUT {
                let px = slot.to_pixels(w, h);
                assert!(px.x + px.width <= w, "{slot:?} overflows width {w}");
                assert!(px.y + px.height <= h, "{slot:?} overflows height {h}");
            }
        }
    }

    #[test]
    fn out_of_range_slots_are_clamped_when_converted() {
        let slot = NormalizedSlot { x: 0.9, y: 0.9, width: 0.5, height: 0.5 };
        let px = slot.to_pixels(100, 50);
        assert_eq!(px, PixelSlot { x: 90, y: 45, width: 10, height: 5 });
    }

    #[test]
    fn new_rejects_fractions_outside_unit_interval() {
        assert!(NormalizedSlot::new(0.1, 0.1, 0.5, 0.5).is_ok());
        assert!(NormalizedSlot::new(-0.1, 0.1, 0.5, 0.5).is_err());
        assert!(NormalizedSlot::new(0.1, 0.1, 1.5, 0.5).is_err());
        assert!(NormalizedSlot::new(0.1, f64::NAN, 0.5, 0.5).is_err());
    }

    #[test]
    fn fit_never_exceeds_slot_and_touches_one_axis() {
        let motifs = [(1, 1), (300, 100), (100, 300), (1920, 1080), (17, 389), (512, 513)];
        let slots = [(1, 1), (10, 3), (409, 540), (276, 324), (768, 540), (3, 997)];
        for (mw, mh) in motifs {
            for (sw, sh) in slots {
                let (fw, fh) = fit_within(mw, mh, sw, sh);
                assert!(fw <= sw && fh <= sh, "{mw}x{mh} in {sw}x{sh} -> {fw}x{fh}");
                assert!(fw == sw || fh == sh, "{mw}x{mh} in {sw}x{sh} -> {fw}x{fh}");
            }
        }
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        assert_eq!(fit_within(200, 100, 400, 400), (400, 200));
        assert_eq!(fit_within(100, 200, 400, 400), (200, 400));
        assert_eq!(fit_within(50, 50, 300, 100), (100, 100));
    }

    #[test]
    fn fit_with_zero_dimension_is_empty() {
        assert_eq!(fit_within(0, 10, 100, 100), (0, 0));
        assert_eq!(fit_within(10, 10, 0, 100), (0, 0));
    }

    #[test]
    fn centered_origin_splits_the_slack() {
        let slot = PixelSlot { x: 10, y: 20, width: 100, height: 50 };
        assert_eq!(slot.centered_origin(60, 50), (30, 20));
        assert_eq!(slot.centered_origin(100, 10), (10, 40));
    }
}
