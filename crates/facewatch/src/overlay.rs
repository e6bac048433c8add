//! Boxes, labels and the clock drawn onto frames.

use ab_glyph::{FontArc, PxScale};
use facewatch_core::{FaceBox, Verdict};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CLOCK_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 16.0;
const CLOCK_SCALE: f32 = 18.0;
const LABEL_GAP: i32 = 5;
const CLOCK_TOP: i32 = 4;

pub fn verdict_color(verdict: Verdict) -> Rgb<u8> {
    match verdict {
        Verdict::Known => KNOWN_COLOR,
        Verdict::Unknown => UNKNOWN_COLOR,
    }
}

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {0}")]
    Invalid(String),
}

/// Draws annotations onto frames.
pub struct Overlay {
    font: Option<FontArc>,
}

impl Overlay {
    /// Load `font_path`, or the bundled DejaVu Sans when none is configured.
    pub fn load(font_path: Option<&Path>) -> Result<Self, OverlayError> {
        let Some(path) = font_path else {
            return Self::bundled();
        };
        let bytes = std::fs::read(path).map_err(|source| OverlayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| OverlayError::Invalid(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded overlay font");
        Ok(Self { font: Some(font) })
    }

    pub fn bundled() -> Result<Self, OverlayError> {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| OverlayError::Invalid(format!("bundled DejaVu Sans: {e}")))?;
        Ok(Self { font: Some(font) })
    }

    /// Boxes only.
    #[cfg(test)]
    pub fn without_text() -> Self {
        Self { font: None }
    }

    /// Rectangle around the face and the label just above it.
    pub fn draw_face(&self, frame: &mut RgbImage, face_box: FaceBox, label: &str, color: Rgb<u8>) {
        for inset in 0..BOX_THICKNESS {
            let (w, h) = (
                face_box.width.saturating_sub(2 * inset),
                face_box.height.saturating_sub(2 * inset),
            );
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((face_box.x + inset) as i32, (face_box.y + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(frame, rect, color);
        }

        if let Some(font) = &self.font {
            let (_, text_h) = text_size(PxScale::from(LABEL_SCALE), font, label);
            let y = (face_box.y as i32 - LABEL_GAP - text_h as i32).max(0);
            draw_text_mut(frame, color, face_box.x as i32, y, PxScale::from(LABEL_SCALE), font, label);
        }
    }

    /// Current time centred at the top of the frame.
    pub fn draw_clock(&self, frame: &mut RgbImage, time: &str) {
        let Some(font) = &self.font else {
            return;
        };
        let (text_w, _) = text_size(PxScale::from(CLOCK_SCALE), font, time);
        let x = ((frame.width() as i32 - text_w as i32) / 2).max(0);
        draw_text_mut(frame, CLOCK_COLOR, x, CLOCK_TOP, PxScale::from(CLOCK_SCALE), font, time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_outline_is_two_pixels_in_verdict_color() {
        let mut frame = RgbImage::new(100, 100);
        let face_box = FaceBox { x: 10, y: 20, width: 30, height: 40 };
        Overlay::without_text().draw_face(&mut frame, face_box, "alice", verdict_color(Verdict::Known));

        assert_eq!(frame.get_pixel(10, 20), &KNOWN_COLOR);
        assert_eq!(frame.get_pixel(11, 21), &KNOWN_COLOR);
        assert_eq!(frame.get_pixel(39, 59), &KNOWN_COLOR);
        assert_eq!(frame.get_pixel(12, 22), &Rgb([0, 0, 0]), "inside stays untouched");
        assert_eq!(frame.get_pixel(40, 20), &Rgb([0, 0, 0]), "outside stays untouched");
    }

    #[test]
    fn test_unknown_color() {
        let mut frame = RgbImage::new(20, 20);
        let face_box = FaceBox { x: 0, y: 0, width: 20, height: 20 };
        Overlay::without_text().draw_face(&mut frame, face_box, "x", verdict_color(Verdict::Unknown));
        assert_eq!(frame.get_pixel(0, 0), &UNKNOWN_COLOR);
        assert_eq!(frame.get_pixel(19, 19), &UNKNOWN_COLOR);
    }

    #[test]
    fn test_tiny_box_does_not_panic() {
        let mut frame = RgbImage::new(10, 10);
        let face_box = FaceBox { x: 9, y: 9, width: 1, height: 1 };
        Overlay::without_text().draw_face(&mut frame, face_box, "x", KNOWN_COLOR);
        assert_eq!(frame.get_pixel(9, 9), &KNOWN_COLOR);
    }

    fn lit_pixels(frame: &RgbImage) -> Vec<(u32, u32, Rgb<u8>)> {
        frame
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != Rgb([0, 0, 0]))
            .map(|(x, y, p)| (x, y, *p))
            .collect()
    }

    #[test]
    fn test_missing_font_override_is_an_error() {
        let err = Overlay::load(Some(Path::new("/nonexistent/font.ttf"))).err().unwrap();
        assert!(matches!(err, OverlayError::Read { .. }));
    }

    #[test]
    fn test_invalid_font_override_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(Overlay::load(Some(&path)), Err(OverlayError::Invalid(_))));
    }

    #[test]
    fn test_default_uses_bundled_font() {
        let overlay = Overlay::load(None).unwrap();
        assert!(overlay.font.is_some());
    }

    #[test]
    fn test_clock_centred_in_top_band() {
        let overlay = Overlay::bundled().unwrap();
        let mut frame = RgbImage::new(200, 100);
        overlay.draw_clock(&mut frame, "12:34:56");

        let lit = lit_pixels(&frame);
        assert!(!lit.is_empty());
        assert!(lit.iter().any(|&(_, _, p)| p[0] > 200 && p[1] > 200), "no solid clock pixels");
        // Anti-aliased yellow on black keeps red == green and no blue.
        assert!(lit.iter().all(|&(_, _, p)| p[0] == p[1] && p[2] == 0));
        assert!(lit.iter().all(|&(_, y, _)| (CLOCK_TOP as u32..CLOCK_TOP as u32 + 30).contains(&y)));

        let min_x = lit.iter().map(|&(x, _, _)| x).min().unwrap();
        let max_x = lit.iter().map(|&(x, _, _)| x).max().unwrap();
        let centre = (min_x + max_x) / 2;
        assert!((90..=110).contains(&centre), "clock centred at {centre}");
    }

    #[test]
    fn test_label_drawn_above_box() {
        let overlay = Overlay::bundled().unwrap();
        let mut frame = RgbImage::new(200, 120);
        let face_box = FaceBox { x: 20, y: 60, width: 80, height: 40 };
        overlay.draw_face(&mut frame, face_box, "alice", KNOWN_COLOR);

        let above: Vec<_> = lit_pixels(&frame).into_iter().filter(|&(_, y, _)| y < 60).collect();
        assert!(!above.is_empty(), "label missing");
        assert!(above.iter().all(|&(_, _, p)| p[0] == 0 && p[2] == 0 && p[1] > 0));
        assert!(above.iter().all(|&(x, _, _)| x >= 18));

        let (_, text_h) = text_size(PxScale::from(LABEL_SCALE), overlay.font.as_ref().unwrap(), "alice");
        let top = 60 - LABEL_GAP as u32 - text_h;
        assert!(above.iter().all(|&(_, y, _)| y >= top), "label starts above {top}");
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        let overlay = Overlay::bundled().unwrap();
        let mut frame = RgbImage::new(200, 100);
        let face_box = FaceBox { x: 20, y: 0, width: 100, height: 60 };
        overlay.draw_face(&mut frame, face_box, "Unknown 12:34:56", UNKNOWN_COLOR);

        // The label lands inside the top of the box instead of off-frame.
        let inside = lit_pixels(&frame)
            .into_iter()
            .filter(|&(x, y, _)| (23..117).contains(&x) && (2..30).contains(&y))
            .count();
        assert!(inside > 0);
    }
}
