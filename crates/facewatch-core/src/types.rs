use crate::detector::DetectorError;
use crate::gallery::GalleryError;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Sub-pixel face detection produced by the detector, with optional landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Clamp to a `width` x `height` frame and snap to whole pixels.
    ///
    /// Returns `None` when nothing of the box is left inside the frame.
    pub fn to_face_box(&self, width: u32, height: u32) -> Option<FaceBox> {
        let x0 = self.x.max(0.0).floor();
        let y0 = self.y.max(0.0).floor();
        let x1 = (self.x + self.width).min(width as f32).ceil();
        let y1 = (self.y + self.height).min(height as f32).ceil();

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(FaceBox {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Integer face rectangle in frame coordinates, always inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A face found in one frame: where it is, and the crop handed to the matcher.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub face_box: FaceBox,
    /// 112x112 RGB crop, aligned when the detector returned landmarks.
    pub crop: RgbImage,
    pub confidence: f32,
}

/// L2-normalised face embedding (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance `1 - similarity`, in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Best reference match for one face crop.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Reference image path, shaped `<reference-dir>/<identity>/<file>`.
    pub identity_path: String,
    /// Dissimilarity score; lower means more similar.
    pub distance: f32,
}

/// Finds faces in a frame.
pub trait FaceLocator {
    /// Detected faces, most confident first.
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError>;
}

/// Matches a batch of face crops against the reference set.
///
/// Implementations return exactly one result per crop, in input order, and
/// must not fail because a crop does not look like a face.
pub trait IdentityMatcher {
    fn match_faces(&mut self, crops: &[RgbImage]) -> Result<Vec<MatchResult>, GalleryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec() }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
        assert!(a.cosine_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!((a.cosine_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((a.cosine_distance(&b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
        assert_eq!(a.cosine_distance(&b), 1.0);
    }

    #[test]
    fn test_face_box_inside_frame() {
        let fb = bbox(10.2, 20.7, 30.0, 40.0).to_face_box(640, 480).unwrap();
        assert_eq!(fb, FaceBox { x: 10, y: 20, width: 31, height: 41 });
    }

    #[test]
    fn test_face_box_clamped_to_frame() {
        let fb = bbox(-15.0, -5.0, 50.0, 50.0).to_face_box(40, 30).unwrap();
        assert_eq!(fb, FaceBox { x: 0, y: 0, width: 35, height: 30 });
    }

    #[test]
    fn test_face_box_outside_frame() {
        assert!(bbox(700.0, 10.0, 20.0, 20.0).to_face_box(640, 480).is_none());
        assert!(bbox(10.0, 10.0, 0.0, 20.0).to_face_box(640, 480).is_none());
    }
}
