//! Face crops for the recognizer.
//!
//! Faces with landmarks are warped onto the five InsightFace reference points
//! with a 2-D similarity transform (scale, rotation, translation). Faces
//! without landmarks fall back to a plain box crop scaled to the same size.

use crate::types::{BoundingBox, FaceBox};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// ArcFace reference landmarks for a 112x112 crop.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Side length of every crop handed to the recognizer.
pub const ALIGNED_SIZE: u32 = 112;

/// Least-squares similarity transform taking `src` onto `dst`.
///
/// Returns the row-major 2x3 matrix `[a, -b, tx, b, a, ty]`, or `None` when
/// the source points are degenerate (all coincident).
fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<[f32; 6]> {
    let n = src.len() as f32;
    let mean = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (msx, msy) = mean(src);
    let (mdx, mdy) = mean(dst);

    let mut spread = 0.0f32;
    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (px, py) = (sx - msx, sy - msy);
        let (qx, qy) = (dx - mdx, dy - mdy);
        spread += px * px + py * py;
        dot += px * qx + py * qy;
        cross += px * qy - py * qx;
    }

    if spread < 1e-6 {
        return None;
    }

    let a = dot / spread;
    let b = cross / spread;
    let tx = mdx - (a * msx - b * msy);
    let ty = mdy - (b * msx + a * msy);

    Some([a, -b, tx, b, a, ty])
}

/// Warp a face onto the 112x112 ArcFace template.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> Option<RgbImage> {
    let m = estimate_similarity(landmarks, &REFERENCE_LANDMARKS_112)?;
    let projection = Projection::from_matrix([m[0], m[1], m[2], m[3], m[4], m[5], 0.0, 0.0, 1.0])?;

    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    warp_into(frame, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Some(out)
}

/// Crop a box out of the frame and scale it to the recognizer input size.
pub fn crop_resized(frame: &RgbImage, face_box: FaceBox) -> RgbImage {
    let region = imageops::crop_imm(frame, face_box.x, face_box.y, face_box.width, face_box.height);
    imageops::resize(&region.to_image(), ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}

/// Recognizer crop for a detection: aligned when possible, box crop otherwise.
pub fn face_crop(frame: &RgbImage, detection: &BoundingBox, face_box: FaceBox) -> RgbImage {
    detection
        .landmarks
        .as_ref()
        .and_then(|lms| align_face(frame, lms))
        .unwrap_or_else(|| crop_resized(frame, face_box))
}

/// Scale a whole image to the recognizer input size.
pub fn whole_image(image: &RgbImage) -> RgbImage {
    imageops::resize(image, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}
