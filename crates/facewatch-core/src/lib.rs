//! facewatch-core — face detection, recognition and reference matching.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime on the CPU, and matches embeddings against a
//! directory of reference images by cosine distance.

pub mod alignment;
pub mod decision;
pub mod detector;
pub mod gallery;
pub mod identity;
pub mod locator;
pub mod recognizer;
pub mod types;

pub use decision::{classify, Decision, Verdict, DEFAULT_DISTANCE_THRESHOLD};
pub use detector::{DetectorError, FaceDetector};
pub use gallery::{Gallery, GalleryError, GalleryMatcher};
pub use identity::{identity_from_path, LabelError};
pub use locator::ScrfdLocator;
pub use recognizer::{Embedder, FaceRecognizer, RecognizerError};
pub use types::{BoundingBox, DetectedFace, Embedding, FaceBox, FaceLocator, IdentityMatcher, MatchResult};

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";
