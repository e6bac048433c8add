//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns 112x112 RGB face crops into L2-normalised 512-dimensional
//! embeddings (w600k_r50). Crops are embedded in a single batched run.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (download w600k_r50.onnx from insightface into the model dir)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Produces embeddings for face crops, one per crop, in input order.
pub trait Embedder {
    fn embed_batch(&mut self, crops: &[RgbImage]) -> Result<Vec<Embedding>, RecognizerError>;
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }
}

impl Embedder for FaceRecognizer {
    fn embed_batch(&mut self, crops: &[RgbImage]) -> Result<Vec<Embedding>, RecognizerError> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }

        let input = preprocess(crops);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        split_embeddings(raw, crops.len())
    }
}

/// Stack crops into a normalised Nx3x112x112 tensor.
///
/// Crops of any other size are rescaled first.
fn preprocess(crops: &[RgbImage]) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((crops.len(), 3, size, size));

    for (n, crop) in crops.iter().enumerate() {
        let resized;
        let crop = if crop.dimensions() == (ALIGNED_SIZE, ALIGNED_SIZE) {
            crop
        } else {
            resized = alignment::whole_image(crop);
            &resized
        };

        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                tensor[[n, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
    }

    tensor
}

/// Split the flat `[N, 512]` output into L2-normalised embeddings.
fn split_embeddings(raw: &[f32], count: usize) -> Result<Vec<Embedding>, RecognizerError> {
    if raw.len() != count * ARCFACE_EMBEDDING_DIM {
        return Err(RecognizerError::InferenceFailed(format!(
            "expected {count}x{ARCFACE_EMBEDDING_DIM} embedding values, got {}",
            raw.len()
        )));
    }

    Ok(raw
        .chunks_exact(ARCFACE_EMBEDDING_DIM)
        .map(|chunk| {
            let norm = chunk.iter().map(|x| x * x).sum::<f32>().sqrt();
            let values = if norm > 0.0 {
                chunk.iter().map(|x| x / norm).collect()
            } else {
                chunk.to_vec()
            };
            Embedding { values }
        })
        .collect())
}
