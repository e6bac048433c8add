use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::types::{DetectedFace, FaceLocator};
use image::RgbImage;

/// [`FaceLocator`] running SCRFD and cutting a recognizer crop per face.
pub struct ScrfdLocator {
    detector: FaceDetector,
}

impl ScrfdLocator {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        Ok(Self { detector: FaceDetector::load(model_path)? })
    }
}

impl FaceLocator for ScrfdLocator {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let detections = self.detector.detect(frame)?;
        let (width, height) = frame.dimensions();

        Ok(detections
            .iter()
            .filter_map(|det| {
                let face_box = det.to_face_box(width, height)?;
                Some(DetectedFace {
                    face_box,
                    crop: alignment::face_crop(frame, det, face_box),
                    confidence: det.confidence,
                })
            })
            .collect())
    }
}
