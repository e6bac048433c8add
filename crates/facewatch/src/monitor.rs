//! The live recognition loop: capture, detect, match, annotate, display.

use crate::clock::Clock;
use crate::overlay::{verdict_color, Overlay};
use crate::snapshot::SnapshotSink;
use facewatch_core::{
    classify, DetectorError, FaceBox, FaceLocator, GalleryError, IdentityMatcher, LabelError, Verdict,
};
use facewatch_hw::{CameraError, DisplayError, FrameSink, FrameSource};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("camera read failed {failures} times in a row: {source}")]
    CaptureExhausted {
        failures: u32,
        #[source]
        source: CameraError,
    },
    #[error("face detection failed: {0}")]
    Locate(#[from] DetectorError),
    #[error("identity matching failed: {0}")]
    Match(#[from] GalleryError),
    #[error("matcher returned {got} results for {expected} faces")]
    ResultCount { expected: usize, got: usize },
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error("display failed: {0}")]
    Display(#[from] DisplayError),
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub distance_threshold: f32,
    pub max_consecutive_read_failures: u32,
}

/// What was drawn for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnnotation {
    pub face_box: FaceBox,
    pub label: String,
    pub verdict: Verdict,
    pub distance: f32,
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub timestamp: String,
    pub faces: Vec<FaceAnnotation>,
}

impl FrameReport {
    pub fn unknown_count(&self) -> usize {
        self.faces.iter().filter(|f| f.verdict == Verdict::Unknown).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub faces: u64,
    pub unknown: u64,
    pub read_failures: u64,
}

pub struct Monitor<'a, S, L, M, D, C> {
    source: S,
    locator: L,
    matcher: M,
    sink: D,
    clock: C,
    overlay: Overlay,
    snapshots: Option<&'a dyn SnapshotSink>,
    settings: MonitorSettings,
}

impl<'a, S, L, M, D, C> Monitor<'a, S, L, M, D, C>
where
    S: FrameSource,
    L: FaceLocator,
    M: IdentityMatcher,
    D: FrameSink,
    C: Clock,
{
    pub fn new(
        source: S,
        locator: L,
        matcher: M,
        sink: D,
        clock: C,
        overlay: Overlay,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            locator,
            matcher,
            sink,
            clock,
            overlay,
            snapshots: None,
            settings,
        }
    }

    /// Save a copy of every frame that contains an unknown face.
    pub fn with_snapshots(mut self, snapshots: &'a dyn SnapshotSink) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Run until the sink asks to quit.
    ///
    /// A failed read skips the iteration; `max_consecutive_read_failures`
    /// failures in a row end the run. Detection, matching and display errors
    /// end it immediately.
    pub fn run(&mut self) -> Result<RunSummary, MonitorError> {
        let mut summary = RunSummary::default();
        let mut consecutive_failures = 0u32;

        loop {
            let frame = match self.source.read_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    frame
                }
                Err(e) => {
                    consecutive_failures += 1;
                    summary.read_failures += 1;
                    if consecutive_failures >= self.settings.max_consecutive_read_failures {
                        return Err(MonitorError::CaptureExhausted {
                            failures: consecutive_failures,
                            source: e,
                        });
                    }
                    tracing::warn!(error = %e, consecutive_failures, "frame read failed, retrying");
                    continue;
                }
            };

            let mut image = frame.image;
            let report = self.process_frame(&mut image)?;
            summary.frames += 1;
            summary.faces += report.faces.len() as u64;
            summary.unknown += report.unknown_count() as u64;

            self.sink.show(&image)?;
            if self.sink.quit_requested() {
                tracing::info!(frames = summary.frames, "quit requested");
                return Ok(summary);
            }
        }
    }

    /// Detect, match and annotate one frame in place.
    ///
    /// The matcher is called once per frame with every face crop, and only
    /// when at least one face was found. The clock is drawn on every frame.
    pub fn process_frame(&mut self, frame: &mut RgbImage) -> Result<FrameReport, MonitorError> {
        let timestamp = self.clock.now_hms();
        let faces = self.locator.locate(frame)?;
        let mut annotations = Vec::with_capacity(faces.len());

        if !faces.is_empty() {
            let (boxes, crops): (Vec<FaceBox>, Vec<RgbImage>) =
                faces.into_iter().map(|f| (f.face_box, f.crop)).unzip();

            let results = self.matcher.match_faces(&crops)?;
            if results.len() != boxes.len() {
                return Err(MonitorError::ResultCount { expected: boxes.len(), got: results.len() });
            }

            for (face_box, result) in boxes.into_iter().zip(results) {
                let decision = classify(&result, self.settings.distance_threshold, &timestamp)?;

                if decision.verdict == Verdict::Unknown {
                    tracing::info!(
                        distance = result.distance,
                        closest = %result.identity_path,
                        %timestamp,
                        "unknown face"
                    );
                    if let Some(snapshots) = self.snapshots {
                        snapshots.submit(frame.clone(), &timestamp);
                    }
                }

                self.overlay.draw_face(frame, face_box, &decision.label, verdict_color(decision.verdict));
                annotations.push(FaceAnnotation {
                    face_box,
                    label: decision.label,
                    verdict: decision.verdict,
                    distance: result.distance,
                });
            }
        }

        self.overlay.draw_clock(frame, &timestamp);
        tracing::debug!(faces = annotations.len(), "processed frame");

        Ok(FrameReport { timestamp, faces: annotations })
    }
}
