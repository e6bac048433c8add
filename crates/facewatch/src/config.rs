use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Monitor configuration.
///
/// Resolved as defaults, then an optional TOML file, then `FACEWATCH_*`
/// environment variables; CLI flags are applied on top by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Frame rate requested from the camera.
    pub fps: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// One sub-directory of face images per known identity.
    pub reference_dir: PathBuf,
    /// Where frames with unknown faces are saved.
    pub unknown_dir: PathBuf,
    /// Cosine distance above which a face is unknown.
    pub distance_threshold: f32,
    /// Whether frames with unknown faces are saved at all.
    pub save_unknown: bool,
    /// Pending snapshots held before the oldest is dropped.
    pub snapshot_queue_capacity: usize,
    /// Consecutive camera read failures tolerated before giving up.
    pub max_consecutive_read_failures: u32,
    /// TrueType font for labels and the clock; the bundled DejaVu Sans when unset.
    pub font_path: Option<PathBuf>,
    pub window_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            fps: 5,
            model_dir: default_model_dir(),
            reference_dir: PathBuf::from("train"),
            unknown_dir: PathBuf::from("unknown_faces"),
            distance_threshold: facewatch_core::DEFAULT_DISTANCE_THRESHOLD,
            save_unknown: true,
            snapshot_queue_capacity: 16,
            max_consecutive_read_failures: 10,
            font_path: None,
            window_title: "Video".to_string(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with `file` when given, then with the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `FACEWATCH_*` variables looked up via `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEWATCH_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACEWATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEWATCH_REFERENCE_DIR") {
            self.reference_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEWATCH_UNKNOWN_DIR") {
            self.unknown_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEWATCH_FONT_PATH") {
            self.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FACEWATCH_SAVE_UNKNOWN") {
            self.save_unknown = v != "0";
        }
        parse_into(&lookup, "FACEWATCH_FPS", &mut self.fps);
        parse_into(&lookup, "FACEWATCH_DISTANCE_THRESHOLD", &mut self.distance_threshold);
        parse_into(&lookup, "FACEWATCH_SNAPSHOT_QUEUE", &mut self.snapshot_queue_capacity);
        parse_into(&lookup, "FACEWATCH_MAX_READ_FAILURES", &mut self.max_consecutive_read_failures);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "distance_threshold must be a non-negative number, got {}",
                self.distance_threshold
            )));
        }
        if self.fps == 0 {
            return Err(ConfigError::Invalid("fps must be at least 1".into()));
        }
        if self.snapshot_queue_capacity == 0 {
            return Err(ConfigError::Invalid("snapshot_queue_capacity must be at least 1".into()));
        }
        if self.max_consecutive_read_failures == 0 {
            return Err(ConfigError::Invalid("max_consecutive_read_failures must be at least 1".into()));
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facewatch_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facewatch_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch/models")
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}
