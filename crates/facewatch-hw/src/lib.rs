//! facewatch-hw — Camera capture and preview window.
//!
//! Provides V4L2-based webcam streaming with RGB conversion and a
//! `minifb` window for the annotated live feed.

pub mod camera;
pub mod display;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use display::{DisplayError, FrameSink, PreviewWindow};
pub use frame::{Frame, FrameError};
