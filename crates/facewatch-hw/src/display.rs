//! Preview window via `minifb`.

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open window: {0}")]
    Open(String),
    #[error("failed to update window: {0}")]
    Update(String),
}

/// Where annotated frames go, and where the quit request comes from.
pub trait FrameSink {
    fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

    /// Polled once per displayed frame.
    fn quit_requested(&self) -> bool;
}

/// Window showing the live feed; `q` or closing the window quits.
pub struct PreviewWindow {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
}

impl PreviewWindow {
    /// The window opens lazily on the first frame, sized to that frame.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            window: None,
            buffer: Vec::new(),
        }
    }
}

impl FrameSink for PreviewWindow {
    fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);

        let window = match self.window.take() {
            Some(window) if window.get_size() == (w, h) => window,
            _ => {
                tracing::debug!(title = %self.title, width = w, height = h, "opening preview window");
                Window::new(&self.title, w, h, WindowOptions::default())
                    .map_err(|e| DisplayError::Open(e.to_string()))?
            }
        };
        let window = self.window.insert(window);

        rgb_to_argb(frame, &mut self.buffer);
        window
            .update_with_buffer(&self.buffer, w, h)
            .map_err(|e| DisplayError::Update(e.to_string()))
    }

    fn quit_requested(&self) -> bool {
        match &self.window {
            Some(window) => !window.is_open() || window.is_key_down(Key::Q),
            None => false,
        }
    }
}

/// Pack RGB pixels into the 0RGB `u32` layout minifb expects.
fn rgb_to_argb(frame: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        frame
            .pixels()
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_rgb_to_argb_packing() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([0x12, 0x34, 0x56]));
        frame.put_pixel(1, 0, Rgb([255, 0, 0]));

        let mut out = vec![7; 10];
        rgb_to_argb(&frame, &mut out);
        assert_eq!(out, vec![0x0012_3456, 0x00FF_0000]);
    }

    #[test]
    fn test_no_quit_before_first_frame() {
        let window = PreviewWindow::new("Video");
        assert!(!window.quit_requested());
    }
}
