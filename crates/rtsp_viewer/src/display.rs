use crate::config::{DisplayBackend, DisplayConfig};
use crate::frame::Frame;
use thiserror::Error;

/// Errors raised by a display backend
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Display backend error: {0}")]
    Backend(String),
    #[error("Display backend unavailable: {0}")]
    Unavailable(String),
}

/// What the viewer should do after a frame was shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    /// The user asked to quit
    Quit,
}

/// Something that can render decoded frames.
///
/// `show` receives a frame that is only borrowed for the duration of the
/// call; implementations that need the pixels later must copy them
/// (see [`Frame::to_packed`]).
pub trait FrameDisplay {
    fn show(&mut self, frame: &Frame<'_>) -> Result<DisplayControl, DisplayError>;
}

/// Open the display backend selected in the configuration
pub fn open_display(config: &DisplayConfig) -> Result<Box<dyn FrameDisplay>, DisplayError> {
    match config.backend {
        DisplayBackend::Headless => {
            log::info!("Running headless, frames are decoded but not shown");
            Ok(Box::new(HeadlessDisplay::new()))
        }
        #[cfg(feature = "highgui")]
        DisplayBackend::Highgui => Ok(Box::new(HighguiDisplay::new(&config.window_title)?)),
        #[cfg(not(feature = "highgui"))]
        DisplayBackend::Highgui => Err(DisplayError::Unavailable(
            "built without the 'highgui' feature; use --headless or rebuild with --features highgui"
                .to_string(),
        )),
    }
}

/// Display that renders nothing and reports resolution changes
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    frames: u64,
    resolution: Option<(u32, u32)>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameDisplay for HeadlessDisplay {
    fn show(&mut self, frame: &Frame<'_>) -> Result<DisplayControl, DisplayError> {
        self.frames += 1;

        let resolution = (frame.width, frame.height);
        if self.resolution != Some(resolution) {
            log::info!(
                "Stream resolution {}x{} (stride {} bytes)",
                frame.width,
                frame.height,
                frame.stride
            );
            self.resolution = Some(resolution);
        }

        Ok(DisplayControl::Continue)
    }
}

#[cfg(feature = "highgui")]
pub use highgui_backend::HighguiDisplay;

#[cfg(feature = "highgui")]
mod highgui_backend {
    use super::{DisplayControl, DisplayError, FrameDisplay};
    use crate::frame::Frame;
    use opencv::{core::Mat, highgui, prelude::*};

    const QUIT_KEY: i32 = 'q' as i32;

    fn backend(e: opencv::Error) -> DisplayError {
        DisplayError::Backend(e.to_string())
    }

    /// OpenCV HighGUI window; pressing 'q' in the window requests quit
    pub struct HighguiDisplay {
        title: String,
        // Packed copy for frames whose rows carry padding
        scratch: Vec<u8>,
    }

    impl HighguiDisplay {
        pub fn new(title: &str) -> Result<Self, DisplayError> {
            highgui::named_window(title, highgui::WINDOW_AUTOSIZE).map_err(backend)?;
            Ok(Self {
                title: title.to_string(),
                scratch: Vec::new(),
            })
        }
    }

    impl FrameDisplay for HighguiDisplay {
        fn show(&mut self, frame: &Frame<'_>) -> Result<DisplayControl, DisplayError> {
            let rows = frame.height as usize;
            let row_bytes = frame.row_bytes();

            let bytes: &[u8] = if frame.is_packed() {
                &frame.as_slice()[..rows * row_bytes]
            } else {
                self.scratch.clear();
                for y in 0..frame.height {
                    if let Some(row) = frame.row(y) {
                        self.scratch.extend_from_slice(row);
                    }
                }
                &self.scratch
            };

            // Single channel view of the bytes, reinterpreted as 3 channels
            let flat = Mat::new_rows_cols_with_data(frame.height as i32, row_bytes as i32, bytes)
                .map_err(backend)?;
            let bgr = flat.reshape(3, frame.height as i32).map_err(backend)?;

            highgui::imshow(&self.title, &*bgr).map_err(backend)?;

            let key = highgui::wait_key(1).map_err(backend)?;
            if key >= 0 && (key & 0xFF) == QUIT_KEY {
                log::info!("Quit key pressed");
                return Ok(DisplayControl::Quit);
            }
            Ok(DisplayControl::Continue)
        }
    }

    impl Drop for HighguiDisplay {
        fn drop(&mut self) {
            if let Err(e) = highgui::destroy_window(&self.title) {
                log::warn!("Failed to close window '{}': {}", self.title, e);
            }
        }
    }
}
