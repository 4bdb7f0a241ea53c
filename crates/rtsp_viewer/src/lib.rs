//! Minimal RTSP H264 viewer.
//!
//! A fixed GStreamer pipeline does all of the media work:
//!
//! ```text
//! rtspsrc -> rtph264depay -> h264parse -> avdec_h264 -> videoconvert -> appsink (BGR)
//! ```
//!
//! [`session::Session`] pulls decoded frames from the appsink, lends them to a
//! [`display::FrameDisplay`] and drains the pipeline bus until end of stream,
//! an error, or the user quits.

pub mod bus;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod session;

pub use error::{Result, ViewerError};
