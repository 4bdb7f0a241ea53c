use gstreamer::prelude::*;
use gstreamer::MessageView;
use thiserror::Error;

/// Fatal error reported by a pipeline element on the bus
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Error received from element {source_name}: {message}")]
pub struct RuntimeError {
    /// Name of the element that posted the error
    pub source_name: String,
    pub message: String,
    /// Extra debugging information attached by the element
    pub debug: Option<String>,
}

impl RuntimeError {
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }
}

/// Pipeline bus message, reduced to what the poll loop reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Error(RuntimeError),
    EndOfStream,
    /// Any other message type, named for trace logging
    Other(String),
}

impl From<&gstreamer::Message> for BusEvent {
    fn from(msg: &gstreamer::Message) -> Self {
        match msg.view() {
            MessageView::Error(err) => {
                let source_name = msg
                    .src()
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                BusEvent::Error(RuntimeError {
                    source_name,
                    message: err.error().to_string(),
                    debug: err.debug().map(|d| d.to_string()),
                })
            }
            MessageView::Eos(..) => BusEvent::EndOfStream,
            _ => BusEvent::Other(format!("{:?}", msg.type_())),
        }
    }
}
