/// Viewer error types.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Display error: {0}")]
    Display(#[from] crate::display::DisplayError),

    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
