use std::path::PathBuf;

/// Errors surfaced by the router core.
///
/// None of these are fatal to the process: decode errors are scoped to one
/// inbound frame, template errors to startup.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid envelope: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("failed to read templates from {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse templates from {path}: {source}")]
    TemplateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RouterError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::InvalidFrame(_) => "invalid_frame",
            Self::TemplateIo { .. } => "template_io",
            Self::TemplateParse { .. } => "template_parse",
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
