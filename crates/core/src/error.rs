use pagedeck_engine::{PdfEngineError, WriteError};
use pagedeck_model::{PageId, SourceId};

/// Failure to open a source document. The session keeps its current
/// document when loading fails.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot open document: {0}")]
    Engine(#[from] PdfEngineError),
    #[error("document has no pages")]
    EmptyDocument,
}

/// Failure to rasterize one page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{0} is not loaded")]
    UnknownSource(SourceId),
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("compositing failed: {0}")]
    Composite(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("page {} ({page}) failed: {reason}", .index + 1)]
    Page { index: usize, page: PageId, reason: String },
    #[error("cannot write output: {0}")]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Failure to start an editing session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start render workers: {0}")]
    Workers(#[from] std::io::Error),
}
