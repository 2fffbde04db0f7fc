use crate::{PageId, ShapeId};

/// Errors returned by edit operations on the document model.
///
/// Every operation that fails leaves the input state untouched; callers keep
/// using the value they already hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("index {index} out of range (len={len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} not found")]
    PageNotFound(PageId),
    #[error("shape {0} not found")]
    ShapeNotFound(ShapeId),
    #[error("{0}")]
    Invariant(&'static str),
}

impl EditError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PageNotFound(_) | Self::ShapeNotFound(_))
    }
}

pub type EditResult<T> = Result<T, EditError>;
