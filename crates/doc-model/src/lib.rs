//! Document model for the page editor.
//!
//! Pages, their rotation and provenance, per-page annotation overlays and the
//! structural edit operations over the ordered page collection.

mod document;
mod error;
mod geometry;
mod history;
mod overlay;
mod page;

pub use document::DocumentState;
pub use error::{EditError, EditResult};
pub use geometry::{Affine, PageDimensions, PagePoint, ShapeSize};
pub use history::EditHistory;
pub use overlay::{
    AnnotationOverlay, AnnotationShape, Color, NewShape, ShapeId, ShapeKind, ShapeStyle,
    ShapeUpdate,
};
pub use page::{PageId, PageModel, PageTemplate, Rotation, SourceId, SourceRef};
