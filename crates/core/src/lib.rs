//! Editing engine for paginated documents.
//!
//! [`EditorSession`] owns the open [`DocumentState`](pagedeck_model::DocumentState),
//! its undo history and a [`ThumbnailPipeline`] that renders page thumbnails
//! on a bounded worker pool. [`ExportCompositor`] flattens a document and its
//! annotation overlays into a new PDF.
//!
//! ```no_run
//! use pagedeck_core::{EditorConfig, EditorSession};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = EditorSession::with_config(EditorConfig::from_env()?)?;
//! session.load(std::path::Path::new("input.pdf"))?;
//!
//! let first = session.document().map(|doc| doc.page_ids()[0]).ok_or("empty")?;
//! session.rotate_page(first, 90)?;
//! session.wait_idle(Duration::from_secs(5));
//!
//! let bytes = session.export()?;
//! std::fs::write("output.pdf", bytes)?;
//! # Ok(())
//! # }
//! ```

mod compositor;
mod config;
mod error;
mod pipeline;
mod rasterizer;
mod session;

pub use compositor::{ComposedPage, ExportCompositor};
pub use config::EditorConfig;
pub use error::{ConfigError, ExportError, LoadError, RenderError, SessionError};
pub use pipeline::{PipelineEvent, PipelineObserver, PipelineStats, RenderState, ThumbnailPipeline};
pub use rasterizer::{EngineRasterizer, LoadedSource, PageRasterizer};
pub use session::EditorSession;
