//! Page rasterization seam between the editor and the source documents.

use crate::{LoadError, RenderError};
use pagedeck_engine::{
    DocumentHandle, OpenSource, PdfEngine, PdfEngineError, RenderRequest, RgbaImage,
};
use pagedeck_model::{PageDimensions, Rotation, SourceId, SourceRef};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Renders pages of loaded source documents.
///
/// Implementations are shared with the render workers, so they must be
/// callable from several threads at once.
pub trait PageRasterizer: Send + Sync {
    /// Natural (unrotated) page size in points.
    fn page_size(&self, source: SourceRef) -> Result<PageDimensions, RenderError>;

    /// Renders the page at `scale` pixels per point, already rotated.
    fn rasterize(
        &self,
        source: SourceRef,
        rotation: Rotation,
        scale: f32,
    ) -> Result<RgbaImage, RenderError>;
}

/// A loaded source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedSource {
    pub id: SourceId,
    pub page_count: u32,
}

struct EngineState<E> {
    engine: E,
    handles: HashMap<SourceId, DocumentHandle>,
    next_source: u64,
}

/// [`PageRasterizer`] backed by a [`PdfEngine`], plus the registry of open
/// source documents. Clones share the engine.
pub struct EngineRasterizer<E> {
    state: Arc<RwLock<EngineState<E>>>,
}

impl<E> Clone for EngineRasterizer<E> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<E: PdfEngine> EngineRasterizer<E> {
    pub fn new(engine: E) -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState {
                engine,
                handles: HashMap::new(),
                next_source: 0,
            })),
        }
    }

    /// Opens a document and registers it as a new source.
    pub fn open(&self, source: OpenSource) -> Result<LoadedSource, LoadError> {
        let mut state = self.state.write();
        let handle = state.engine.open(source).map_err(|err| match err {
            PdfEngineError::NoPages => LoadError::EmptyDocument,
            other => LoadError::Engine(other),
        })?;

        let page_count = match state.engine.page_count(handle) {
            Ok(0) => Err(LoadError::EmptyDocument),
            Ok(count) => Ok(count),
            Err(err) => Err(err.into()),
        };
        let page_count = match page_count {
            Ok(count) => count,
            Err(err) => {
                if let Err(close_err) = state.engine.close(handle) {
                    log::warn!("failed to close rejected document: {close_err}");
                }
                return Err(err);
            }
        };

        state.next_source += 1;
        let id = SourceId(state.next_source);
        state.handles.insert(id, handle);

        Ok(LoadedSource { id, page_count })
    }

    /// Closes a source. Unknown ids are ignored.
    pub fn close(&self, id: SourceId) {
        let mut state = self.state.write();
        if let Some(handle) = state.handles.remove(&id) {
            if let Err(err) = state.engine.close(handle) {
                log::warn!("failed to close {id}: {err}");
            }
        }
    }

    pub fn close_all(&self) {
        let ids: Vec<SourceId> = self.state.read().handles.keys().copied().collect();
        for id in ids {
            self.close(id);
        }
    }

    /// True if `source` names a page of an open document.
    pub fn contains(&self, source: SourceRef) -> bool {
        self.page_count(source.source).is_some_and(|count| source.page_index < count)
    }

    pub fn page_count(&self, id: SourceId) -> Option<u32> {
        let state = self.state.read();
        let handle = state.handles.get(&id)?;
        state.engine.page_count(*handle).ok()
    }

    pub fn sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.state.read().handles.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl<E> EngineState<E> {
    fn handle(&self, id: SourceId) -> Result<DocumentHandle, RenderError> {
        self.handles.get(&id).copied().ok_or(RenderError::UnknownSource(id))
    }
}

impl<E> PageRasterizer for EngineRasterizer<E>
where
    E: PdfEngine + Send + Sync,
{
    fn page_size(&self, source: SourceRef) -> Result<PageDimensions, RenderError> {
        let state = self.state.read();
        let handle = state.handle(source.source)?;
        let size = state.engine.page_size(handle, source.page_index)?;
        Ok(PageDimensions::new(size.width_pt, size.height_pt))
    }

    fn rasterize(
        &self,
        source: SourceRef,
        rotation: Rotation,
        scale: f32,
    ) -> Result<RgbaImage, RenderError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(RenderError::InvalidScale(scale));
        }

        let state = self.state.read();
        let handle = state.handle(source.source)?;
        let request = RenderRequest { page_index: source.page_index, scale, rotation };
        Ok(state.engine.render_page(handle, request)?)
    }
}
