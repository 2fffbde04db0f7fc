//! One editing session: the open document, its undo history, the thumbnail
//! pipeline that mirrors it and the sources its pages come from.

use crate::{
    EditorConfig, EngineRasterizer, ExportCompositor, ExportError, LoadError, LoadedSource,
    PipelineStats, RenderState, SessionError, ThumbnailPipeline,
};
use pagedeck_cache::CachedThumbnail;
use pagedeck_engine::{LopdfEngine, OpenSource, PdfEngine};
use pagedeck_model::{
    AnnotationOverlay, AnnotationShape, DocumentState, EditError, EditHistory, EditResult,
    NewShape, PageId, PageTemplate, ShapeId, ShapeUpdate,
};
use std::sync::Arc;
use std::time::Duration;

const NO_DOCUMENT: &str = "no document is open";

/// Drives every edit through [`DocumentState`] and keeps the thumbnail
/// pipeline in step with the result.
pub struct EditorSession<E = LopdfEngine>
where
    E: PdfEngine + Send + Sync + 'static,
{
    pipeline: ThumbnailPipeline,
    rasterizer: EngineRasterizer<E>,
    document: Option<DocumentState>,
    history: EditHistory,
    config: EditorConfig,
}

impl EditorSession<LopdfEngine> {
    pub fn with_config(config: EditorConfig) -> Result<Self, SessionError> {
        Self::new(LopdfEngine::new(), config)
    }
}

impl<E> EditorSession<E>
where
    E: PdfEngine + Send + Sync + 'static,
{
    pub fn new(engine: E, config: EditorConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let rasterizer = EngineRasterizer::new(engine);
        let pipeline = ThumbnailPipeline::new(Arc::new(rasterizer.clone()), &config)?;

        Ok(Self {
            pipeline,
            rasterizer,
            document: None,
            history: EditHistory::new(config.history_limit),
            config,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&DocumentState> {
        self.document.as_ref()
    }

    pub fn pipeline(&self) -> &ThumbnailPipeline {
        &self.pipeline
    }

    pub fn rasterizer(&self) -> &EngineRasterizer<E> {
        &self.rasterizer
    }

    /// Opens `source` as the new document, replacing the current one.
    ///
    /// On failure the current document stays open untouched.
    pub fn load(&mut self, source: impl Into<OpenSource>) -> Result<LoadedSource, LoadError> {
        let loaded = self.rasterizer.open(source.into())?;
        let document = match DocumentState::load(loaded.id, loaded.page_count) {
            Ok(document) => document,
            Err(_) => {
                self.rasterizer.close(loaded.id);
                return Err(LoadError::EmptyDocument);
            }
        };

        for id in self.rasterizer.sources() {
            if id != loaded.id {
                self.rasterizer.close(id);
            }
        }
        self.pipeline.reset();
        self.history.clear();
        self.pipeline.sync(&document);
        self.document = Some(document);

        log::info!("loaded {} with {} pages", loaded.id, loaded.page_count);
        Ok(loaded)
    }

    /// Registers another document whose pages can then be inserted.
    pub fn add_source(
        &mut self,
        source: impl Into<OpenSource>,
    ) -> Result<LoadedSource, LoadError> {
        let loaded = self.rasterizer.open(source.into())?;
        log::info!("added {} with {} pages", loaded.id, loaded.page_count);
        Ok(loaded)
    }

    /// Inserts pages before `at`. Every template must name a page of a
    /// loaded source.
    pub fn insert_pages(&mut self, at: usize, pages: Vec<PageTemplate>) -> EditResult<()> {
        if let Some(missing) = pages.iter().find(|page| !self.rasterizer.contains(page.source)) {
            return Err(EditError::InvalidArgument(format!(
                "{} page {} is not loaded",
                missing.source.source, missing.source.page_index
            )));
        }
        self.apply(|doc| doc.insert_pages(at, pages))
    }

    pub fn delete_page(&mut self, id: PageId) -> EditResult<()> {
        self.apply(|doc| doc.delete_page(id))
    }

    pub fn move_page(&mut self, id: PageId, new_index: usize) -> EditResult<()> {
        self.apply(|doc| doc.move_page(id, new_index))
    }

    pub fn rotate_page(&mut self, id: PageId, delta_degrees: i32) -> EditResult<()> {
        self.apply(|doc| doc.rotate_page(id, delta_degrees))
    }

    pub fn rotate_all(&mut self, delta_degrees: i32) -> EditResult<()> {
        self.apply(|doc| doc.rotate_all(delta_degrees))
    }

    pub fn duplicate_page(&mut self, id: PageId) -> EditResult<()> {
        self.apply(|doc| doc.duplicate_page(id))
    }

    pub fn set_overlay(&mut self, id: PageId, overlay: AnnotationOverlay) -> EditResult<()> {
        self.apply(|doc| doc.set_overlay(id, overlay))
    }

    pub fn add_shape(&mut self, page: PageId, shape: NewShape) -> EditResult<ShapeId> {
        self.apply_with(|doc| doc.update_overlay(page, |overlay| Ok(overlay.add_shape(shape))))
    }

    pub fn update_shape(
        &mut self,
        page: PageId,
        shape: ShapeId,
        update: ShapeUpdate,
    ) -> EditResult<()> {
        self.apply_with(|doc| {
            doc.update_overlay(page, |overlay| overlay.update_shape(shape, update))
        })
    }

    pub fn remove_shape(&mut self, page: PageId, shape: ShapeId) -> EditResult<AnnotationShape> {
        self.apply_with(|doc| doc.update_overlay(page, |overlay| overlay.remove_shape(shape)))
    }

    /// Moves the selection. Not recorded in the undo history.
    pub fn select(&mut self, id: PageId) -> EditResult<()> {
        let next = self.current()?.select(id)?;
        self.document = Some(next);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restores the state before the last edit. Returns `false` if there is
    /// nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(current) = self.document.as_ref() else {
            return false;
        };
        let Some(previous) = self.history.undo(current) else {
            return false;
        };
        self.pipeline.sync(&previous);
        self.document = Some(previous);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(current) = self.document.as_ref() else {
            return false;
        };
        let Some(next) = self.history.redo(current) else {
            return false;
        };
        self.pipeline.sync(&next);
        self.document = Some(next);
        true
    }

    pub fn set_visible(&self, pages: Option<Vec<PageId>>) {
        self.pipeline.set_visible(pages);
    }

    pub fn thumbnail(&self, id: PageId) -> Option<Arc<CachedThumbnail>> {
        self.pipeline.thumbnail(id)
    }

    pub fn page_state(&self, id: PageId) -> Option<RenderState> {
        self.pipeline.page_state(id)
    }

    pub fn retry_thumbnail(&self, id: PageId) -> bool {
        self.pipeline.retry(id)
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pipeline.wait_idle(timeout)
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Compositor over this session's sources at the configured export scale.
    pub fn compositor(&self) -> ExportCompositor<'_> {
        ExportCompositor::new(&self.rasterizer, self.config.export_scale)
    }

    /// Flattens the current document into PDF bytes.
    pub fn export(&self) -> Result<Vec<u8>, ExportError> {
        let document = self.document.as_ref().ok_or(ExportError::Empty)?;
        self.compositor().export(document)
    }

    /// Drops the document, its history and every source.
    pub fn close(&mut self) {
        self.pipeline.reset();
        self.history.clear();
        self.document = None;
        self.rasterizer.close_all();
    }

    fn current(&self) -> EditResult<&DocumentState> {
        self.document.as_ref().ok_or(EditError::Invariant(NO_DOCUMENT))
    }

    fn apply<F>(&mut self, edit: F) -> EditResult<()>
    where
        F: FnOnce(&DocumentState) -> EditResult<DocumentState>,
    {
        self.apply_with(|doc| edit(doc).map(|next| (next, ())))
    }

    fn apply_with<T, F>(&mut self, edit: F) -> EditResult<T>
    where
        F: FnOnce(&DocumentState) -> EditResult<(DocumentState, T)>,
    {
        let (next, output) = edit(self.current()?)?;
        self.pipeline.sync(&next);
        if let Some(previous) = self.document.replace(next) {
            self.history.record(previous);
        }
        Ok(output)
    }
}
