//! Asynchronous thumbnail rendering kept consistent with the document.
//!
//! The pipeline mirrors the last synced [`DocumentState`] as one slot per
//! page. Every slot carries the generation of its latest render request; a
//! worker result is applied only while the slot still holds that generation,
//! and the cache itself refuses writes older than its current stamp.

use crate::{EditorConfig, PageRasterizer, RenderError};
use image::imageops::{self, FilterType};
use pagedeck_cache::{ApplyOutcome, CacheStats, CachedThumbnail, ThumbnailCache, ThumbnailKey};
use pagedeck_engine::RgbaImage;
use pagedeck_model::{DocumentState, PageId, SourceRef};
use pagedeck_scheduler::{
    CancellationToken, Job, JobExecutor, JobId, JobPriority, JobScheduler, RenderJob,
    SchedulerStats, WorkerPool,
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-page render state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    /// Not requested, usually because the page is outside the visible set.
    Unrendered,
    Queued,
    Rendering,
    Ready,
    /// Rasterization failed. Kept until the page changes or is retried.
    Failed(String),
}

impl RenderState {
    fn is_busy(&self) -> bool {
        matches!(self, RenderState::Queued | RenderState::Rendering)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    pub page: PageId,
    pub state: RenderState,
}

/// Callback invoked for every page state transition, on whichever thread
/// caused it. It must not call back into the pipeline.
pub type PipelineObserver = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub cache: CacheStats,
    pub scheduler: SchedulerStats,
    /// Worker results dropped because a newer request superseded them.
    pub discarded_results: u64,
}

struct PageSlot {
    key: ThumbnailKey,
    source: SourceRef,
    generation: u64,
    state: RenderState,
    job: Option<JobId>,
}

#[derive(Default)]
struct Slots {
    pages: HashMap<PageId, PageSlot>,
    /// `None` renders every page.
    visible: Option<HashSet<PageId>>,
    next_generation: u64,
    discarded: u64,
}

impl Slots {
    fn is_busy(&self) -> bool {
        self.pages.values().any(|slot| slot.state.is_busy())
    }

    fn is_visible(&self, page: PageId) -> bool {
        self.visible.as_ref().map_or(true, |visible| visible.contains(&page))
    }

    fn mint_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct Shared {
    slots: Mutex<Slots>,
    idle: Condvar,
    cache: ThumbnailCache,
    scheduler: Arc<JobScheduler>,
    rasterizer: Arc<dyn PageRasterizer>,
    observer: RwLock<Option<PipelineObserver>>,
    width: u32,
}

impl Shared {
    fn emit(&self, events: Vec<PipelineEvent>) {
        if events.is_empty() {
            return;
        }
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            for event in &events {
                observer(event);
            }
        }
    }

    /// Points `page`'s slot at a fresh generation and queues it if visible.
    /// The slot must exist.
    fn schedule(&self, slots: &mut Slots, page: PageId) -> Option<PipelineEvent> {
        let generation = slots.mint_generation();
        let visible = slots.is_visible(page);
        let priority = if slots.visible.is_some() {
            JobPriority::Visible
        } else {
            JobPriority::Background
        };
        let slot = slots.pages.get_mut(&page)?;
        slot.generation = generation;

        let state = if visible {
            // A still-queued request for the same key is conflated by the
            // scheduler; one already running finishes and is discarded.
            let render = RenderJob { key: slot.key, source: slot.source, generation };
            let (job, _token) = self.scheduler.submit(priority, render);
            slot.job = Some(job);
            RenderState::Queued
        } else {
            if let Some(previous) = slot.job.take() {
                self.scheduler.cancel_job(previous);
            }
            RenderState::Unrendered
        };

        slot.state = state.clone();
        Some(PipelineEvent { page, state })
    }

    /// Serves a still-cached thumbnail without rendering.
    fn mark_ready_from_cache(&self, slots: &mut Slots, page: PageId) -> Option<PipelineEvent> {
        let generation = slots.mint_generation();
        let slot = slots.pages.get_mut(&page)?;
        if let Some(previous) = slot.job.take() {
            self.scheduler.cancel_job(previous);
        }
        slot.generation = generation;
        slot.state = RenderState::Ready;
        Some(PipelineEvent { page, state: RenderState::Ready })
    }

    fn execute(&self, job: &Job, token: &CancellationToken) {
        let render = job.render;
        let page = render.page();

        {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.pages.get_mut(&page) else {
                return;
            };
            if slot.generation != render.generation {
                return;
            }
            slot.state = RenderState::Rendering;
        }
        self.emit(vec![PipelineEvent { page, state: RenderState::Rendering }]);

        let result = self.render(render);

        let mut events = Vec::new();
        {
            let mut slots = self.slots.lock();
            let current = slots
                .pages
                .get(&page)
                .is_some_and(|slot| slot.generation == render.generation);

            if !current {
                slots.discarded += 1;
                log::debug!(
                    "discarding stale thumbnail for {page} (generation {})",
                    render.generation
                );
            } else if token.is_cancelled() {
                slots.discarded += 1;
                if let Some(slot) = slots.pages.get_mut(&page) {
                    slot.job = None;
                    slot.state = RenderState::Unrendered;
                }
                events.push(PipelineEvent { page, state: RenderState::Unrendered });
            } else {
                let state = match result {
                    Ok(image) => {
                        let (width, height) = image.dimensions();
                        let thumbnail = CachedThumbnail::new(
                            render.key,
                            render.generation,
                            image.into_raw(),
                            width,
                            height,
                        );
                        match self.cache.apply(thumbnail) {
                            ApplyOutcome::Stored => Some(RenderState::Ready),
                            ApplyOutcome::Stale { current } => {
                                slots.discarded += 1;
                                log::warn!(
                                    "cache refused generation {} for {page}: holds {current}",
                                    render.generation
                                );
                                None
                            }
                        }
                    }
                    Err(err) => {
                        log::warn!("thumbnail for {page} failed: {err}");
                        Some(RenderState::Failed(err.to_string()))
                    }
                };

                if let Some(slot) = slots.pages.get_mut(&page) {
                    slot.job = None;
                    if let Some(state) = state {
                        slot.state = state.clone();
                        events.push(PipelineEvent { page, state });
                    } else {
                        // A newer thumbnail for the same key is already cached.
                        let state = if self.cache.contains(&slot.key) {
                            RenderState::Ready
                        } else {
                            RenderState::Unrendered
                        };
                        slot.state = state.clone();
                        events.push(PipelineEvent { page, state });
                    }
                }
            }
        }
        self.idle.notify_all();
        self.emit(events);
    }

    fn render(&self, render: RenderJob) -> Result<RgbaImage, RenderError> {
        let natural = self.rasterizer.page_size(render.source)?;
        let rotated = render.key.rotation.rotated_size(natural);
        if !(rotated.width > 0.0 && rotated.height > 0.0) {
            return Err(RenderError::Composite(format!(
                "page has no area ({} x {} pt)",
                rotated.width, rotated.height
            )));
        }

        let width = render.key.width;
        let scale = width as f32 / rotated.width;
        let image = self.rasterizer.rasterize(render.source, render.key.rotation, scale)?;

        if image.width() == width {
            return Ok(image);
        }
        let height = (rotated.height * scale).round().max(1.0) as u32;
        Ok(imageops::resize(&image, width, height, FilterType::Triangle))
    }
}

/// Keeps one thumbnail per visible page, rendered by a bounded worker pool.
pub struct ThumbnailPipeline {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

impl ThumbnailPipeline {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, config: &EditorConfig) -> io::Result<Self> {
        let scheduler = Arc::new(JobScheduler::new());
        let shared = Arc::new(Shared {
            slots: Mutex::new(Slots::default()),
            idle: Condvar::new(),
            cache: ThumbnailCache::new(config.cache_size),
            scheduler: scheduler.clone(),
            rasterizer,
            observer: RwLock::new(None),
            width: config.thumbnail_width.max(1),
        });

        let worker_shared = shared.clone();
        let executor: JobExecutor =
            Arc::new(move |job: &Job, token: &CancellationToken| worker_shared.execute(job, token));
        let pool = WorkerPool::new(scheduler, executor, config.worker_pool())?;

        Ok(Self { shared, pool })
    }

    /// Target thumbnail width in pixels.
    pub fn width(&self) -> u32 {
        self.shared.width
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }

    pub fn set_observer(&self, observer: Option<PipelineObserver>) {
        *self.shared.observer.write() = observer;
    }

    /// Brings the slots in line with `document`.
    ///
    /// Pages whose id, rotation and source are unchanged keep their state and
    /// thumbnail. Removed pages lose their queued work and cache entries.
    pub fn sync(&self, document: &DocumentState) {
        let shared = &self.shared;
        let mut events = Vec::new();
        {
            let mut slots = shared.slots.lock();
            let live: HashSet<PageId> = document.pages().iter().map(|page| page.id()).collect();

            let removed: Vec<PageId> =
                slots.pages.keys().filter(|id| !live.contains(id)).copied().collect();
            for page in removed {
                if let Some(slot) = slots.pages.remove(&page) {
                    if let Some(job) = slot.job {
                        shared.scheduler.cancel_job(job);
                    }
                }
                shared.scheduler.cancel_page_jobs(page);
                shared.cache.invalidate_page(page);
            }
            if let Some(visible) = slots.visible.as_mut() {
                visible.retain(|page| live.contains(page));
            }

            for page in document.pages() {
                let key = ThumbnailKey::new(page.id(), page.rotation(), shared.width);
                let source = page.source();

                match slots.pages.get_mut(&page.id()) {
                    Some(slot) if slot.key == key && slot.source == source => continue,
                    Some(slot) => {
                        if let Some(job) = slot.job.take() {
                            shared.scheduler.cancel_job(job);
                        }
                        if slot.source != source {
                            shared.cache.invalidate_page(page.id());
                        }
                        slot.key = key;
                        slot.source = source;
                    }
                    None => {
                        slots.pages.insert(
                            page.id(),
                            PageSlot {
                                key,
                                source,
                                generation: 0,
                                state: RenderState::Unrendered,
                                job: None,
                            },
                        );
                    }
                }

                shared.cache.evict_stale(&key);
                let event = if shared.cache.contains(&key) {
                    shared.mark_ready_from_cache(&mut slots, page.id())
                } else {
                    shared.schedule(&mut slots, page.id())
                };
                events.extend(event);
            }
        }
        shared.idle.notify_all();
        shared.emit(events);
    }

    /// Restricts rendering to `pages` (`None` renders everything).
    ///
    /// Pages entering the set are queued at visible priority; queued work for
    /// pages leaving it is cancelled and they fall back to `Unrendered`.
    pub fn set_visible(&self, pages: Option<Vec<PageId>>) {
        let shared = &self.shared;
        let mut events = Vec::new();
        {
            let mut slots = shared.slots.lock();
            slots.visible = pages.map(|pages| pages.into_iter().collect());

            let ids: Vec<PageId> = slots.pages.keys().copied().collect();
            for page in ids {
                let visible = slots.is_visible(page);
                let Some(state) = slots.pages.get(&page).map(|slot| slot.state.clone()) else {
                    continue;
                };

                match (state, visible) {
                    (RenderState::Unrendered, true) => {
                        events.extend(shared.schedule(&mut slots, page));
                    }
                    (RenderState::Queued, false) => {
                        events.extend(shared.schedule(&mut slots, page));
                    }
                    (RenderState::Rendering, false) => {
                        // Let the worker finish; its result still fits the page.
                    }
                    _ => {}
                }
            }
        }
        shared.idle.notify_all();
        shared.emit(events);
    }

    /// Re-queues a page that failed to render. Returns `false` unless the
    /// page is currently `Failed`.
    pub fn retry(&self, page: PageId) -> bool {
        let event = {
            let mut slots = self.shared.slots.lock();
            let failed = slots
                .pages
                .get(&page)
                .is_some_and(|slot| matches!(slot.state, RenderState::Failed(_)));
            if !failed {
                return false;
            }
            log::debug!("retrying thumbnail for {page}");
            self.shared.schedule(&mut slots, page)
        };
        self.shared.emit(event.into_iter().collect());
        true
    }

    /// Cancels all work and forgets every page and thumbnail. The visible set
    /// is kept; the next `sync` drops ids that no longer exist.
    pub fn reset(&self) {
        let mut slots = self.shared.slots.lock();
        self.shared.scheduler.clear();
        slots.pages.clear();
        self.shared.cache.clear();
        drop(slots);
        self.shared.idle.notify_all();
        log::debug!("thumbnail pipeline reset");
    }

    /// The thumbnail for the page's current rotation and width, if rendered.
    pub fn thumbnail(&self, page: PageId) -> Option<Arc<CachedThumbnail>> {
        let slots = self.shared.slots.lock();
        let slot = slots.pages.get(&page)?;
        self.shared.cache.get(&slot.key)
    }

    pub fn page_state(&self, page: PageId) -> Option<RenderState> {
        self.shared.slots.lock().pages.get(&page).map(|slot| slot.state.clone())
    }

    /// Blocks until no page is queued or rendering. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slots = self.shared.slots.lock();
        while slots.is_busy() {
            if self.shared.idle.wait_until(&mut slots, deadline).timed_out() {
                return !slots.is_busy();
            }
        }
        true
    }

    pub fn stats(&self) -> PipelineStats {
        let discarded_results = self.shared.slots.lock().discarded;
        PipelineStats {
            cache: self.shared.cache.stats(),
            scheduler: self.shared.scheduler.stats(),
            discarded_results,
        }
    }
}

impl Drop for ThumbnailPipeline {
    fn drop(&mut self) {
        // Queued jobs are dropped; the pool joins its workers afterwards.
        self.shared.scheduler.clear();
    }
}
