//! Render job scheduling for page thumbnails.
//!
//! Jobs are ordered by priority (visible pages first) with FIFO ordering
//! within a priority. Requests for the same thumbnail key are conflated in the
//! queue, every job carries a cancellation token, and a bounded pool of
//! worker threads executes them.
//!
//! ```
//! use pagedeck_cache::ThumbnailKey;
//! use pagedeck_model::{PageId, Rotation, SourceId, SourceRef};
//! use pagedeck_scheduler::{JobPriority, JobScheduler, RenderJob};
//!
//! let scheduler = JobScheduler::new();
//! let render = RenderJob {
//!     key: ThumbnailKey::new(PageId(1), Rotation::Deg0, 160),
//!     source: SourceRef::new(SourceId(1), 0),
//!     generation: 1,
//! };
//!
//! let (job_id, token) = scheduler.submit(JobPriority::Visible, render);
//! if let Some(job) = scheduler.next_job() {
//!     assert_eq!(job.id, job_id);
//!     scheduler.complete_job(job.id);
//! }
//! assert!(!token.is_cancelled());
//! ```

mod cancel;
mod queue;
mod scheduler;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use queue::{Job, JobId, JobPriority, PriorityQueue, Pushed, RenderJob};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{JobExecutor, WorkerPool, WorkerPoolConfig};
