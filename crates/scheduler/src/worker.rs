//! Bounded pool of render worker threads.
//!
//! Workers poll the scheduler, skip jobs whose token was cancelled before
//! they started, and hand everything else to the executor.

use crate::{CancellationToken, Job, JobScheduler};
use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type JobExecutor = Arc<dyn Fn(&Job, &CancellationToken) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub num_workers: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { num_workers: num_cpus(), poll_interval: Duration::from_millis(10) }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers, ..Self::default() }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `config.num_workers` threads (at least one).
    pub fn new(
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        config: WorkerPoolConfig,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let count = config.num_workers.max(1);
        let mut pool = Self { workers: Vec::with_capacity(count), shutdown: shutdown.clone() };

        for id in 0..count {
            // On failure `pool` drops here and joins the threads already spawned.
            let worker = Worker::spawn(
                id,
                scheduler.clone(),
                executor.clone(),
                shutdown.clone(),
                config.poll_interval,
            )?;
            pool.workers.push(worker);
        }

        log::debug!("started {count} render workers");
        Ok(pool)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Signals shutdown and waits for every worker to finish its current job.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("pagedeck-render-{id}"))
            .spawn(move || Self::run(scheduler, executor, shutdown, poll_interval))?;

        Ok(Self { id, thread: Some(thread) })
    }

    fn run(
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        while !shutdown.load(Ordering::Acquire) {
            let Some(job) = scheduler.next_job() else {
                thread::sleep(poll_interval);
                continue;
            };

            let token = scheduler.get_cancellation_token(job.id).unwrap_or_default();
            if token.is_cancelled() {
                log::debug!("skipping cancelled job {}", job.id);
            } else {
                executor(&job, &token);
            }

            scheduler.complete_job(job.id);
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("render worker {} panicked", self.id);
            }
        }
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobPriority, RenderJob};
    use pagedeck_cache::ThumbnailKey;
    use pagedeck_model::{PageId, Rotation, SourceId, SourceRef};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn render(page: u64) -> RenderJob {
        RenderJob {
            key: ThumbnailKey::new(PageId(page), Rotation::Deg0, 100),
            source: SourceRef::new(SourceId(1), page as u32),
            generation: page,
        }
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn config(workers: usize) -> WorkerPoolConfig {
        WorkerPoolConfig::new(workers).with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_worker_pool_config() {
        assert!(WorkerPoolConfig::default().num_workers > 0);

        let config = WorkerPoolConfig::new(4).with_poll_interval(Duration::from_millis(50));
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_zero_workers_still_spawns_one() {
        let scheduler = Arc::new(JobScheduler::new());
        let executor: JobExecutor = Arc::new(|_job: &Job, _token: &CancellationToken| {});

        let pool = WorkerPool::new(scheduler, executor, config(0)).expect("spawn");
        assert_eq!(pool.num_workers(), 1);
        assert!(!pool.is_shutting_down());
        pool.shutdown();
    }

    #[test]
    fn test_worker_pool_executes_jobs() {
        let scheduler = Arc::new(JobScheduler::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = executed.clone();
        let executor: JobExecutor = Arc::new(move |_job: &Job, _token: &CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(scheduler.clone(), executor, config(2)).expect("spawn");
        for page in 0..5 {
            scheduler.submit(JobPriority::Visible, render(page));
        }

        assert!(wait_until(|| executed.load(Ordering::SeqCst) == 5));
        assert!(wait_until(|| scheduler.is_idle()));
        pool.shutdown();
    }

    #[test]
    fn test_cancelled_jobs_are_skipped() {
        let scheduler = Arc::new(JobScheduler::new());
        let executed = Arc::new(Mutex::new(Vec::new()));
        let sink = executed.clone();
        let executor: JobExecutor = Arc::new(move |job: &Job, _token: &CancellationToken| {
            sink.lock().push(job.render.page());
        });

        let (doomed, _) = scheduler.submit(JobPriority::Visible, render(1));
        scheduler.submit(JobPriority::Visible, render(2));
        scheduler.cancel_job(doomed);

        let pool = WorkerPool::new(scheduler.clone(), executor, config(1)).expect("spawn");
        assert!(wait_until(|| scheduler.is_idle() && !executed.lock().is_empty()));
        pool.shutdown();

        assert_eq!(*executed.lock(), vec![PageId(2)]);
    }

    #[test]
    fn test_single_worker_respects_priority() {
        let scheduler = Arc::new(JobScheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = order.clone();
        let executor: JobExecutor = Arc::new(move |job: &Job, _token: &CancellationToken| {
            sink.lock().push(job.render.page());
        });

        scheduler.submit(JobPriority::Background, render(3));
        scheduler.submit(JobPriority::Visible, render(1));
        scheduler.submit(JobPriority::Background, render(4));
        scheduler.submit(JobPriority::Visible, render(2));

        let pool = WorkerPool::new(scheduler.clone(), executor, config(1)).expect("spawn");
        assert!(wait_until(|| order.lock().len() == 4));
        pool.shutdown();

        assert_eq!(*order.lock(), vec![PageId(1), PageId(2), PageId(3), PageId(4)]);
    }

    #[test]
    fn test_drop_stops_workers() {
        let scheduler = Arc::new(JobScheduler::new());
        let executor: JobExecutor = Arc::new(|_job: &Job, _token: &CancellationToken| {});

        let pool = WorkerPool::new(scheduler.clone(), executor, config(2)).expect("spawn");
        drop(pool);

        assert_eq!(Arc::strong_count(&scheduler), 1);
    }
}
