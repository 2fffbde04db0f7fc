//! Render job scheduler.
//!
//! Owns the pending queue and the cancellation registry. Workers pull jobs
//! with [`JobScheduler::next_job`] and report back with
//! [`JobScheduler::complete_job`]; the edit path submits and cancels.

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::queue::{Job, JobId, JobPriority, PriorityQueue, RenderJob};
use pagedeck_model::PageId;
use parking_lot::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    /// Removed from the queue before a worker picked them up.
    pub jobs_cancelled: u64,
    /// Replaced in the queue by a newer request for the same key.
    pub jobs_conflated: u64,
    pub queue_size: usize,
    pub running: usize,
}

impl SchedulerStats {
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted
            .saturating_sub(self.jobs_completed + self.jobs_cancelled + self.jobs_conflated)
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    stats: SchedulerStats,
}

#[derive(Debug, Default)]
pub struct JobScheduler {
    queue: PriorityQueue,
    state: Mutex<SchedulerState>,
    cancellation: CancellationRegistry,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a render job. A queued job for the same key is replaced and its
    /// token cancelled.
    pub fn submit(&self, priority: JobPriority, render: RenderJob) -> (JobId, CancellationToken) {
        // Held across push and register so no worker sees an unregistered job.
        let mut state = self.state.lock();

        let pushed = self.queue.push(priority, render);
        let token = self.cancellation.register(pushed.id);
        state.stats.jobs_submitted += 1;

        if let Some(replaced) = pushed.replaced {
            self.cancellation.cancel(replaced);
            self.cancellation.unregister(replaced);
            state.stats.jobs_conflated += 1;
            log::debug!("conflated job {replaced} into {} for {}", pushed.id, render.key.page);
        }

        (pushed.id, token)
    }

    /// Pops the highest-priority job and marks it running.
    pub fn next_job(&self) -> Option<Job> {
        let mut state = self.state.lock();
        let job = self.queue.pop()?;
        state.stats.running += 1;
        Some(job)
    }

    pub fn complete_job(&self, job_id: JobId) {
        {
            let mut state = self.state.lock();
            state.stats.jobs_completed += 1;
            state.stats.running = state.stats.running.saturating_sub(1);
        }

        self.cancellation.unregister(job_id);
    }

    /// Cancels a queued or running job. Returns `false` for unknown ids.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let token_cancelled = self.cancellation.cancel(job_id);
        let removed = self.queue.remove_if(|job| job.id == job_id);

        if removed.is_empty() {
            // Possibly running; the token tells the worker to stop.
            return token_cancelled;
        }

        self.state.lock().stats.jobs_cancelled += removed.len() as u64;
        self.cancellation.unregister(job_id);
        true
    }

    /// Cancels queued jobs matching `predicate`. Returns how many were removed.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        let removed = self.queue.remove_if(predicate);
        if removed.is_empty() {
            return 0;
        }

        self.cancellation.cancel_many(&removed);
        for job_id in &removed {
            self.cancellation.unregister(*job_id);
        }
        self.state.lock().stats.jobs_cancelled += removed.len() as u64;

        removed.len()
    }

    /// Cancels every queued job of `page`.
    pub fn cancel_page_jobs(&self, page: PageId) -> usize {
        let cancelled = self.cancel_jobs_if(|job| job.render.page() == page);
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} queued jobs for {page}");
        }
        cancelled
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    /// True when nothing is queued and no worker holds a job.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.stats.running == 0 && self.queue.is_empty()
    }

    /// Cancels everything, queued and running.
    pub fn clear(&self) {
        let removed = self.queue.clear();
        self.cancellation.cancel_all();
        self.cancellation.clear();

        self.state.lock().stats.jobs_cancelled += removed.len() as u64;
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.state.lock().stats.clone();
        stats.queue_size = self.queue.len();
        stats
    }

    pub fn pending_jobs_list(&self) -> Vec<Job> {
        self.queue.jobs()
    }

    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagedeck_cache::ThumbnailKey;
    use pagedeck_model::{Rotation, SourceId, SourceRef};

    fn render(page: u64, generation: u64) -> RenderJob {
        RenderJob {
            key: ThumbnailKey::new(PageId(page), Rotation::Deg0, 100),
            source: SourceRef::new(SourceId(1), page as u32),
            generation,
        }
    }

    #[test]
    fn submit_run_complete() {
        let scheduler = JobScheduler::new();
        assert!(scheduler.is_idle());

        let (job_id, token) = scheduler.submit(JobPriority::Visible, render(1, 1));
        assert_eq!(scheduler.pending_jobs(), 1);
        assert!(!token.is_cancelled());

        let job = scheduler.next_job().expect("job queued");
        assert_eq!(job.id, job_id);
        assert!(!scheduler.is_idle());
        assert_eq!(scheduler.stats().running, 1);

        scheduler.complete_job(job_id);

        let stats = scheduler.stats();
        assert!(scheduler.is_idle());
        assert_eq!(stats.jobs_submitted, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.pending_jobs(), 0);
    }

    #[test]
    fn conflated_job_token_is_cancelled() {
        let scheduler = JobScheduler::new();

        let (first, first_token) = scheduler.submit(JobPriority::Visible, render(1, 1));
        let (second, second_token) = scheduler.submit(JobPriority::Visible, render(1, 2));

        assert_ne!(first, second);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert_eq!(scheduler.pending_jobs(), 1);

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_conflated, 1);
        assert_eq!(stats.pending_jobs(), 1);
    }

    #[test]
    fn cancel_queued_job() {
        let scheduler = JobScheduler::new();
        let (job_id, token) = scheduler.submit(JobPriority::Visible, render(1, 1));

        assert!(scheduler.cancel_job(job_id));
        assert!(token.is_cancelled());
        assert_eq!(scheduler.pending_jobs(), 0);
        assert_eq!(scheduler.stats().jobs_cancelled, 1);

        assert!(!scheduler.cancel_job(999));
    }

    #[test]
    fn cancel_running_job_only_flips_token() {
        let scheduler = JobScheduler::new();
        let (job_id, token) = scheduler.submit(JobPriority::Visible, render(1, 1));
        scheduler.next_job().expect("job queued");

        assert!(scheduler.cancel_job(job_id));
        assert!(token.is_cancelled());
        assert_eq!(scheduler.stats().jobs_cancelled, 0);
    }

    #[test]
    fn cancel_page_jobs_leaves_other_pages() {
        let scheduler = JobScheduler::new();
        scheduler.submit(JobPriority::Visible, render(1, 1));
        scheduler.submit(JobPriority::Background, render(2, 2));

        assert_eq!(scheduler.cancel_page_jobs(PageId(1)), 1);
        assert_eq!(scheduler.cancel_page_jobs(PageId(1)), 0);

        let remaining = scheduler.pending_jobs_list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].render.page(), PageId(2));
    }

    #[test]
    fn clear_cancels_everything() {
        let scheduler = JobScheduler::new();
        let (_, queued) = scheduler.submit(JobPriority::Visible, render(1, 1));
        let (_, running) = scheduler.submit(JobPriority::Visible, render(2, 2));
        scheduler.next_job().expect("job queued");

        scheduler.clear();

        assert!(queued.is_cancelled());
        assert!(running.is_cancelled());
        assert!(!scheduler.has_pending_jobs());
    }
}
