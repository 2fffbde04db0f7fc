//! Priority queue of pending render jobs.
//!
//! Jobs pop in priority order, FIFO within a priority. Pushing a job whose
//! thumbnail key is already queued replaces the queued job instead of adding
//! a second one.

use pagedeck_cache::ThumbnailKey;
use pagedeck_model::{PageId, SourceRef};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Pages outside the visible range.
    Background = 0,
    Visible = 1,
}

pub type JobId = u64;

/// What a worker has to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderJob {
    pub key: ThumbnailKey,
    pub source: SourceRef,
    pub generation: u64,
}

impl RenderJob {
    pub fn page(&self) -> PageId {
        self.key.page
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub render: RenderJob,
    insertion_order: u64,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: higher priority first, then earlier insertion.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.insertion_order.cmp(&self.insertion_order))
    }
}

/// Outcome of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pushed {
    pub id: JobId,
    /// Queued job with the same key that this push replaced.
    pub replaced: Option<JobId>,
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<Job>,
    last_job_id: JobId,
    insertion_counter: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `render`, conflating with a queued job for the same key.
    ///
    /// The surviving job keeps the higher of the two priorities.
    pub fn push(&self, priority: JobPriority, render: RenderJob) -> Pushed {
        let mut state = self.state.lock();

        let mut replaced = None;
        let mut priority = priority;
        if state.heap.iter().any(|job| job.render.key == render.key) {
            let mut remaining = Vec::with_capacity(state.heap.len());
            for job in state.heap.drain() {
                if job.render.key == render.key {
                    priority = priority.max(job.priority);
                    replaced = Some(job.id);
                } else {
                    remaining.push(job);
                }
            }
            state.heap = remaining.into();
        }

        state.last_job_id += 1;
        let id = state.last_job_id;
        let insertion_order = state.insertion_counter;
        state.insertion_counter += 1;

        state.heap.push(Job { id, priority, render, insertion_order });

        Pushed { id, replaced }
    }

    pub fn pop(&self) -> Option<Job> {
        self.state.lock().heap.pop()
    }

    pub fn peek(&self) -> Option<Job> {
        self.state.lock().heap.peek().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    pub fn clear(&self) -> Vec<JobId> {
        self.state.lock().heap.drain().map(|job| job.id).collect()
    }

    /// Removes matching jobs and returns their ids.
    pub fn remove_if<F>(&self, predicate: F) -> Vec<JobId>
    where
        F: Fn(&Job) -> bool,
    {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        let mut remaining = Vec::with_capacity(state.heap.len());

        for job in state.heap.drain() {
            if predicate(&job) {
                removed.push(job.id);
            } else {
                remaining.push(job);
            }
        }

        state.heap = remaining.into();
        removed
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().heap.iter().cloned().collect()
    }
}
