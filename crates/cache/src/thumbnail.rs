//! Page thumbnail cache with stamped writes and LRU eviction.
//!
//! Entries are keyed by page, rotation and target width. Every write carries
//! the generation of the request that produced it; a write older than the
//! entry it would replace is rejected, so late results from superseded renders
//! can never overwrite newer pixels.

use pagedeck_model::{PageId, Rotation};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Identifies one rendered thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    pub page: PageId,
    pub rotation: Rotation,
    /// Target width in pixels.
    pub width: u32,
}

impl ThumbnailKey {
    pub fn new(page: PageId, rotation: Rotation, width: u32) -> Self {
        Self { page, rotation, width }
    }
}

/// Rendered thumbnail pixels (RGBA, row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedThumbnail {
    pub key: ThumbnailKey,
    /// Generation of the render request that produced these pixels.
    pub generation: u64,
    pub pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl CachedThumbnail {
    pub fn new(key: ThumbnailKey, generation: u64, pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self { key, generation, pixels: pixels.into(), width, height }
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Result of offering a rendered thumbnail to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Stored,
    /// An entry with a newer generation is already cached.
    Stale { current: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub memory_used: usize,
    pub memory_limit: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejected_stale: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: HashMap<ThumbnailKey, Arc<CachedThumbnail>>,
    lru_queue: VecDeque<ThumbnailKey>,
    memory_used: usize,
    memory_limit: usize,
    stats: CacheStats,
}

impl CacheState {
    fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats { memory_limit, ..Default::default() },
        }
    }

    fn touch(&mut self, key: ThumbnailKey) {
        self.lru_queue.retain(|&k| k != key);
        self.lru_queue.push_back(key);
    }

    fn detach(&mut self, key: &ThumbnailKey) -> Option<Arc<CachedThumbnail>> {
        let entry = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
        self.lru_queue.retain(|k| k != key);
        self.sync_stats();
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.lru_queue.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
            self.stats.evictions += 1;
            self.sync_stats();
        }
        true
    }

    fn evict_to_fit(&mut self, required_size: usize) {
        while self.memory_used + required_size > self.memory_limit && !self.entries.is_empty() {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Shared thumbnail cache. Clones share the same storage.
#[derive(Clone)]
pub struct ThumbnailCache {
    state: Arc<Mutex<CacheState>>,
}

impl ThumbnailCache {
    pub fn new(memory_limit: usize) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new(memory_limit))) }
    }

    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    /// Stores `thumbnail` unless the cached entry for its key is newer.
    ///
    /// Equal generations replace the entry, so re-applying a result is
    /// idempotent.
    pub fn apply(&self, thumbnail: CachedThumbnail) -> ApplyOutcome {
        let mut state = self.state.lock();
        let key = thumbnail.key;

        if let Some(existing) = state.entries.get(&key) {
            if existing.generation > thumbnail.generation {
                let current = existing.generation;
                state.stats.rejected_stale += 1;
                log::debug!(
                    "rejected stale thumbnail for {} (generation {} < {current})",
                    key.page,
                    thumbnail.generation
                );
                return ApplyOutcome::Stale { current };
            }
        }

        state.detach(&key);
        let size = thumbnail.memory_size();
        state.evict_to_fit(size);

        state.memory_used += size;
        state.entries.insert(key, Arc::new(thumbnail));
        state.touch(key);
        state.sync_stats();

        ApplyOutcome::Stored
    }

    pub fn get(&self, key: &ThumbnailKey) -> Option<Arc<CachedThumbnail>> {
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get(key).cloned() {
            state.touch(*key);
            state.stats.hits += 1;
            Some(entry)
        } else {
            state.stats.misses += 1;
            None
        }
    }

    pub fn contains(&self, key: &ThumbnailKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Generation of the cached entry for `key`, if any.
    pub fn stamp(&self, key: &ThumbnailKey) -> Option<u64> {
        self.state.lock().entries.get(key).map(|entry| entry.generation)
    }

    pub fn remove(&self, key: &ThumbnailKey) -> Option<Arc<CachedThumbnail>> {
        self.state.lock().detach(key)
    }

    /// Drops every entry of `page`. Returns how many were removed.
    pub fn invalidate_page(&self, page: PageId) -> usize {
        self.retain_for_page(page, |_| false)
    }

    /// Drops entries of `key.page` whose rotation or width differ from `key`.
    pub fn evict_stale(&self, key: &ThumbnailKey) -> usize {
        self.retain_for_page(key.page, |candidate| candidate == key)
    }

    fn retain_for_page(&self, page: PageId, keep: impl Fn(&ThumbnailKey) -> bool) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<ThumbnailKey> =
            state.entries.keys().filter(|key| key.page == page && !keep(key)).copied().collect();

        for key in &doomed {
            state.detach(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    pub fn set_memory_limit(&self, new_limit: usize) {
        let mut state = self.state.lock();
        state.memory_limit = new_limit;
        state.stats.memory_limit = new_limit;

        if state.memory_used > new_limit {
            state.evict_to_fit(0);
        }
    }

    pub fn memory_limit(&self) -> usize {
        self.state.lock().memory_limit
    }

    pub fn memory_used(&self) -> usize {
        self.state.lock().memory_used
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::with_mb_limit(64)
    }
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_BYTES: usize = 64 * 64 * 4;

    fn key(page: u64) -> ThumbnailKey {
        ThumbnailKey::new(PageId(page), Rotation::Deg0, 64)
    }

    fn thumb(key: ThumbnailKey, generation: u64, fill: u8) -> CachedThumbnail {
        CachedThumbnail::new(key, generation, vec![fill; ENTRY_BYTES], 64, 64)
    }

    #[test]
    fn test_basic_apply_get() {
        let cache = ThumbnailCache::new(1024 * 1024);

        assert_eq!(cache.apply(thumb(key(1), 1, 7)), ApplyOutcome::Stored);

        let entry = cache.get(&key(1)).expect("entry should be cached");
        assert_eq!(entry.key, key(1));
        assert_eq!(entry.generation, 1);
        assert_eq!(entry.pixels[0], 7);
        assert_eq!((entry.width, entry.height), (64, 64));
    }

    #[test]
    fn test_older_generation_is_rejected() {
        let cache = ThumbnailCache::new(1024 * 1024);

        cache.apply(thumb(key(1), 5, 5));
        let outcome = cache.apply(thumb(key(1), 3, 3));

        assert_eq!(outcome, ApplyOutcome::Stale { current: 5 });
        assert_eq!(cache.get(&key(1)).expect("cached").pixels[0], 5);
        assert_eq!(cache.stats().rejected_stale, 1);
    }

    #[test]
    fn test_newer_or_equal_generation_replaces() {
        let cache = ThumbnailCache::new(1024 * 1024);

        cache.apply(thumb(key(1), 2, 2));
        assert_eq!(cache.apply(thumb(key(1), 2, 9)), ApplyOutcome::Stored);
        assert_eq!(cache.apply(thumb(key(1), 4, 4)), ApplyOutcome::Stored);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stamp(&key(1)), Some(4));
        assert_eq!(cache.memory_used(), ENTRY_BYTES);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ThumbnailCache::new(1024 * 1024);

        assert!(cache.get(&key(999)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_lru_ordering() {
        let cache = ThumbnailCache::new(2 * ENTRY_BYTES);

        cache.apply(thumb(key(1), 1, 0));
        cache.apply(thumb(key(2), 1, 0));
        assert!(cache.get(&key(1)).is_some());

        cache.apply(thumb(key(3), 1, 0));

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_page_drops_all_variants() {
        let cache = ThumbnailCache::new(1024 * 1024);
        let upright = key(1);
        let sideways = ThumbnailKey::new(PageId(1), Rotation::Deg90, 64);

        cache.apply(thumb(upright, 1, 0));
        cache.apply(thumb(sideways, 2, 0));
        cache.apply(thumb(key(2), 1, 0));

        assert_eq!(cache.invalidate_page(PageId(1)), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(2)));
    }

    #[test]
    fn test_evict_stale_keeps_current_key_only() {
        let cache = ThumbnailCache::new(1024 * 1024);
        let upright = key(1);
        let sideways = ThumbnailKey::new(PageId(1), Rotation::Deg90, 64);
        let wide = ThumbnailKey::new(PageId(1), Rotation::Deg90, 128);

        cache.apply(thumb(upright, 1, 0));
        cache.apply(thumb(sideways, 2, 0));
        cache.apply(thumb(wide, 3, 0));

        assert_eq!(cache.evict_stale(&sideways), 2);
        assert!(cache.contains(&sideways));
        assert!(!cache.contains(&upright));
        assert!(!cache.contains(&wide));
    }

    #[test]
    fn test_memory_tracking_and_clear() {
        let cache = ThumbnailCache::new(1024 * 1024);

        cache.apply(thumb(key(1), 1, 0));
        cache.apply(thumb(key(2), 1, 0));
        assert_eq!(cache.memory_used(), ENTRY_BYTES * 2);

        cache.remove(&key(1));
        assert_eq!(cache.memory_used(), ENTRY_BYTES);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().memory_used, 0);
    }

    #[test]
    fn test_set_memory_limit_evicts() {
        let cache = ThumbnailCache::new(1024 * 1024);
        for page in 0..3 {
            cache.apply(thumb(key(page), 1, 0));
        }

        cache.set_memory_limit(2 * ENTRY_BYTES);

        assert_eq!(cache.len(), 2);
        assert!(cache.memory_used() <= 2 * ENTRY_BYTES);
        assert!(!cache.contains(&key(0)));
    }

    #[test]
    fn test_memory_stays_bounded_for_many_pages() {
        let cache = ThumbnailCache::new(20 * ENTRY_BYTES);

        for page in 0..500 {
            cache.apply(thumb(key(page), 1, 0));
        }

        let stats = cache.stats();
        assert!(stats.memory_used <= 20 * ENTRY_BYTES);
        assert_eq!(stats.entry_count, 20);
        assert_eq!(stats.evictions, 480);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = ThumbnailCache::default();
        let other = cache.clone();

        other.apply(thumb(key(1), 1, 0));

        assert!(cache.contains(&key(1)));
        assert_eq!(cache.memory_limit(), 64 * 1024 * 1024);
    }
}
