//! Thumbnail cache for the page editor.
//!
//! In-memory, memory-bounded LRU storage of rendered page thumbnails with
//! generation-stamped, last-writer-wins updates.

pub mod thumbnail;

pub use thumbnail::{ApplyOutcome, CacheStats, CachedThumbnail, ThumbnailCache, ThumbnailKey};
