use crate::frame::{PixelImage, VideoFrame};
use crate::segmentation::RequestId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// A frame waiting for its segmentation result
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Downscaled image that was submitted to the segmenter
    pub resized: PixelImage,
    /// The captured frame, emitted as fallback or used for timing metadata
    pub original: VideoFrame,
    /// Stream time at which the request was made
    pub submitted_at: Duration,
}

/// Correlates in-flight segmentation requests with their captured frames
///
/// Safe for concurrent inserts from the capture thread and takes from
/// result callbacks.
#[derive(Debug, Default)]
pub struct InFlightCache {
    entries: Mutex<HashMap<RequestId, CacheEntry>>,
}

impl InFlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry; `key` is expected to be fresh
    pub fn insert(&self, key: RequestId, entry: CacheEntry) {
        if self.entries.lock().insert(key, entry).is_some() {
            tracing::warn!("Request {} was already in flight; previous frame replaced", key);
        }
    }

    /// Remove and return the entry for `key`, if any
    pub fn take(&self, key: RequestId) -> Option<CacheEntry> {
        self.entries.lock().remove(&key)
    }

    /// Drop entries submitted more than `max_age` before `now`
    ///
    /// Returns how many entries were evicted.
    pub fn evict_stale(&self, now: Duration, max_age: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_sub(entry.submitted_at) <= max_age);
        before - entries.len()
    }

    /// Abandon every in-flight entry
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
