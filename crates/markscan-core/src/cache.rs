//! Batch-scoped pixel-buffer cache.
//!
//! Decoding a full-resolution page dominates warp cost, so a grading batch
//! decodes each source once and shares the buffer between every region
//! warped from it. The cache is an explicit object owned by the batch; call
//! [`PixelCache::clear`] at batch boundaries.

use crate::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Stable identifier of a source image (path, URL, content hash, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(pub String);

impl ImageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Slot = Mutex<Option<Arc<RgbaImage>>>;

#[derive(Default)]
struct CacheState {
    slots: HashMap<ImageKey, Arc<Slot>>,
    // Least recently used at the front.
    order: VecDeque<ImageKey>,
}

impl CacheState {
    fn touch(&mut self, key: &ImageKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.order.len() > capacity {
            if let Some(old) = self.order.pop_front() {
                self.slots.remove(&old);
            }
        }
    }
}

/// LRU cache of decoded pixel buffers with compute-once population.
///
/// Concurrent callers asking for the same key block on a per-key slot, so
/// the loader runs once; readers of a populated entry only clone an `Arc`.
pub struct PixelCache {
    capacity: usize,
    state: Mutex<CacheState>,
    loads: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PixelCache {
    /// Create a cache holding at most `capacity` images (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently tracked (including ones still loading).
    pub fn len(&self) -> usize {
        lock(&self.state).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times a loader actually ran.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Return a populated entry without loading.
    pub fn get(&self, key: &ImageKey) -> Option<Arc<RgbaImage>> {
        let slot = {
            let mut state = lock(&self.state);
            let slot = state.slots.get(key).cloned()?;
            state.touch(key);
            slot
        };
        let guard = lock(&slot);
        guard.clone()
    }

    /// Return the cached buffer for `key`, running `load` once if absent.
    ///
    /// A failed load leaves the entry empty so a later call can retry.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &ImageKey,
        load: impl FnOnce() -> Result<RgbaImage, E>,
    ) -> Result<Arc<RgbaImage>, E> {
        let slot = {
            let mut state = lock(&self.state);
            let slot = state
                .slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone();
            state.touch(key);
            state.evict_to(self.capacity);
            slot
        };

        let mut guard = lock(&slot);
        if let Some(img) = guard.as_ref() {
            return Ok(Arc::clone(img));
        }
        self.loads.fetch_add(1, Ordering::Relaxed);
        log::debug!("pixel cache miss: {key}");
        let img = Arc::new(load()?);
        *guard = Some(Arc::clone(&img));
        Ok(img)
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &ImageKey) {
        let mut state = lock(&self.state);
        state.slots.remove(key);
        state.order.retain(|k| k != key);
    }

    /// Drop everything; call between batches.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.slots.clear();
        state.order.clear();
    }
}

impl Default for PixelCache {
    fn default() -> Self {
        Self::new(8)
    }
}

impl fmt::Debug for PixelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("loads", &self.load_count())
            .finish()
    }
}
