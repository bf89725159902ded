//! The load coordinator: the one place hosts ask for pixels.
//!
//! Lookups go memory cache, then disk store, then decoder. Decodes are
//! throttled by two semaphores, one for standard formats and a wider one for
//! raw files (their work is mostly I/O bound preview extraction). Preloads
//! run as a single cancellable background task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::{self, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::animation::FrameSequence;
use crate::config::{core_count, Config, PipelineConfig};
use crate::decoder::{Bitmap, ImageKind, ImageSource};
use crate::error::{ConfigError, DecodeError};
use crate::state::{CacheStore, MemoryCache, MemoryStats};

/// Smallest batch for [`LoadCoordinator::load_thumbnail_batch`]
const MIN_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Variant {
    Thumbnail,
    Full,
}

/// Memory cache key: the same path is cached once per variant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: PathBuf,
    variant: Variant,
}

impl CacheKey {
    fn thumbnail(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            variant: Variant::Thumbnail,
        }
    }

    fn full(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            variant: Variant::Full,
        }
    }
}

/// How a preload task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadOutcome {
    Completed { loaded: usize, skipped: usize },
    Cancelled,
}

/// Combined view of both cache tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub disk_count: u64,
    pub disk_bytes: u64,
    pub mem_count: usize,
    pub mem_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired: usize,
    pub evicted: usize,
}

struct PreloadTask {
    token: CancellationToken,
    handle: JoinHandle<PreloadOutcome>,
}

struct Inner {
    config: PipelineConfig,
    store: Option<Arc<CacheStore>>,
    source: Arc<dyn ImageSource>,
    memory: MemoryCache<CacheKey, Bitmap>,
    standard_slots: Semaphore,
    raw_slots: Semaphore,
    loading: watch::Sender<usize>,
    preload: Mutex<Option<PreloadTask>>,
}

impl Inner {
    fn slots(&self, kind: ImageKind) -> &Semaphore {
        if kind.is_raw() {
            &self.raw_slots
        } else {
            &self.standard_slots
        }
    }

    fn thumbnail_blocking(&self, path: &Path) -> Result<RgbaImage, DecodeError> {
        let max_size = self.config.thumbnail_size;
        match &self.store {
            Some(store) => Ok(store.get_or_create(path, self.source.as_ref(), max_size)?.image),
            None => self.source.decode_thumbnail(path, max_size),
        }
    }
}

/// Counts one in-flight load for as long as it lives
struct LoadingGuard<'a>(&'a watch::Sender<usize>);

impl<'a> LoadingGuard<'a> {
    fn new(loading: &'a watch::Sender<usize>) -> Self {
        loading.send_modify(|count| *count += 1);
        Self(loading)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Estimated memory cost of a bitmap
fn bitmap_cost(bitmap: &RgbaImage) -> usize {
    bitmap.width() as usize * bitmap.height() as usize * 4
}

/// Cheap to clone handle; all clones share caches, slots and the preload task
#[derive(Clone)]
pub struct LoadCoordinator {
    inner: Arc<Inner>,
}

impl LoadCoordinator {
    /// Build a coordinator. Without a store, thumbnails are decoded directly.
    pub fn new(
        config: &Config,
        store: Option<Arc<CacheStore>>,
        source: Arc<dyn ImageSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = config.pipeline.clone();
        let (loading, _) = watch::channel(0);

        log::info!(
            "⚙️ Load coordinator: {} standard / {} raw decode slots, {} item memory cache",
            pipeline.standard_slots(),
            pipeline.raw_slots(),
            pipeline.memory_max_items
        );
        Ok(Self {
            inner: Arc::new(Inner {
                memory: MemoryCache::new(pipeline.memory_max_items, pipeline.memory_max_bytes),
                standard_slots: Semaphore::new(pipeline.standard_slots()),
                raw_slots: Semaphore::new(pipeline.raw_slots()),
                config: pipeline,
                store,
                source,
                loading,
                preload: Mutex::new(None),
            }),
        })
    }

    /// Thumbnail for `path`, or `None` if it can't be decoded
    pub async fn load_thumbnail(&self, path: &Path) -> Option<Bitmap> {
        let key = CacheKey::thumbnail(path);
        if let Some(hit) = self.inner.memory.try_get(&key) {
            log::trace!("Memory hit {}", path.display());
            return Some(hit);
        }

        let Some(kind) = ImageKind::from_path(path) else {
            log::debug!("Skipping unsupported file {}", path.display());
            return None;
        };
        let _permit = self.inner.slots(kind).acquire().await.ok()?;
        let _loading = LoadingGuard::new(&self.inner.loading);

        // Another caller may have finished this one while we waited
        if self.inner.memory.contains(&key) {
            return self.inner.memory.try_get(&key);
        }

        let inner = Arc::clone(&self.inner);
        let owned = path.to_path_buf();
        let image = finish(
            path,
            task::spawn_blocking(move || inner.thumbnail_blocking(&owned)).await,
        )?;

        let bitmap: Bitmap = Arc::new(image);
        self.inner
            .memory
            .insert(key, Arc::clone(&bitmap), bitmap_cost(&bitmap));
        Some(bitmap)
    }

    /// Full-size image for the viewer. Memory cached, never stored on disk.
    pub async fn load_full_image(&self, path: &Path) -> Option<Bitmap> {
        let key = CacheKey::full(path);
        if let Some(hit) = self.inner.memory.try_get(&key) {
            return Some(hit);
        }

        let kind = ImageKind::from_path(path)?;
        let _permit = self.inner.slots(kind).acquire().await.ok()?;
        let _loading = LoadingGuard::new(&self.inner.loading);

        let source = Arc::clone(&self.inner.source);
        let owned = path.to_path_buf();
        let image = finish(
            path,
            task::spawn_blocking(move || source.decode_full(&owned)).await,
        )?;

        let bitmap: Bitmap = Arc::new(image);
        self.inner
            .memory
            .insert(key, Arc::clone(&bitmap), bitmap_cost(&bitmap));
        Some(bitmap)
    }

    /// Every frame of an animated image (a still image yields one frame)
    pub async fn load_animated(&self, path: &Path) -> Option<FrameSequence> {
        let kind = ImageKind::from_path(path)?;
        let _permit = self.inner.slots(kind).acquire().await.ok()?;
        let _loading = LoadingGuard::new(&self.inner.loading);

        let source = Arc::clone(&self.inner.source);
        let owned = path.to_path_buf();
        finish(
            path,
            task::spawn_blocking(move || source.decode_animation(&owned)).await,
        )
    }

    /// Replace the running preload with one over the first `priority_count`
    /// paths. The previous preload is cancelled and awaited first.
    pub async fn preload_intelligent(&self, paths: Vec<PathBuf>, priority_count: usize) {
        let mut slot = self.inner.preload.lock().await;
        if let Some(previous) = slot.take() {
            previous.token.cancel();
            let _ = previous.handle.await;
        }

        let paths: Vec<PathBuf> = paths.into_iter().take(priority_count).collect();
        log::debug!("Preloading {} thumbnails", paths.len());

        let token = CancellationToken::new();
        let coordinator = self.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(async move { coordinator.run_preload(paths, task_token).await });
        *slot = Some(PreloadTask { token, handle });
    }

    async fn run_preload(&self, paths: Vec<PathBuf>, token: CancellationToken) -> PreloadOutcome {
        let (mut loaded, mut skipped) = (0, 0);
        for path in paths {
            if token.is_cancelled() {
                log::debug!("Preload cancelled after {} thumbnails", loaded);
                return PreloadOutcome::Cancelled;
            }
            if self.inner.memory.contains(&CacheKey::thumbnail(&path)) {
                skipped += 1;
                continue;
            }
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("Preload cancelled after {} thumbnails", loaded);
                    return PreloadOutcome::Cancelled;
                }
                bitmap = self.load_thumbnail(&path) => {
                    if bitmap.is_some() {
                        loaded += 1;
                    }
                }
            }
        }
        log::debug!("Preload done: {} loaded, {} already cached", loaded, skipped);
        PreloadOutcome::Completed { loaded, skipped }
    }

    /// Cancel the running preload and wait for it to stop
    pub async fn cancel_preload(&self) -> Option<PreloadOutcome> {
        let task = self.inner.preload.lock().await.take()?;
        task.token.cancel();
        task.handle.await.ok()
    }

    /// Wait for the running preload to finish on its own
    pub async fn wait_for_preload(&self) -> Option<PreloadOutcome> {
        let task = self.inner.preload.lock().await.take()?;
        task.handle.await.ok()
    }

    /// Load many thumbnails, reporting `(done, total)` after each one.
    /// Results are in input order.
    pub async fn load_thumbnail_batch(
        &self,
        paths: &[PathBuf],
        mut progress: impl FnMut(usize, usize),
    ) -> Vec<Option<Bitmap>> {
        let total = paths.len();
        let batch_size = (core_count() * 3).max(MIN_BATCH_SIZE);
        let mut results: Vec<Option<Bitmap>> = vec![None; total];
        let mut done = 0;

        for (batch, chunk) in paths.chunks(batch_size).enumerate() {
            let base = batch * batch_size;
            let mut set = JoinSet::new();
            for (i, path) in chunk.iter().enumerate() {
                let coordinator = self.clone();
                let path = path.clone();
                set.spawn(async move { (base + i, coordinator.load_thumbnail(&path).await) });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, bitmap)) => results[index] = bitmap,
                    Err(e) => log::warn!("Thumbnail task failed: {}", e),
                }
                done += 1;
                progress(done, total);
            }
        }
        results
    }

    pub async fn cache_statistics(&self) -> CacheStatistics {
        let memory = self.inner.memory.stats();
        let mut stats = CacheStatistics {
            mem_count: memory.count,
            mem_bytes: memory.bytes,
            ..CacheStatistics::default()
        };
        if let Some(store) = self.inner.store.clone() {
            match task::spawn_blocking(move || store.statistics()).await {
                Ok(Ok(disk)) => {
                    stats.disk_count = disk.entry_count;
                    stats.disk_bytes = disk.blob_bytes;
                }
                Ok(Err(e)) => log::warn!("Failed to read store statistics: {}", e),
                Err(e) => log::warn!("Statistics task failed: {}", e),
            }
        }
        stats
    }

    /// Expire old entries, then trim the store to its size budget
    pub async fn cleanup_cache(&self) -> CleanupReport {
        let Some(store) = self.inner.store.clone() else {
            return CleanupReport::default();
        };
        let result = task::spawn_blocking(move || {
            let mut report = CleanupReport::default();
            match store.clear_expired() {
                Ok(expired) => report.expired = expired,
                Err(e) => log::warn!("Expiry sweep failed: {}", e),
            }
            match store.clear_oversized() {
                Ok(evicted) => report.evicted = evicted,
                Err(e) => log::warn!("Size sweep failed: {}", e),
            }
            report
        })
        .await;
        result.unwrap_or_else(|e| {
            log::warn!("Cleanup task failed: {}", e);
            CleanupReport::default()
        })
    }

    pub fn clear_memory_cache(&self) {
        self.inner.memory.clear();
        log::debug!("Memory cache cleared");
    }

    /// Forget everything cached for `path`, e.g. after it changed on disk
    pub async fn invalidate(&self, path: &Path) {
        self.inner.memory.remove(&CacheKey::thumbnail(path));
        self.inner.memory.remove(&CacheKey::full(path));

        if let Some(store) = self.inner.store.clone() {
            let owned = path.to_path_buf();
            match task::spawn_blocking(move || store.remove(&owned)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::warn!("Failed to invalidate {}: {}", path.display(), e),
                Err(e) => log::warn!("Invalidate task failed: {}", e),
            }
        }
    }

    /// Whether a thumbnail for `path` is in memory right now
    pub fn is_thumbnail_cached(&self, path: &Path) -> bool {
        self.inner.memory.contains(&CacheKey::thumbnail(path))
    }

    /// Receiver for the number of loads currently in flight
    pub fn subscribe_loading(&self) -> watch::Receiver<usize> {
        self.inner.loading.subscribe()
    }

    pub fn loading_count(&self) -> usize {
        *self.inner.loading.borrow()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.inner.memory.stats()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }
}

/// Collapse a blocking decode result, logging why it failed
fn finish<T>(path: &Path, joined: Result<Result<T, DecodeError>, task::JoinError>) -> Option<T> {
    match joined {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            log::debug!("Failed to load {}: {}", path.display(), e);
            None
        }
        Err(e) => {
            log::warn!("Decode task for {} failed: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StoreConfig;
    use crate::testing::{write_jpeg, CountingSource};
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba};
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn config() -> Config {
        let mut config = Config::default();
        config.pipeline.thumbnail_size = 128;
        config
    }

    fn with_store(dir: &TempDir, source: Arc<CountingSource>) -> LoadCoordinator {
        let store =
            CacheStore::open(&dir.path().join("thumbs.db"), StoreConfig::default()).unwrap();
        LoadCoordinator::new(&config(), Some(Arc::new(store)), source).unwrap()
    }

    fn photos(dir: &TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| write_jpeg(dir.path(), &format!("photo_{i:02}.jpg"), 320, 240))
            .collect()
    }

    #[tokio::test]
    async fn repeated_loads_decode_once() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::new());
        let coordinator = with_store(&dir, Arc::clone(&source));
        let photo = write_jpeg(dir.path(), "a.jpg", 640, 480);

        let first = coordinator.load_thumbnail(&photo).await.unwrap();
        let second = coordinator.load_thumbnail(&photo).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.dimensions(), (128, 96));

        // Memory gone: the disk store still answers
        coordinator.clear_memory_cache();
        let third = coordinator.load_thumbnail(&photo).await.unwrap();
        assert_eq!(third.dimensions(), (128, 96));
        assert_eq!(source.thumbnail_calls(), 1);

        let stats = coordinator.cache_statistics().await;
        assert_eq!((stats.disk_count, stats.mem_count), (1, 1));
        assert_eq!(stats.mem_bytes, 128 * 96 * 4);
    }

    #[tokio::test]
    async fn works_without_a_store() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::new());
        let coordinator = LoadCoordinator::new(&config(), None, source.clone()).unwrap();
        let photo = write_jpeg(dir.path(), "a.jpg", 300, 300);

        assert!(coordinator.load_thumbnail(&photo).await.is_some());
        assert!(coordinator.is_thumbnail_cached(&photo));
        assert_eq!(coordinator.cache_statistics().await.disk_count, 0);
        assert_eq!(coordinator.cleanup_cache().await, CleanupReport::default());
    }

    #[tokio::test]
    async fn failures_become_none_and_release_slots() {
        let dir = tempdir().unwrap();
        let coordinator = with_store(&dir, Arc::new(CountingSource::new()));

        let corrupt = dir.path().join("broken.jpg");
        fs::write(&corrupt, b"not a jpeg").unwrap();
        assert!(coordinator.load_thumbnail(&corrupt).await.is_none());
        assert!(coordinator.load_thumbnail(&dir.path().join("missing.png")).await.is_none());
        assert!(coordinator.load_thumbnail(&dir.path().join("notes.txt")).await.is_none());

        assert_eq!(coordinator.loading_count(), 0);
        let slots = coordinator.config().standard_slots();
        assert_eq!(coordinator.inner.standard_slots.available_permits(), slots);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.pipeline.thumbnail_size = 0;
        let result = LoadCoordinator::new(&config, None, Arc::new(CountingSource::new()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn full_images_are_cached_separately() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::new());
        let coordinator = with_store(&dir, Arc::clone(&source));
        let photo = write_jpeg(dir.path(), "a.jpg", 640, 480);

        let thumb = coordinator.load_thumbnail(&photo).await.unwrap();
        let full = coordinator.load_full_image(&photo).await.unwrap();
        assert_eq!(thumb.dimensions(), (128, 96));
        assert_eq!(full.dimensions(), (640, 480));

        coordinator.load_full_image(&photo).await.unwrap();
        assert_eq!(source.full_calls(), 1);
        assert_eq!(coordinator.cache_statistics().await.disk_count, 1);
    }

    #[tokio::test]
    async fn animated_gif_yields_frames() {
        let dir = tempdir().unwrap();
        let coordinator = with_store(&dir, Arc::new(CountingSource::new()));
        let path = dir.path().join("spin.gif");
        {
            let file = fs::File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            for shade in [0u8, 128, 255] {
                let frame = Frame::from_parts(
                    RgbaImage::from_pixel(8, 8, Rgba([shade, 0, 0, 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(50, 1),
                );
                encoder.encode_frame(frame).unwrap();
            }
        }

        let frames = coordinator.load_animated(&path).await.unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.is_animated());
    }

    #[tokio::test]
    async fn preload_loads_only_priority_paths() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::new());
        let coordinator = with_store(&dir, Arc::clone(&source));
        let paths = photos(&dir, 5);

        coordinator.load_thumbnail(&paths[0]).await.unwrap();
        coordinator.preload_intelligent(paths.clone(), 3).await;
        let outcome = coordinator.wait_for_preload().await;

        assert_eq!(outcome, Some(PreloadOutcome::Completed { loaded: 2, skipped: 1 }));
        assert!(paths[..3].iter().all(|p| coordinator.is_thumbnail_cached(p)));
        assert!(!coordinator.is_thumbnail_cached(&paths[3]));
        assert_eq!(source.thumbnail_calls(), 3);
    }

    #[tokio::test]
    async fn new_preload_cancels_the_previous_one() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(100)));
        let coordinator = with_store(&dir, Arc::clone(&source));
        let paths = photos(&dir, 12);

        coordinator.preload_intelligent(paths[..10].to_vec(), 10).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.preload_intelligent(paths[10..].to_vec(), 2).await;

        assert_eq!(
            coordinator.wait_for_preload().await,
            Some(PreloadOutcome::Completed { loaded: 2, skipped: 0 })
        );
        // The first preload stopped long before walking all ten
        assert!(source.thumbnail_calls() < 12);
    }

    #[tokio::test]
    async fn cancelled_preload_reports_cancelled() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(100)));
        let coordinator = with_store(&dir, source);
        let paths = photos(&dir, 10);

        coordinator.preload_intelligent(paths, 10).await;
        assert_eq!(coordinator.cancel_preload().await, Some(PreloadOutcome::Cancelled));
        assert_eq!(coordinator.cancel_preload().await, None);
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_reports_progress() {
        let dir = tempdir().unwrap();
        let coordinator = with_store(&dir, Arc::new(CountingSource::new()));
        let mut paths = photos(&dir, 4);
        paths.insert(2, dir.path().join("missing.jpg"));

        let mut reports = Vec::new();
        let results = coordinator
            .load_thumbnail_batch(&paths, |done, total| reports.push((done, total)))
            .await;

        assert_eq!(results.len(), 5);
        assert!(results[2].is_none());
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 4);
        assert_eq!(reports.len(), 5);
        assert_eq!(reports.last(), Some(&(5, 5)));
    }

    #[tokio::test]
    async fn invalidate_drops_every_tier() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::new());
        let coordinator = with_store(&dir, Arc::clone(&source));
        let photo = write_jpeg(dir.path(), "a.jpg", 320, 240);

        coordinator.load_thumbnail(&photo).await.unwrap();
        coordinator.load_full_image(&photo).await.unwrap();
        coordinator.invalidate(&photo).await;

        assert!(!coordinator.is_thumbnail_cached(&photo));
        assert_eq!(coordinator.cache_statistics().await, CacheStatistics::default());

        coordinator.load_thumbnail(&photo).await.unwrap();
        assert_eq!(source.thumbnail_calls(), 2);
    }

    #[tokio::test]
    async fn loading_count_tracks_in_flight_work() {
        let dir = tempdir().unwrap();
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(200)));
        let coordinator = with_store(&dir, source);
        let photo = write_jpeg(dir.path(), "slow.jpg", 64, 64);
        let mut loading = coordinator.subscribe_loading();

        let background = coordinator.clone();
        let handle = tokio::spawn(async move { background.load_thumbnail(&photo).await });

        loading.changed().await.unwrap();
        assert_eq!(*loading.borrow_and_update(), 1);
        assert!(handle.await.unwrap().is_some());
        assert_eq!(coordinator.loading_count(), 0);
    }

    #[tokio::test]
    async fn cleanup_on_fresh_store_removes_nothing() {
        let dir = tempdir().unwrap();
        let coordinator = with_store(&dir, Arc::new(CountingSource::new()));
        let paths = photos(&dir, 3);
        coordinator.load_thumbnail_batch(&paths, |_, _| {}).await;

        assert_eq!(coordinator.cleanup_cache().await, CleanupReport::default());
        assert_eq!(coordinator.cache_statistics().await.disk_count, 3);
    }
}
