use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::entry::{content_hash, modified_millis, now_millis, path_key, CacheEntry};
use crate::config::PipelineConfig;
use crate::decoder::{classify, ImageSource};
use crate::error::{DecodeError, StoreError};

/// Idle reader connections kept around for reuse
const MAX_IDLE_READERS: usize = 8;

/// How long a connection waits on a locked database
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Budgets for the persistent store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub max_bytes: u64,
    pub expiry: Duration,
    pub blob_quality: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for StoreConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_bytes: config.disk_max_bytes,
            expiry: config.expiry(),
            blob_quality: config.blob_quality,
        }
    }
}

/// A thumbnail served by the store, with its metadata row
#[derive(Debug, Clone)]
pub struct CachedThumbnail {
    pub entry: CacheEntry,
    pub image: RgbaImage,
    /// False when the thumbnail was decoded by this call
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub entry_count: u64,
    pub blob_bytes: u64,
}

/// The persistent thumbnail cache.
///
/// One SQLite file holds both the `entries` metadata table and the
/// content-addressed `blobs` table. Writes go through a single connection;
/// reads use pooled connections so WAL lets them proceed during a write.
pub struct CacheStore {
    db_path: PathBuf,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    config: StoreConfig,
}

impl CacheStore {
    /// Open (or create) the store at `db_path`
    pub fn open(db_path: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Self::connect(db_path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::warn!("Thumbnail store running in {} journal mode", mode);
        }
        Self::init_schema(&conn)?;

        log::info!("📁 Thumbnail store at {}", db_path.display());
        Ok(Self {
            db_path: db_path.to_path_buf(),
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
            config,
        })
    }

    fn connect(path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Create tables and indexes if they don't exist
    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blobs (
                content_hash    TEXT PRIMARY KEY,
                data            BLOB NOT NULL,
                byte_size       INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS entries (
                path            TEXT PRIMARY KEY,
                content_hash    TEXT NOT NULL,
                source_modified INTEGER NOT NULL,
                pixel_width     INTEGER NOT NULL,
                pixel_height    INTEGER NOT NULL,
                file_size       INTEGER NOT NULL,
                format          TEXT NOT NULL,
                cached_at       INTEGER NOT NULL,
                last_accessed   INTEGER NOT NULL,
                max_size        INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_entries_last_accessed
                ON entries(last_accessed);
            CREATE INDEX IF NOT EXISTS idx_entries_content_hash
                ON entries(content_hash);",
        )?;

        // Stores created before the size bound was tracked; the ALTER fails
        // harmlessly once the column exists. Old rows read as bound 0 and
        // are regenerated on first use.
        let _ = conn.execute(
            "ALTER TABLE entries ADD COLUMN max_size INTEGER NOT NULL DEFAULT 0",
            [],
        );
        log::debug!("Thumbnail store schema ready");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run a read against a pooled connection
    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let pooled = self.readers.lock().map_err(|_| StoreError::Poisoned)?.pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => Self::connect(&self.db_path)?,
        };
        let result = f(&conn);
        if let Ok(mut pool) = self.readers.lock() {
            if pool.len() < MAX_IDLE_READERS {
                pool.push(conn);
            }
        }
        Ok(result?)
    }

    fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn)
    }

    /// Return a fresh cached thumbnail or decode, store and return a new one.
    ///
    /// Store failures are logged and treated as a miss; only decode and
    /// file errors reach the caller.
    pub fn get_or_create(
        &self,
        path: &Path,
        source: &dyn ImageSource,
        max_size: u32,
    ) -> Result<CachedThumbnail, DecodeError> {
        let meta = fs::metadata(path).map_err(|e| DecodeError::io(path, e))?;
        let modified = modified_millis(&meta).map_err(|e| DecodeError::io(path, e))?;
        let key = path_key(path);

        match self.cached(&key, modified, max_size) {
            Ok(Some(hit)) => {
                log::trace!("Store hit {}", key);
                return Ok(hit);
            }
            Ok(None) => log::trace!("Store miss {}", key),
            Err(e) => log::warn!("Thumbnail store read failed for {}: {}", key, e),
        }

        let format = classify(path)?;
        let image = source.decode_thumbnail(path, max_size)?;
        let hash = content_hash(path).map_err(|e| DecodeError::io(path, e))?;
        let now = now_millis();
        let entry = CacheEntry {
            path: key,
            content_hash: hash,
            source_modified: modified,
            pixel_width: image.width(),
            pixel_height: image.height(),
            file_size: meta.len(),
            format,
            cached_at: now,
            last_accessed: now,
            max_size,
        };

        let stored = encode_blob(&image, self.config.blob_quality)
            .and_then(|blob| self.insert(&entry, &blob));
        match stored {
            Ok(()) => log::trace!("Stored thumbnail for {}", entry.path),
            Err(e) => log::warn!("Failed to store thumbnail for {}: {}", entry.path, e),
        }

        Ok(CachedThumbnail {
            entry,
            image,
            from_cache: false,
        })
    }

    /// A valid stored thumbnail, refreshing its access time
    fn cached(
        &self,
        key: &str,
        modified: i64,
        max_size: u32,
    ) -> Result<Option<CachedThumbnail>, StoreError> {
        let Some(mut entry) = self.lookup_key(key)? else {
            return Ok(None);
        };
        if !entry.is_fresh(modified, max_size) {
            log::debug!("Stale thumbnail for {}", key);
            return Ok(None);
        }
        let Some(blob) = self.read_blob(&entry.content_hash)? else {
            log::debug!("Blob {} missing for {}", entry.content_hash, key);
            return Ok(None);
        };
        let image = match image::load_from_memory(&blob) {
            Ok(image) => image.to_rgba8(),
            Err(e) => {
                log::warn!("Corrupt blob {} for {}: {}", entry.content_hash, key, e);
                return Ok(None);
            }
        };

        let now = now_millis();
        if let Err(e) = self.touch(key, now) {
            log::warn!("Failed to refresh access time for {}: {}", key, e);
        }
        entry.last_accessed = now;
        Ok(Some(CachedThumbnail {
            entry,
            image,
            from_cache: true,
        }))
    }

    pub fn lookup(&self, path: &Path) -> Result<Option<CacheEntry>, StoreError> {
        self.lookup_key(&path_key(path))
    }

    fn lookup_key(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let sql = format!("SELECT {} FROM entries WHERE path = ?1", CacheEntry::COLUMNS);
        self.with_reader(|conn| conn.query_row(&sql, [key], CacheEntry::from_row).optional())
    }

    pub fn read_blob(&self, hash: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT data FROM blobs WHERE content_hash = ?1",
                [hash],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn touch(&self, key: &str, now: i64) -> Result<(), StoreError> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE entries SET last_accessed = ?1 WHERE path = ?2",
                params![now, key],
            )?;
            Ok(())
        })
    }

    /// Write an entry and its blob atomically.
    ///
    /// If the entry replaces one pointing at a different hash, the old blob
    /// is deleted in the same transaction once nothing references it.
    pub fn insert(&self, entry: &CacheEntry, blob: &[u8]) -> Result<(), StoreError> {
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row(
                    "SELECT content_hash FROM entries WHERE path = ?1",
                    [&entry.path],
                    |row| row.get(0),
                )
                .optional()?;

            tx.execute(
                "INSERT OR REPLACE INTO blobs (content_hash, data, byte_size) VALUES (?1, ?2, ?3)",
                params![entry.content_hash, blob, blob.len() as i64],
            )?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO entries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    CacheEntry::COLUMNS
                ),
                params![
                    entry.path,
                    entry.content_hash,
                    entry.source_modified,
                    entry.pixel_width,
                    entry.pixel_height,
                    entry.file_size as i64,
                    entry.format.as_str(),
                    entry.cached_at,
                    entry.last_accessed,
                    entry.max_size,
                ],
            )?;
            if let Some(previous) = previous.filter(|hash| *hash != entry.content_hash) {
                delete_blob_if_orphaned(&tx, &previous)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete the entry for `path`, and its blob if no other entry shares it.
    /// Returns whether an entry existed.
    pub fn remove(&self, path: &Path) -> Result<bool, StoreError> {
        let key = path_key(path);
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            let hash: Option<String> = tx
                .query_row(
                    "SELECT content_hash FROM entries WHERE path = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(hash) = hash else {
                return Ok(false);
            };
            tx.execute("DELETE FROM entries WHERE path = ?1", [&key])?;
            delete_blob_if_orphaned(&tx, &hash)?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        self.with_reader(|conn| {
            let entry_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            let blob_bytes: i64 = conn.query_row(
                "SELECT COALESCE(SUM(byte_size), 0) FROM blobs",
                [],
                |row| row.get(0),
            )?;
            Ok(StoreStatistics {
                entry_count: entry_count.max(0) as u64,
                blob_bytes: blob_bytes.max(0) as u64,
            })
        })
    }

    /// Remove entries not accessed within the expiry horizon
    pub fn clear_expired(&self) -> Result<usize, StoreError> {
        let horizon = i64::try_from(self.config.expiry.as_millis()).unwrap_or(i64::MAX);
        self.clear_accessed_before(now_millis().saturating_sub(horizon))
    }

    /// Remove entries last accessed before `cutoff` (unix milliseconds)
    pub fn clear_accessed_before(&self, cutoff: i64) -> Result<usize, StoreError> {
        let removed = self.with_writer(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM entries WHERE last_accessed < ?1", [cutoff])?;
            let blobs = tx.execute(
                "DELETE FROM blobs WHERE content_hash NOT IN (SELECT content_hash FROM entries)",
                [],
            )?;
            tx.commit()?;
            log::trace!("Expired {} entries, {} blobs", removed, blobs);
            Ok(removed)
        })?;
        if removed > 0 {
            log::info!("🧹 Expired {} thumbnails", removed);
        }
        Ok(removed)
    }

    /// When blob usage exceeds the budget, evict least recently accessed
    /// entries until usage is at most 80% of it, then compact the file.
    pub fn clear_oversized(&self) -> Result<usize, StoreError> {
        let budget = self.config.max_bytes;
        let target = budget / 5 * 4;

        let (evicted, usage) = self.with_writer(|conn| {
            let tx = conn.transaction()?;
            let mut usage: u64 = tx
                .query_row("SELECT COALESCE(SUM(byte_size), 0) FROM blobs", [], |row| {
                    row.get::<_, i64>(0)
                })?
                .max(0) as u64;
            if usage <= budget {
                return Ok((0, usage));
            }

            let victims: Vec<(String, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT path, content_hash FROM entries ORDER BY last_accessed ASC",
                )?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };

            let mut evicted = 0;
            for (path, hash) in victims {
                if usage <= target {
                    break;
                }
                tx.execute("DELETE FROM entries WHERE path = ?1", [&path])?;
                usage = usage.saturating_sub(delete_blob_if_orphaned(&tx, &hash)?);
                evicted += 1;
            }
            tx.commit()?;
            Ok((evicted, usage))
        })?;

        if evicted > 0 {
            log::info!(
                "🧹 Evicted {} thumbnails, store now {:.1}MB",
                evicted,
                usage as f64 / 1024.0 / 1024.0
            );
            self.compact();
        }
        Ok(evicted)
    }

    /// Checkpoint the WAL and vacuum; failures are only logged
    fn compact(&self) {
        let result = self.with_writer(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            conn.execute_batch("VACUUM")?;
            Ok(())
        });
        if let Err(e) = result {
            log::warn!("Thumbnail store compaction failed: {}", e);
        }
    }
}

/// Delete a blob nothing references any more; returns the bytes freed
fn delete_blob_if_orphaned(conn: &Connection, hash: &str) -> rusqlite::Result<u64> {
    let size: Option<i64> = conn
        .query_row(
            "SELECT byte_size FROM blobs WHERE content_hash = ?1
             AND NOT EXISTS (SELECT 1 FROM entries WHERE content_hash = ?1)",
            [hash],
            |row| row.get(0),
        )
        .optional()?;
    match size {
        Some(size) => {
            conn.execute("DELETE FROM blobs WHERE content_hash = ?1", [hash])?;
            Ok(size.max(0) as u64)
        }
        None => Ok(0),
    }
}

/// Compress a thumbnail: JPEG when opaque, PNG when it carries alpha
pub fn encode_blob(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    if image.pixels().any(|p| p.0[3] != u8::MAX) {
        PngEncoder::new(&mut bytes).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )?;
    } else {
        let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ImageKind;
    use crate::testing::{write_jpeg, CountingSource};
    use filetime::{set_file_mtime, FileTime};
    use image::Rgba;
    use tempfile::{tempdir, TempDir};

    fn open_store(dir: &TempDir, config: StoreConfig) -> CacheStore {
        CacheStore::open(&dir.path().join("cache").join("thumbnails.db"), config).unwrap()
    }

    fn entry(path: &str, hash: &str, last_accessed: i64) -> CacheEntry {
        CacheEntry {
            path: path.into(),
            content_hash: hash.into(),
            source_modified: 0,
            pixel_width: 4,
            pixel_height: 4,
            file_size: 10,
            format: ImageKind::Png,
            cached_at: last_accessed,
            last_accessed,
            max_size: 64,
        }
    }

    fn blob_exists(store: &CacheStore, hash: &str) -> bool {
        store.read_blob(hash).unwrap().is_some()
    }

    #[test]
    fn open_creates_empty_store_in_wal_mode() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        assert!(store.path().exists());
        assert_eq!(store.statistics().unwrap(), StoreStatistics::default());

        let mode: String = store
            .with_reader(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn second_request_is_served_from_store() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        let photo = write_jpeg(dir.path(), "photo.jpg", 640, 480);
        let source = CountingSource::new();

        let first = store.get_or_create(&photo, &source, 256).unwrap();
        assert!(!first.from_cache);
        assert_eq!((first.entry.pixel_width, first.entry.pixel_height), (256, 192));

        let second = store.get_or_create(&photo, &source, 256).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.image.dimensions(), (256, 192));
        assert_eq!(source.thumbnail_calls(), 1);
        assert!(second.entry.last_accessed >= first.entry.last_accessed);
    }

    #[test]
    fn modified_file_is_regenerated() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        let photo = write_jpeg(dir.path(), "photo.jpg", 320, 240);
        let source = CountingSource::new();

        store.get_or_create(&photo, &source, 128).unwrap();
        set_file_mtime(&photo, FileTime::from_unix_time(1_000_000, 0)).unwrap();

        let refreshed = store.get_or_create(&photo, &source, 128).unwrap();
        assert!(!refreshed.from_cache);
        assert_eq!(refreshed.entry.source_modified, 1_000_000_000);
        assert_eq!(source.thumbnail_calls(), 2);
        assert_eq!(store.statistics().unwrap().entry_count, 1);
    }

    #[test]
    fn different_size_bound_is_regenerated() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        let photo = write_jpeg(dir.path(), "photo.jpg", 1024, 768);
        let source = CountingSource::new();

        let small = store.get_or_create(&photo, &source, 128).unwrap();
        assert_eq!(small.image.dimensions(), (128, 96));

        let large = store.get_or_create(&photo, &source, 512).unwrap();
        assert!(!large.from_cache);
        assert_eq!(large.image.dimensions(), (512, 384));
        assert_eq!(large.entry.max_size, 512);

        // The new bound replaced the old row
        let again = store.get_or_create(&photo, &source, 512).unwrap();
        assert!(again.from_cache);
        assert_eq!(source.thumbnail_calls(), 2);
        assert_eq!(store.statistics().unwrap().entry_count, 1);
    }

    #[test]
    fn missing_blob_is_regenerated() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        let photo = write_jpeg(dir.path(), "photo.jpg", 200, 100);
        let source = CountingSource::new();

        store.get_or_create(&photo, &source, 64).unwrap();
        store
            .with_writer(|conn| {
                conn.execute("DELETE FROM blobs", [])?;
                Ok(())
            })
            .unwrap();

        let again = store.get_or_create(&photo, &source, 64).unwrap();
        assert!(!again.from_cache);
        assert_eq!(source.thumbnail_calls(), 2);
    }

    #[test]
    fn decode_failures_reach_the_caller() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        let source = CountingSource::new();

        let missing = dir.path().join("gone.jpg");
        assert!(matches!(
            store.get_or_create(&missing, &source, 64),
            Err(DecodeError::Io { .. })
        ));

        let corrupt = dir.path().join("corrupt.png");
        fs::write(&corrupt, b"definitely not a png").unwrap();
        assert!(store.get_or_create(&corrupt, &source, 64).is_err());
        assert_eq!(store.statistics().unwrap().entry_count, 0);
    }

    #[test]
    fn shared_blob_survives_until_last_reference() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        store.insert(&entry("/a.png", "shared", 1), b"0123456789").unwrap();
        store.insert(&entry("/copy/a.png", "shared", 2), b"0123456789").unwrap();

        assert!(store.remove(Path::new("/a.png")).unwrap());
        assert!(blob_exists(&store, "shared"));

        assert!(store.remove(Path::new("/copy/a.png")).unwrap());
        assert!(!blob_exists(&store, "shared"));
        assert!(!store.remove(Path::new("/copy/a.png")).unwrap());
    }

    #[test]
    fn replacing_an_entry_drops_its_orphaned_blob() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        store.insert(&entry("/a.png", "old", 1), b"old bytes").unwrap();
        store.insert(&entry("/a.png", "new", 2), b"new bytes").unwrap();

        assert!(!blob_exists(&store, "old"));
        assert!(blob_exists(&store, "new"));
        assert_eq!(store.lookup(Path::new("/a.png")).unwrap().unwrap().content_hash, "new");
    }

    #[test]
    fn size_sweep_evicts_oldest_until_eighty_percent() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            max_bytes: 100,
            ..StoreConfig::default()
        };
        let store = open_store(&dir, config);
        for i in 0..12 {
            let path = format!("/photos/{i}.png");
            store.insert(&entry(&path, &format!("hash{i}"), i), b"0123456789").unwrap();
        }
        assert_eq!(store.statistics().unwrap().blob_bytes, 120);

        assert_eq!(store.clear_oversized().unwrap(), 4);
        assert!(store.statistics().unwrap().blob_bytes <= 80);
        for i in 0..4 {
            assert!(store.lookup(Path::new(&format!("/photos/{i}.png"))).unwrap().is_none());
        }
        for i in 4..12 {
            assert!(store.lookup(Path::new(&format!("/photos/{i}.png"))).unwrap().is_some());
        }

        // Under budget: nothing to do
        assert_eq!(store.clear_oversized().unwrap(), 0);
    }

    #[test]
    fn expiry_removes_only_old_entries() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, StoreConfig::default());
        let now = now_millis();
        let day = 24 * 60 * 60 * 1000;
        store.insert(&entry("/old.png", "old", now - 61 * day), b"aaaa").unwrap();
        store.insert(&entry("/recent.png", "recent", now - day), b"bbbb").unwrap();

        assert_eq!(store.clear_expired().unwrap(), 1);
        assert!(store.lookup(Path::new("/old.png")).unwrap().is_none());
        assert!(!blob_exists(&store, "old"));
        assert!(store.lookup(Path::new("/recent.png")).unwrap().is_some());
    }

    #[test]
    fn blobs_are_jpeg_unless_alpha_is_present() {
        let opaque = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        let bytes = encode_blob(&opaque, 85).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let translucent = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128]));
        let bytes = encode_blob(&translucent, 85).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
