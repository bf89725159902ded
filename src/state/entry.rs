use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use sha2::{Digest, Sha256};
use std::fs::{File, Metadata};
use std::io::{self, Read};
use std::path::Path;

use crate::decoder::ImageKind;

/// Only the head of a file is hashed; large raws stay cheap to key
pub const HASH_PREFIX_BYTES: u64 = 1024 * 1024;

/// Metadata row for one cached thumbnail.
/// Mirrors the `entries` table; the pixels live in `blobs` under `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    pub content_hash: String,
    /// Source mtime in unix milliseconds
    pub source_modified: i64,
    /// Dimensions of the stored thumbnail
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub file_size: u64,
    pub format: ImageKind,
    pub cached_at: i64,
    pub last_accessed: i64,
    /// Square bound the thumbnail was generated for
    pub max_size: u32,
}

impl CacheEntry {
    /// Column list matching [`CacheEntry::from_row`]
    pub const COLUMNS: &'static str = "path, content_hash, source_modified, pixel_width, \
         pixel_height, file_size, format, cached_at, last_accessed, max_size";

    /// An entry is only valid for the exact mtime and size bound it was
    /// generated from
    pub fn is_fresh(&self, source_modified: i64, max_size: u32) -> bool {
        self.source_modified == source_modified && self.max_size == max_size
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let format: String = row.get(6)?;
        let format = ImageKind::parse(&format)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(6, "format".into(), Type::Text))?;
        let file_size: i64 = row.get(5)?;
        Ok(CacheEntry {
            path: row.get(0)?,
            content_hash: row.get(1)?,
            source_modified: row.get(2)?,
            pixel_width: row.get(3)?,
            pixel_height: row.get(4)?,
            file_size: file_size.max(0) as u64,
            format,
            cached_at: row.get(7)?,
            last_accessed: row.get(8)?,
            max_size: row.get(9)?,
        })
    }
}

/// Key under which a path is stored
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Current time in unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// File mtime in unix milliseconds
pub fn modified_millis(meta: &Metadata) -> io::Result<i64> {
    let modified: DateTime<Utc> = meta.modified()?.into();
    Ok(modified.timestamp_millis())
}

/// Hex SHA-256 of the first MiB of a file
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut head = Vec::new();
    File::open(path)?
        .take(HASH_PREFIX_BYTES)
        .read_to_end(&mut head)?;
    Ok(format!("{:x}", Sha256::digest(&head)))
}
