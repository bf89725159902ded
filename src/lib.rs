//! Thumbnail loading pipeline for large photo folders.
//!
//! The pieces, leaves first:
//! - `state`: persistent SQLite thumbnail store and in-memory LRU
//! - `decoder`, `raw`, `animation`: format-specific decode chains
//! - `coordinator`: concurrency-limited, cancellable loading
//! - `scroll`, `viewport`: scroll prediction and grid virtualization
//! - `library`: folder scanning and the folder tree

pub mod animation;
pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod library;
pub mod logging;
pub mod raw;
pub mod scroll;
pub mod state;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{CacheStatistics, CleanupReport, LoadCoordinator, PreloadOutcome};
pub use decoder::{Bitmap, Decoder, ImageKind, ImageSource};
pub use error::{ConfigError, DecodeError, StoreError};
