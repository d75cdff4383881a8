//! Error types for the store layer.

use std::path::PathBuf;

/// Errors that can occur while reading or writing a store.
///
/// Only genuinely unexpected failures surface as `StoreError`: a corrupt
/// session blob is NOT one of them (the persistor logs it and reports "no
/// session"). What's left is the disk being unwritable, or a record that
/// can't be serialized.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized to JSON.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}
