//! Storage backend abstraction for track files and catalog tables.
//!
//! Track data lives behind a [`Storage`] implementation so the engine can
//! read from the remote catalog over HTTP or from a local mirror
//! interchangeably.
//!
//! # Implementations
//!
//! - [`HttpStorage`] - HTTP/HTTPS with range requests and timeouts
//! - [`LocalStorage`] - Local filesystem, resolving URLs against a root directory
//!
//! # Example
//!
//! ```no_run
//! use overlapr::storage::{LocalStorage, Storage};
//! use std::path::PathBuf;
//!
//! let storage = LocalStorage::new(PathBuf::from("./data"));
//! ```

mod http;
mod local;

pub use http::HttpStorage;
pub use local::LocalStorage;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Raw (still compressed) byte stream of a stored file
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Byte range within a file, `end` inclusive as in an HTTP `Range` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// The first `len` bytes of a file
    pub fn prefix(len: u64) -> Self {
        Self {
            start: 0,
            end: Some(len.saturating_sub(1)),
        }
    }

    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Storage backend trait for track files and catalog documents
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a forward-only stream over the whole file
    async fn open(&self, location: &str) -> Result<ByteStream>;

    /// Read a bounded byte range
    async fn read_bytes(&self, location: &str, range: Option<ByteRange>) -> Result<Bytes>;

    /// Read a small text document in full
    async fn read_to_string(&self, location: &str) -> Result<String>;
}
