//! Source of ranged byte streams.

use std::io::Read;

use super::error::DownloadResult;

/// A response body positioned at some offset of the remote item.
pub struct RangeBody {
    /// Offset of the first byte `reader` yields.
    ///
    /// Equal to the requested offset when the range was honoured, 0 when the
    /// source ignored it and is sending the whole item again.
    pub start: u64,

    /// Total size of the remote item, when the source knows it.
    pub total: Option<u64>,

    /// Remaining bytes, starting at `start`.
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for RangeBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeBody")
            .field("start", &self.start)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// Opens a remote item from a byte offset.
///
/// [`HttpFetcher`](super::HttpFetcher) is the production implementation;
/// tests drive the scheduler with in-memory fetchers.
pub trait RangeFetcher: Send + Sync {
    /// Start reading `url` at byte `offset`.
    fn fetch(&self, url: &str, offset: u64) -> DownloadResult<RangeBody>;
}
