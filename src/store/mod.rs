//! Store Module - job result cache
//!
//! Finished jobs can be replayed on the next run instead of running their
//! worker again. Only clean results are stored: exit code 0 and not degraded.
//!
//! Key types:
//! - `JobCache`: async load/store trait used by the runner
//! - `MemoryCache`: DashMap-backed, for tests and single-process reuse
//! - `FileCache`: one JSON file per job under the cache directory

mod cache;

pub use cache::{CacheEntry, CacheKey, FileCache, JobCache, MemoryCache};
