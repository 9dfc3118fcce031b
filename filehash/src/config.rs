//! Run configuration.

use std::ffi::OsString;
use std::num::NonZeroU8;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enumerate::TraversalPolicy;

/// Number of concurrent workers hashing files.
///
/// Chosen empirically on a desktop-class machine, not derived from the available parallelism.
pub const DEFAULT_WORKERS: NonZeroU8 = unsafe { NonZeroU8::new_unchecked(7) };
/// Path of the digest artifact, relative to the current directory.
pub const DEFAULT_OUTPUT: &str = "./digest_dump";
/// Path components pruned from the walk.
pub const DEFAULT_EXCLUDED: &[&str] = &[".git"];
/// How long the run waits for workers to exit once every outcome has been collected.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of a single hashing run.
///
/// Every setting but the root directory has a documented default and can be overridden with the
/// consuming `with_*` builder methods:
/// ```
/// # use filehash::{Config, TraversalPolicy};
/// let config = Config::new("some/dir")
///     .with_workers(2.try_into().unwrap())
///     .with_traversal(TraversalPolicy::Abort);
///
/// assert_eq!(config.workers().get(), 2);
/// assert_eq!(config.output(), std::path::Path::new("./digest_dump"));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// The directory tree to hash.
    root: PathBuf,
    /// Where digest records are written.
    output: PathBuf,
    /// Size of the worker pool.
    workers: NonZeroU8,
    /// Path component names excluded from the candidate set.
    excluded: Vec<OsString>,
    /// What to do when a subtree cannot be walked.
    traversal: TraversalPolicy,
    /// Bound on the wait for workers to exit.
    stall_timeout: Duration,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            workers: DEFAULT_WORKERS,
            excluded: DEFAULT_EXCLUDED.iter().map(OsString::from).collect(),
            traversal: TraversalPolicy::default(),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    #[inline]
    pub fn with_output(self, output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            ..self
        }
    }

    #[inline]
    pub fn with_workers(self, workers: NonZeroU8) -> Self {
        Self { workers, ..self }
    }

    /// Replace the excluded path component names, defaults included.
    #[inline]
    pub fn with_excluded<I: IntoIterator<Item = impl Into<OsString>>>(self, iter: I) -> Self {
        Self {
            excluded: iter.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    #[inline]
    pub fn with_traversal(self, traversal: TraversalPolicy) -> Self {
        Self { traversal, ..self }
    }

    #[inline]
    pub fn with_stall_timeout(self, stall_timeout: Duration) -> Self {
        Self { stall_timeout, ..self }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    #[inline]
    pub fn output(&self) -> &Path {
        self.output.as_path()
    }

    #[inline]
    pub fn workers(&self) -> NonZeroU8 {
        self.workers
    }

    #[inline]
    pub fn excluded(&self) -> &[OsString] {
        &self.excluded
    }

    #[inline]
    pub fn traversal(&self) -> TraversalPolicy {
        self.traversal
    }

    #[inline]
    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }
}
