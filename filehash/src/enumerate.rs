//! Path enumeration: the candidate set of a run.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::{Config, Error};

/// What to do when a subtree cannot be walked (permission denied, vanished directory...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraversalPolicy {
    /// Log the error, count it and keep walking, under-reporting that subtree.
    #[default]
    Continue,
    /// Fail the whole run on the first error.
    Abort,
}

/// Regular, non-excluded files found under a root directory.
#[derive(Debug, Default)]
pub struct Candidates {
    /// Candidate paths, in walk order.
    pub paths: Vec<PathBuf>,
    /// Traversal errors tolerated while walking.
    pub skipped: usize,
}

impl Candidates {
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Recursive directory walker producing [`Candidates`].
///
/// Symbolic links are never followed nor included. A path is excluded when any of its components,
/// relative to the root, is one of the excluded names; excluded directories are not descended into.
#[derive(Debug, Clone)]
pub struct Enumerator {
    root: PathBuf,
    excluded: Vec<OsString>,
    policy: TraversalPolicy,
}

impl Enumerator {
    /// Create an `Enumerator` for `root` without any exclusion.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: vec![],
            policy: TraversalPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.root())
            .with_excluded(config.excluded().iter().cloned())
            .with_policy(config.traversal())
    }

    #[inline]
    pub fn with_excluded<I: IntoIterator<Item = impl Into<OsString>>>(self, iter: I) -> Self {
        Self {
            excluded: iter.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    #[inline]
    pub fn with_policy(self, policy: TraversalPolicy) -> Self {
        Self { policy, ..self }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Whether `path` (relative to the root) matches the exclusion predicate.
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|component| match component {
            Component::Normal(name) => self.excluded.iter().any(|excluded| excluded == name),
            _ => false,
        })
    }

    /// Walk the whole tree synchronously.
    pub fn walk(&self) -> Result<Candidates, Error> {
        if !self.root.is_dir() {
            return Err(Error::InvalidRoot(self.root.clone()));
        }

        tracing::debug!("Enumerating files under `{}`", self.root.display());

        let mut candidates = Candidates::default();

        let entries = WalkDir::new(&self.root).follow_links(false).into_iter().filter_entry(|entry| {
            // the root itself strips down to an empty path, which is never excluded
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            !self.is_excluded(relative)
        });

        for entry in entries {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    tracing::trace!("Found candidate `{}`", entry.path().display());

                    candidates.paths.push(entry.into_path());
                }
                Ok(_) => { /* directories, symlinks and special files are never candidates */ }
                Err(err) => match self.policy {
                    TraversalPolicy::Continue => {
                        let path = err.path().unwrap_or(&self.root).display().to_string();
                        tracing::warn!("Skipping `{path}`: {err}");

                        candidates.skipped += 1;
                    }
                    TraversalPolicy::Abort => return Err(err.into()),
                },
            }
        }

        tracing::debug!(
            "Enumerated {} candidate(s) under `{}`, {} subtree error(s) skipped",
            candidates.len(),
            self.root.display(),
            candidates.skipped
        );

        Ok(candidates)
    }
}
