//! Content digests and the per-file outcome produced by workers.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use tokio::{fs, io};

/// Width of a [`Digest`] in bytes.
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest of a file's full content.
///
/// Displays as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash `content` in one go.
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// The result of processing exactly one claimed path.
#[derive(Debug)]
pub enum Outcome {
    Digested { path: PathBuf, digest: Digest },
    Failed { path: PathBuf, cause: io::Error },
}

impl Outcome {
    /// Read the whole file at `path` and digest it.
    ///
    /// A read error is turned into [`Outcome::Failed`], so this always yields an outcome for `path`.
    pub async fn of_file(path: PathBuf) -> Self {
        match fs::read(&path).await {
            Ok(content) => {
                let digest = Digest::of(&content);

                tracing::trace!("Digested `{}`: {digest}", path.display());

                Outcome::Digested { path, digest }
            }
            Err(cause) => {
                tracing::warn!("Cannot read `{}`: {cause}", path.display());

                Outcome::Failed { path, cause }
            }
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Outcome::Digested { path, .. } | Outcome::Failed { path, .. } => path,
        }
    }

    #[inline]
    pub fn is_digested(&self) -> bool {
        matches!(self, Outcome::Digested { .. })
    }
}
