use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io;

use crate::queue::QueueError;

/// Errors escalated out of a hashing run.
///
/// Unreadable files never show up here: they are accounted as [`Outcome::Failed`](crate::Outcome::Failed)
/// and only surface in the [`RunResult`](crate::RunResult).
#[derive(Debug, Error)]
pub enum Error {
    #[error("`{}` is not a directory", .0.display())]
    InvalidRoot(PathBuf),
    #[error("cannot walk directory tree")]
    Traversal(#[from] walkdir::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("cannot create digest artifact `{}`", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write digest artifact")]
    WriteOutput(#[source] io::Error),
    #[error("{pending} worker(s) did not exit within {timeout:?}")]
    Stalled { pending: usize, timeout: Duration },
    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),
}
