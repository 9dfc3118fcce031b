//! The single-use work queue shared by the worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("work queue is full ({0} paths)")]
    Full(usize),
    #[error("work queue is closed")]
    Closed,
}

/// A bounded, single-use FIFO of paths.
///
/// It is loaded without blocking up to its capacity, then closed once and for all. Paths are handed
/// out through [`Claimer`]s, which any number of workers can share.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// # use filehash::queue::WorkQueue;
/// let mut queue = WorkQueue::with_capacity(2);
/// queue.push("a".into()).unwrap();
/// queue.push("b".into()).unwrap();
/// queue.close();
///
/// let claimer = queue.claimer();
/// assert_eq!(claimer.claim().await, Some("a".into()));
/// assert_eq!(claimer.claim().await, Some("b".into()));
/// assert_eq!(claimer.claim().await, None);
/// # })
/// ```
#[derive(Debug)]
pub struct WorkQueue {
    /// The loading part, dropped when the queue is closed.
    sender: Option<mpsc::Sender<PathBuf>>,
    /// The claiming part, shared with workers.
    claimer: Claimer,
    capacity: usize,
    loaded: usize,
}

impl WorkQueue {
    /// Create an open queue able to hold `capacity` paths.
    pub fn with_capacity(capacity: usize) -> Self {
        // a channel cannot be zero-sized, the logical capacity is enforced on push
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        Self {
            sender: Some(sender),
            claimer: Claimer(Arc::new(Mutex::new(receiver))),
            capacity,
            loaded: 0,
        }
    }

    /// Enqueue `path` without ever waiting.
    pub fn push(&mut self, path: PathBuf) -> Result<(), QueueError> {
        let sender = self.sender.as_ref().ok_or(QueueError::Closed)?;

        if self.loaded == self.capacity {
            return Err(QueueError::Full(self.capacity));
        }

        sender.try_send(path).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => QueueError::Full(self.capacity),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;

        self.loaded += 1;

        Ok(())
    }

    /// Signal that no further path will ever be enqueued.
    ///
    /// Paths already loaded can still be claimed. Closing more than once has no effect.
    pub fn close(&mut self) {
        if self.sender.take().is_some() {
            tracing::debug!("Work queue closed with {} path(s) loaded", self.loaded);
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.loaded
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.loaded == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a handle to claim paths from this queue.
    #[inline]
    pub fn claimer(&self) -> Claimer {
        self.claimer.clone()
    }
}

/// The consuming side of a [`WorkQueue`].
///
/// Claiming is exclusive: a path handed out to one claimer is never seen by another.
#[derive(Debug, Clone)]
pub struct Claimer(Arc<Mutex<mpsc::Receiver<PathBuf>>>);

impl Claimer {
    /// Claim the next path.
    ///
    /// Waits while the queue is empty but still open, and returns `None` once it is closed and drained.
    /// Cancel safe: dropping the future before completion never loses a path.
    pub async fn claim(&self) -> Option<PathBuf> {
        self.0.lock().await.recv().await
    }
}

/// Load all `paths` into a queue sized to fit them exactly, close it, and return its claimer.
pub fn distribute<I>(paths: I) -> Result<Claimer, QueueError>
where
    I: IntoIterator<Item = PathBuf>,
    I::IntoIter: ExactSizeIterator,
{
    let paths = paths.into_iter();
    let mut queue = WorkQueue::with_capacity(paths.len());

    for path in paths {
        queue.push(path)?;
    }

    queue.close();

    Ok(queue.claimer())
}
