//! This module provides the hashing worker pool.

use std::num::NonZeroU8;
use std::time::Duration;

use futures::future::{Future, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::queue::Claimer;
use crate::{Error, Outcome};

/// Diagnostics published by a worker once it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRecord {
    /// Worker id, unique within a run.
    pub id: usize,
    /// Number of paths claimed, whatever their outcome.
    pub processed: u64,
}

/// A fixed-size pool of workers hashing the paths of a shared queue.
///
/// Every worker repeatedly claims a path, reads and digests it, and sends exactly one [`Outcome`] for it
/// to the outcome sink. Workers exit once the queue is closed and drained, or once the run is cancelled.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// # use filehash::{pool::Pool, queue, CancellationToken};
/// # use std::time::Duration;
/// let claimer = queue::distribute(vec!["does/not/exist".into()]).unwrap();
/// let (sink, mut outcomes) = tokio::sync::mpsc::channel(1);
///
/// let pool = Pool::start(3.try_into().unwrap(), claimer, sink, CancellationToken::new());
///
/// let outcome = outcomes.recv().await.unwrap();
/// assert!(!outcome.is_digested());
///
/// let records = pool.join_within(Duration::from_secs(1)).await.unwrap();
/// assert_eq!(records.iter().map(|record| record.processed).sum::<u64>(), 1);
/// # })
/// ```
#[derive(Debug)]
pub struct Pool {
    /// The pool of workers.
    workers: Vec<Worker>,
}

impl Pool {
    /// Start a pool with `size` workers claiming from `claimer` and sending outcomes to `sink`.
    ///
    /// The outcome channel is closed once every worker has exited.
    pub fn start(size: NonZeroU8, claimer: Claimer, sink: mpsc::Sender<Outcome>, cancel: CancellationToken) -> Pool {
        let size: usize = size.get().into();
        let workers = (0..size)
            .map(|id| Worker::new(id, claimer.clone(), sink.clone(), cancel.clone()))
            .collect();

        Pool { workers }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit and collect their records, ordered by worker id.
    ///
    /// Workers still running after `timeout` are aborted and reported as [`Error::Stalled`]. A worker that
    /// panicked is reported as [`Error::Task`], once the remaining ones are aborted.
    pub async fn join_within(self, timeout: Duration) -> Result<Vec<WorkerRecord>, Error> {
        let mut records = Vec::with_capacity(self.workers.len());
        let mut pending: FuturesUnordered<Worker> = self.workers.into_iter().collect();

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some(Ok(record)) => records.push(record),
                    Some(Err(err)) => {
                        for worker in pending.iter() {
                            tracing::debug!("Aborting worker {} after a failed worker.", worker.id);

                            worker.handle.abort();
                        }

                        return Err(err.into());
                    }
                    None => break,
                },
                () = &mut deadline => {
                    for worker in pending.iter() {
                        tracing::warn!("Worker {} did not exit within {timeout:?}, aborting it.", worker.id);

                        worker.handle.abort();
                    }

                    return Err(Error::Stalled {
                        pending: pending.len(),
                        timeout,
                    });
                }
            }
        }

        records.sort_unstable_by_key(|record| record.id);

        Ok(records)
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    handle: tokio::task::JoinHandle<WorkerRecord>,
}

impl Worker {
    fn new(id: usize, claimer: Claimer, sink: mpsc::Sender<Outcome>, cancel: CancellationToken) -> Worker {
        tracing::debug!("Starting worker {id}...");

        Worker {
            id,
            handle: tokio::spawn(async move {
                let mut record = WorkerRecord { id, processed: 0 };

                loop {
                    let path = tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            tracing::debug!("Run cancelled, shutting down worker {id}.");
                            break;
                        }
                        path = claimer.claim() => match path {
                            Some(path) => path,
                            None => {
                                tracing::debug!("All paths exhausted, shutting down worker {id}.");
                                break;
                            }
                        },
                    };

                    tracing::trace!("Hashing `{}` on worker {id}...", path.display());

                    let outcome = Outcome::of_file(path).await;
                    record.processed += 1;

                    if sink.send(outcome).await.is_err() {
                        tracing::debug!("Outcome sink closed, shutting down worker {id}.");
                        break;
                    }
                }

                record
            }
            .in_current_span()),
        }
    }
}

impl Future for Worker {
    type Output = Result<WorkerRecord, tokio::task::JoinError>;

    #[inline]
    fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Self::Output> {
        self.handle.poll_unpin(cx)
    }
}
