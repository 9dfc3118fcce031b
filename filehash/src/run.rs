//! A whole hashing run, from enumeration to artifact finalization.

use std::fmt;

use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio::{fs, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::collect::{Collector, Failure};
use crate::enumerate::{Candidates, Enumerator};
use crate::pool::{Pool, WorkerRecord};
use crate::{queue, Config, Error};

/// Lifecycle of a run.
///
/// Phases only ever move forward; [`Phase::Done`] and [`Phase::Partial`] are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Enumerating,
    Distributing,
    Processing,
    Collecting,
    Synchronizing,
    /// Every candidate has been accounted for.
    Done,
    /// The run was cancelled before every candidate was accounted for.
    Partial,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunResult {
    /// Terminal phase, either [`Phase::Done`] or [`Phase::Partial`].
    pub phase: Phase,
    /// Size of the candidate set.
    pub candidates: usize,
    /// Subtrees skipped because they could not be walked.
    pub skipped: usize,
    /// Records written to the artifact.
    pub digested: usize,
    /// Candidates that could not be read.
    pub failures: Vec<Failure>,
    /// Per-worker diagnostics, ordered by worker id.
    pub workers: Vec<WorkerRecord>,
}

impl RunResult {
    #[inline]
    pub fn received(&self) -> usize {
        self.digested + self.failures.len()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// The context of a single hashing run.
///
/// It owns everything the run needs (configuration, cancellation signal, current phase), so nothing is
/// shared between runs.
///
/// # Example
/// ```no_run
/// # tokio_test::block_on(async {
/// # use filehash::{Config, Run};
/// let run = Run::new(Config::new("some/dir").with_output("digests.txt"));
///
/// let result = run.execute().await?;
/// println!("{} digested, {} failed", result.digested, result.failures.len());
/// # Ok::<_, filehash::Error>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct Run {
    config: Config,
    cancel: CancellationToken,
    phase: Phase,
}

impl Run {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            phase: Phase::Enumerating,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// A handle to cancel this run from anywhere.
    ///
    /// Once cancelled, workers stop claiming paths and the run ends as [`Phase::Partial`].
    #[inline]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole pipeline, writing records to the configured output file.
    ///
    /// The root is walked first, so that a bad root never touches an existing artifact.
    pub async fn execute(self) -> Result<RunResult, Error> {
        let candidates = self.enumerate().await?;

        self.execute_candidates(candidates).await
    }

    /// Run the pipeline on `candidates`, writing records to the configured output file.
    ///
    /// The output file is created before any file is hashed, so that a run unable to persist its results
    /// fails without hashing anything. It is flushed and synced to disk once the run is over.
    pub async fn execute_candidates(self, candidates: Candidates) -> Result<RunResult, Error> {
        let path = self.config.output().to_path_buf();

        let file = fs::File::create(&path).await.map_err(|source| Error::CreateOutput {
            path: path.clone(),
            source,
        })?;

        let (result, mut writer) = self.process(candidates, io::BufWriter::new(file)).await?;

        writer.shutdown().await.map_err(Error::WriteOutput)?;
        writer.into_inner().sync_all().await.map_err(Error::WriteOutput)?;

        tracing::debug!("Digest artifact finalized: `{}`", path.display());

        Ok(result)
    }

    /// Run the whole pipeline, writing records to `writer`.
    pub async fn execute_into<W>(self, writer: W) -> Result<(RunResult, W), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let candidates = self.enumerate().await?;

        self.process(candidates, writer).await
    }

    /// Walk the configured root on the blocking pool.
    pub async fn enumerate(&self) -> Result<Candidates, Error> {
        let enumerator = Enumerator::from_config(&self.config);

        tokio::task::spawn_blocking(move || enumerator.walk()).await?
    }

    /// Run the pipeline on an already enumerated candidate set.
    pub async fn process<W>(mut self, candidates: Candidates, writer: W) -> Result<(RunResult, W), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let Candidates { paths, skipped } = candidates;
        let expected = paths.len();

        tracing::debug!("{expected} paths to process");

        self.enter(Phase::Distributing);
        let claimer = queue::distribute(paths)?;

        self.enter(Phase::Processing);
        let workers = self.config.workers();
        tracing::debug!("Spinning up {workers} workers to process these");

        let (sink, mut outcomes) = mpsc::channel(expected.max(1));
        let pool = Pool::start(workers, claimer, sink, self.cancel.clone());

        self.enter(Phase::Collecting);
        let (collected, writer) = Collector::new(writer)
            .collect(expected, &mut outcomes, &self.cancel)
            .await
            .map_err(Error::WriteOutput)?;

        // releases any worker still waiting to send
        drop(outcomes);

        self.enter(Phase::Synchronizing);
        let workers = pool.join_within(self.config.stall_timeout()).await?;

        for record in &workers {
            tracing::debug!("Worker {} processed {} items", record.id, record.processed);
        }

        self.enter(if collected.is_complete() { Phase::Done } else { Phase::Partial });

        let result = RunResult {
            phase: self.phase,
            candidates: expected,
            skipped,
            digested: collected.digested,
            failures: collected.failures,
            workers,
        };

        Ok((result, writer))
    }

    fn enter(&mut self, phase: Phase) {
        debug_assert!(phase > self.phase, "run cannot go from {} back to {phase}", self.phase);

        tracing::debug!("Run phase: {} -> {phase}", self.phase);

        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;

    fn parse(artifact: &[u8]) -> BTreeMap<PathBuf, String> {
        let artifact = std::str::from_utf8(artifact).unwrap();

        artifact
            .split_terminator("\n\n")
            .map(|record| {
                let (path, digest) = record.split_once("\n\t").unwrap();
                (PathBuf::from(path), digest.to_owned())
            })
            .collect()
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_phases() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "x").unwrap();

        let run = Run::new(Config::new(dir.path()));
        assert_eq!(run.phase(), Phase::Enumerating);

        let (result, artifact) = run.execute_into(Vec::<u8>::new()).await.unwrap();

        assert!(result.is_done());
        assert_eq!(result.received(), 1);
        assert_eq!(parse(&artifact).len(), 1);
        assert!(logs_contain("Run phase: Collecting -> Synchronizing"));
        assert!(logs_contain("Run phase: Synchronizing -> Done"));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(dir.path().join(i.to_string()), "x").unwrap();
        }

        let run = Run::new(Config::new(dir.path()));
        run.cancellation().cancel();

        let (result, artifact) = run.execute_into(Vec::<u8>::new()).await.unwrap();

        assert_eq!(result.phase, Phase::Partial);
        assert_eq!(result.candidates, 20);
        assert_eq!(result.received(), 0);
        assert!(artifact.is_empty());
    }

    #[tokio::test]
    async fn test_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing/digest_dump");

        let err = Run::new(Config::new(dir.path()).with_output(&output)).execute().await.unwrap_err();

        assert!(matches!(err, Error::CreateOutput { ref path, .. } if *path == output), "unexpected {err:?}");
    }

    #[tokio::test]
    async fn test_invalid_root_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("digest_dump");
        std::fs::write(&output, "previous/run\n\tdeadbeef\n\n").unwrap();

        let err = Run::new(Config::new(dir.path().join("typo")).with_output(&output))
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRoot(_)), "unexpected {err:?}");
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous/run\n\tdeadbeef\n\n");
    }
}
