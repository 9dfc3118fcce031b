//! Fan-in of worker outcomes into the digest artifact.

use std::path::{Path, PathBuf};

use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Digest, Outcome};

/// A path that could not be digested.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub cause: io::Error,
}

/// What the [`Collector`] observed.
#[derive(Debug, Default)]
pub struct Collected {
    /// Outcomes the collector waited for.
    pub expected: usize,
    /// Records written to the artifact.
    pub digested: usize,
    /// Outcomes that carried a read error, kept out of the artifact.
    pub failures: Vec<Failure>,
}

impl Collected {
    #[inline]
    pub fn received(&self) -> usize {
        self.digested + self.failures.len()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.received() == self.expected
    }
}

/// The single writer of the digest artifact.
///
/// Each digested path is written as a record made of the path line, a tab-indented hex digest line
/// and a blank separator line.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// # use filehash::{Collector, Digest, Outcome, CancellationToken};
/// let (sink, mut outcomes) = tokio::sync::mpsc::channel(1);
/// sink.send(Outcome::Digested { path: "a".into(), digest: Digest::of(b"x") }).await.unwrap();
///
/// let (collected, artifact) = Collector::new(Vec::new())
///     .collect(1, &mut outcomes, &CancellationToken::new())
///     .await
///     .unwrap();
///
/// assert!(collected.is_complete());
/// assert_eq!(
///     String::from_utf8(artifact).unwrap(),
///     "a\n\t2d711642b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a4881\n\n"
/// );
/// # })
/// ```
#[derive(Debug)]
pub struct Collector<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> Collector<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Receive `expected` outcomes, writing every digested one to the artifact.
    ///
    /// Stops early when the run is cancelled or when every sender is gone, in which case the returned
    /// [`Collected`] is incomplete. The writer is flushed and handed back for finalization.
    pub async fn collect(
        mut self,
        expected: usize,
        outcomes: &mut mpsc::Receiver<Outcome>,
        cancel: &CancellationToken,
    ) -> io::Result<(Collected, W)> {
        let mut collected = Collected {
            expected,
            ..Default::default()
        };

        while collected.received() < expected {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("Run cancelled after {} of {expected} outcome(s).", collected.received());
                    break;
                }
                outcome = outcomes.recv() => match outcome {
                    Some(outcome) => outcome,
                    None => {
                        tracing::warn!("Outcome channel closed after {} of {expected} outcome(s).", collected.received());
                        break;
                    }
                },
            };

            match outcome {
                Outcome::Digested { path, digest } => {
                    self.write_record(&path, &digest).await?;
                    collected.digested += 1;
                }
                Outcome::Failed { path, cause } => collected.failures.push(Failure { path, cause }),
            }
        }

        self.writer.flush().await?;

        tracing::debug!(
            "Collected {} outcome(s): {} digested, {} failed.",
            collected.received(),
            collected.digested,
            collected.failures.len()
        );

        Ok((collected, self.writer))
    }

    async fn write_record(&mut self, path: &Path, digest: &Digest) -> io::Result<()> {
        self.writer.write_all(path.as_os_str().as_encoded_bytes()).await?;
        self.writer.write_all(format!("\n\t{digest}\n\n").as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;

    fn digested(path: &str, content: &[u8]) -> Outcome {
        Outcome::Digested {
            path: path.into(),
            digest: Digest::of(content),
        }
    }

    fn failed(path: &str) -> Outcome {
        Outcome::Failed {
            path: path.into(),
            cause: io::ErrorKind::NotFound.into(),
        }
    }

    #[tokio::test]
    async fn test_collect_writes_only_digested() {
        let (sink, mut outcomes) = mpsc::channel(3);
        sink.send(digested("a", b"x")).await.unwrap();
        sink.send(failed("gone")).await.unwrap();
        sink.send(digested("b", b"y")).await.unwrap();

        let (collected, artifact) = Collector::new(Vec::<u8>::new())
            .collect(3, &mut outcomes, &CancellationToken::new())
            .await
            .unwrap();

        assert!(collected.is_complete());
        assert_eq!(collected.digested, 2);
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].path, PathBuf::from("gone"));
        assert_eq!(
            String::from_utf8(artifact).unwrap(),
            format!("a\n\t{}\n\nb\n\t{}\n\n", Digest::of(b"x"), Digest::of(b"y"))
        );
    }

    #[tokio::test]
    async fn test_collect_stops_after_expected() {
        let (sink, mut outcomes) = mpsc::channel(2);
        sink.send(digested("a", b"x")).await.unwrap();
        sink.send(digested("b", b"y")).await.unwrap();

        let (collected, _) = Collector::new(Vec::<u8>::new())
            .collect(1, &mut outcomes, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(collected.received(), 1);
        assert_eq!(outcomes.recv().await.unwrap().path(), Path::new("b"));
    }

    #[tokio::test]
    async fn test_collect_nothing_expected() {
        let (_sink, mut outcomes) = mpsc::channel(1);

        let (collected, artifact) = Collector::new(Vec::<u8>::new())
            .collect(0, &mut outcomes, &CancellationToken::new())
            .await
            .unwrap();

        assert!(collected.is_complete());
        assert!(artifact.is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_collect_closed_channel() {
        let (sink, mut outcomes) = mpsc::channel(1);
        sink.send(digested("a", b"x")).await.unwrap();
        drop(sink);

        let (collected, _) = Collector::new(Vec::<u8>::new())
            .collect(2, &mut outcomes, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!collected.is_complete());
        assert_eq!(collected.received(), 1);
        assert!(logs_contain("Outcome channel closed after 1 of 2"));
    }

    #[tokio::test]
    async fn test_collect_cancelled() {
        let (_sink, mut outcomes) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (collected, _) = Collector::new(Vec::<u8>::new()).collect(5, &mut outcomes, &cancel).await.unwrap();

        assert_eq!(collected.received(), 0);
        assert!(!collected.is_complete());
    }

    #[derive(Debug)]
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::WriteZero.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_collect_write_error() {
        let (sink, mut outcomes) = mpsc::channel(1);
        sink.send(digested("a", b"x")).await.unwrap();

        let err = Collector::new(BrokenWriter)
            .collect(1, &mut outcomes, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_keeps_raw_path_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = PathBuf::from(OsStr::from_bytes(b"dir/bad\xffname"));
        let (sink, mut outcomes) = mpsc::channel(1);
        sink.send(Outcome::Digested {
            path,
            digest: Digest::of(b"x"),
        })
        .await
        .unwrap();

        let (_, artifact) = Collector::new(Vec::<u8>::new())
            .collect(1, &mut outcomes, &CancellationToken::new())
            .await
            .unwrap();

        let mut expected = b"dir/bad\xffname\n\t".to_vec();
        expected.extend_from_slice(format!("{}\n\n", Digest::of(b"x")).as_bytes());
        assert_eq!(artifact, expected);
    }
}
