//! A crate computing content digests of every file under a directory tree.
//!
//! A run is a small producer/consumer pipeline:
//! - the [`Enumerator`] walks the tree and keeps regular, non-excluded files as candidates,
//! - the candidates are loaded into a single-use [`queue::WorkQueue`] sized exactly to fit them, which is then closed,
//! - a fixed-size [`pool::Pool`] of workers claims paths from the shared queue, reads and digests them with SHA-256,
//! - the [`Collector`] drains exactly one [`Outcome`] per candidate and writes digests to the artifact,
//! - the run only completes once every worker has signaled its exit, within a bounded delay.
//!
//! Every claimed path yields exactly one outcome, successful or not, so the collector always knows how many
//! outcomes to wait for and an unreadable file can never hang a run.
//!
//! The digest artifact is a flat text file made of one record per digested file:
//!
//! ```text
//!     path/to/file
//!     	sha256 hex digest
//!
//!     path/to/other/file
//!     	sha256 hex digest
//!
//! ```
//!
//! Records come in no particular order, which may vary from one run to another.
//!
//! Nothing is shared between runs: each [`Run`] carries its own [`Config`], its own queue and its own
//! cancellation signal.

mod collect;
mod config;
mod digest;
mod enumerate;
mod error;
mod run;

pub mod pool;
pub mod queue;

pub use collect::{Collected, Collector, Failure};
pub use config::*;
pub use digest::{Digest, Outcome, DIGEST_LEN};
pub use enumerate::{Candidates, Enumerator, TraversalPolicy};
pub use error::Error;
pub use run::{Phase, Run, RunResult};

pub use tokio_util::sync::CancellationToken;
