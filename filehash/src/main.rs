//! filehash - SHA-256 digests of every file under a directory
//!
//! Entry point for the CLI application.

use std::ffi::OsString;
use std::num::NonZeroU8;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use filehash::{Config, Error, Run, RunResult, TraversalPolicy, DEFAULT_EXCLUDED, DEFAULT_OUTPUT, DEFAULT_WORKERS};
use tracing_subscriber::EnvFilter;

/// Compute the SHA-256 digest of every file under a directory and dump them to a file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct CliArgs {
    /// Directory to walk
    #[arg(value_name = "DIR")]
    root: PathBuf,

    /// Digest artifact to write
    #[arg(short, long, default_value = DEFAULT_OUTPUT, value_name = "FILE")]
    output: PathBuf,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, value_name = "NUM")]
    workers: NonZeroU8,

    /// Exclude paths having this component (repeatable)
    #[arg(long = "exclude", value_name = "NAME", action = clap::ArgAction::Append)]
    excluded: Vec<OsString>,

    /// Do not exclude version control metadata (`.git`) by default
    #[arg(long)]
    no_default_excludes: bool,

    /// Fail on the first directory that cannot be walked instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Seconds to wait for workers to exit once every file is accounted for
    #[arg(long, default_value = "30", value_name = "SECS")]
    stall_timeout: u64,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl CliArgs {
    fn into_config(self) -> Config {
        let mut excluded = self.excluded;
        if !self.no_default_excludes {
            excluded.extend(DEFAULT_EXCLUDED.iter().map(OsString::from));
        }

        Config::new(self.root)
            .with_output(self.output)
            .with_workers(self.workers)
            .with_excluded(excluded)
            .with_traversal(if self.strict { TraversalPolicy::Abort } else { TraversalPolicy::Continue })
            .with_stall_timeout(Duration::from_secs(self.stall_timeout))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    setup_logging(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let config = args.into_config();
    let output = config.output().to_path_buf();

    let run = Run::new(config);

    let cancel = run.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run...");
            cancel.cancel();
        }
    });

    let candidates = run.enumerate().await?;

    println!("{} paths to process", candidates.len());
    println!("Spinning up {} workers to process these", run.config().workers());

    let result = run
        .execute_candidates(candidates)
        .await
        .map_err(|err| describe(err, &output))?;

    print_summary(&result);

    if !result.is_done() {
        eprintln!(
            "Run interrupted: {} of {} files accounted for, `{}` is incomplete",
            result.received(),
            result.candidates,
            output.display()
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Point at the artifact only when the failure is about the artifact.
fn describe(err: Error, output: &Path) -> anyhow::Error {
    match err {
        Error::CreateOutput { .. } | Error::WriteOutput(_) => {
            anyhow::Error::new(err).context(format!("Cannot dump digests to `{}`", output.display()))
        }
        err => err.into(),
    }
}

/// Final summary, printed once every worker has exited.
fn print_summary(result: &RunResult) {
    for record in &result.workers {
        println!("Worker {} processed {} items", record.id, record.processed);
    }

    println!(
        "{} digested, {} unreadable, {} directories skipped",
        result.digested,
        result.failures.len(),
        result.skipped
    );

    for failure in &result.failures {
        eprintln!("Cannot read `{}`: {}", failure.path.display(), failure.cause);
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("filehash=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filehash=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_output_errors() {
        let output = Path::new("out/digest_dump");
        let err = Error::CreateOutput {
            path: output.to_path_buf(),
            source: std::io::ErrorKind::NotFound.into(),
        };

        assert!(format!("{:#}", describe(err, output)).starts_with("Cannot dump digests to `out/digest_dump`"));
    }

    #[test]
    fn test_describe_other_errors() {
        let output = Path::new("out/digest_dump");

        let message = format!("{:#}", describe(Error::InvalidRoot("typo".into()), output));

        assert_eq!(message, "`typo` is not a directory");
    }

    #[test]
    fn test_cli_args() {
        let args = CliArgs::parse_from(["filehash", "-w", "2", "--exclude", "target", "--strict", "root"]);
        let config = args.into_config();

        assert_eq!(config.root(), Path::new("root"));
        assert_eq!(config.workers().get(), 2);
        assert_eq!(config.excluded(), [OsString::from("target"), OsString::from(".git")]);
        assert_eq!(config.traversal(), TraversalPolicy::Abort);
    }
}
