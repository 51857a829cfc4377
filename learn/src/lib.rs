//! Trains a feed-forward network mapping constant-Q spectra to bass and
//! treble chromagrams, reading both from line-aligned CSV feature files.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use network::FeedForwardNet;
use tracing::{info, instrument};

/// Logs at `info` when the run is verbose and at `debug` otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod assembly;
pub mod batch;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod trainer;
pub mod walker;

pub use assembly::assemble_network;
pub use batch::TrainingBatch;
pub use config::LearnConfig;
pub use error::{DesyncKind, LearnError, Result, RowError, Stream};
pub use normalize::{normalize, Norm};
pub use pipeline::{Pipeline, RunSummary, Schedule};
pub use reader::{FeatureReader, FeatureRow};
pub use walker::{AlignedPair, SongState, SyncWalker};

/// Locations of the two feature files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePaths {
    /// Bass and treble chromagram rows, the training targets.
    pub chroma: PathBuf,
    /// Constant-Q transform rows, the network inputs.
    pub constant_q: PathBuf,
}

impl Default for FeaturePaths {
    fn default() -> Self {
        Self {
            chroma: PathBuf::from("data/bothchroma.csv"),
            constant_q: PathBuf::from("data/logfreqspec.csv"),
        }
    }
}

/// Loads every row into memory and trains once.
pub fn learn(paths: &FeaturePaths, config: &LearnConfig) -> Result<(FeedForwardNet, RunSummary)> {
    learn_with(paths, config, Schedule::Unbuffered)
}

/// Trains after every `config.delta_train` songs so only that many songs are
/// held in memory at a time.
pub fn learn_buffered(
    paths: &FeaturePaths,
    config: &LearnConfig,
) -> Result<(FeedForwardNet, RunSummary)> {
    learn_with(
        paths,
        config,
        Schedule::Buffered {
            delta_train: config.delta_train,
        },
    )
}

#[instrument(skip(config), level = "trace")]
fn learn_with(
    paths: &FeaturePaths,
    config: &LearnConfig,
    schedule: Schedule,
) -> Result<(FeedForwardNet, RunSummary)> {
    let pipeline = Pipeline::new(config, schedule)?;
    let mut net = assemble_network(config)?;

    let summary = {
        let chroma = open(Stream::Chroma, &paths.chroma)?;
        let constant_q = open(Stream::ConstantQ, &paths.constant_q)?;
        let summary = pipeline.run(chroma, constant_q, &mut net)?;
        progress!(config.verbose, "releasing feature files");
        summary
    };

    info!(
        rows = summary.rows,
        songs = summary.songs,
        calls = summary.trainer_calls(),
        "done training neural network"
    );
    Ok((net, summary))
}

fn open(stream: Stream, path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| LearnError::Io { stream, source })
}
