use anyhow::Context;
use clap::Parser;
use learn::{FeaturePaths, LearnConfig, Norm, RunSummary};
use network::{FeedForwardNet, Loss};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

#[derive(Debug, clap::Parser)]
enum Command {
    /// Train after every `delta_train` songs, keeping memory bounded
    Buffered {
        #[command(flatten)]
        run: RunArgs,
        #[arg[short, long]]
        delta_train: Option<usize>,
    },
    /// Load the whole corpus and train once
    Unbuffered {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    #[arg[long, default_value = "data/bothchroma.csv"]]
    chroma: PathBuf,
    #[arg[long, default_value = "data/logfreqspec.csv"]]
    constant_q: PathBuf,
    /// JSON file with any `LearnConfig` fields. Fields it leaves out keep the
    /// subcommand's defaults and flags below override it
    #[arg[short, long]]
    config: Option<PathBuf>,
    #[arg[long]]
    chroma_norm: Option<Norm>,
    #[arg[long]]
    constant_q_norm: Option<Norm>,
    /// Comma separated neurons per layer, input first
    #[arg[long, value_delimiter = ',']]
    layers: Option<Vec<usize>>,
    #[arg[long]]
    loss: Option<Loss>,
    #[arg[long]]
    seed: Option<u64>,
    #[arg[long]]
    strict_length: bool,
    #[arg[short, long]]
    verbose: bool,
}

impl RunArgs {
    fn paths(&self) -> FeaturePaths {
        FeaturePaths {
            chroma: self.chroma.clone(),
            constant_q: self.constant_q.clone(),
        }
    }

    fn config(&self, preset: LearnConfig) -> anyhow::Result<LearnConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path, preset)?,
            None => preset,
        };

        if let Some(norm) = self.chroma_norm {
            config.chroma_norm = norm;
        }
        if let Some(norm) = self.constant_q_norm {
            config.constant_q_norm = norm;
        }
        if let Some(layers) = &self.layers {
            config.layer_sizes = layers.clone();
        }
        if let Some(loss) = self.loss {
            config.loss = loss;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.strict_length |= self.strict_length;
        config.verbose |= self.verbose;

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let command = Command::parse();
    let verbose = match &command {
        Command::Buffered { run, .. } | Command::Unbuffered { run } => run.verbose,
    };

    {
        use tracing_subscriber::prelude::*;

        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" })
        });
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init()
    }

    let (net, summary) = match command {
        Command::Buffered { run, delta_train } => {
            let mut config = run.config(LearnConfig::buffered())?;
            if let Some(delta_train) = delta_train {
                config.delta_train = delta_train;
            }
            debug!(?config, "buffered run");
            learn::learn_buffered(&run.paths(), &config)?
        }
        Command::Unbuffered { run } => {
            let config = run.config(LearnConfig::unbuffered())?;
            debug!(?config, "unbuffered run");
            learn::learn(&run.paths(), &config)?
        }
    };

    report(&net, &summary);
    Ok(())
}

#[instrument(level = "trace", skip(preset))]
fn read_config(path: &Path, preset: LearnConfig) -> anyhow::Result<LearnConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    merge_config(preset, &text).with_context(|| format!("invalid config {}", path.display()))
}

/// Overlays the top-level fields of a JSON object on `preset`.
fn merge_config(preset: LearnConfig, text: &str) -> anyhow::Result<LearnConfig> {
    let Value::Object(fields) = serde_json::from_str::<Value>(text)? else {
        anyhow::bail!("expected a JSON object");
    };
    let mut merged = serde_json::to_value(preset)?;
    if let Value::Object(base) = &mut merged {
        base.extend(fields);
    }
    Ok(serde_json::from_value(merged)?)
}

fn report(net: &FeedForwardNet, summary: &RunSummary) {
    for (call, report) in summary.reports.iter().enumerate() {
        info!(
            call,
            error = report.error,
            iterations = report.iterations,
            evaluations = report.evaluations,
            termination = ?report.termination,
            "training call"
        );
    }
    info!(
        layers = ?net.layer_sizes(),
        parameters = net.param_count(),
        rows = summary.rows,
        songs = summary.songs,
        skipped = summary.empty_flushes,
        "trained network"
    );
}
