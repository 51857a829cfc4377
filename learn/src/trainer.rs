use network::{LbfgsbOptions, Loss, Method, Network, TrainReport};
use tracing::{debug, instrument};

use crate::{batch::TrainingBatch, error::Result};

pub const WEIGHT_BOUNDS: (f64, f64) = (-2.0, 2.0);
pub const HISTORY: usize = 10;
pub const FACTR: f64 = 1e7;
pub const PGTOL: f64 = 1e-5;
pub const MAX_FUN: usize = 15000;

/// Hands buffered batches to the network's L-BFGS-B training.
#[derive(Debug, Clone)]
pub struct Trainer {
    loss: Loss,
    options: LbfgsbOptions,
    verbose: bool,
}

impl Trainer {
    pub fn new(loss: Loss, verbose: bool) -> Self {
        Self {
            loss,
            options: LbfgsbOptions {
                bounds: Some(WEIGHT_BOUNDS),
                history: HISTORY,
                factr: FACTR,
                pgtol: PGTOL,
                max_fun: MAX_FUN,
                disp: verbose,
                ..Default::default()
            },
            verbose,
        }
    }

    /// Trains `network` on `batch`. An empty batch is skipped and gives `None`.
    #[instrument(skip_all, fields(rows = batch.len()), level = "trace")]
    pub fn train<N: Network>(
        &self,
        batch: TrainingBatch,
        network: &mut N,
    ) -> Result<Option<TrainReport>> {
        if batch.is_empty() {
            debug!("nothing buffered, skipping training call");
            return Ok(None);
        }

        progress!(self.verbose, rows = batch.len(), "training");
        let (x, y) = batch.into_matrices()?;
        let report = network.train(x.view(), y.view(), Method::LBfgsB, self.loss, &self.options)?;
        progress!(self.verbose, error = report.error, "done training");

        Ok(Some(report))
    }
}
