use std::io::BufRead;

use network::{Network, TrainReport};
use tracing::instrument;

use crate::{
    batch::TrainingBatch,
    config::LearnConfig,
    error::{LearnError, Result},
    normalize::FeatureNormalization,
    trainer::Trainer,
    walker::{SongState, SyncWalker},
};

/// When buffered rows are handed to the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Everything in one batch at the end of the files.
    Unbuffered,
    /// A batch each time the song counter reaches a multiple of
    /// `delta_train`, plus one for whatever is left at the end.
    Buffered { delta_train: usize },
}

impl Schedule {
    /// Whether the buffer is flushed on reaching `state`, before that row is
    /// buffered. The song that completes a multiple therefore opens the next
    /// batch rather than closing the current one.
    pub fn flushes_at(&self, state: SongState) -> bool {
        match (*self, state) {
            (Schedule::Buffered { delta_train }, SongState::SongBoundaryCrossed { song }) => {
                delta_train > 0 && song % delta_train == 0
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub rows: usize,
    pub songs: usize,
    /// Flushes that found nothing buffered and were skipped.
    pub empty_flushes: usize,
    /// One report per training call, in order.
    pub reports: Vec<TrainReport>,
}

impl RunSummary {
    pub fn trainer_calls(&self) -> usize {
        self.reports.len()
    }

    fn record(&mut self, report: Option<TrainReport>) {
        match report {
            Some(report) => self.reports.push(report),
            None => self.empty_flushes += 1,
        }
    }
}

/// Streams two feature files into a network according to a [`Schedule`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    normalization: FeatureNormalization,
    trainer: Trainer,
    schedule: Schedule,
    strict_length: bool,
    verbose: bool,
}

impl Pipeline {
    pub fn new(config: &LearnConfig, schedule: Schedule) -> Result<Self> {
        config.validate()?;
        if let Schedule::Buffered { delta_train: 0 } = schedule {
            return Err(LearnError::InvalidConfig(
                "delta_train must be at least 1 for buffered runs".to_string(),
            ));
        }
        Ok(Self {
            normalization: FeatureNormalization {
                chroma: config.chroma_norm,
                constant_q: config.constant_q_norm,
                chroma_split: config.chroma_split,
            },
            trainer: Trainer::new(config.loss, config.verbose),
            schedule,
            strict_length: config.strict_length,
            verbose: config.verbose,
        })
    }

    /// Walks both files to the end, training `network` in place. Stops at the
    /// first error without training on what is still buffered.
    #[instrument(skip_all, fields(schedule = ?self.schedule), level = "trace")]
    pub fn run<P, S, N>(&self, chroma: P, constant_q: S, network: &mut N) -> Result<RunSummary>
    where
        P: BufRead,
        S: BufRead,
        N: Network,
    {
        let walker = SyncWalker::new(chroma, constant_q).strict_length(self.strict_length);
        let mut summary = RunSummary::default();
        let mut batch = TrainingBatch::default();

        for step in walker {
            let step = step?;
            if let SongState::SongBoundaryCrossed { song } = step.state {
                progress!(
                    self.verbose,
                    song = %step.pair.chroma.song_id,
                    number = song,
                    "processing song"
                );
            }

            if self.schedule.flushes_at(step.state) {
                let full = std::mem::take(&mut batch);
                summary.record(self.trainer.train(full, network)?);
            }

            let (input, target) = self.normalization.apply(step.pair);
            batch.push(input, target);
            summary.rows += 1;
            summary.songs = step.state.songs();
        }

        summary.record(self.trainer.train(batch, network)?);
        Ok(summary)
    }
}
