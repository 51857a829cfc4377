//! Lockstep iteration over the chromagram and constant-Q feature files.
//!
//! The chromagram file is the primary stream: a row with a non-empty identity
//! starts a new song and the constant-Q row read alongside it must carry the
//! same identity. Timestamps must agree exactly on every row.

use std::io::BufRead;

use tracing::{trace, warn};

use crate::{
    error::{DesyncKind, LearnError, Result, Stream},
    reader::{FeatureReader, FeatureRow},
};

/// Rows from both files consumed in the same step.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub chroma: FeatureRow,
    pub constant_q: FeatureRow,
}

/// Song tracking across steps. `song` counts songs seen so far, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongState {
    AwaitingFirstRow,
    /// The current row started song number `song`.
    SongBoundaryCrossed { song: usize },
    MidSong { song: usize },
}

impl SongState {
    /// State after a row that does (or does not) name a new song. `None` when
    /// the very first row continues a song that was never started.
    pub fn advance(self, starts_song: bool) -> Option<SongState> {
        let songs = self.songs();
        match (self, starts_song) {
            (_, true) => Some(SongState::SongBoundaryCrossed { song: songs + 1 }),
            (SongState::AwaitingFirstRow, false) => None,
            (_, false) => Some(SongState::MidSong { song: songs }),
        }
    }

    pub fn songs(&self) -> usize {
        match *self {
            SongState::AwaitingFirstRow => 0,
            SongState::SongBoundaryCrossed { song } | SongState::MidSong { song } => song,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// 1-based step number, equal to the line number in both files.
    pub index: usize,
    pub pair: AlignedPair,
    pub state: SongState,
}

/// Walks two feature files in lockstep, stopping at the end of the shorter.
pub struct SyncWalker<P, S> {
    chroma: FeatureReader<P>,
    constant_q: FeatureReader<S>,
    state: SongState,
    steps: usize,
    strict_length: bool,
    done: bool,
}

impl<P: BufRead, S: BufRead> SyncWalker<P, S> {
    pub fn new(chroma: P, constant_q: S) -> Self {
        Self {
            chroma: FeatureReader::new(chroma, Stream::Chroma),
            constant_q: FeatureReader::new(constant_q, Stream::ConstantQ),
            state: SongState::AwaitingFirstRow,
            steps: 0,
            strict_length: false,
            done: false,
        }
    }

    /// Treat files of different lengths as an error instead of a warning.
    pub fn strict_length(mut self, strict: bool) -> Self {
        self.strict_length = strict;
        self
    }

    fn step(&mut self) -> Option<Result<Step>> {
        let chroma = match self.chroma.next() {
            Some(row) => row,
            None => {
                let surplus = self.constant_q.next().is_some();
                return self.finish(surplus.then_some(Stream::ConstantQ));
            }
        };
        let constant_q = match self.constant_q.next() {
            Some(row) => row,
            None => return self.finish(Some(Stream::Chroma)),
        };

        Some(self.align(chroma, constant_q))
    }

    fn align(
        &mut self,
        chroma: Result<FeatureRow>,
        constant_q: Result<FeatureRow>,
    ) -> Result<Step> {
        let (chroma, constant_q) = (chroma?, constant_q?);
        let index = self.steps + 1;

        if chroma.starts_song() && chroma.song_id != constant_q.song_id {
            return Err(LearnError::Desync {
                step: index,
                kind: DesyncKind::Identity {
                    chroma: chroma.song_id,
                    constant_q: constant_q.song_id,
                },
            });
        }
        if chroma.timestamp != constant_q.timestamp {
            return Err(LearnError::Desync {
                step: index,
                kind: DesyncKind::Timestamp {
                    chroma: chroma.timestamp,
                    constant_q: constant_q.timestamp,
                },
            });
        }

        let state = self
            .state
            .advance(chroma.starts_song())
            .ok_or(LearnError::OrphanRow { line: index })?;
        self.state = state;
        self.steps = index;
        trace!(step = index, ?state, "aligned rows");

        Ok(Step {
            index,
            pair: AlignedPair { chroma, constant_q },
            state,
        })
    }

    fn finish(&mut self, longer: Option<Stream>) -> Option<Result<Step>> {
        let longer = longer?;
        let lines = self.steps;
        if self.strict_length {
            return Some(Err(LearnError::LengthMismatch { longer, lines }));
        }
        warn!(%longer, lines, "feature files differ in length, ignoring the surplus rows");
        None
    }
}

impl<P: BufRead, S: BufRead> Iterator for SyncWalker<P, S> {
    type Item = Result<Step>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
