use std::{fmt, ops::Range, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::walker::AlignedPair;

pub trait Float: num_traits::Float {}
impl Float for f32 {}
impl Float for f64 {}

/// Per-segment vector normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Norm {
    /// Divide by the sum of absolute values.
    L1,
    /// Divide by the sum of squares. There is deliberately no square root:
    /// trained models depend on this exact scaling.
    L2,
    /// Divide by the largest absolute value.
    Linf,
    None,
}

impl Norm {
    fn divisor<T: Float>(self, segment: &[T]) -> Option<T> {
        let fold = |f: fn(T, T) -> T| segment.iter().fold(T::zero(), |acc, &v| f(acc, v));
        match self {
            Norm::L1 => Some(fold(|acc, v| acc + v.abs())),
            Norm::L2 => Some(fold(|acc, v| acc + v * v)),
            Norm::Linf => Some(fold(|acc, v| acc.max(v.abs()))),
            Norm::None => None,
        }
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Norm::L1 => "L1",
            Norm::L2 => "L2",
            Norm::Linf => "Linf",
            Norm::None => "None",
        };
        f.write_str(name)
    }
}

impl FromStr for Norm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L1" => Ok(Norm::L1),
            "L2" => Ok(Norm::L2),
            "Linf" => Ok(Norm::Linf),
            "None" => Ok(Norm::None),
            other => Err(format!(
                "unknown normalization {other:?}, expected L1, L2, Linf or None"
            )),
        }
    }
}

/// Normalizes each segment of `vector` on its own. Ranges past the end of the
/// vector are clipped, and a segment whose plain sum is exactly zero is left
/// untouched.
pub fn normalize<T: Float>(vector: &mut [T], norm: Norm, segments: &[Range<usize>]) {
    let len = vector.len();
    for range in segments {
        let end = range.end.min(len);
        let start = range.start.min(end);
        let segment = &mut vector[start..end];

        let sum = segment.iter().fold(T::zero(), |acc, &v| acc + v);
        if sum == T::zero() {
            continue;
        }
        if let Some(divisor) = norm.divisor(segment) {
            segment.iter_mut().for_each(|v| *v = *v / divisor);
        }
    }
}

/// [`normalize`] with the whole vector as a single segment.
pub fn normalize_whole<T: Float>(vector: &mut [T], norm: Norm) {
    let len = vector.len();
    normalize(vector, norm, &[0..len]);
}

/// The bass and treble halves of a chromagram split at `split`.
pub fn chroma_segments(split: usize) -> [Range<usize>; 2] {
    [0..split, split..2 * split]
}

/// Normalization applied to every aligned row before it is buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureNormalization {
    pub chroma: Norm,
    pub constant_q: Norm,
    pub chroma_split: usize,
}

impl FeatureNormalization {
    /// Returns the `(input, target)` training pair for one aligned row.
    pub fn apply(&self, pair: AlignedPair) -> (Vec<f64>, Vec<f64>) {
        let mut constant_q = pair.constant_q.vector;
        normalize_whole(&mut constant_q, self.constant_q);

        let mut chroma = pair.chroma.vector;
        normalize(&mut chroma, self.chroma, &chroma_segments(self.chroma_split));

        (constant_q, chroma)
    }
}
