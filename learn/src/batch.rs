use ndarray::Array2;

use crate::error::{LearnError, Result};

/// Normalized `(input, target)` rows waiting to be trained on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingBatch {
    inputs: Vec<Vec<f64>>,
    targets: Vec<Vec<f64>>,
}

impl TrainingBatch {
    pub fn push(&mut self, input: Vec<f64>, target: Vec<f64>) {
        self.inputs.push(input);
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Stacks the rows into `(X, Y)`.
    pub fn into_matrices(self) -> Result<(Array2<f64>, Array2<f64>)> {
        Ok((stack("input", self.inputs)?, stack("target", self.targets)?))
    }
}

fn stack(which: &'static str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    if let Some((row, ragged)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(LearnError::RaggedBatch {
            which,
            row,
            expected: width,
            actual: ragged.len(),
        });
    }

    Ok(Array2::from_shape_fn((rows.len(), width), |(r, c)| rows[r][c]))
}
