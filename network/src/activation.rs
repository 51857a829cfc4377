use std::ops::Range;

use ndarray::{s, Array2, ArrayView2, Zip};

/// Per-layer output nonlinearity.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Sigmoid,
    /// Softmax applied independently to each slice between consecutive split
    /// points, e.g. `splits: [12]` on a 24 wide layer gives `[0, 12)` and `[12, 24)`.
    SoftMax { splits: Vec<usize> },
    Identity,
}

impl Activation {
    pub fn softmax(splits: impl Into<Vec<usize>>) -> Self {
        Activation::SoftMax {
            splits: splits.into(),
        }
    }

    /// Index ranges a softmax normalizes over for a layer of `width` units.
    pub fn partitions(splits: &[usize], width: usize) -> Vec<Range<usize>> {
        let mut bounds = vec![0];
        bounds.extend(splits.iter().copied().filter(|&split| split > 0 && split < width));
        bounds.push(width);
        bounds.dedup();

        bounds.windows(2).map(|pair| pair[0]..pair[1]).collect()
    }

    /// Turns pre-activations into activations, one row per sample.
    pub fn apply(&self, z: &mut Array2<f64>) {
        match self {
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Identity => {}
            Activation::SoftMax { splits } => {
                let partitions = Self::partitions(splits, z.ncols());
                for mut row in z.rows_mut() {
                    for range in &partitions {
                        let mut part = row.slice_mut(s![range.clone()]);
                        let max = part.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
                        part.mapv_inplace(|v| (v - max).exp());
                        let total = part.sum();
                        part.mapv_inplace(|v| v / total);
                    }
                }
            }
        }
    }

    /// Converts a gradient with respect to this layer's outputs into one with
    /// respect to its pre-activations, given the outputs the forward pass produced.
    pub fn backprop(&self, output: ArrayView2<f64>, grad: &mut Array2<f64>) {
        match self {
            Activation::Identity => {}
            Activation::Sigmoid => {
                Zip::from(grad)
                    .and(output)
                    .for_each(|g, &a| *g *= a * (1.0 - a));
            }
            Activation::SoftMax { splits } => {
                let partitions = Self::partitions(splits, output.ncols());
                for (mut g_row, a_row) in grad.rows_mut().into_iter().zip(output.rows()) {
                    for range in &partitions {
                        let a = a_row.slice(s![range.clone()]);
                        let mut g = g_row.slice_mut(s![range.clone()]);
                        let weighted = g.dot(&a);
                        Zip::from(&mut g)
                            .and(&a)
                            .for_each(|g, &a| *g = a * (*g - weighted));
                    }
                }
            }
        }
    }
}
