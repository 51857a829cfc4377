use std::{fmt, str::FromStr};

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

const KL_FLOOR: f64 = 1e-12;

/// Error function minimized during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Loss {
    /// Half the sum of squared errors.
    #[default]
    #[serde(rename = "SSE")]
    Sse,
    /// Kullback-Leibler divergence of the outputs from the targets.
    #[serde(rename = "KLDiv")]
    KlDiv,
}

impl Loss {
    pub fn value(&self, output: ArrayView2<f64>, target: ArrayView2<f64>) -> f64 {
        match self {
            Loss::Sse => Zip::from(output)
                .and(target)
                .fold(0.0, |acc, &o, &t| acc + 0.5 * (o - t).powi(2)),
            Loss::KlDiv => Zip::from(output).and(target).fold(0.0, |acc, &o, &t| {
                if t > 0.0 {
                    acc + t * (t / o.max(KL_FLOOR)).ln()
                } else {
                    acc
                }
            }),
        }
    }

    /// Gradient of [`Loss::value`] with respect to the outputs.
    pub fn gradient(&self, output: ArrayView2<f64>, target: ArrayView2<f64>) -> Array2<f64> {
        match self {
            Loss::Sse => &output - &target,
            Loss::KlDiv => Zip::from(output)
                .and(target)
                .map_collect(|&o, &t| if t > 0.0 && o >= KL_FLOOR { -t / o } else { 0.0 }),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::Sse => f.write_str("SSE"),
            Loss::KlDiv => f.write_str("KLDiv"),
        }
    }
}

impl FromStr for Loss {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SSE" => Ok(Loss::Sse),
            "KLDiv" => Ok(Loss::KlDiv),
            other => Err(format!("unknown error function {other:?}, expected SSE or KLDiv")),
        }
    }
}
