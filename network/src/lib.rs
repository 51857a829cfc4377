use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, instrument};

pub mod activation;
pub mod error;
pub mod loss;
pub mod optimizer;

pub use activation::Activation;
pub use error::NetworkError;
pub use loss::Loss;
pub use optimizer::{LbfgsbOptions, Termination};

/// Batch optimizer used by [`Network::train`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    LBfgsB,
}

/// Outcome of one batch-training call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Loss at the returned weights.
    pub error: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// A trainable model mapping rows of `x` to rows of `y`.
pub trait Network {
    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    /// Fits the parameters to `(x, y)` in place.
    fn train(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        method: Method,
        loss: Loss,
        options: &LbfgsbOptions,
    ) -> Result<TrainReport, NetworkError>;
}

#[derive(Debug, Clone)]
struct Layer {
    /// `[outputs, inputs]`
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
}

/// Fully connected feed-forward network.
#[derive(Debug, Clone)]
pub struct FeedForwardNet {
    sizes: Vec<usize>,
    layers: Vec<Layer>,
}

impl FeedForwardNet {
    /// Builds a network with one activation per non-input layer. Weights are
    /// drawn uniformly from a Glorot range using `seed`.
    pub fn new(
        sizes: Vec<usize>,
        activations: Vec<Activation>,
        seed: u64,
    ) -> Result<Self, NetworkError> {
        if sizes.len() < 2 {
            return Err(NetworkError::InvalidShape(format!(
                "need at least an input and an output layer, got {sizes:?}"
            )));
        }
        if sizes.contains(&0) {
            return Err(NetworkError::InvalidShape(format!(
                "layer sizes must be non-zero, got {sizes:?}"
            )));
        }
        if activations.len() != sizes.len() - 1 {
            return Err(NetworkError::InvalidShape(format!(
                "{} layers need {} activations, got {}",
                sizes.len(),
                sizes.len() - 1,
                activations.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let layers = sizes
            .windows(2)
            .zip(activations)
            .map(|(pair, activation)| {
                let (inputs, outputs) = (pair[0], pair[1]);
                let range = (6.0 / (inputs + outputs) as f64).sqrt();
                Layer {
                    weights: Array2::from_shape_simple_fn((outputs, inputs), || {
                        rng.random_range(-range..range)
                    }),
                    biases: Array1::zeros(outputs),
                    activation,
                }
            })
            .collect();

        Ok(Self { sizes, layers })
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn activations(&self) -> impl Iterator<Item = &Activation> {
        self.layers.iter().map(|layer| &layer.activation)
    }

    pub fn output_activation(&self) -> &Activation {
        // new() guarantees at least one layer
        &self.layers[self.layers.len() - 1].activation
    }

    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.weights.len() + layer.biases.len())
            .sum()
    }

    /// Runs the forward pass, one output row per input row.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, NetworkError> {
        self.check_width("input", self.input_size(), x.ncols())?;
        let mut outputs = self.forward(x);
        Ok(outputs.pop().unwrap_or_else(|| x.to_owned()))
    }

    fn check_width(
        &self,
        what: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), NetworkError> {
        if expected != actual {
            return Err(NetworkError::DimensionMismatch {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Activations of every non-input layer, in order.
    fn forward(&self, x: ArrayView2<f64>) -> Vec<Array2<f64>> {
        let mut outputs: Vec<Array2<f64>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let input = match outputs.last() {
                Some(a) => a.view(),
                None => x.view(),
            };
            let mut z = input.dot(&layer.weights.t());
            z += &layer.biases;
            layer.activation.apply(&mut z);
            outputs.push(z);
        }
        outputs
    }

    fn params(&self) -> Vec<f64> {
        let mut params = Vec::with_capacity(self.param_count());
        for layer in &self.layers {
            params.extend(layer.weights.iter());
            params.extend(layer.biases.iter());
        }
        params
    }

    fn set_params(&mut self, params: &[f64]) {
        let mut offset = 0;
        for layer in &mut self.layers {
            for (w, p) in layer.weights.iter_mut().zip(&params[offset..]) {
                *w = *p;
            }
            offset += layer.weights.len();
            for (b, p) in layer.biases.iter_mut().zip(&params[offset..]) {
                *b = *p;
            }
            offset += layer.biases.len();
        }
    }

    /// Loss over the batch, writing its gradient in [`Self::params`] order.
    fn loss_and_gradient(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        loss: Loss,
        grad: &mut [f64],
    ) -> f64 {
        let outputs = self.forward(x);
        let Some(prediction) = outputs.last() else {
            return 0.0;
        };
        let value = loss.value(prediction.view(), y);

        let mut delta = loss.gradient(prediction.view(), y);
        let mut layer_grads = Vec::with_capacity(self.layers.len());
        for (index, layer) in self.layers.iter().enumerate().rev() {
            layer.activation.backprop(outputs[index].view(), &mut delta);
            let input = if index == 0 {
                x.view()
            } else {
                outputs[index - 1].view()
            };
            let weight_grad = delta.t().dot(&input);
            let bias_grad = delta.sum_axis(Axis(0));
            if index > 0 {
                delta = delta.dot(&layer.weights);
            }
            layer_grads.push((weight_grad, bias_grad));
        }

        let mut offset = 0;
        for (weight_grad, bias_grad) in layer_grads.iter().rev() {
            for (g, v) in grad[offset..].iter_mut().zip(weight_grad.iter()) {
                *g = *v;
            }
            offset += weight_grad.len();
            for (g, v) in grad[offset..].iter_mut().zip(bias_grad.iter()) {
                *g = *v;
            }
            offset += bias_grad.len();
        }

        value
    }
}

impl Network for FeedForwardNet {
    fn input_size(&self) -> usize {
        self.sizes[0]
    }

    fn output_size(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    #[instrument(skip(self, x, y, options), fields(rows = x.nrows()), level = "trace")]
    fn train(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        method: Method,
        loss: Loss,
        options: &LbfgsbOptions,
    ) -> Result<TrainReport, NetworkError> {
        if x.nrows() == 0 {
            return Err(NetworkError::EmptyBatch);
        }
        if x.nrows() != y.nrows() {
            return Err(NetworkError::DimensionMismatch {
                what: "target rows",
                expected: x.nrows(),
                actual: y.nrows(),
            });
        }
        self.check_width("input", self.input_size(), x.ncols())?;
        self.check_width("target", self.output_size(), y.ncols())?;

        let Method::LBfgsB = method;
        let mut probe = self.clone();
        let minimum = optimizer::minimize(
            |params, grad| {
                probe.set_params(params);
                probe.loss_and_gradient(x, y, loss, grad)
            },
            self.params(),
            options,
        )?;
        self.set_params(&minimum.x);

        debug!(
            error = minimum.f,
            iterations = minimum.iterations,
            termination = ?minimum.termination,
            "batch trained"
        );

        Ok(TrainReport {
            error: minimum.f,
            iterations: minimum.iterations,
            evaluations: minimum.evaluations,
            termination: minimum.termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn tiny(output: Activation) -> FeedForwardNet {
        FeedForwardNet::new(vec![3, 4, 2], vec![Activation::Sigmoid, output], 7).unwrap()
    }

    #[test]
    fn rejects_mismatched_activation_count() {
        let result = FeedForwardNet::new(vec![3, 4, 2], vec![Activation::Identity], 0);
        assert!(matches!(result, Err(NetworkError::InvalidShape(_))));
    }

    #[test]
    fn rejects_single_layer() {
        let result = FeedForwardNet::new(vec![3], vec![], 0);
        assert!(matches!(result, Err(NetworkError::InvalidShape(_))));
    }

    #[test]
    fn same_seed_gives_same_weights() {
        let a = tiny(Activation::Identity);
        let b = tiny(Activation::Identity);
        assert_eq!(a.params(), b.params());
        assert_eq!(a.param_count(), 3 * 4 + 4 + 4 * 2 + 2);
    }

    #[test]
    fn predict_runs_every_layer() {
        let net = FeedForwardNet::new(
            vec![3, 5, 4, 2],
            vec![Activation::Sigmoid, Activation::Sigmoid, Activation::softmax([1])],
            3,
        )
        .unwrap();
        let out = net
            .predict(array![[0.1, 0.2, 0.3], [1.0, 0.0, -1.0]].view())
            .unwrap();

        assert_eq!(out.dim(), (2, 2));
        // one-wide softmax partitions are always 1
        assert!(out.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn predict_checks_input_width() {
        let net = tiny(Activation::Identity);
        let result = net.predict(array![[1.0, 2.0]].view());
        assert!(matches!(
            result,
            Err(NetworkError::DimensionMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let x = array![[0.1, 0.5, 0.9], [0.3, 0.2, 0.0]];
        let y = array![[0.7, 0.3], [0.4, 0.6]];

        for (output, loss) in [
            (Activation::Identity, Loss::Sse),
            (Activation::Sigmoid, Loss::Sse),
            (Activation::softmax([1]), Loss::KlDiv),
            (Activation::softmax(Vec::<usize>::new()), Loss::KlDiv),
        ] {
            let mut net = tiny(output);
            let params = net.params();
            let mut grad = vec![0.0; params.len()];
            net.loss_and_gradient(x.view(), y.view(), loss, &mut grad);

            let h = 1e-6;
            for i in [0, 5, params.len() - 3, params.len() - 1] {
                let mut shifted = params.clone();
                shifted[i] += h;
                net.set_params(&shifted);
                let mut scratch = vec![0.0; params.len()];
                let up = net.loss_and_gradient(x.view(), y.view(), loss, &mut scratch);
                shifted[i] -= 2.0 * h;
                net.set_params(&shifted);
                let down = net.loss_and_gradient(x.view(), y.view(), loss, &mut scratch);
                net.set_params(&params);

                let numeric = (up - down) / (2.0 * h);
                assert!(
                    (numeric - grad[i]).abs() < 1e-5,
                    "param {i}: numeric {numeric} analytic {}",
                    grad[i]
                );
            }
        }
    }

    #[test]
    fn training_reduces_error_and_stays_in_bounds() {
        let x = array![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let y = array![[0.1, 0.9], [0.9, 0.1], [0.5, 0.5], [0.2, 0.8]];
        let mut net = tiny(Activation::Sigmoid);

        let before = Loss::Sse.value(net.predict(x.view()).unwrap().view(), y.view());
        let options = LbfgsbOptions {
            bounds: Some((-2.0, 2.0)),
            ..Default::default()
        };
        let report = net
            .train(x.view(), y.view(), Method::LBfgsB, Loss::Sse, &options)
            .unwrap();

        assert!(report.error < before);
        assert!(net.params().iter().all(|w| (-2.0..=2.0).contains(w)));
    }

    #[test]
    fn train_rejects_empty_batch() {
        let mut net = tiny(Activation::Identity);
        let x = Array2::<f64>::zeros((0, 3));
        let y = Array2::<f64>::zeros((0, 2));
        let result = net.train(
            x.view(),
            y.view(),
            Method::LBfgsB,
            Loss::Sse,
            &LbfgsbOptions::default(),
        );
        assert!(matches!(result, Err(NetworkError::EmptyBatch)));
    }
}
