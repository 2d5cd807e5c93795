//! Reconstruction-error scorer: a dense encode/decode network trained to
//! reproduce standardized curves. Curves it reconstructs badly are anomalous.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::model::{AnomalyLabel, AnomalyScore, CurveMatrix};
use crate::error::CurveError;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderParams {
    pub hidden: usize,
    pub bottleneck: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of rows, taken from the end, held out for validation loss.
    pub validation_split: f64,
    /// Scores above this percentile of the scored collection are anomalous.
    pub percentile: f64,
    pub seed: u64,
}

impl Default for AutoencoderParams {
    fn default() -> Self {
        AutoencoderParams {
            hidden: 128,
            bottleneck: 64,
            epochs: 50,
            batch_size: 8,
            learning_rate: 0.001,
            validation_split: 0.1,
            percentile: 90.0,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Dense layer with Adam state
// ---------------------------------------------------------------------------

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    Linear,
}

#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    fn new(fan_in: usize, fan_out: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let weights =
            Array2::from_shape_simple_fn((fan_in, fan_out), || rng.random_range(-limit..limit));
        Dense {
            weights,
            bias: Array1::zeros(fan_out),
            activation,
            m_w: Array2::zeros((fan_in, fan_out)),
            v_w: Array2::zeros((fan_in, fan_out)),
            m_b: Array1::zeros(fan_out),
            v_b: Array1::zeros(fan_out),
        }
    }

    /// Returns `(pre_activation, output)`.
    fn forward(&self, input: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        let z = input.dot(&self.weights) + &self.bias;
        let a = match self.activation {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Linear => z.clone(),
        };
        (z, a)
    }

    /// Backpropagate `grad_out` (dL/d output), update with Adam, and return
    /// dL/d input.
    fn backward(
        &mut self,
        input: &ArrayView2<f64>,
        z: &Array2<f64>,
        grad_out: Array2<f64>,
        lr_t: f64,
    ) -> Array2<f64> {
        let grad_z = match self.activation {
            Activation::Relu => grad_out * &z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Linear => grad_out,
        };
        let grad_w = input.t().dot(&grad_z);
        let grad_b = grad_z.sum_axis(Axis(0));
        let grad_in = grad_z.dot(&self.weights.t());

        adam_step(&mut self.weights, &mut self.m_w, &mut self.v_w, &grad_w, lr_t);
        adam_step(&mut self.bias, &mut self.m_b, &mut self.v_b, &grad_b, lr_t);
        grad_in
    }
}

fn adam_step<D: ndarray::Dimension>(
    param: &mut ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    grad: &ndarray::Array<f64, D>,
    lr_t: f64,
) {
    ndarray::Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + ADAM_EPS);
        });
}

// ---------------------------------------------------------------------------
// Autoencoder
// ---------------------------------------------------------------------------

/// Loss per epoch. `validation` is empty when no rows were held out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub validation: Vec<f64>,
}

/// `input → hidden → bottleneck → hidden → input` with ReLU on the hidden
/// layers and a linear output.
#[derive(Debug, Clone)]
pub struct Autoencoder {
    layers: Vec<Dense>,
    params: AutoencoderParams,
    input_dim: usize,
    step: i32,
    rng: StdRng,
}

impl Autoencoder {
    pub fn new(input_dim: usize, params: AutoencoderParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let (h, b) = (params.hidden, params.bottleneck);
        let layers = vec![
            Dense::new(input_dim, h, Activation::Relu, &mut rng),
            Dense::new(h, b, Activation::Relu, &mut rng),
            Dense::new(b, h, Activation::Relu, &mut rng),
            Dense::new(h, input_dim, Activation::Linear, &mut rng),
        ];
        Autoencoder {
            layers,
            params,
            input_dim,
            step: 0,
            rng,
        }
    }

    /// Reconstruct each row of `x`.
    pub fn reconstruct(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut a = x.clone();
        for layer in &self.layers {
            a = layer.forward(&a.view()).1;
        }
        a
    }

    /// Mean squared error of `x` against its reconstruction, over all cells.
    fn loss(&self, x: &Array2<f64>) -> f64 {
        let diff = self.reconstruct(x) - x;
        diff.mapv(|v| v * v).mean().unwrap_or(0.0)
    }

    /// One Adam update on a mini-batch. Returns the batch loss before the update.
    fn train_batch(&mut self, batch: &Array2<f64>) -> f64 {
        let mut inputs: Vec<Array2<f64>> = Vec::with_capacity(self.layers.len());
        let mut pre: Vec<Array2<f64>> = Vec::with_capacity(self.layers.len());
        let mut a = batch.clone();
        for layer in &self.layers {
            let (z, out) = layer.forward(&a.view());
            inputs.push(a);
            pre.push(z);
            a = out;
        }

        let diff = &a - batch;
        let loss = diff.mapv(|v| v * v).mean().unwrap_or(0.0);
        let mut grad = diff * (2.0 / batch.len() as f64);

        self.step += 1;
        let t = self.step;
        let lr_t = self.params.learning_rate * (1.0 - BETA2.powi(t)).sqrt() / (1.0 - BETA1.powi(t));
        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            grad = layer.backward(&inputs[i].view(), &pre[i], grad, lr_t);
        }
        loss
    }

    /// Train on the rows of `data`. The last `validation_split` fraction of
    /// rows is held out; batch order is reshuffled every epoch.
    pub fn fit(&mut self, data: &CurveMatrix) -> Result<TrainingHistory, CurveError> {
        data.check_width(self.input_dim)?;
        let n = data.nrows();
        if n == 0 {
            return Err(CurveError::InsufficientPoints { found: 0 });
        }
        let n_train = ((n as f64 * (1.0 - self.params.validation_split)) as usize).clamp(1, n);
        let train = data.values.slice(ndarray::s![..n_train, ..]).to_owned();
        let validation = data.values.slice(ndarray::s![n_train.., ..]).to_owned();
        let batch_size = self.params.batch_size.max(1);

        let mut history = TrainingHistory::default();
        let mut order: Vec<usize> = (0..n_train).collect();
        for epoch in 0..self.params.epochs {
            order.shuffle(&mut self.rng);
            let mut total = 0.0;
            for chunk in order.chunks(batch_size) {
                let batch = train.select(Axis(0), chunk);
                total += self.train_batch(&batch) * chunk.len() as f64;
            }
            let loss = total / n_train as f64;
            history.loss.push(loss);
            if validation.nrows() > 0 {
                let val = self.loss(&validation);
                history.validation.push(val);
                log::debug!("epoch {}: loss {loss:.6}, val_loss {val:.6}", epoch + 1);
            } else {
                log::debug!("epoch {}: loss {loss:.6}", epoch + 1);
            }
        }
        if let Some(last) = history.loss.last() {
            log::info!(
                "Trained autoencoder for {} epochs on {n_train} curves, final loss {last:.6}",
                self.params.epochs
            );
        }
        Ok(history)
    }

    /// Per-row mean squared reconstruction error.
    pub fn reconstruction_errors(&self, data: &CurveMatrix) -> Result<Vec<f64>, CurveError> {
        data.check_width(self.input_dim)?;
        let diff = self.reconstruct(&data.values) - &data.values;
        Ok(diff
            .rows()
            .into_iter()
            .map(|r| r.mapv(|v| v * v).mean().unwrap_or(0.0))
            .collect())
    }

    /// Score every row and label those above the configured percentile.
    pub fn score(&self, data: &CurveMatrix) -> Result<Vec<AnomalyScore>, CurveError> {
        let errors = self.reconstruction_errors(data)?;
        let threshold = percentile(&errors, self.params.percentile);
        log::info!("Reconstruction threshold (p{}): {threshold:.6}", self.params.percentile);
        Ok(data
            .names
            .iter()
            .zip(label_by_threshold(&errors, threshold))
            .zip(&errors)
            .map(|((name, label), &score)| AnomalyScore {
                name: name.clone(),
                score,
                label,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Thresholding
// ---------------------------------------------------------------------------

/// Percentile with linear interpolation between closest ranks (`p` in 0..=100).
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `Anomalous` when the error is strictly above `threshold`.
pub fn label_by_threshold(errors: &[f64], threshold: f64) -> Vec<AnomalyLabel> {
    errors
        .iter()
        .map(|&e| {
            if e > threshold {
                AnomalyLabel::Anomalous
            } else {
                AnomalyLabel::Normal
            }
        })
        .collect()
}
