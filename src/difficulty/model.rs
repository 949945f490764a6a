//! Learned difficulty model
//!
//! A deliberately tiny regressor: three normalized performance features in,
//! one value in [0, 1] out. Trained online from buffered examples and
//! persisted through a `ModelStorage`.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::storage::ModelStorage;

/// Number of input features
pub const INPUTS: usize = 3;
/// Hidden layer width
pub const HIDDEN: usize = 3;

// Flat parameter layout: W1 (HIDDEN x INPUTS), b1 (HIDDEN), w2 (HIDDEN), b2
const W1: usize = 0;
const B1: usize = W1 + HIDDEN * INPUTS;
const W2: usize = B1 + HIDDEN;
const B2: usize = W2 + HIDDEN;
/// Total trainable parameters
pub const PARAM_COUNT: usize = B2 + 1;

/// Bumped whenever the persisted layout changes
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("model data is malformed: {0}")]
    Format(#[from] serde_json::Error),
    #[error("persisted model has version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
    #[error("input features must be finite")]
    InvalidInput,
    #[error("need at least {need} training examples, have {have}")]
    NotEnoughData { have: usize, need: usize },
    #[error("training diverged")]
    Diverged,
    #[error("model produced a non-finite output")]
    NonFiniteOutput,
}

/// Where the learned model sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    /// No model attached
    Uninitialized,
    /// Model exists but has never been trained or loaded
    HeuristicOnly,
    /// Model produces usable predictions
    Trained,
}

/// One (features, label) pair; label in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: [f32; INPUTS],
    pub label: f32,
}

/// Optimizer settings for one training run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 4,
            learning_rate: 0.01,
        }
    }
}

/// Pluggable regressor used by the difficulty controller
pub trait RegressionModel {
    /// Predict a value in [0, 1]
    fn predict(&self, features: [f32; INPUTS]) -> Result<f32, ModelError>;
    /// Fit on `samples`, returning the final mean squared error
    fn fit(&mut self, samples: &[TrainingSample], options: &TrainOptions)
    -> Result<f32, ModelError>;
    /// Restore persisted weights; `Ok(false)` when nothing was stored
    fn load(&mut self, storage: &dyn ModelStorage) -> Result<bool, ModelError>;
    fn save(&self, storage: &mut dyn ModelStorage) -> Result<(), ModelError>;
}

#[derive(Serialize, Deserialize)]
struct PersistedMlp {
    version: u32,
    params: Vec<f32>,
}

/// Dense 3 -> 3 (ReLU) -> 1 (sigmoid) network trained with Adam on MSE
#[derive(Debug, Clone)]
pub struct TinyMlp {
    params: [f32; PARAM_COUNT],
    // Adam moments
    m: [f32; PARAM_COUNT],
    v: [f32; PARAM_COUNT],
    step: i32,
    rng: Pcg32,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl TinyMlp {
    /// Randomly initialized network (uniform Glorot range)
    pub fn new(seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut params = [0.0; PARAM_COUNT];
        let limit1 = (6.0 / (INPUTS + HIDDEN) as f32).sqrt();
        let limit2 = (6.0 / (HIDDEN + 1) as f32).sqrt();
        for p in &mut params[W1..B1] {
            *p = rng.random_range(-limit1..limit1);
        }
        for p in &mut params[W2..B2] {
            *p = rng.random_range(-limit2..limit2);
        }
        Self {
            params,
            m: [0.0; PARAM_COUNT],
            v: [0.0; PARAM_COUNT],
            step: 0,
            rng,
        }
    }

    pub fn params(&self) -> &[f32; PARAM_COUNT] {
        &self.params
    }

    /// Hidden pre-activations and the output
    fn forward(&self, x: &[f32; INPUTS]) -> ([f32; HIDDEN], f32) {
        let p = &self.params;
        let mut hidden_pre = [0.0; HIDDEN];
        let mut out_pre = p[B2];
        for j in 0..HIDDEN {
            let mut acc = p[B1 + j];
            for i in 0..INPUTS {
                acc += p[W1 + j * INPUTS + i] * x[i];
            }
            hidden_pre[j] = acc;
            out_pre += p[W2 + j] * acc.max(0.0);
        }
        (hidden_pre, sigmoid(out_pre))
    }

    /// Accumulate MSE gradients of one sample into `grad`, returning its squared error
    fn backward(&self, sample: &TrainingSample, scale: f32, grad: &mut [f32; PARAM_COUNT]) -> f32 {
        let x = &sample.features;
        let (hidden_pre, y) = self.forward(x);
        let err = y - sample.label;
        let d_out = 2.0 * err * scale * y * (1.0 - y);

        grad[B2] += d_out;
        for j in 0..HIDDEN {
            let h = hidden_pre[j].max(0.0);
            grad[W2 + j] += d_out * h;
            if hidden_pre[j] > 0.0 {
                let d_hidden = d_out * self.params[W2 + j];
                grad[B1 + j] += d_hidden;
                for i in 0..INPUTS {
                    grad[W1 + j * INPUTS + i] += d_hidden * x[i];
                }
            }
        }
        err * err
    }

    fn adam_step(&mut self, grad: &[f32; PARAM_COUNT], lr: f32) {
        const BETA1: f32 = 0.9;
        const BETA2: f32 = 0.999;
        const EPS: f32 = 1e-7;

        self.step += 1;
        let bias1 = 1.0 - BETA1.powi(self.step);
        let bias2 = 1.0 - BETA2.powi(self.step);
        for k in 0..PARAM_COUNT {
            self.m[k] = BETA1 * self.m[k] + (1.0 - BETA1) * grad[k];
            self.v[k] = BETA2 * self.v[k] + (1.0 - BETA2) * grad[k] * grad[k];
            let m_hat = self.m[k] / bias1;
            let v_hat = self.v[k] / bias2;
            self.params[k] -= lr * m_hat / (v_hat.sqrt() + EPS);
        }
    }

    fn mse(&self, samples: &[TrainingSample]) -> f32 {
        let total: f32 = samples
            .iter()
            .map(|s| {
                let (_, y) = self.forward(&s.features);
                (y - s.label).powi(2)
            })
            .sum();
        total / samples.len().max(1) as f32
    }
}

impl RegressionModel for TinyMlp {
    fn predict(&self, features: [f32; INPUTS]) -> Result<f32, ModelError> {
        if features.iter().any(|f| !f.is_finite()) {
            return Err(ModelError::InvalidInput);
        }
        let (_, y) = self.forward(&features);
        if y.is_finite() {
            Ok(y)
        } else {
            Err(ModelError::NonFiniteOutput)
        }
    }

    fn fit(
        &mut self,
        samples: &[TrainingSample],
        options: &TrainOptions,
    ) -> Result<f32, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::NotEnoughData { have: 0, need: 1 });
        }
        if samples
            .iter()
            .any(|s| !s.label.is_finite() || s.features.iter().any(|f| !f.is_finite()))
        {
            return Err(ModelError::InvalidInput);
        }

        let backup = self.clone();
        let batch_size = options.batch_size.max(1);
        let mut order: Vec<usize> = (0..samples.len()).collect();

        for _ in 0..options.epochs {
            // Fisher-Yates with the model's own RNG
            for i in (1..order.len()).rev() {
                let j = self.rng.random_range(0..=i);
                order.swap(i, j);
            }
            for batch in order.chunks(batch_size) {
                let mut grad = [0.0; PARAM_COUNT];
                let scale = 1.0 / batch.len() as f32;
                for &idx in batch {
                    self.backward(&samples[idx], scale, &mut grad);
                }
                self.adam_step(&grad, options.learning_rate);
            }
        }

        let loss = self.mse(samples);
        if !loss.is_finite() || self.params.iter().any(|p| !p.is_finite()) {
            *self = backup;
            return Err(ModelError::Diverged);
        }
        Ok(loss)
    }

    fn load(&mut self, storage: &dyn ModelStorage) -> Result<bool, ModelError> {
        let Some(data) = storage.read()? else {
            return Ok(false);
        };
        let persisted: PersistedMlp = serde_json::from_str(&data)?;
        if persisted.version != FORMAT_VERSION {
            return Err(ModelError::Version {
                found: persisted.version,
                expected: FORMAT_VERSION,
            });
        }
        if persisted.params.len() != PARAM_COUNT || persisted.params.iter().any(|p| !p.is_finite())
        {
            return Err(ModelError::InvalidInput);
        }
        self.params.copy_from_slice(&persisted.params);
        self.m = [0.0; PARAM_COUNT];
        self.v = [0.0; PARAM_COUNT];
        self.step = 0;
        Ok(true)
    }

    fn save(&self, storage: &mut dyn ModelStorage) -> Result<(), ModelError> {
        let persisted = PersistedMlp {
            version: FORMAT_VERSION,
            params: self.params.to_vec(),
        };
        storage.write(&serde_json::to_string(&persisted)?)?;
        Ok(())
    }
}
