//! Burn reference estimator.
//!
//! A small dense actor-critic:
//!
//! ```text
//! screen ──► Linear ─ relu ─┐
//!                           ├─ concat ─► Linear ─ relu ─┬─► action head  (softmax)
//! info   ──► Linear ─ tanh ─┘                           ├─► spatial head (softmax over cells)
//!                                                       └─► value head
//! ```
//!
//! Updates go through RMSProp with gradient-norm clipping. The network and
//! the optimizer state share one mutex, so training calls from different
//! workers are applied one at a time. `predict` runs on a separate inference
//! copy that is swapped in after every update and never waits for training.

use std::path::Path;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, Module};
use burn::nn::{Linear, LinearConfig};
use burn::optim::{GradientsParams, Optimizer, RmsPropConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::{relu, softmax, tanh};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use parking_lot::Mutex;

use super::loss::{LossReport, PROB_FLOOR};
use super::{Estimator, EstimatorError, Prediction, TrainingBatch};
use crate::config::{EstimatorConfig, TrainingConfig};
use crate::core::transition::FeatureState;
use crate::environment::FeatureLayout;

/// Input and output sizes of [`A3CNet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct A3CNetConfig {
    pub screen_size: usize,
    pub non_spatial_size: usize,
    pub n_actions: usize,
    pub n_cells: usize,
    pub hidden_size: usize,
}

impl A3CNetConfig {
    pub fn new(
        screen_size: usize,
        non_spatial_size: usize,
        n_actions: usize,
        n_cells: usize,
    ) -> Self {
        Self {
            screen_size,
            non_spatial_size,
            n_actions,
            n_cells,
            hidden_size: 256,
        }
    }

    /// Sizes matching the features a run encodes, width from `config.estimator`.
    pub fn from_training(config: &TrainingConfig) -> Self {
        let layout = FeatureLayout::from_config(config);
        Self::new(
            layout.screen_size(),
            layout.non_spatial_size(),
            config.actions.len(),
            config.resolution.cells(),
        )
        .with_hidden_size(config.estimator.hidden_size)
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> A3CNet<B> {
        let h = self.hidden_size;
        A3CNet {
            screen_encoder: LinearConfig::new(self.screen_size, h).init(device),
            info_encoder: LinearConfig::new(self.non_spatial_size, h).init(device),
            trunk: LinearConfig::new(2 * h, h).init(device),
            action_head: LinearConfig::new(h, self.n_actions).init(device),
            spatial_head: LinearConfig::new(h, self.n_cells).init(device),
            value_head: LinearConfig::new(h, 1).init(device),
            screen_size: self.screen_size,
            non_spatial_size: self.non_spatial_size,
        }
    }
}

/// Output of one forward pass.
#[derive(Debug, Clone)]
pub struct A3COutput<B: Backend> {
    /// [batch, n_actions]
    pub action_probs: Tensor<B, 2>,
    /// [batch, n_cells]
    pub spatial_probs: Tensor<B, 2>,
    /// [batch, 1]
    pub values: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct A3CNet<B: Backend> {
    screen_encoder: Linear<B>,
    info_encoder: Linear<B>,
    trunk: Linear<B>,
    action_head: Linear<B>,
    spatial_head: Linear<B>,
    value_head: Linear<B>,
    #[module(skip)]
    screen_size: usize,
    #[module(skip)]
    non_spatial_size: usize,
}

impl<B: Backend> A3CNet<B> {
    pub fn forward(&self, screen: Tensor<B, 2>, info: Tensor<B, 2>) -> A3COutput<B> {
        let screen = relu(self.screen_encoder.forward(screen));
        let info = tanh(self.info_encoder.forward(info));
        let hidden = relu(self.trunk.forward(Tensor::cat(vec![screen, info], 1)));

        A3COutput {
            action_probs: softmax(self.action_head.forward(hidden.clone()), 1),
            spatial_probs: softmax(self.spatial_head.forward(hidden.clone()), 1),
            values: self.value_head.forward(hidden),
        }
    }

    /// Stack feature states into `(screen, info)` input tensors.
    pub fn inputs(
        &self,
        states: &[FeatureState],
        device: &B::Device,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>), EstimatorError> {
        let n = states.len();
        let mut screen = Vec::with_capacity(n * self.screen_size);
        let mut info = Vec::with_capacity(n * self.non_spatial_size);
        for state in states {
            if state.screen.len() != self.screen_size
                || state.non_spatial.len() != self.non_spatial_size
            {
                return Err(EstimatorError::InvalidBatch(format!(
                    "state has {}/{} features, network expects {}/{}",
                    state.screen.len(),
                    state.non_spatial.len(),
                    self.screen_size,
                    self.non_spatial_size
                )));
            }
            screen.extend_from_slice(&state.screen);
            info.extend_from_slice(&state.non_spatial);
        }

        Ok((
            Tensor::<B, 1>::from_floats(screen.as_slice(), device).reshape([n, self.screen_size]),
            Tensor::<B, 1>::from_floats(info.as_slice(), device)
                .reshape([n, self.non_spatial_size]),
        ))
    }
}

/// Build the RMSProp optimizer described by `config`.
pub fn rmsprop_optimizer<B: AutodiffBackend>(
    config: &EstimatorConfig,
) -> impl Optimizer<A3CNet<B>, B> {
    RmsPropConfig::new()
        .with_alpha(config.rms_decay)
        .with_epsilon(config.rms_epsilon)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
        .init()
}

struct Learner<B: AutodiffBackend, O> {
    net: A3CNet<B>,
    optimizer: O,
}

/// [`Estimator`] backed by an [`A3CNet`].
pub struct BurnEstimator<B: AutodiffBackend, O> {
    learner: Mutex<Learner<B, O>>,
    /// Parameters of the last finished update, without autodiff.
    inference: Mutex<A3CNet<B::InnerBackend>>,
    device: B::Device,
}

impl<B, O> BurnEstimator<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<A3CNet<B>, B> + Send,
{
    pub fn new(net: A3CNet<B>, optimizer: O, device: B::Device) -> Self {
        Self {
            inference: Mutex::new(net.valid()),
            learner: Mutex::new(Learner { net, optimizer }),
            device,
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Inference copy of the current parameters.
    ///
    /// Only the inference lock is taken, and only for the clone.
    pub fn snapshot(&self) -> A3CNet<B::InnerBackend> {
        self.inference.lock().clone()
    }

    fn publish(&self, net: &A3CNet<B>) {
        *self.inference.lock() = net.valid();
    }

    fn matrix(rows: &[Vec<f32>], width: usize, device: &B::Device) -> Result<Tensor<B, 2>, EstimatorError> {
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(EstimatorError::InvalidBatch(format!(
                    "row has {} columns, expected {}",
                    row.len(),
                    width
                )));
            }
            flat.extend_from_slice(row);
        }
        Ok(Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), width]))
    }

    fn column(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(values, device).reshape([values.len(), 1])
    }
}

fn rows<Bk: Backend>(tensor: Tensor<Bk, 2>) -> Result<Vec<Vec<f32>>, EstimatorError> {
    let [n, width] = tensor.dims();
    let flat = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| EstimatorError::Backend(format!("{:?}", e)))?;
    if width == 0 {
        return Ok(vec![Vec::new(); n]);
    }
    Ok(flat.chunks(width).map(|c| c.to_vec()).collect())
}

impl<B, O> Estimator for BurnEstimator<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<A3CNet<B>, B> + Send,
{
    fn predict(&self, states: &[FeatureState]) -> Result<Prediction, EstimatorError> {
        if states.is_empty() {
            return Ok(Prediction::default());
        }
        let net = self.snapshot();
        let (screen, info) = net.inputs(states, &self.device)?;
        let out = net.forward(screen, info);

        let values = out
            .values
            .flatten::<1>(0, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| EstimatorError::Backend(format!("{:?}", e)))?;

        Ok(Prediction {
            action_probs: rows(out.action_probs)?,
            spatial_probs: rows(out.spatial_probs)?,
            values,
        })
    }

    fn train_step(
        &self,
        batch: &TrainingBatch<'_>,
        learning_rate: f64,
    ) -> Result<LossReport, EstimatorError> {
        batch.validate()?;
        let device = &self.device;
        let mut learner = self.learner.lock();

        let (screen, info) = learner.net.inputs(batch.states, device)?;
        let out = learner.net.forward(screen, info);
        let [_, n_actions] = out.action_probs.dims();
        let [_, n_cells] = out.spatial_probs.dims();

        let legal = Self::matrix(batch.legal_masks, n_actions, device)?;
        let chosen = Self::matrix(batch.action_one_hots, n_actions, device)?;
        let target = Self::matrix(batch.spatial_one_hots, n_cells, device)?;
        let has_spatial = Self::column(batch.has_spatial, device);
        let returns = Self::column(batch.returns, device);

        let legal_mass = (out.action_probs.clone() * legal)
            .sum_dim(1)
            .clamp(PROB_FLOOR, 1.0);
        let action_log_prob = ((out.action_probs * chosen).sum_dim(1) / legal_mass)
            .clamp(PROB_FLOOR, 1.0)
            .log();
        let spatial_log_prob = (out.spatial_probs * target)
            .sum_dim(1)
            .clamp(PROB_FLOOR, 1.0)
            .log();
        let log_prob = action_log_prob + spatial_log_prob * has_spatial;

        let advantage = (returns - out.values.clone()).detach();
        let policy_loss = (log_prob * advantage.clone()).mean().neg();
        let value_loss = (out.values * advantage).mean().neg();

        let report = LossReport::new(
            policy_loss.clone().into_scalar().elem::<f32>(),
            value_loss.clone().into_scalar().elem::<f32>(),
        );

        let grads = (policy_loss + value_loss).backward();
        let grads = GradientsParams::from_grads(grads, &learner.net);
        let net = learner.net.clone();
        learner.net = learner.optimizer.step(learning_rate, net, grads);
        self.publish(&learner.net);

        Ok(report)
    }

    /// The recorder appends its own `.bin` extension to `path`.
    fn save(&self, path: &Path) -> Result<(), EstimatorError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let net = self.learner.lock().net.clone();
        net.save_file(path.to_path_buf(), &recorder)
            .map_err(|e| EstimatorError::Persistence(e.to_string()))
    }

    fn load(&self, path: &Path) -> Result<(), EstimatorError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let mut learner = self.learner.lock();
        let net = learner
            .net
            .clone()
            .load_file(path.to_path_buf(), &recorder, &self.device)
            .map_err(|e| EstimatorError::Persistence(e.to_string()))?;
        self.publish(&net);
        learner.net = net;
        Ok(())
    }
}
