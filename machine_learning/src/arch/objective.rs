use std::sync::Arc;

use ndarray::Array2;

use super::{LossFn, WeightsHandle, statistics::EpochStatistics};
use crate::{MlErr, Result, distributed::Communicator, execution::ExecutionMode};

/// The quantity a model minimizes, evaluated once per mini-batch.
///
/// An evaluation is opened by `start_evaluation` and closed by `finish_evaluation`. While
/// training, `differentiate` and `compute_weight_regularization` run in between.
pub trait ObjectiveFunction: Send {
    /// Computes the loss of the last forward pass over `mini_batch_size` samples.
    fn start_evaluation(&mut self, mode: ExecutionMode, mini_batch_size: usize) -> Result<()>;

    /// Computes the gradient of the loss with respect to the model's output.
    fn differentiate(&mut self) -> Result<()>;

    /// Adds the regularization terms to the objective value and to the weights' gradients.
    fn compute_weight_regularization(&mut self) -> Result<()>;

    /// Reduces the open evaluation across ranks, records it for the epoch and returns it.
    fn finish_evaluation(&mut self, mode: ExecutionMode, mini_batch_size: usize) -> Result<f32>;
}

#[derive(Clone)]
struct L2Regularization {
    scale: f32,
    weights: Vec<WeightsHandle>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    mode: ExecutionMode,
    loss: f64,
    regularization: f64,
}

/// A loss term plus an optional L2 penalty on every weights object of the model.
pub struct Objective<L: LossFn> {
    loss_fn: L,
    l2: Option<L2Regularization>,
    comm: Arc<dyn Communicator>,
    prediction: Array2<f32>,
    labels: Array2<f32>,
    gradient: Array2<f32>,
    pending: Option<Pending>,
    statistics: EpochStatistics,
}

impl<L: LossFn> Objective<L> {
    /// Creates a new `Objective`.
    ///
    /// # Arguments
    /// * `loss_fn` - The loss term.
    /// * `comm` - The communicator the per batch values are reduced with.
    pub fn new(loss_fn: L, comm: Arc<dyn Communicator>) -> Self {
        Self {
            loss_fn,
            l2: None,
            comm,
            prediction: Array2::zeros((0, 0)),
            labels: Array2::zeros((0, 0)),
            gradient: Array2::zeros((0, 0)),
            pending: None,
            statistics: EpochStatistics::default(),
        }
    }

    /// Adds a `scale / 2 * ||w||^2` penalty over the given weights.
    pub fn with_l2(mut self, scale: f32, weights: Vec<WeightsHandle>) -> Self {
        self.l2 = Some(L2Regularization { scale, weights });
        self
    }

    /// A copy of this objective penalizing `weights` instead, with no recorded statistics.
    pub(crate) fn copy_with(&self, weights: Vec<WeightsHandle>) -> Self {
        Self {
            l2: self.l2.as_ref().map(|l2| L2Regularization {
                scale: l2.scale,
                weights,
            }),
            pending: None,
            statistics: EpochStatistics::default(),
            loss_fn: self.loss_fn.clone(),
            comm: Arc::clone(&self.comm),
            prediction: self.prediction.clone(),
            labels: self.labels.clone(),
            gradient: self.gradient.clone(),
        }
    }

    /// Stores the output of a forward pass and the labels it is scored against.
    pub(crate) fn set_outputs(&mut self, prediction: Array2<f32>, labels: Array2<f32>) {
        self.prediction = prediction;
        self.labels = labels;
    }

    pub fn prediction(&self) -> &Array2<f32> {
        &self.prediction
    }

    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// The gradient of the loss with respect to the prediction.
    pub fn gradient(&self) -> &Array2<f32> {
        &self.gradient
    }

    /// The mean objective value of `mode` over the current epoch.
    pub fn mean_value(&self, mode: ExecutionMode) -> Option<f32> {
        self.statistics.mean(mode).map(|v| v as f32)
    }

    pub fn reset_statistics(&mut self, mode: ExecutionMode) {
        self.statistics.reset(mode);
    }
}

impl<L: LossFn> ObjectiveFunction for Objective<L> {
    fn start_evaluation(&mut self, mode: ExecutionMode, _mini_batch_size: usize) -> Result<()> {
        let loss = self
            .loss_fn
            .loss(self.prediction.view(), self.labels.view());

        self.pending = Some(Pending {
            mode,
            loss: loss as f64,
            regularization: 0.,
        });

        Ok(())
    }

    fn differentiate(&mut self) -> Result<()> {
        self.gradient = self
            .loss_fn
            .loss_prime(self.prediction.view(), self.labels.view());

        Ok(())
    }

    fn compute_weight_regularization(&mut self) -> Result<()> {
        let Some(l2) = &self.l2 else {
            return Ok(());
        };

        let pending = self
            .pending
            .as_mut()
            .ok_or(MlErr::ObjectiveNotStarted(ExecutionMode::Training))?;

        let mut squared = 0.;
        for handle in &l2.weights {
            let mut weights = handle.lock();
            let (values, grad) = weights.parts_mut();

            squared += values.iter().map(|&v| (v as f64).powi(2)).sum::<f64>();
            grad.iter_mut()
                .zip(values)
                .for_each(|(g, &v)| *g += l2.scale * v);
        }

        pending.regularization = 0.5 * l2.scale as f64 * squared;
        Ok(())
    }

    fn finish_evaluation(&mut self, mode: ExecutionMode, mini_batch_size: usize) -> Result<f32> {
        let pending = self
            .pending
            .take()
            .filter(|p| p.mode == mode)
            .ok_or(MlErr::ObjectiveNotStarted(mode))?;

        let mut totals = [pending.loss * mini_batch_size as f64, mini_batch_size as f64];
        self.comm.allreduce_sum_f64(&mut totals);

        let samples = totals[1];
        let value = match samples > 0. {
            true => totals[0] / samples,
            false => 0.,
        } + pending.regularization;

        self.statistics.add(mode, value * samples, samples);
        Ok(value as f32)
    }
}
