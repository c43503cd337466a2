use rayon::prelude::*;

use super::{
    Optimizer, OptimizerState,
    optimizer::{check_len, wrong_state},
};
use crate::Result;

/// Gradient descent optimization algorithm.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `update_params`.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient, with a length of `learning_rate`.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_len("gradient descent gradient", grad.len(), params.len())?;
        let lr = self.learning_rate;

        params
            .par_iter_mut()
            .zip(grad.par_iter())
            .for_each(|(w, g)| *w -= lr * g);

        Ok(())
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Stateless
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        match state {
            OptimizerState::Stateless => Ok(()),
            state => Err(wrong_state("gradient descent", state)),
        }
    }

    fn box_clone(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}
