use rayon::prelude::*;

use super::{
    Optimizer, OptimizerState,
    optimizer::{check_len, wrong_state},
};
use crate::Result;

/// Gradient descent with a velocity term.
#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Box<[f32]>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The decay of the accumulated velocity.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_len("momentum gradient", grad.len(), params.len())?;
        check_len("momentum velocity", self.velocity.len(), params.len())?;

        let lr = self.learning_rate;
        let mu = self.momentum;

        params
            .par_iter_mut()
            .zip(grad.par_iter())
            .zip(self.velocity.par_iter_mut())
            .for_each(|((p, g), v)| {
                *v = mu * *v + g;
                *p -= lr * *v;
            });

        Ok(())
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Momentum {
            velocity: self.velocity.to_vec(),
        }
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        let OptimizerState::Momentum { velocity } = state else {
            return Err(wrong_state("momentum", state));
        };

        check_len("momentum velocity", velocity.len(), self.velocity.len())?;
        self.velocity.copy_from_slice(velocity);
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}
