use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    optimization::{Optimizer, OptimizerState},
};

/// A weights object shared between its layer and the terms of the objective that read it.
pub type WeightsHandle = Arc<Mutex<Weights>>;

/// A named, flat set of trainable values with their gradient and update rule.
#[derive(Clone)]
pub struct Weights {
    name: String,
    values: Vec<f32>,
    gradient: Vec<f32>,
    optimizer: Box<dyn Optimizer>,
}

/// The values of a weights object, as saved to checkpoints and exchanged between trainers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsSnapshot {
    pub name: String,
    pub values: Vec<f32>,
}

impl Weights {
    /// Creates a new `Weights` with a zeroed gradient.
    ///
    /// # Arguments
    /// * `name` - The name callbacks and snapshots refer to it by.
    /// * `values` - The initial values.
    /// * `optimizer` - The optimizer owning the update state of these values.
    pub fn new(name: impl Into<String>, values: Vec<f32>, optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            name: name.into(),
            gradient: vec![0.; values.len()],
            values,
            optimizer,
        }
    }

    pub fn into_handle(self) -> WeightsHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn gradient(&self) -> &[f32] {
        &self.gradient
    }

    pub fn gradient_mut(&mut self) -> &mut [f32] {
        &mut self.gradient
    }

    /// Borrows the values and the gradient at the same time.
    pub fn parts_mut(&mut self) -> (&[f32], &mut [f32]) {
        (&self.values, &mut self.gradient)
    }

    pub fn clear_gradient(&mut self) {
        self.gradient.fill(0.);
    }

    /// Applies the optimizer to the values using the current gradient.
    pub fn step(&mut self) -> Result<()> {
        let Self {
            values,
            gradient,
            optimizer,
            ..
        } = self;

        optimizer.update_params(values, gradient)
    }

    pub fn snapshot(&self) -> WeightsSnapshot {
        WeightsSnapshot {
            name: self.name.clone(),
            values: self.values.clone(),
        }
    }

    pub fn optimizer_state(&self) -> OptimizerState {
        self.optimizer.state()
    }

    pub fn load_optimizer_state(&mut self, state: &OptimizerState) -> Result<()> {
        self.optimizer.load_state(state)
    }

    /// Overwrites the values with those of `snapshot`, keeping the optimizer state.
    pub fn load(&mut self, snapshot: &WeightsSnapshot) -> Result<()> {
        if snapshot.values.len() != self.values.len() {
            return Err(MlErr::SizeMismatch {
                what: "weights snapshot",
                got: snapshot.values.len(),
                expected: self.values.len(),
            });
        }

        self.values.copy_from_slice(&snapshot.values);
        Ok(())
    }
}

/// Concatenates the values of every snapshot.
pub fn flatten(snapshots: &[WeightsSnapshot]) -> Vec<f32> {
    snapshots
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .collect()
}

/// Splits `flat` back into snapshots shaped and named like `template`.
pub fn unflatten(template: &[WeightsSnapshot], flat: &[f32]) -> Result<Vec<WeightsSnapshot>> {
    let expected = template.iter().map(|s| s.values.len()).sum();

    if flat.len() != expected {
        return Err(MlErr::SizeMismatch {
            what: "flattened weights",
            got: flat.len(),
            expected,
        });
    }

    let mut rest = flat;
    let snapshots = template
        .iter()
        .map(|s| {
            let (values, tail) = rest.split_at(s.values.len());
            rest = tail;

            WeightsSnapshot {
                name: s.name.clone(),
                values: values.to_vec(),
            }
        })
        .collect();

    Ok(snapshots)
}
