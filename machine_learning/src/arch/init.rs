use comms::specs::machine_learning::InitSpec;
use rand::{
    Rng,
    distr::{Distribution, Uniform},
};

use crate::{MlErr, Result};

fn uniform(low: f32, high: f32) -> Result<Uniform<f32>> {
    Uniform::new(low, high)
        .map_err(|e| MlErr::InvalidConfig(format!("invalid uniform range [{low}, {high}): {e}")))
}

/// Draws the initial parameters of a dense layer, weights first and zeroed biases last.
///
/// # Arguments
/// * `init` - How the weight matrix is drawn.
/// * `dim` - The amount of inputs and outputs of the layer.
/// * `rng` - The random source.
pub fn dense_params<R: Rng>(init: InitSpec, dim: (usize, usize), rng: &mut R) -> Result<Vec<f32>> {
    let n = dim.0 * dim.1;

    let mut params: Vec<f32> = match init {
        InitSpec::Constant { value } => vec![value; n],
        InitSpec::Uniform { low, high } => uniform(low, high)?.sample_iter(&mut *rng).take(n).collect(),
        InitSpec::XavierUniform => {
            let limit = (6.0 / (dim.0 + dim.1).max(1) as f32).sqrt();
            uniform(-limit, limit)?.sample_iter(&mut *rng).take(n).collect()
        }
    };

    params.resize(n + dim.1, 0.);
    Ok(params)
}
