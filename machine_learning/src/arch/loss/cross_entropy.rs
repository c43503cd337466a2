use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

const EPS: f32 = 1e-7;

/// Binary cross entropy over predictions in `(0, 1)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let total = Zip::from(&y_pred).and(&y).fold(0.0, |acc, &p, &y| {
            let p = p.clamp(EPS, 1. - EPS);
            acc - (y * p.ln() + (1. - y) * (1. - p).ln())
        });

        total / y_pred.len().max(1) as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;

        Zip::from(&y_pred).and(&y).map_collect(|&p, &y| {
            let p = p.clamp(EPS, 1. - EPS);
            (p - y) / (p * (1. - p) * n)
        })
    }
}
