use comms::specs::machine_learning::MetricSpec;
use ndarray::{ArrayView1, ArrayView2, Zip};

/// A quantity reported about the model's predictions, besides the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// The percentage of samples whose highest output matches the highest label.
    CategoricalAccuracy,
    MeanSquaredError,
}

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &x)| match x > best.1 {
            true => (i, x),
            false => best,
        })
        .0
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CategoricalAccuracy => "categorical_accuracy",
            Self::MeanSquaredError => "mean_squared_error",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, Self::CategoricalAccuracy)
    }

    /// The sum of the per sample values of the metric over the rows of `y_pred`.
    pub fn evaluate(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f64 {
        match self {
            Self::CategoricalAccuracy => Zip::from(y_pred.rows())
                .and(y.rows())
                .fold(0.0, |acc, p, y| {
                    let hit = match p.len() {
                        1 => (p[0] >= 0.5) == (y[0] >= 0.5),
                        _ => argmax(p) == argmax(y),
                    };

                    acc + if hit { 100.0 } else { 0.0 }
                }),
            Self::MeanSquaredError => Zip::from(y_pred.rows())
                .and(y.rows())
                .fold(0.0, |acc, p, y| {
                    let se: f32 = p.iter().zip(y).map(|(p, y)| (p - y).powi(2)).sum();
                    acc + (se / p.len().max(1) as f32) as f64
                }),
        }
    }
}

impl From<MetricSpec> for Metric {
    fn from(spec: MetricSpec) -> Self {
        match spec {
            MetricSpec::CategoricalAccuracy => Self::CategoricalAccuracy,
            MetricSpec::MeanSquaredError => Self::MeanSquaredError,
        }
    }
}
