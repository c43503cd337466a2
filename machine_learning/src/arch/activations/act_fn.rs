use comms::specs::machine_learning::ActFnSpec;

use super::Sigmoid;

/// An element wise activation function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu,
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.f(x),
            Self::Relu => x.max(0.),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.df(x),
            Self::Relu if x > 0. => 1.,
            Self::Relu => 0.,
        }
    }
}

impl From<ActFnSpec> for ActFn {
    fn from(spec: ActFnSpec) -> Self {
        match spec {
            ActFnSpec::Sigmoid { amp } => Self::sigmoid(amp),
            ActFnSpec::Relu => Self::Relu,
        }
    }
}
