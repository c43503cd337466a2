use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer with an optional activation.
///
/// Its parameters live outside the layer in a flat slice of `(dim.0 + 1) * dim.1` values:
/// the `dim.0 x dim.1` row major weight matrix followed by the `dim.1` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    name: String,
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `name` - The name callbacks see for this layer.
    /// * `dim` - The amount of inputs and outputs.
    /// * `act_fn` - The activation applied to the affine output.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(name: impl Into<String>, dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            name: name.into(),
            dim,
            act_fn,
            size: (dim.0 + 1) * dim.1,
            x: Array2::zeros((0, dim.0)),
            z: Array2::zeros((0, dim.1)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Computes the layer's output for the rows of `x`, keeping what `backward` needs.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input columns",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = x.to_owned();

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.z = z;
        Ok(a)
    }

    /// Writes the parameter gradient into `grad` and returns the delta of the layer's input.
    ///
    /// # Arguments
    /// * `params` - The same parameters the last `forward` call used.
    /// * `grad` - The gradient slice to overwrite, laid out like `params`.
    /// * `d` - The delta of the layer's output.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        let mut d = d.to_owned();

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn size_mismatch(&self, what: &'static str, got: usize) -> MlErr {
        MlErr::SizeMismatch {
            what,
            got,
            expected: self.size,
        }
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        if grad.len() != self.size {
            return Err(self.size_mismatch("dense gradient", grad.len()));
        }

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)
            .map_err(|_| self.size_mismatch("dense gradient", self.size))?;
        let db = ArrayViewMut1::from(db_raw);
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        if params.len() != self.size {
            return Err(self.size_mismatch("dense parameters", params.len()));
        }

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let weights = ArrayView2::from_shape(self.dim, w_raw)
            .map_err(|_| self.size_mismatch("dense parameters", self.size))?;
        let biases = ArrayView1::from(b_raw);
        Ok((weights, biases))
    }
}
