use std::{fs::File, io::BufReader, path::Path};

use comms::specs::data::{DatasetSource, DatasetSpec};
use ndarray::{Array2, ArrayView1};

use crate::{MlErr, Result};

/// A batch of samples, one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniBatch {
    pub x: Array2<f32>,
    pub y: Array2<f32>,
}

impl MiniBatch {
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Self {
        Self { x, y }
    }

    /// The amount of samples in the batch.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory, row major dataset.
///
/// Every row holds `x_size` features followed by `y_size` labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    data: Vec<f32>,
    x_size: usize,
    y_size: usize,
    len: usize,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `data` - The row major samples.
    /// * `x_size` - The amount of features per sample.
    /// * `y_size` - The amount of labels per sample.
    ///
    /// # Returns
    /// A new `Dataset` or an error if `data` does not hold a whole amount of rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let stride = x_size + y_size;

        if x_size == 0 || data.len() % stride != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset rows",
                got: data.len(),
                expected: data.len().next_multiple_of(stride.max(1)),
            });
        }

        Ok(Self {
            len: data.len() / stride,
            data,
            x_size,
            y_size,
        })
    }

    pub fn from_spec(spec: DatasetSpec) -> Result<Self> {
        Self::new(spec.data, spec.x_size, spec.y_size)
    }

    /// Reads a JSON encoded `DatasetSpec` from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_spec(serde_json::from_reader(reader)?)
    }

    pub fn from_source(source: DatasetSource) -> Result<Self> {
        match source {
            DatasetSource::Inline(spec) => Self::from_spec(spec),
            DatasetSource::Local { path } => Self::load(&path),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Copies the given rows, in order, into a new mini-batch.
    ///
    /// # Arguments
    /// * `rows` - Indices of the rows to gather, all of them must be lower than `len`.
    pub fn gather(&self, rows: &[usize]) -> MiniBatch {
        let Self {
            ref data,
            x_size,
            y_size,
            ..
        } = *self;
        let stride = x_size + y_size;

        let mut x = Array2::zeros((rows.len(), x_size));
        let mut y = Array2::zeros((rows.len(), y_size));

        for (i, &r) in rows.iter().enumerate() {
            let row = &data[r * stride..(r + 1) * stride];
            x.row_mut(i).assign(&ArrayView1::from(&row[..x_size]));
            y.row_mut(i).assign(&ArrayView1::from(&row[x_size..]));
        }

        MiniBatch::new(x, y)
    }
}
