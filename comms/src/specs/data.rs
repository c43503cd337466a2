use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};

/// An inline, row major dataset. Every sample is `x_size` features followed by `y_size` labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub data: Vec<f32>,
    pub x_size: usize,
    pub y_size: usize,
}

/// Where the samples of one split come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    Inline(DatasetSpec),
    /// A JSON file holding a `DatasetSpec`.
    Local { path: PathBuf },
}

/// The specification for one split of the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub source: DatasetSource,
    pub batch_size: NonZeroUsize,
    #[serde(default)]
    pub shuffle: bool,
}

/// The data every trainer reads, one optional split per execution mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    pub training: SplitSpec,
    #[serde(default)]
    pub validation: Option<SplitSpec>,
    #[serde(default)]
    pub testing: Option<SplitSpec>,
    #[serde(default)]
    pub tournament: Option<SplitSpec>,
    /// Fetches mini-batches on a background thread when set.
    #[serde(default)]
    pub prefetch: bool,
}
