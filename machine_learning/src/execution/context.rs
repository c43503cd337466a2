use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ExecutionMode;

/// An accumulating wall clock timer.
///
/// Serializes as its total including the running interval and deserializes stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Stopwatch {
    elapsed: Duration,
    started: Option<Instant>,
}

impl Stopwatch {
    fn total(&self) -> Duration {
        self.elapsed + self.started.map(|t| t.elapsed()).unwrap_or_default()
    }
}

impl Serialize for Stopwatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.total().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Stopwatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elapsed = Duration::deserialize(deserializer)?;
        Ok(Self {
            elapsed,
            started: None,
        })
    }
}

/// The mutable progress record of one run of a training algorithm.
///
/// Holds the epoch and step counters, the mini-batch sizes, the early stop flag and an
/// accumulating wall clock timer. It round trips through serde so a checkpoint can restore it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    mode: ExecutionMode,
    epoch: usize,
    step: usize,
    current_mini_batch_size: usize,
    effective_mini_batch_size: usize,
    early_stop: bool,
    #[serde(rename = "elapsed")]
    timer: Stopwatch,
}

impl ExecutionContext {
    /// Creates a new `ExecutionContext`.
    ///
    /// # Arguments
    /// * `mode` - The execution mode the context starts in.
    /// * `mini_batch_size` - The initial current and effective mini-batch size.
    ///
    /// # Returns
    /// A new `ExecutionContext` instance with zeroed counters.
    pub fn new(mode: ExecutionMode, mini_batch_size: usize) -> Self {
        Self {
            mode,
            current_mini_batch_size: mini_batch_size,
            effective_mini_batch_size: mini_batch_size,
            ..Default::default()
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.mode = mode;
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn inc_epoch(&mut self) {
        self.epoch += 1;
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn inc_step(&mut self) {
        self.step += 1;
    }

    pub fn current_mini_batch_size(&self) -> usize {
        self.current_mini_batch_size
    }

    pub fn set_current_mini_batch_size(&mut self, size: usize) {
        self.current_mini_batch_size = size;
    }

    pub fn effective_mini_batch_size(&self) -> usize {
        self.effective_mini_batch_size
    }

    pub fn set_effective_mini_batch_size(&mut self, size: usize) {
        self.effective_mini_batch_size = size;
    }

    pub fn early_stop(&self) -> bool {
        self.early_stop
    }

    pub fn set_early_stop(&mut self, early_stop: bool) {
        self.early_stop = early_stop;
    }

    /// Starts accumulating wall clock time, does nothing if the timer is already running.
    pub fn start_timer(&mut self) {
        self.timer.started.get_or_insert_with(Instant::now);
    }

    /// Stops the timer, adding the time since `start_timer` to the accumulated total.
    pub fn stop_timer(&mut self) {
        let timer = &mut self.timer;
        if let Some(started) = timer.started.take() {
            timer.elapsed += started.elapsed();
        }
    }

    /// The accumulated running time, including the currently running interval.
    pub fn elapsed(&self) -> Duration {
        self.timer.total()
    }

    #[cfg(test)]
    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.timer.elapsed = elapsed;
    }
}
