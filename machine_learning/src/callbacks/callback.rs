use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    Result,
    arch::Model,
    execution::{ExecutionContext, ExecutionMode},
};

/// A callback as stored by a model, shared so copies of the list observe the same state.
pub type SharedCallback = Arc<Mutex<dyn Callback>>;

/// Wraps `callback` into a `SharedCallback`.
pub fn shared<C: Callback + 'static>(callback: C) -> SharedCallback {
    Arc::new(Mutex::new(callback))
}

/// Hooks into the training loop, every hook defaults to doing nothing.
///
/// The loop level hooks receive the model and the context of the running loop and may
/// change either, for instance to request an early stop. The finer propagation hooks are
/// fired by the model itself and only receive names.
pub trait Callback: Send {
    fn name(&self) -> &str;

    /// Training batch hooks only fire on steps that are a multiple of this interval.
    fn batch_interval(&self) -> usize {
        1
    }

    fn on_train_begin(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_train_end(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_batch_begin(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_batch_end(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_batch_evaluate_begin(
        &mut self,
        _model: &mut dyn Model,
        _ctx: &mut ExecutionContext,
    ) -> Result<()> {
        Ok(())
    }

    fn on_batch_evaluate_end(
        &mut self,
        _model: &mut dyn Model,
        _ctx: &mut ExecutionContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Fires before a validation or tournament evaluation.
    fn on_validation_begin(
        &mut self,
        _model: &mut dyn Model,
        _ctx: &mut ExecutionContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Fires after a validation or tournament evaluation.
    fn on_validation_end(
        &mut self,
        _model: &mut dyn Model,
        _ctx: &mut ExecutionContext,
    ) -> Result<()> {
        Ok(())
    }

    fn on_test_begin(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_test_end(&mut self, _model: &mut dyn Model, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_forward_prop_begin(&mut self, _model: &str, _mode: ExecutionMode) -> Result<()> {
        Ok(())
    }

    fn on_forward_prop_end(&mut self, _model: &str, _mode: ExecutionMode) -> Result<()> {
        Ok(())
    }

    fn on_layer_forward_prop_begin(&mut self, _layer: &str, _mode: ExecutionMode) -> Result<()> {
        Ok(())
    }

    fn on_layer_forward_prop_end(&mut self, _layer: &str, _mode: ExecutionMode) -> Result<()> {
        Ok(())
    }

    fn on_backward_prop_begin(&mut self, _model: &str) -> Result<()> {
        Ok(())
    }

    fn on_backward_prop_end(&mut self, _model: &str) -> Result<()> {
        Ok(())
    }

    fn on_layer_backward_prop_begin(&mut self, _layer: &str) -> Result<()> {
        Ok(())
    }

    fn on_layer_backward_prop_end(&mut self, _layer: &str) -> Result<()> {
        Ok(())
    }

    fn on_optimize_begin(&mut self, _model: &str) -> Result<()> {
        Ok(())
    }

    fn on_optimize_end(&mut self, _model: &str) -> Result<()> {
        Ok(())
    }

    fn on_weights_optimize_begin(&mut self, _weights: &str) -> Result<()> {
        Ok(())
    }

    fn on_weights_optimize_end(&mut self, _weights: &str) -> Result<()> {
        Ok(())
    }
}
