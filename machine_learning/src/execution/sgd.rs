use std::{mem, time::Instant};

use comms::specs::training::SgdSpec;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{
    AlgorithmState, ExecutionContext, ExecutionMode, TerminationCriteria, TimerMap,
    TrainingAlgorithm, foreign_state, timed,
};
use crate::{
    MlErr, Result,
    arch::Model,
    callbacks::dispatch,
    data::DataCoordinator,
};

const TRAIN: &str = "train()";
const MINI_BATCH: &str = "train minibatch";
const EVAL_MINI_BATCH: &str = "eval minibatch";

/// The part of an SGD run that outlives a single `apply` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdState {
    pub validation_context: ExecutionContext,
    pub validation_epochs: usize,
}

/// Plain mini-batch stochastic gradient descent.
///
/// Trains until its stopping criteria are met, running one validation epoch after every
/// training epoch when there is validation data. The validation progress lives in a
/// context of its own that persists across calls.
pub struct SgdTrainingAlgorithm {
    name: String,
    stopping_criteria: TerminationCriteria,
    validation_context: ExecutionContext,
    validation_epochs: usize,
    suppress_timer: bool,
    timers: TimerMap,
}

impl SgdTrainingAlgorithm {
    /// Creates a new `SgdTrainingAlgorithm`.
    ///
    /// # Arguments
    /// * `name` - The instance name.
    /// * `stopping_criteria` - When `apply` stops.
    /// * `suppress_timer` - Skips the timing report at the end of `apply`.
    ///
    /// # Returns
    /// A new `SgdTrainingAlgorithm` instance.
    pub fn new(
        name: impl Into<String>,
        stopping_criteria: TerminationCriteria,
        suppress_timer: bool,
    ) -> Self {
        Self {
            name: name.into(),
            stopping_criteria,
            validation_context: ExecutionContext::new(ExecutionMode::Validation, 1),
            validation_epochs: 1,
            suppress_timer,
            timers: TimerMap::default(),
        }
    }

    pub fn from_spec(name: impl Into<String>, spec: &SgdSpec) -> Self {
        Self::new(
            name,
            spec.stopping_criteria.into(),
            spec.suppress_timer_output,
        )
    }

    pub fn stopping_criteria(&self) -> TerminationCriteria {
        self.stopping_criteria
    }

    /// The timings of the last `apply` call.
    pub fn timers(&self) -> &TimerMap {
        &self.timers
    }

    pub fn suppress_timer(&self) -> bool {
        self.suppress_timer
    }

    pub(crate) fn sgd_state(&self) -> SgdState {
        SgdState {
            validation_context: self.validation_context.clone(),
            validation_epochs: self.validation_epochs,
        }
    }

    pub(crate) fn restore_sgd_state(&mut self, state: &SgdState) {
        self.validation_context = state.validation_context.clone();
        self.validation_epochs = state.validation_epochs;
    }

    pub(crate) fn reset_timers(&mut self, label: impl Into<String>) {
        self.timers = TimerMap::new(label);
    }

    pub fn validation_context(&self) -> &ExecutionContext {
        &self.validation_context
    }

    /// Trains `model` until `term` is met for `c`.
    ///
    /// Every completed epoch reconciles the weights across ranks and, if there is validation
    /// data, runs one more validation epoch. An early stop requested during validation stops
    /// training too.
    pub fn train(
        &mut self,
        c: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        term: &TerminationCriteria,
    ) -> Result<()> {
        let train_start = Instant::now();
        let timers = &mut self.timers;

        let eval_batch = dc.mini_batch_size(ExecutionMode::Validation);
        self.validation_context.set_current_mini_batch_size(eval_batch);
        self.validation_context.set_effective_mini_batch_size(eval_batch);

        c.set_execution_mode(ExecutionMode::Training);
        model.reset_mode(c, ExecutionMode::Training);
        dc.reset_mode(c);

        timed(timers, &[TRAIN, "train_begin callbacks"], || {
            dispatch::train_begin(model, c)
        })?;

        let mut is_start_of_epoch = true;
        c.start_timer();

        while !term.is_done(c) {
            if is_start_of_epoch {
                model.reset_mode(c, ExecutionMode::Training);
                model.reset_epoch_statistics(ExecutionMode::Training);
                dc.reset_mode(c);

                timed(&mut self.timers, &[TRAIN, "epoch_begin callbacks"], || {
                    dispatch::epoch_begin(model, c)
                })?;
                is_start_of_epoch = false;
            }

            let start = Instant::now();
            let finished = self.train_mini_batch(c, model, dc)?;
            self.timers.record(&[TRAIN, MINI_BATCH], start.elapsed());

            if !finished {
                continue;
            }

            c.inc_epoch();
            model.reconcile_weight_values()?;

            timed(&mut self.timers, &[TRAIN, "epoch_end callbacks"], || {
                dispatch::epoch_end(model, c)
            })?;

            debug!(
                epoch = c.epoch(),
                step = c.step(),
                objective = model.objective_value(ExecutionMode::Training).unwrap_or(f32::NAN);
                "training epoch complete"
            );

            if dc.is_execution_mode_valid(ExecutionMode::Validation) {
                self.validate(model, dc)?;

                if self.validation_context.early_stop() {
                    c.set_early_stop(true);
                }
            }

            is_start_of_epoch = true;
        }

        c.stop_timer();

        model.reset_mode(c, ExecutionMode::Training);
        timed(&mut self.timers, &[TRAIN, "train_end callbacks"], || {
            dispatch::train_end(model, c)
        })?;

        self.timers.record(&[TRAIN], train_start.elapsed());
        Ok(())
    }

    /// Runs the next validation epoch on the persistent validation context.
    fn validate(&mut self, model: &mut dyn Model, dc: &mut dyn DataCoordinator) -> Result<()> {
        let mut eval_ctx = mem::take(&mut self.validation_context);
        let term = TerminationCriteria::Epochs(self.validation_epochs);

        let res = self.evaluate(&mut eval_ctx, model, dc, ExecutionMode::Validation, &term);
        self.validation_context = eval_ctx;
        res?;

        self.validation_epochs += 1;
        Ok(())
    }

    /// Runs one training step: fetch, forward, objective, backward, update.
    ///
    /// # Returns
    /// Whether the fetched mini-batch was the last one of its epoch.
    fn train_mini_batch(
        &mut self,
        c: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
    ) -> Result<bool> {
        let timers = &mut self.timers;
        let mode = ExecutionMode::Training;

        model.reset_mode(c, mode);
        dc.reset_mode(c);

        timed(timers, &[TRAIN, MINI_BATCH, "batch_begin callbacks"], || {
            dispatch::batch_begin(model, c, mode)
        })?;

        let batch = dc.fetch_data(mode)?;
        c.set_current_mini_batch_size(batch.len());
        let mini_batch_size = batch.len();

        model.clear_gradients();
        timed(timers, &[TRAIN, MINI_BATCH, "forward prop"], || {
            model.forward_prop(mode, &batch)
        })?;
        let finished = dc.epoch_complete(mode);

        {
            let objective = model.objective_function();
            objective.start_evaluation(mode, mini_batch_size)?;
            objective.differentiate()?;
        }

        timed(timers, &[TRAIN, MINI_BATCH, "backward prop"], || {
            model.backward_prop()
        })?;

        {
            let objective = model.objective_function();
            objective.compute_weight_regularization()?;
            objective.finish_evaluation(mode, mini_batch_size)?;
        }
        model.evaluate_metrics(mode, mini_batch_size)?;

        timed(timers, &[TRAIN, MINI_BATCH, "update weights"], || {
            model.update_weights()
        })?;
        model.update_layers();

        c.inc_step();
        timed(timers, &[TRAIN, MINI_BATCH, "batch_end callbacks"], || {
            dispatch::batch_end(model, c, mode)
        })?;

        Ok(finished)
    }

    /// Evaluates `model` on the data of `mode` until `term` is met for `c`.
    ///
    /// Does nothing when the coordinator has no data for `mode`.
    ///
    /// # Errors
    /// `MlErr::InvalidExecutionMode` if `mode` is not an evaluation mode.
    pub fn evaluate(
        &mut self,
        c: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        mode: ExecutionMode,
        term: &TerminationCriteria,
    ) -> Result<()> {
        let eval_start = Instant::now();
        let scope = format!("evaluate({mode})");
        let scope = scope.as_str();

        c.set_execution_mode(mode);
        model.reset_epoch_statistics(mode);
        model.reset_mode(c, mode);
        dc.reset_mode(c);

        if !dc.is_execution_mode_valid(mode) {
            return Ok(());
        }

        if !mode.is_evaluation() {
            return Err(MlErr::InvalidExecutionMode {
                mode,
                during: "evaluate",
            });
        }

        timed(&mut self.timers, &[scope, "eval_begin callbacks"], || {
            dispatch::evaluate_begin(model, c, mode)
        })?;

        while !term.is_done(c) {
            let start = Instant::now();
            let finished = self.evaluate_mini_batch(c, model, dc, mode, scope)?;
            self.timers.record(&[scope, EVAL_MINI_BATCH], start.elapsed());

            if finished {
                c.inc_epoch();
            }
        }

        timed(&mut self.timers, &[scope, "eval_end callbacks"], || {
            dispatch::evaluate_end(model, c, mode)
        })?;

        debug!(
            mode = mode.as_str(),
            epoch = c.epoch(),
            objective = model.objective_value(mode).unwrap_or(f32::NAN);
            "evaluation complete"
        );

        self.timers.record(&[scope], eval_start.elapsed());
        Ok(())
    }

    fn evaluate_mini_batch(
        &mut self,
        c: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        mode: ExecutionMode,
        scope: &str,
    ) -> Result<bool> {
        let timers = &mut self.timers;

        model.reset_mode(c, mode);
        dc.reset_mode(c);

        timed(timers, &[scope, EVAL_MINI_BATCH, "batch_begin callbacks"], || {
            dispatch::batch_begin(model, c, mode)
        })?;

        let batch = dc.fetch_data(mode)?;
        c.set_current_mini_batch_size(batch.len());
        let mini_batch_size = batch.len();

        timed(timers, &[scope, EVAL_MINI_BATCH, "forward prop"], || {
            model.forward_prop(mode, &batch)
        })?;
        let finished = dc.epoch_complete(mode);

        {
            let objective = model.objective_function();
            objective.start_evaluation(mode, mini_batch_size)?;
            objective.finish_evaluation(mode, mini_batch_size)?;
        }
        model.evaluate_metrics(mode, mini_batch_size)?;
        model.update_layers();

        c.inc_step();
        timed(timers, &[scope, EVAL_MINI_BATCH, "batch_end callbacks"], || {
            dispatch::batch_end(model, c, mode)
        })?;

        Ok(finished)
    }
}

impl TrainingAlgorithm for SgdTrainingAlgorithm {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "sgd"
    }

    fn apply(
        &mut self,
        ctx: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        mode: ExecutionMode,
    ) -> Result<()> {
        self.reset_timers(format!("SGD::{}", self.name));
        let term = self.stopping_criteria;

        match mode {
            ExecutionMode::Training => self.train(ctx, model, dc, &term)?,
            ExecutionMode::Validation | ExecutionMode::Testing | ExecutionMode::Prediction => {
                self.evaluate(ctx, model, dc, mode, &term)?
            }
            mode => {
                return Err(MlErr::InvalidExecutionMode {
                    mode,
                    during: "sgd apply",
                });
            }
        }

        if !self.suppress_timer && model.comm().am_master() {
            info!("{}", self.timers);
        }

        Ok(())
    }

    fn state(&self) -> Option<AlgorithmState> {
        Some(AlgorithmState::Sgd(self.sgd_state()))
    }

    fn restore_state(&mut self, state: &AlgorithmState) -> Result<()> {
        match state {
            AlgorithmState::Sgd(state) => {
                self.restore_sgd_state(state);
                Ok(())
            }
            state => Err(foreign_state("sgd", state)),
        }
    }
}
