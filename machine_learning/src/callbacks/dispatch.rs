//! Fires the loop level hooks of every callback of a model, in registration order.

use crate::{
    MlErr, Result,
    arch::Model,
    execution::{ExecutionContext, ExecutionMode},
};

macro_rules! every_callback {
    ($model:ident, $ctx:ident, $hook:ident) => {{
        for cb in $model.callbacks() {
            cb.lock().$hook($model, $ctx)?;
        }
        Ok(())
    }};
}

pub fn train_begin(model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
    every_callback!(model, ctx, on_train_begin)
}

pub fn train_end(model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
    every_callback!(model, ctx, on_train_end)
}

pub fn epoch_begin(model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
    every_callback!(model, ctx, on_epoch_begin)
}

pub fn epoch_end(model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
    every_callback!(model, ctx, on_epoch_end)
}

/// Fires the batch begin hooks of `mode`.
///
/// Training hooks are filtered by each callback's batch interval against the step the
/// batch is about to take, evaluation hooks fire on every batch.
pub fn batch_begin(
    model: &mut dyn Model,
    ctx: &mut ExecutionContext,
    mode: ExecutionMode,
) -> Result<()> {
    for cb in model.callbacks() {
        let mut cb = cb.lock();

        match mode {
            ExecutionMode::Training => {
                if ctx.step() % cb.batch_interval().max(1) == 0 {
                    cb.on_batch_begin(model, ctx)?;
                }
            }
            m if m.is_evaluation() => cb.on_batch_evaluate_begin(model, ctx)?,
            mode => {
                return Err(MlErr::InvalidExecutionMode {
                    mode,
                    during: "batch begin callbacks",
                });
            }
        }
    }

    Ok(())
}

/// Fires the batch end hooks of `mode`, with training hooks filtered against the step
/// the batch has just taken.
pub fn batch_end(
    model: &mut dyn Model,
    ctx: &mut ExecutionContext,
    mode: ExecutionMode,
) -> Result<()> {
    for cb in model.callbacks() {
        let mut cb = cb.lock();

        match mode {
            ExecutionMode::Training => {
                if ctx.step() % cb.batch_interval().max(1) == 0 {
                    cb.on_batch_end(model, ctx)?;
                }
            }
            m if m.is_evaluation() => cb.on_batch_evaluate_end(model, ctx)?,
            mode => {
                return Err(MlErr::InvalidExecutionMode {
                    mode,
                    during: "batch end callbacks",
                });
            }
        }
    }

    Ok(())
}

pub fn evaluate_begin(
    model: &mut dyn Model,
    ctx: &mut ExecutionContext,
    mode: ExecutionMode,
) -> Result<()> {
    match mode {
        ExecutionMode::Validation | ExecutionMode::Tournament => {
            every_callback!(model, ctx, on_validation_begin)
        }
        ExecutionMode::Testing => every_callback!(model, ctx, on_test_begin),
        mode => Err(MlErr::InvalidExecutionMode {
            mode,
            during: "evaluate begin callbacks",
        }),
    }
}

pub fn evaluate_end(
    model: &mut dyn Model,
    ctx: &mut ExecutionContext,
    mode: ExecutionMode,
) -> Result<()> {
    match mode {
        ExecutionMode::Validation | ExecutionMode::Tournament => {
            every_callback!(model, ctx, on_validation_end)
        }
        ExecutionMode::Testing => every_callback!(model, ctx, on_test_end),
        mode => Err(MlErr::InvalidExecutionMode {
            mode,
            during: "evaluate end callbacks",
        }),
    }
}
