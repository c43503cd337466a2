mod common;

use std::time::Duration;

use common::{EventLog, RecordingCallback, RecordingModel, ScriptedCoordinator};
use machine_learning::{
    MlErr,
    execution::{
        ExecutionContext, ExecutionMode, SgdTrainingAlgorithm, TerminationCriteria,
        TrainingAlgorithm,
    },
};

fn sgd(term: TerminationCriteria) -> SgdTrainingAlgorithm {
    SgdTrainingAlgorithm::new("sgd", term, true)
}

fn train(
    algorithm: &mut SgdTrainingAlgorithm,
    model: &mut RecordingModel,
    dc: &mut ScriptedCoordinator,
) -> ExecutionContext {
    let mut ctx = algorithm.new_execution_context();
    algorithm
        .apply(&mut ctx, model, dc, ExecutionMode::Training)
        .unwrap();
    ctx
}

#[test]
fn epoch_bound_runs_whole_epochs() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log);
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let ctx = train(&mut sgd(TerminationCriteria::Epochs(2)), &mut model, &mut dc);

    assert_eq!(ctx.epoch(), 2);
    assert_eq!(ctx.step(), 6);
    assert_eq!(log.count("forward(training)"), 6);
    assert_eq!(log.count("update_weights"), 6);
}

#[test]
fn batch_bound_stops_mid_epoch() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let ctx = train(&mut sgd(TerminationCriteria::Batches(5)), &mut model, &mut dc);

    assert_eq!(ctx.step(), 5);
    assert_eq!(ctx.epoch(), 1);
    assert_eq!(log.starting_with("epoch_begin"), ["epoch_begin@0", "epoch_begin@3"]);
    assert_eq!(log.starting_with("epoch_end"), ["epoch_end@3"]);
    assert_eq!(log.starting_with("train_end"), ["train_end@5"]);
}

#[test]
fn callback_can_stop_training_early() {
    let log = EventLog::default();
    let stopper = RecordingCallback::new(&log).stop_at_epoch(1).shared();
    let mut model = RecordingModel::new(&log).with_callback(stopper);
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let ctx = train(&mut sgd(TerminationCriteria::Epochs(10)), &mut model, &mut dc);

    assert!(ctx.early_stop());
    assert_eq!(ctx.epoch(), 1);
    assert_eq!(ctx.step(), 3);
    assert_eq!(log.count("train_end@3"), 1);
}

#[test]
fn batch_callbacks_respect_their_interval() {
    let log = EventLog::default();
    let every_other = RecordingCallback::new(&log).every(2).shared();
    let mut model = RecordingModel::new(&log).with_callback(every_other);
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 10);

    train(&mut sgd(TerminationCriteria::Batches(5)), &mut model, &mut dc);

    // begin hooks see the step about to run, end hooks the step just taken
    assert_eq!(
        log.starting_with("batch_begin"),
        ["batch_begin@0", "batch_begin@2", "batch_begin@4"]
    );
    assert_eq!(log.starting_with("batch_end"), ["batch_end@2", "batch_end@4"]);
}

#[test]
fn evaluation_batch_callbacks_ignore_the_interval() {
    let log = EventLog::default();
    let every_third = RecordingCallback::new(&log).every(3).shared();
    let mut model = RecordingModel::new(&log).with_callback(every_third);
    let mut dc = ScriptedCoordinator::new(&log)
        .with_split(ExecutionMode::Training, 1)
        .with_split(ExecutionMode::Validation, 4)
        .with_split(ExecutionMode::Testing, 4);

    train(&mut sgd(TerminationCriteria::Epochs(1)), &mut model, &mut dc);

    let begins = [
        "batch_evaluate_begin@0",
        "batch_evaluate_begin@1",
        "batch_evaluate_begin@2",
        "batch_evaluate_begin@3",
    ];
    let ends = [
        "batch_evaluate_end@1",
        "batch_evaluate_end@2",
        "batch_evaluate_end@3",
        "batch_evaluate_end@4",
    ];
    assert_eq!(log.starting_with("batch_evaluate_begin"), begins);
    assert_eq!(log.starting_with("batch_evaluate_end"), ends);

    let mut ctx = ExecutionContext::new(ExecutionMode::Testing, 2);
    sgd(TerminationCriteria::Epochs(1))
        .apply(&mut ctx, &mut model, &mut dc, ExecutionMode::Testing)
        .unwrap();

    assert_eq!(log.starting_with("batch_evaluate_begin").len(), 8);
    assert_eq!(log.starting_with("batch_evaluate_end")[4..], ends);
}

#[test]
fn weights_are_reconciled_once_per_epoch() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log);
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 4);

    train(&mut sgd(TerminationCriteria::Epochs(3)), &mut model, &mut dc);

    assert_eq!(log.count("reconcile"), 3);
}

#[test]
fn validation_follows_every_epoch() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log)
        .with_split(ExecutionMode::Training, 2)
        .with_split(ExecutionMode::Validation, 1);

    let mut algorithm = sgd(TerminationCriteria::Epochs(3));
    let ctx = train(&mut algorithm, &mut model, &mut dc);

    assert_eq!(ctx.epoch(), 3);
    assert_eq!(log.count("forward(validation)"), 3);
    assert_eq!(log.starting_with("validation_begin").len(), 3);

    let validation = algorithm.validation_context();
    assert_eq!(validation.execution_mode(), ExecutionMode::Validation);
    assert_eq!(validation.epoch(), 3);
    assert_eq!(validation.step(), 3);

    let epoch_end = log.position("epoch_end@2").unwrap();
    let validation_begin = log.position("validation_begin@0").unwrap();
    assert!(epoch_end < validation_begin);
}

#[test]
fn validation_early_stop_stops_training() {
    let log = EventLog::default();
    let stopper = RecordingCallback::new(&log)
        .stop_at_validation_epoch(2)
        .shared();
    let mut model = RecordingModel::new(&log).with_callback(stopper);
    let mut dc = ScriptedCoordinator::new(&log)
        .with_split(ExecutionMode::Training, 2)
        .with_split(ExecutionMode::Validation, 1);

    let ctx = train(&mut sgd(TerminationCriteria::Epochs(10)), &mut model, &mut dc);

    assert!(ctx.early_stop());
    assert_eq!(ctx.epoch(), 2);
}

#[test]
fn training_step_calls_collaborators_in_order() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    train(&mut sgd(TerminationCriteria::Batches(1)), &mut model, &mut dc);

    assert_eq!(
        log.events(),
        [
            "train_begin@0",
            "epoch_begin@0",
            "batch_begin@0",
            "fetch(training)",
            "clear_gradients",
            "forward(training)",
            "start(training)",
            "differentiate",
            "backward",
            "regularize",
            "finish(training)",
            "metrics(training)",
            "update_weights",
            "update_layers",
            "batch_end@1",
            "train_end@1",
        ]
    );
}

#[test]
fn evaluation_step_calls_collaborators_in_order() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Testing, 1);

    let mut algorithm = sgd(TerminationCriteria::Epochs(1));
    let mut ctx = ExecutionContext::new(ExecutionMode::Testing, 2);
    algorithm
        .apply(&mut ctx, &mut model, &mut dc, ExecutionMode::Testing)
        .unwrap();

    assert_eq!(
        log.events(),
        [
            "test_begin@0",
            "batch_evaluate_begin@0",
            "fetch(testing)",
            "forward(testing)",
            "start(testing)",
            "finish(testing)",
            "metrics(testing)",
            "update_layers",
            "batch_evaluate_end@1",
            "test_end@1",
        ]
    );
    assert_eq!(ctx.epoch(), 1);
}

#[test]
fn evaluating_without_data_does_nothing() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let mut ctx = ExecutionContext::new(ExecutionMode::Testing, 2);
    sgd(TerminationCriteria::Epochs(1))
        .apply(&mut ctx, &mut model, &mut dc, ExecutionMode::Testing)
        .unwrap();

    assert!(log.events().is_empty());
    assert_eq!(ctx.step(), 0);
}

#[test]
fn unsupported_modes_are_rejected() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log);
    let mut dc = ScriptedCoordinator::new(&log)
        .with_split(ExecutionMode::Training, 3)
        .with_split(ExecutionMode::Prediction, 1);
    let mut algorithm = sgd(TerminationCriteria::Epochs(1));

    for mode in [
        ExecutionMode::Invalid,
        ExecutionMode::Tournament,
        ExecutionMode::Prediction,
    ] {
        let mut ctx = ExecutionContext::new(mode, 2);
        let res = algorithm.apply(&mut ctx, &mut model, &mut dc, mode);
        assert!(
            matches!(res, Err(MlErr::InvalidExecutionMode { mode: m, .. }) if m == mode),
            "{mode} was accepted"
        );
    }
}

#[test]
fn zero_seconds_trains_nothing() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let ctx = train(&mut sgd(TerminationCriteria::Seconds(0.0)), &mut model, &mut dc);

    assert_eq!(ctx.step(), 0);
    assert_eq!(log.events(), ["train_begin@0", "train_end@0"]);
}

#[test]
fn time_bound_accumulates_elapsed_time() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log);
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let ctx = train(&mut sgd(TerminationCriteria::Seconds(0.02)), &mut model, &mut dc);

    assert!(ctx.step() > 0);
    assert!(ctx.elapsed() >= Duration::from_millis(20));
}

#[test]
fn training_resumes_from_the_context() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log)
        .with_callback(RecordingCallback::new(&log).shared());
    let mut dc = ScriptedCoordinator::new(&log).with_split(ExecutionMode::Training, 3);

    let mut ctx = ExecutionContext::default();
    sgd(TerminationCriteria::Epochs(2))
        .apply(&mut ctx, &mut model, &mut dc, ExecutionMode::Training)
        .unwrap();
    sgd(TerminationCriteria::Epochs(4))
        .apply(&mut ctx, &mut model, &mut dc, ExecutionMode::Training)
        .unwrap();

    assert_eq!((ctx.epoch(), ctx.step()), (4, 12));
    assert_eq!(log.starting_with("train_begin"), ["train_begin@0", "train_begin@6"]);
}

#[test]
fn timers_cover_the_whole_run() {
    let log = EventLog::default();
    let mut model = RecordingModel::new(&log);
    let mut dc = ScriptedCoordinator::new(&log)
        .with_split(ExecutionMode::Training, 2)
        .with_split(ExecutionMode::Validation, 1);

    let mut algorithm = sgd(TerminationCriteria::Epochs(2));
    train(&mut algorithm, &mut model, &mut dc);

    let timers = algorithm.timers();
    assert_eq!(timers.calls(&["train()", "train minibatch"]), Some(4));
    assert_eq!(
        timers.calls(&["evaluate(validation)", "eval minibatch"]),
        Some(2)
    );

    let report = timers.to_string();
    assert!(report.contains("train minibatch"));
    assert!(report.contains("forward prop"));
}
