mod common;

use std::{borrow::Cow, num::NonZeroUsize, sync::Arc, thread};

use comms::{
    msg::Msg,
    specs::{trainer::TrainerSpec, training::AlgorithmSpec},
};
use machine_learning::{
    MlErr, Result,
    arch::{WeightsSnapshot, flatten},
    data::{DataCoordinator, MiniBatch},
    distributed::LocalComm,
    execution::{AlgorithmState, ExecutionContext, ExecutionMode},
    ltfb::{ChannelExchange, OnoExchange, PeerExchange, Roster},
    training::{AlgorithmRegistry, Resources, Trainer, TrainerBuilder},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::{io, runtime::Runtime};

fn sgd(stopping_criteria: Value) -> Value {
    json!({
        "name": "sgd",
        "algorithm": { "sgd": {
            "stopping_criteria": stopping_criteria,
            "suppress_timer_output": true
        } }
    })
}

fn ltfb(batches_per_round: usize, max_batches: usize, mutation: Value) -> Value {
    json!({
        "name": "ltfb",
        "algorithm": { "ltfb": {
            "local_algorithm": {
                "stopping_criteria": { "max_epochs": 1 },
                "suppress_timer_output": true
            },
            "batches_per_round": batches_per_round,
            "stopping_criteria": { "max_batches": max_batches },
            "mutation": mutation,
            "seed": 3
        } }
    })
}

/// A single rank XOR trainer that also holds a tournament split.
fn xor_tournament(seed: u64, algorithm: Value) -> TrainerSpec {
    let mut spec = common::xor_spec(1, algorithm);
    spec.seed = Some(seed);
    spec.data.tournament = spec.data.validation.clone();
    spec
}

/// A single rank AND trainer whose tournament split is the whole dataset.
fn and_tournament(seed: u64, algorithm: Value) -> TrainerSpec {
    let mut spec = common::xor_spec(1, algorithm);
    spec.seed = Some(seed);
    spec.data.training = common::and_split(2, true);
    spec.data.validation = None;
    spec.data.tournament = Some(common::and_split(4, false));
    spec
}

fn build(spec: &TrainerSpec, resources: Resources) -> Trainer {
    let registry = AlgorithmRegistry::with_defaults();
    TrainerBuilder::new(&registry)
        .build(spec, Arc::new(LocalComm), resources)
        .unwrap()
}

/// The flattened weights of a model trained long enough to beat a fresh one.
fn trained_and_weights() -> Vec<f32> {
    let mut trainer = build(
        &and_tournament(5, sgd(json!({ "max_epochs": 1000 }))),
        Resources::default(),
    );
    trainer.train().unwrap();
    flatten(&trainer.model().weights())
}

/// Always hands back the same weights.
struct FixedExchange(Vec<f32>);

impl PeerExchange for FixedExchange {
    fn trainer(&self) -> usize {
        0
    }

    fn num_trainers(&self) -> usize {
        2
    }

    fn exchange(&mut self, _partner: usize, _round: usize, _weights: &[f32]) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Hands back `reply` and keeps what it was sent.
struct RecordingExchange {
    reply: Vec<f32>,
    sent: Arc<Mutex<Vec<f32>>>,
}

impl PeerExchange for RecordingExchange {
    fn trainer(&self) -> usize {
        0
    }

    fn num_trainers(&self) -> usize {
        2
    }

    fn exchange(&mut self, _partner: usize, _round: usize, weights: &[f32]) -> Result<Vec<f32>> {
        *self.sent.lock() = weights.to_vec();
        Ok(self.reply.clone())
    }
}

fn exchanging_only(mut spec: TrainerSpec, names: &[&str]) -> TrainerSpec {
    if let AlgorithmSpec::Ltfb(ltfb) = &mut spec.algorithm.algorithm {
        ltfb.weights_names = Some(names.iter().map(|n| n.to_string()).collect());
    }
    spec
}

fn against(weights: Vec<f32>) -> Resources {
    Resources {
        exchange: Some(Box::new(FixedExchange(weights))),
        roster: Roster {
            trainer: 0,
            num_trainers: 2,
        },
    }
}

/// A coordinator without any data.
struct NoData;

impl DataCoordinator for NoData {
    fn reset_mode(&mut self, _ctx: &ExecutionContext) {}

    fn fetch_data(&mut self, mode: ExecutionMode) -> Result<MiniBatch> {
        Err(MlErr::EmptySplit(mode))
    }

    fn epoch_complete(&self, _mode: ExecutionMode) -> bool {
        false
    }

    fn is_execution_mode_valid(&self, _mode: ExecutionMode) -> bool {
        false
    }

    fn mini_batch_size(&self, _mode: ExecutionMode) -> usize {
        0
    }
}

#[test]
fn paired_trainers_end_with_the_winning_model() {
    let mesh = ChannelExchange::mesh(NonZeroUsize::new(2).unwrap());

    let finals: Vec<Vec<WeightsSnapshot>> = thread::scope(|s| {
        let handles: Vec<_> = mesh
            .into_iter()
            .enumerate()
            .map(|(id, exchange)| {
                s.spawn(move || {
                    // different seeds draw different initial weights
                    let spec = xor_tournament(100 + id as u64, ltfb(4, 8, json!("null")));
                    let resources = Resources {
                        exchange: Some(Box::new(exchange)),
                        roster: Roster {
                            trainer: id,
                            num_trainers: 2,
                        },
                    };

                    let mut trainer = build(&spec, resources);
                    let initial = trainer.model().weights();
                    trainer.train().unwrap();

                    assert_ne!(initial, trainer.model().weights());
                    assert_eq!(trainer.context().step(), 8);
                    trainer.model().weights()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(finals[0], finals[1]);
}

#[test]
fn better_partner_is_adopted() {
    let trained = trained_and_weights();

    let spec = and_tournament(6, ltfb(1, 1, json!("null")));
    let mut trainer = build(&spec, against(trained.clone()));
    trainer.train().unwrap();

    assert_eq!(flatten(&trainer.model().weights()), trained);
}

#[test]
fn worse_partner_is_ignored() {
    let spec = and_tournament(6, ltfb(1, 1, json!("null")));
    let len = flatten(&build(&spec, Resources::default()).model().weights()).len();

    // saturated sigmoids answer 1 to every input
    let saturated = vec![10.0; len];
    let mut trainer = build(&spec, against(saturated.clone()));
    trainer.train().unwrap();

    assert_ne!(flatten(&trainer.model().weights()), saturated);
}

#[test]
fn mutation_perturbs_the_partner() {
    let trained = trained_and_weights();

    let mutation = json!({ "perturb_weights": { "scale": 0.5 } });
    let spec = and_tournament(6, ltfb(1, 1, mutation));
    let mut trainer = build(&spec, against(trained.clone()));
    trainer.train().unwrap();

    // whichever model won, it is not the unaltered partner
    assert_ne!(flatten(&trainer.model().weights()), trained);
}

#[test]
fn lone_trainer_trains_locally() {
    let spec = xor_tournament(7, ltfb(3, 7, json!("null")));
    let mut trainer = build(&spec, Resources::default());

    trainer.train().unwrap();

    // the last round is cut short by the outer bound
    assert_eq!(trainer.context().step(), 7);
    assert_eq!(trainer.algorithm().kind(), "ltfb");
}

#[test]
fn missing_exchange_fails_the_round() {
    let spec = xor_tournament(7, ltfb(2, 4, json!("null")));
    let resources = Resources {
        exchange: None,
        roster: Roster {
            trainer: 0,
            num_trainers: 2,
        },
    };

    let mut trainer = build(&spec, resources);
    assert!(matches!(trainer.train(), Err(MlErr::Exchange(_))));
}

#[test]
fn only_training_is_supported() {
    let spec = xor_tournament(7, ltfb(2, 4, json!("null")));
    let mut trainer = build(&spec, Resources::default());

    let registry = AlgorithmRegistry::with_defaults();
    let mut algorithm = registry
        .build(&spec.algorithm, &mut Resources::default())
        .unwrap();

    let mut ctx = ExecutionContext::new(ExecutionMode::Validation, 4);
    let res = algorithm.apply(
        &mut ctx,
        trainer.model_mut(),
        &mut NoData,
        ExecutionMode::Validation,
    );
    assert!(matches!(res, Err(MlErr::InvalidExecutionMode { .. })));
}

#[test]
fn ono_exchange_swaps_weights_over_a_stream() {
    const BUF_SIZE: usize = 4096;

    // In-memory duplex link
    let (a_stream, b_stream) = io::duplex(BUF_SIZE);
    let (a_rx, a_tx) = io::split(a_stream);
    let (b_rx, b_tx) = io::split(b_stream);

    let mut a = OnoExchange::new(0, 2, Runtime::new().unwrap());
    let (rx, tx) = comms::channel(a_rx, a_tx);
    a.add_peer(1, rx, tx);

    let mut b = OnoExchange::new(1, 2, Runtime::new().unwrap());
    let (rx, tx) = comms::channel(b_rx, b_tx);
    b.add_peer(0, rx, tx);

    thread::scope(|s| {
        let handle = s.spawn(move || b.exchange(0, 5, &[3.0; 10]).unwrap());
        assert_eq!(a.exchange(1, 5, &[1.0; 10]).unwrap(), vec![3.0; 10]);
        assert_eq!(handle.join().unwrap(), vec![1.0; 10]);
    });
}

#[test]
fn ono_exchange_reports_peer_errors() {
    let (a_stream, b_stream) = io::duplex(4096);
    let (a_rx, a_tx) = io::split(a_stream);
    let (b_rx, b_tx) = io::split(b_stream);

    let mut a = OnoExchange::new(0, 2, Runtime::new().unwrap());
    let (rx, tx) = comms::channel(a_rx, a_tx);
    a.add_peer(1, rx, tx);

    // the peer answers with an error frame and never reads
    let (_peer_rx, mut peer_tx) = comms::channel(b_rx, b_tx);
    a.runtime()
        .block_on(peer_tx.send(&Msg::Err(Cow::Borrowed("out of memory"))))
        .unwrap();

    let res = a.exchange(1, 0, &[0.0; 4]);
    assert!(matches!(res, Err(MlErr::Exchange(reason)) if reason.contains("out of memory")));
}

#[test]
fn named_weights_are_the_only_ones_exchanged() {
    let spec = exchanging_only(and_tournament(6, ltfb(1, 1, json!("null"))), &["dense1.params"]);

    let mut alone = build(&spec, Resources::default());
    alone.train().unwrap();
    let local = alone.model().weights();

    // dense1 is a 4x1 layer plus its bias
    let sent = Arc::new(Mutex::new(Vec::new()));
    let exchange = RecordingExchange {
        reply: vec![10.0; 5],
        sent: Arc::clone(&sent),
    };
    let resources = Resources {
        exchange: Some(Box::new(exchange)),
        roster: Roster {
            trainer: 0,
            num_trainers: 2,
        },
    };

    let mut trainer = build(&spec, resources);
    trainer.train().unwrap();
    let weights = trainer.model().weights();

    assert_eq!(*sent.lock(), local[1].values);
    assert_eq!(weights[0], local[0]);
}

#[test]
fn unknown_weights_names_fail_the_round() {
    let spec = exchanging_only(and_tournament(6, ltfb(1, 1, json!("null"))), &["dense7.params"]);
    let mut trainer = build(&spec, against(vec![0.0; 5]));

    assert!(matches!(trainer.train(), Err(MlErr::InvalidConfig(_))));
}

#[test]
fn round_counter_is_checkpointed() {
    let spec = xor_tournament(7, ltfb(3, 7, json!("null")));
    let mut trainer = build(&spec, Resources::default());
    trainer.train().unwrap();

    let checkpoint = trainer.checkpoint();
    assert!(matches!(
        checkpoint.algorithm,
        Some(AlgorithmState::Ltfb { round: 3, .. })
    ));

    let mut resumed = build(&spec, Resources::default());
    resumed.restore(&checkpoint).unwrap();
    assert_eq!(resumed.algorithm().state(), checkpoint.algorithm);

    let plain_spec = xor_tournament(7, sgd(json!({ "max_epochs": 1 })));
    let mut plain = build(&plain_spec, Resources::default());
    assert!(matches!(plain.restore(&checkpoint), Err(MlErr::Checkpoint(_))));
}
