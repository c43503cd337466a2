use std::collections::HashMap;

use comms::specs::training::{AlgorithmSpec, TrainingAlgorithmSpec};
use log::debug;

use crate::{
    MlErr, Result,
    execution::{SgdTrainingAlgorithm, TrainingAlgorithm},
    ltfb::{Ltfb, PeerExchange, Roster},
};

/// What an algorithm may take from its surroundings while being built.
#[derive(Default)]
pub struct Resources {
    /// The tournament link, only set on the master rank of a trainer.
    pub exchange: Option<Box<dyn PeerExchange>>,
    pub roster: Roster,
}

/// Builds a training algorithm named after the first argument out of its specification.
pub type AlgorithmFactory = Box<
    dyn Fn(&str, &AlgorithmSpec, &mut Resources) -> Result<Box<dyn TrainingAlgorithm>>
        + Send
        + Sync,
>;

/// Maps algorithm kinds to the factories that build them.
#[derive(Default)]
pub struct AlgorithmRegistry {
    factories: HashMap<&'static str, AlgorithmFactory>,
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry knowing the `sgd` and `ltfb` kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sgd", build_sgd);
        registry.register("ltfb", build_ltfb);
        registry
    }

    /// Registers `factory` under `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: &'static str, factory: F)
    where
        F: Fn(&str, &AlgorithmSpec, &mut Resources) -> Result<Box<dyn TrainingAlgorithm>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Builds the algorithm described by `spec`.
    ///
    /// # Errors
    /// `MlErr::UnknownAlgorithm` if nothing is registered for the kind of `spec`.
    pub fn build(
        &self,
        spec: &TrainingAlgorithmSpec,
        resources: &mut Resources,
    ) -> Result<Box<dyn TrainingAlgorithm>> {
        let kind = spec.algorithm.kind();
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| MlErr::UnknownAlgorithm(kind.to_string()))?;

        debug!(name = spec.name.as_str(), kind = kind; "building training algorithm");
        factory(&spec.name, &spec.algorithm, resources)
    }
}

fn kind_mismatch(expected: &str, spec: &AlgorithmSpec) -> MlErr {
    MlErr::InvalidConfig(format!(
        "the {expected} factory got a {} specification",
        spec.kind()
    ))
}

fn build_sgd(
    name: &str,
    spec: &AlgorithmSpec,
    _resources: &mut Resources,
) -> Result<Box<dyn TrainingAlgorithm>> {
    match spec {
        AlgorithmSpec::Sgd(sgd) => Ok(Box::new(SgdTrainingAlgorithm::from_spec(name, sgd))),
        other => Err(kind_mismatch("sgd", other)),
    }
}

fn build_ltfb(
    name: &str,
    spec: &AlgorithmSpec,
    resources: &mut Resources,
) -> Result<Box<dyn TrainingAlgorithm>> {
    match spec {
        AlgorithmSpec::Ltfb(ltfb) => Ok(Box::new(Ltfb::from_spec(
            name,
            ltfb,
            resources.roster,
            resources.exchange.take(),
        ))),
        other => Err(kind_mismatch("ltfb", other)),
    }
}
