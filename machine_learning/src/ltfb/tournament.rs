use comms::specs::training::LtfbSpec;
use log::{debug, info, warn};

use super::{MutationStrategy, NullMutation, PeerExchange, mutation, pairing};
use crate::{
    MlErr, Result,
    arch::{Model, WeightsSnapshot, flatten, unflatten},
    data::DataCoordinator,
    execution::{
        AlgorithmState, ExecutionContext, ExecutionMode, SgdTrainingAlgorithm,
        TerminationCriteria, TrainingAlgorithm, foreign_state,
    },
};

/// Where a trainer sits among the trainers of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roster {
    pub trainer: usize,
    pub num_trainers: usize,
}

impl Roster {
    /// A roster with a single trainer, which never finds a partner.
    pub fn alone() -> Self {
        Self {
            trainer: 0,
            num_trainers: 1,
        }
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::alone()
    }
}

/// Live the tournament, fight the battle.
///
/// Every round trains the local model for a fixed amount of mini-batches with an inner SGD
/// algorithm, then pairs the trainer with another one, swaps weights with it and keeps
/// whichever of the two models scores the lower objective on the tournament data.
///
/// When restricted to a set of weights names, only those weights objects are swapped and
/// the partner's model is the local one with them replaced.
pub struct Ltfb {
    name: String,
    local: SgdTrainingAlgorithm,
    batches_per_round: usize,
    stopping_criteria: TerminationCriteria,
    mutation: Box<dyn MutationStrategy>,
    exchange: Option<Box<dyn PeerExchange>>,
    weights_names: Option<Vec<String>>,
    roster: Roster,
    seed: u64,
    round: usize,
}

impl Ltfb {
    /// Creates a new `Ltfb` with no mutation and no peer exchange.
    ///
    /// # Arguments
    /// * `name` - The instance name.
    /// * `local` - The algorithm that trains between tournaments.
    /// * `batches_per_round` - The mini-batches trained between tournaments.
    /// * `stopping_criteria` - When `apply` stops.
    /// * `roster` - The local trainer and the size of the tournament.
    /// * `seed` - The seed every trainer pairs with.
    ///
    /// # Returns
    /// A new `Ltfb` instance.
    pub fn new(
        name: impl Into<String>,
        local: SgdTrainingAlgorithm,
        batches_per_round: usize,
        stopping_criteria: TerminationCriteria,
        roster: Roster,
        seed: u64,
    ) -> Self {
        Self {
            name: name.into(),
            local,
            batches_per_round: batches_per_round.max(1),
            stopping_criteria,
            mutation: Box::new(NullMutation),
            exchange: None,
            weights_names: None,
            roster,
            seed,
            round: 0,
        }
    }

    /// Creates a new `Ltfb` out of its specification.
    ///
    /// # Arguments
    /// * `name` - The instance name.
    /// * `spec` - The algorithm specification.
    /// * `roster` - The local trainer and the size of the tournament.
    /// * `exchange` - The peer exchange, only present on the master rank of the trainer.
    pub fn from_spec(
        name: impl Into<String>,
        spec: &LtfbSpec,
        roster: Roster,
        exchange: Option<Box<dyn PeerExchange>>,
    ) -> Self {
        let name = name.into();
        let local = SgdTrainingAlgorithm::from_spec(format!("{name}::local"), &spec.local_algorithm);
        let mutation_seed = spec.seed.wrapping_add((roster.trainer as u64) << 32);

        let mut ltfb = Self::new(
            name,
            local,
            spec.batches_per_round.get(),
            spec.stopping_criteria.into(),
            roster,
            spec.seed,
        )
        .with_mutation(mutation::from_spec(spec.mutation, mutation_seed));
        ltfb.exchange = exchange;
        ltfb.weights_names = spec.weights_names.clone();
        ltfb
    }

    pub fn with_mutation(mut self, mutation: Box<dyn MutationStrategy>) -> Self {
        self.mutation = mutation;
        self
    }

    pub fn with_exchange(mut self, exchange: Box<dyn PeerExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Restricts the exchange to the weights objects called `names`.
    pub fn with_weights_names(mut self, names: Vec<String>) -> Self {
        self.weights_names = Some(names);
        self
    }

    /// The amount of tournament rounds played so far.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn roster(&self) -> Roster {
        self.roster
    }

    pub fn local_algorithm(&self) -> &SgdTrainingAlgorithm {
        &self.local
    }

    fn train(
        &mut self,
        c: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
    ) -> Result<()> {
        c.set_execution_mode(ExecutionMode::Training);

        while !self.stopping_criteria.is_done(c) {
            let round_end = c.step() + self.batches_per_round;
            let term = match self.stopping_criteria {
                TerminationCriteria::Batches(max) => TerminationCriteria::Batches(round_end.min(max)),
                _ => TerminationCriteria::Batches(round_end),
            };

            self.local.train(c, model, dc, &term)?;
            if c.early_stop() {
                break;
            }

            self.tournament(model, dc)?;
            self.round += 1;
        }

        Ok(())
    }

    /// Plays one tournament round.
    fn tournament(&mut self, model: &mut dyn Model, dc: &mut dyn DataCoordinator) -> Result<()> {
        let Roster {
            trainer,
            num_trainers,
        } = self.roster;

        let Some(partner) = pairing::partner(self.seed, self.round, trainer, num_trainers) else {
            debug!(trainer = trainer, round = self.round; "no partner this round");
            return Ok(());
        };

        let local_weights = model.weights();
        let sent = self.exchanged_weights(&local_weights)?;
        let theirs = self.swap(model, partner, &flatten(&sent))?;

        let mut received = unflatten(&sent, &theirs)?.into_iter();
        let partner_weights: Vec<WeightsSnapshot> = local_weights
            .into_iter()
            .map(|local| {
                if self.is_exchanged(&local.name) {
                    received.next().unwrap_or(local)
                } else {
                    local
                }
            })
            .collect();

        let mut challenger = model.copy_model();
        challenger.set_weights(&partner_weights)?;
        self.mutation.mutate(challenger.as_mut(), self.round)?;

        let Some(mode) = [ExecutionMode::Tournament, ExecutionMode::Validation]
            .into_iter()
            .find(|&mode| dc.is_execution_mode_valid(mode))
        else {
            warn!(
                trainer = trainer,
                round = self.round;
                "no tournament or validation data, keeping the local model"
            );
            return Ok(());
        };

        let local_score = self.score(model, dc, mode)?;
        let challenger_score = self.score(challenger.as_mut(), dc, mode)?;

        if challenger_score < local_score {
            model.set_weights(&challenger.weights())?;
        }

        if model.comm().am_master() {
            info!(
                trainer = trainer,
                partner = partner,
                round = self.round,
                local = local_score,
                partner_score = challenger_score,
                adopted = challenger_score < local_score;
                "tournament round complete"
            );
        }

        Ok(())
    }

    fn is_exchanged(&self, name: &str) -> bool {
        self.weights_names
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == name))
    }

    /// The snapshots sent to the partner, in model order.
    ///
    /// # Errors
    /// `MlErr::InvalidConfig` if a configured weights name is not part of the model.
    fn exchanged_weights(&self, local: &[WeightsSnapshot]) -> Result<Vec<WeightsSnapshot>> {
        if let Some(names) = &self.weights_names {
            if let Some(missing) = names.iter().find(|n| !local.iter().any(|s| &s.name == *n)) {
                return Err(MlErr::InvalidConfig(format!(
                    "the model has no weights called {missing:?} to exchange"
                )));
            }
        }

        Ok(local
            .iter()
            .filter(|s| self.is_exchanged(&s.name))
            .cloned()
            .collect())
    }

    /// Swaps the flattened weights with `partner` and shares the result with every rank.
    ///
    /// Only the master rank talks to the partner. It first broadcasts whether the exchange
    /// succeeded so every rank fails together.
    fn swap(&mut self, model: &dyn Model, partner: usize, ours: &[f32]) -> Result<Vec<f32>> {
        let comm = model.comm();

        let exchanged = comm.am_master().then(|| {
            let exchange = self.exchange.as_mut().ok_or_else(|| {
                MlErr::Exchange("the master rank has no peer exchange".to_string())
            })?;

            let theirs = exchange.exchange(partner, self.round, ours)?;
            if theirs.len() != ours.len() {
                return Err(MlErr::SizeMismatch {
                    what: "exchanged weights",
                    got: theirs.len(),
                    expected: ours.len(),
                });
            }

            Ok(theirs)
        });

        let mut status = [match &exchanged {
            Some(Err(_)) => 0.0,
            _ => 1.0,
        }];
        comm.broadcast(0, &mut status);

        let mut theirs = match exchanged {
            Some(res) => res?,
            None if status[0] == 0.0 => {
                return Err(MlErr::Exchange(format!(
                    "the master rank failed to exchange with trainer {partner}"
                )));
            }
            None => vec![0.0; ours.len()],
        };

        comm.broadcast(0, &mut theirs);
        Ok(theirs)
    }

    /// Evaluates one full epoch of `mode` on a fresh context.
    fn score(
        &mut self,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        mode: ExecutionMode,
    ) -> Result<f32> {
        let mut ctx = ExecutionContext::new(mode, dc.mini_batch_size(mode));
        self.local
            .evaluate(&mut ctx, model, dc, mode, &TerminationCriteria::Epochs(1))?;

        Ok(model.objective_value(mode).unwrap_or(f32::INFINITY))
    }
}

impl TrainingAlgorithm for Ltfb {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ltfb"
    }

    fn apply(
        &mut self,
        ctx: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        mode: ExecutionMode,
    ) -> Result<()> {
        if mode != ExecutionMode::Training {
            return Err(MlErr::InvalidExecutionMode {
                mode,
                during: "ltfb apply",
            });
        }

        self.local.reset_timers(format!("LTFB::{}", self.name));
        self.train(ctx, model, dc)?;

        if !self.local.suppress_timer() && model.comm().am_master() {
            info!("{}", self.local.timers());
        }

        Ok(())
    }

    fn state(&self) -> Option<AlgorithmState> {
        Some(AlgorithmState::Ltfb {
            local: self.local.sgd_state(),
            round: self.round,
        })
    }

    fn restore_state(&mut self, state: &AlgorithmState) -> Result<()> {
        let AlgorithmState::Ltfb { local, round } = state else {
            return Err(foreign_state("ltfb", state));
        };

        self.local.restore_sgd_state(local);
        self.round = *round;
        Ok(())
    }
}
