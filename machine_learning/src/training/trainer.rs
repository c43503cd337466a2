use crate::{
    Result,
    arch::Model,
    checkpoint::Checkpoint,
    data::{DataCoordinator, InMemoryCoordinator},
    execution::{
        ExecutionContext, ExecutionMode, SgdTrainingAlgorithm, TerminationCriteria,
        TrainingAlgorithm,
    },
};

/// One rank of a trainer: a model, the data it reads and the algorithm that trains it.
pub struct Trainer {
    model: Box<dyn Model>,
    coordinator: InMemoryCoordinator,
    algorithm: Box<dyn TrainingAlgorithm>,
    context: ExecutionContext,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `coordinator` - The data of this rank.
    /// * `algorithm` - The training algorithm.
    ///
    /// # Returns
    /// A new `Trainer` instance.
    pub fn new(
        model: Box<dyn Model>,
        coordinator: InMemoryCoordinator,
        algorithm: Box<dyn TrainingAlgorithm>,
    ) -> Self {
        let context = algorithm.new_execution_context();

        Self {
            model,
            coordinator,
            algorithm,
            context,
        }
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Model {
        self.model.as_mut()
    }

    pub fn coordinator(&self) -> &InMemoryCoordinator {
        &self.coordinator
    }

    pub fn algorithm(&self) -> &dyn TrainingAlgorithm {
        self.algorithm.as_ref()
    }

    /// The training progress so far.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Runs the training algorithm, resuming from the current context.
    pub fn train(&mut self) -> Result<()> {
        self.algorithm.apply(
            &mut self.context,
            self.model.as_mut(),
            &mut self.coordinator,
            ExecutionMode::Training,
        )
    }

    /// Evaluates one epoch of the data of `mode`.
    ///
    /// # Returns
    /// The mean objective over the epoch, or `None` if there is no data for `mode`.
    pub fn evaluate(&mut self, mode: ExecutionMode) -> Result<Option<f32>> {
        if !self.coordinator.is_execution_mode_valid(mode) {
            return Ok(None);
        }

        let mut evaluator = SgdTrainingAlgorithm::new("evaluate", TerminationCriteria::Epochs(1), true);
        let mut ctx = ExecutionContext::new(mode, self.coordinator.mini_batch_size(mode));
        evaluator.apply(&mut ctx, self.model.as_mut(), &mut self.coordinator, mode)?;

        Ok(self.model.objective_value(mode))
    }

    pub fn test(&mut self) -> Result<Option<f32>> {
        self.evaluate(ExecutionMode::Testing)
    }

    /// Captures the training context, the algorithm state, the weights and the data positions.
    pub fn checkpoint(&self) -> Checkpoint {
        let checkpoint =
            Checkpoint::capture(&self.context, self.model.as_ref()).with_data(&self.coordinator);

        match self.algorithm.state() {
            Some(state) => checkpoint.with_algorithm(state),
            None => checkpoint,
        }
    }

    /// Puts the run captured by `checkpoint` back in place, algorithm state included.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.restore(&mut self.context, self.model.as_mut(), &mut self.coordinator)?;

        if let Some(state) = &checkpoint.algorithm {
            self.algorithm.restore_state(state)?;
        }

        Ok(())
    }
}
