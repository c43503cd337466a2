mod peers;

use std::{env, fs, panic, process, sync::Arc, thread};

use comms::specs::trainer::TrainerSpec;
use log::{error, info};
use machine_learning::{
    MlErr, Result,
    distributed::ThreadComm,
    execution::ExecutionMode,
    ltfb::{PeerExchange, Roster},
    training::{AlgorithmRegistry, Resources, TrainerBuilder},
};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        error!("{e}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let path = env::args()
        .nth(1)
        .ok_or_else(|| MlErr::InvalidConfig("usage: node <trainer spec json>".to_string()))?;

    let spec: TrainerSpec = serde_json::from_str(&fs::read_to_string(&path)?)?;
    info!(ranks = spec.ranks.get(); "loaded trainer spec from {path}");

    let (mut exchange, roster) = match &spec.peers {
        Some(peers_spec) => {
            let exchange: Box<dyn PeerExchange> = Box::new(peers::connect(peers_spec)?);
            (Some(exchange), peers::roster(peers_spec))
        }
        None => (None, Roster::alone()),
    };

    let registry = AlgorithmRegistry::with_defaults();
    let builder = TrainerBuilder::new(&registry);

    thread::scope(|s| {
        let handles: Vec<_> = ThreadComm::group(spec.ranks)
            .into_iter()
            .map(|comm| {
                // only the master rank talks to other trainers
                let resources = Resources {
                    exchange: exchange.take(),
                    roster,
                };
                let (builder, spec) = (&builder, &spec);

                s.spawn(move || -> Result<()> {
                    let mut trainer = builder.build(spec, Arc::new(comm), resources)?;
                    trainer.train()?;

                    let test = trainer.test()?;
                    if trainer.model().comm().am_master() {
                        let ctx = trainer.context();
                        info!(
                            epoch = ctx.epoch(),
                            step = ctx.step(),
                            training = trainer.model().objective_value(ExecutionMode::Training),
                            testing = test;
                            "training finished"
                        );
                    }

                    Ok(())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| panic::resume_unwind(e)))
            .collect::<Result<()>>()
    })
}
