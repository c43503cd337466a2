use std::{
    collections::HashMap,
    io,
    num::NonZeroUsize,
    sync::mpsc::{self, Receiver, Sender},
};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    runtime::Runtime,
};

use crate::{MlErr, Result};

/// Swaps flattened model weights with another trainer.
pub trait PeerExchange: Send {
    /// The id of the local trainer.
    fn trainer(&self) -> usize;

    fn num_trainers(&self) -> usize;

    /// Sends `weights` to `partner` and returns the weights it sent back for `round`.
    fn exchange(&mut self, partner: usize, round: usize, weights: &[f32]) -> Result<Vec<f32>>;
}

type Envelope = (usize, Vec<f32>);

/// An in-process exchange between trainers running as threads of the same program.
pub struct ChannelExchange {
    trainer: usize,
    senders: Vec<Option<Sender<Envelope>>>,
    receivers: Vec<Option<Receiver<Envelope>>>,
}

impl ChannelExchange {
    /// Creates a fully connected group of exchanges, one per trainer.
    ///
    /// # Arguments
    /// * `num_trainers` - The amount of trainers in the group.
    ///
    /// # Returns
    /// The exchanges, indexed by trainer id.
    pub fn mesh(num_trainers: NonZeroUsize) -> Vec<Self> {
        let n = num_trainers.get();

        let mut senders: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

        for from in 0..n {
            for to in (0..n).filter(|&to| to != from) {
                let (tx, rx) = mpsc::channel();
                senders[from][to] = Some(tx);
                receivers[to][from] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(trainer, (senders, receivers))| Self {
                trainer,
                senders,
                receivers,
            })
            .collect()
    }

    fn no_link(&self, partner: usize) -> MlErr {
        MlErr::Exchange(format!(
            "trainer {} has no link to trainer {partner}",
            self.trainer
        ))
    }
}

impl PeerExchange for ChannelExchange {
    fn trainer(&self) -> usize {
        self.trainer
    }

    fn num_trainers(&self) -> usize {
        self.senders.len()
    }

    fn exchange(&mut self, partner: usize, round: usize, weights: &[f32]) -> Result<Vec<f32>> {
        let tx = self
            .senders
            .get(partner)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.no_link(partner))?;

        tx.send((round, weights.to_vec()))
            .map_err(|_| MlErr::Exchange(format!("trainer {partner} hung up")))?;

        let rx = self
            .receivers
            .get(partner)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.no_link(partner))?;

        let (their_round, theirs) = rx
            .recv()
            .map_err(|_| MlErr::Exchange(format!("trainer {partner} hung up")))?;

        if their_round != round {
            return Err(MlErr::Exchange(format!(
                "trainer {partner} is at round {their_round}, expected {round}"
            )));
        }

        Ok(theirs)
    }
}

/// An exchange over the framed protocol, one connection per peer trainer.
///
/// The exchange owns a runtime and blocks on it, so it can be driven from the synchronous
/// training loop.
pub struct OnoExchange<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    trainer: usize,
    num_trainers: usize,
    runtime: Runtime,
    peers: HashMap<usize, (OnoReceiver<R>, OnoSender<W>)>,
    rx_buf: Vec<f32>,
}

impl<R, W> OnoExchange<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a new `OnoExchange` with no peers.
    ///
    /// # Arguments
    /// * `trainer` - The id of the local trainer.
    /// * `num_trainers` - The amount of trainers taking part in the tournament.
    /// * `runtime` - The runtime the connections were opened on.
    ///
    /// # Returns
    /// A new `OnoExchange` instance.
    pub fn new(trainer: usize, num_trainers: usize, runtime: Runtime) -> Self {
        Self {
            trainer,
            num_trainers,
            runtime,
            peers: HashMap::new(),
            rx_buf: Vec::new(),
        }
    }

    /// Registers the connection to `trainer`.
    pub fn add_peer(&mut self, trainer: usize, rx: OnoReceiver<R>, tx: OnoSender<W>) {
        self.peers.insert(trainer, (rx, tx));
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

impl<R, W> PeerExchange for OnoExchange<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn trainer(&self) -> usize {
        self.trainer
    }

    fn num_trainers(&self) -> usize {
        self.num_trainers
    }

    fn exchange(&mut self, partner: usize, round: usize, weights: &[f32]) -> Result<Vec<f32>> {
        let Self {
            trainer,
            runtime,
            peers,
            rx_buf,
            ..
        } = self;
        let trainer = *trainer;

        let (rx, tx) = peers.get_mut(&partner).ok_or_else(|| {
            MlErr::Exchange(format!("trainer {trainer} has no link to trainer {partner}"))
        })?;

        let mut outgoing = weights.to_vec();

        let send = async {
            tx.send(&Msg::Control(Command::Exchange { round, trainer }))
                .await?;
            tx.send(&Msg::Data(Payload::Weights(&mut outgoing))).await
        };

        let recv = async {
            match rx.recv_into::<Msg<'_>, f32>(&mut *rx_buf).await? {
                Msg::Control(Command::Exchange { round: r, .. }) if r == round => {}
                Msg::Err(e) => return Err(io::Error::other(e.into_owned())),
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("expected the header of round {round}, got {other:?}"),
                    ));
                }
            }

            match rx.recv_into::<Msg<'_>, f32>(&mut *rx_buf).await? {
                Msg::Data(Payload::Weights(theirs)) => Ok(theirs.to_vec()),
                other => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected weights, got {other:?}"),
                )),
            }
        };

        let ((), theirs) = runtime
            .block_on(async { tokio::try_join!(send, recv) })
            .map_err(|e| MlErr::Exchange(format!("with trainer {partner}: {e}")))?;

        debug!(
            trainer = trainer,
            partner = partner,
            round = round,
            len = theirs.len();
            "weights exchanged"
        );
        Ok(theirs)
    }
}
