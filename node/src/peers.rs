use std::{io, time::Duration};

use comms::{
    msg::{Command, Msg},
    specs::trainer::PeersSpec,
};
use log::{info, warn};
use machine_learning::ltfb::{OnoExchange, Roster};
use tokio::{
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Runtime,
    time,
};

pub type TcpExchange = OnoExchange<OwnedReadHalf, OwnedWriteHalf>;

const CONNECT_ATTEMPTS: usize = 20;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// The place of this trainer in the tournament described by `spec`.
pub fn roster(spec: &PeersSpec) -> Roster {
    Roster {
        trainer: spec.trainer,
        num_trainers: spec.peers.len() + 1,
    }
}

/// Opens one connection to every peer trainer.
///
/// Trainers connect to the peers with a lower id and accept the ones with a higher id, the
/// connecting side identifies itself with a `Connect` command.
pub fn connect(spec: &PeersSpec) -> io::Result<TcpExchange> {
    let runtime = Runtime::new()?;
    let Roster {
        trainer,
        num_trainers,
    } = roster(spec);

    let links = runtime.block_on(async {
        let listener = TcpListener::bind(&spec.listen).await?;
        info!(trainer = trainer; "listening for peers at {}", spec.listen);

        let mut links = Vec::with_capacity(spec.peers.len());

        for peer in spec.peers.iter().filter(|p| p.trainer < trainer) {
            let stream = dial(&peer.addr).await?;
            let (rx, tx) = stream.into_split();
            let (rx, mut tx) = comms::channel(rx, tx);
            tx.send(&Msg::Control(Command::Connect { trainer })).await?;

            info!(trainer = trainer, peer = peer.trainer; "connected to {}", peer.addr);
            links.push((peer.trainer, rx, tx));
        }

        let expected = spec.peers.iter().filter(|p| p.trainer > trainer).count();
        let mut buf: Vec<u32> = Vec::new();

        while links.len() < spec.peers.len() {
            let (stream, addr) = listener.accept().await?;
            let (rx, tx) = stream.into_split();
            let (mut rx, tx) = comms::channel(rx, tx);

            match rx.recv_into::<Msg<'_>, u32>(&mut buf).await? {
                Msg::Control(Command::Connect { trainer: peer }) => {
                    info!(trainer = trainer, peer = peer; "accepted peer from {addr}");
                    links.push((peer, rx, tx));
                }
                other => warn!("expected a Connect from {addr}, got {other:?}"),
            }
        }

        info!(trainer = trainer, accepted = expected; "every peer is connected");
        Ok::<_, io::Error>(links)
    })?;

    let mut exchange = OnoExchange::new(trainer, num_trainers, runtime);
    for (peer, rx, tx) in links {
        exchange.add_peer(peer, rx, tx);
    }

    Ok(exchange)
}

/// Connects to `addr`, retrying while the peer is not listening yet.
async fn dial(addr: &str) -> io::Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt = attempt; "could not reach {addr}: {e}, retrying");
                attempt += 1;
                time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}
