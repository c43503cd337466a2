use comms::{
    Deserialize, Serialize,
    msg::{Command, Msg, Payload},
    specs::{
        trainer::TrainerSpec,
        training::{AlgorithmSpec, TerminationSpec},
    },
};
use tokio::io;

struct MyStr<'a>(&'a str);

impl<'a> Serialize<'a> for MyStr<'_> {
    fn serialize(&'a self, _buf: &mut Vec<u8>) -> std::io::Result<Option<&'a [u8]>> {
        Ok(Some(self.0.as_bytes()))
    }
}

impl<'a> Deserialize<'a> for MyStr<'a> {
    fn deserialize(buf: &'a mut [u8]) -> std::io::Result<Self> {
        Ok(Self(std::str::from_utf8(buf).unwrap()))
    }
}

#[tokio::test]
async fn send_recv() {
    const SIZE: usize = 128;

    let msg = MyStr("Hello, world!");

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let s: MyStr = rx.recv_into(&mut buf).await.unwrap();

    assert_eq!(msg.0, s.0);
}

#[tokio::test]
async fn weights_arrive_after_their_exchange_command() {
    const SIZE: usize = 4096;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let mut weights = vec![0.5, -1.25, 3.0];
    tx.send(&Msg::Control(Command::Exchange {
        round: 7,
        trainer: 2,
    }))
    .await
    .unwrap();
    tx.send(&Msg::Data(Payload::Weights(&mut weights)))
        .await
        .unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);
    let mut buf: Vec<f32> = Vec::new();

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Control(Command::Exchange { round, trainer }) => {
            assert_eq!((round, trainer), (7, 2));
        }
        other => panic!("unexpected message {other:?}"),
    }

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Weights(received)) => assert_eq!(received, &[0.5, -1.25, 3.0]),
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn trainer_spec_defaults() {
    let json = r#"{
        "model": { "sequential": { "layers": [
            { "dense": { "dim": [2, 1], "act_fn": { "sigmoid": { "amp": 1.0 } } } }
        ] } },
        "optimizer": { "gradient_descent": { "learning_rate": 0.5 } },
        "loss": "mse",
        "data": {
            "training": {
                "source": { "inline": { "data": [0, 0, 0, 1, 1, 1], "x_size": 2, "y_size": 1 } },
                "batch_size": 1
            }
        },
        "algorithm": { "name": "sgd", "algorithm": { "sgd": { "stopping_criteria": { "max_epochs": 2 } } } },
        "seed": 7
    }"#;

    let spec: TrainerSpec = serde_json::from_str(json).unwrap();

    assert_eq!(spec.ranks.get(), 1);
    assert!(spec.callbacks.is_empty());
    assert!(spec.peers.is_none());
    assert_eq!(spec.algorithm.algorithm.kind(), "sgd");

    let AlgorithmSpec::Sgd(sgd) = spec.algorithm.algorithm else {
        panic!("expected an sgd algorithm");
    };
    assert_eq!(sgd.stopping_criteria, TerminationSpec::MaxEpochs(2));
    assert!(!sgd.suppress_timer_output);
}
