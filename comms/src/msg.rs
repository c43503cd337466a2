use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_KIND: Header = 0;
const CONTROL_KIND: Header = 1;
const WEIGHTS_KIND: Header = 2;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A flattened copy of every weights object of a model.
    Weights(&'a mut [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Sent once after a connection is established to identify the sending trainer.
    Connect { trainer: usize },
    /// Announces the weights that follow belong to the given tournament round.
    Exchange { round: usize, trainer: usize },
    Disconnect,
}

/// The application layer message exchanged between trainers.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

fn invalid_data<T>(msg: String) -> io::Result<T> {
    Err(io::Error::new(io::ErrorKind::InvalidData, msg))
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_KIND.to_be_bytes());
                Ok(Some(e.as_bytes()))
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_KIND.to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
                Ok(None)
            }
            Msg::Data(Payload::Weights(weights)) => {
                buf.extend_from_slice(&WEIGHTS_KIND.to_be_bytes());
                Ok(Some(bytemuck::cast_slice(weights)))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        let len = buf.len();
        let Some((kind_buf, rest)) = buf.split_at_mut_checked(HEADER_SIZE) else {
            return invalid_data(format!(
                "frame of {len} bytes is shorter than the {HEADER_SIZE} byte header"
            ));
        };

        let mut header = [0; HEADER_SIZE];
        header.copy_from_slice(kind_buf);

        match Header::from_be_bytes(header) {
            ERR_KIND => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL_KIND => Ok(Self::Control(serde_json::from_slice(rest)?)),
            WEIGHTS_KIND => match bytemuck::try_cast_slice_mut(rest) {
                Ok(nums) => Ok(Self::Data(Payload::Weights(nums))),
                Err(e) => invalid_data(format!("malformed weights payload: {e}")),
            },
            kind => invalid_data(format!("received an invalid kind {kind}")),
        }
    }
}
