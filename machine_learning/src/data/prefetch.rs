use std::{
    sync::mpsc::{self, Receiver},
    thread::{self, JoinHandle},
};

use log::warn;

use crate::{MlErr, Result, execution::ExecutionMode};

/// Produces the mini-batches of a split one step ahead on a background thread.
///
/// The channel is a rendezvous, so the producer prepares the next batch and then waits
/// for it to be taken while the previous one is in use.
pub(super) struct Prefetcher<T> {
    mode: ExecutionMode,
    rx: Option<Receiver<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Prefetcher<T> {
    pub fn spawn<F>(mode: ExecutionMode, mut produce: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(0);

        let handle = thread::spawn(move || {
            while tx.send(produce()).is_ok() {}
        });

        Self {
            mode,
            rx: Some(rx),
            handle: Some(handle),
        }
    }

    pub fn next(&mut self) -> Result<T> {
        self.rx
            .as_ref()
            .and_then(|rx| rx.recv().ok())
            .ok_or(MlErr::EmptySplit(self.mode))
    }
}

impl<T> Drop for Prefetcher<T> {
    fn drop(&mut self) {
        // Disconnecting wakes the producer out of a blocked send.
        drop(self.rx.take());

        if let Some(Err(e)) = self.handle.take().map(JoinHandle::join) {
            let mode = self.mode;
            warn!("failed to join the {mode} prefetch thread: {e:?}");
        }
    }
}
