//! One-shot completion gate between the relay and the run.
//!
//! The run blocks on a [`CompletionWaiter`] until whichever relay path ends
//! the amplification opens the gate through the shared [`CompletionSignal`].
use crate::relay::FanoutSummary;
use crate::Error;
use std::sync::Mutex;
use tokio::sync::oneshot;

type Outcome = Result<FanoutSummary, Error>;

/// Sending half of the completion gate. Shared as `Arc<CompletionSignal>`.
#[derive(Debug)]
pub struct CompletionSignal {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// Receiving half of the completion gate.
#[derive(Debug)]
pub struct CompletionWaiter {
    receiver: oneshot::Receiver<Outcome>,
}

impl CompletionSignal {
    /// Creates a closed gate and the waiter that observes it opening.
    pub fn new() -> (Self, CompletionWaiter) {
        let (sender, receiver) = oneshot::channel();
        (
            CompletionSignal {
                sender: Mutex::new(Some(sender)),
            },
            CompletionWaiter { receiver },
        )
    }

    /// Opens the gate with the outcome of the relay.
    ///
    /// Fails with [`Error::CompletionAlreadySignaled`] when the gate was
    /// already opened.
    pub fn fire(&self, outcome: Outcome) -> Result<(), Error> {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let sender = sender.ok_or(Error::CompletionAlreadySignaled)?;
        // the waiter may be gone when the run already gave up, nothing to tell
        let _ = sender.send(outcome);
        Ok(())
    }

    /// Whether the gate has been opened.
    pub fn is_fired(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl CompletionWaiter {
    /// Waits for the gate to open.
    ///
    /// Resolves to [`Error::CompletionDropped`] if every signal handle is
    /// dropped without firing.
    pub async fn wait(self) -> Outcome {
        self.receiver
            .await
            .unwrap_or(Err(Error::CompletionDropped))
    }
}
