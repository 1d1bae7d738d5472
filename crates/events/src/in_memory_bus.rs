//! Process-local fan-out for approval audit envelopes.

use std::sync::{Mutex, PoisonError, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// A publisher panicked while holding the subscriber list.
    #[error("audit bus subscriber list poisoned, message not delivered")]
    Poisoned,
}

/// Delivers every published message to each live subscriber over a channel.
///
/// The invoicing service publishes only after the store write commits, so a
/// reader that drains its subscription sees transitions in commit order.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // receivers that were dropped are pruned here
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);

        Subscription::new(rx)
    }
}
