//! In-memory notification channel for tests/dev.

use std::sync::{mpsc, Mutex};

use crate::channel::{ChannelError, ChannelState, NotificationChannel, Subscription};

/// In-memory pub/sub channel.
///
/// - No IO / no async
/// - Best-effort fan-out
/// - Always `Connected` (there is no transport to lose)
#[derive(Debug)]
pub struct InMemoryChannel<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryChannel<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryChannel<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> NotificationChannel<M> for InMemoryChannel<M>
where
    M: Clone + Send + 'static,
{
    fn publish(&self, message: M) -> Result<(), ChannelError> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| ChannelError::Transport("subscriber list poisoned".to_string()))?;

        // A send failure means the subscription was dropped; prune it here.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // Even against a poisoned list the caller gets a valid (if silent)
        // subscription back.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }

    fn state(&self) -> ChannelState {
        ChannelState::Connected
    }
}
