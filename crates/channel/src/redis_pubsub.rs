//! Redis pub/sub-backed notification channel (optional).
//!
//! Note: Redis pub/sub is not durable (messages can be dropped if subscribers
//! are offline). That matches the channel contract: the local cache and the
//! pending queue are the durable state, the channel only accelerates peers.

use std::marker::PhantomData;
use std::sync::{mpsc, Arc, RwLock};
use std::thread;

use redis::Commands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::channel::{ChannelError, ChannelState, NotificationChannel, Subscription};

/// Redis pub/sub transport for JSON-serializable notices.
#[derive(Debug, Clone)]
pub struct RedisChannel<M> {
    client: redis::Client,
    topic: String,
    state: Arc<RwLock<ChannelState>>,
    _marker: PhantomData<fn() -> M>,
}

impl<M> RedisChannel<M> {
    pub fn new(redis_url: impl AsRef<str>, topic: impl Into<String>) -> Result<Self, ChannelError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            topic: topic.into(),
            state: Arc::new(RwLock::new(ChannelState::Connecting)),
            _marker: PhantomData,
        })
    }

    fn set_state(&self, next: ChannelState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }
}

impl<M> NotificationChannel<M> for RedisChannel<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    fn publish(&self, message: M) -> Result<(), ChannelError> {
        let payload =
            serde_json::to_string(&message).map_err(|e| ChannelError::Serialize(e.to_string()))?;

        let mut conn = self.client.get_connection().map_err(|e| {
            self.set_state(ChannelState::Disconnected);
            ChannelError::Transport(e.to_string())
        })?;

        let _: i64 = conn.publish(&self.topic, payload).map_err(|e| {
            self.set_state(ChannelState::Disconnected);
            ChannelError::Transport(e.to_string())
        })?;

        self.set_state(ChannelState::Connected);
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let topic = self.topic.clone();
        let state = self.state.clone();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!("redis subscribe failed: {err}");
                    if let Ok(mut s) = state.write() {
                        *s = ChannelState::Disconnected;
                    }
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if pubsub.subscribe(topic).is_err() {
                if let Ok(mut s) = state.write() {
                    *s = ChannelState::Disconnected;
                }
                return;
            }
            if let Ok(mut s) = state.write() {
                *s = ChannelState::Connected;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(_) => {
                        if let Ok(mut s) = state.write() {
                            *s = ChannelState::Disconnected;
                        }
                        return;
                    }
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let message: M = match serde_json::from_str(&payload) {
                    Ok(m) => m,
                    Err(err) => {
                        tracing::warn!("dropping undecodable channel message: {err}");
                        continue;
                    }
                };

                if tx.send(message).is_err() {
                    // Subscriber dropped; stop forwarding.
                    return;
                }
            }
        });

        Subscription::new(rx)
    }

    fn state(&self) -> ChannelState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ChannelState::Disconnected)
    }
}
