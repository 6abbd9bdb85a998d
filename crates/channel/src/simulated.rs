//! Simulated channel transport.
//!
//! Stands in for a live socket connection: the connect handshake completes
//! immediately, `publish` echoes into a local dispatch table instead of a wire
//! protocol, and a background task periodically synthesizes inbound events to
//! emulate a live multi-client feed. A production deployment swaps this for a
//! genuine bidirectional transport (see `redis_pubsub` behind the `redis`
//! feature) without touching any collaborator.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::channel::{ChannelError, ChannelState, NotificationChannel, Subscription};
use crate::in_memory::InMemoryChannel;

type Feed<M> = Arc<dyn Fn() -> Option<M> + Send + Sync>;

/// Connectivity simulation with a synthesized inbound feed.
///
/// Once connected it stays connected; `stop` tears the transport down and
/// `on_foreground` models the host page regaining visibility, which triggers a
/// reconnection attempt when disconnected.
pub struct SimulatedChannel<M> {
    dispatch: Arc<InMemoryChannel<M>>,
    state: Arc<RwLock<ChannelState>>,
    feed: Feed<M>,
    feed_interval: Duration,
    shutdown: Arc<tokio::sync::Notify>,
}

impl<M> SimulatedChannel<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Connect the simulated transport and start the inbound feed.
    ///
    /// `feed` is polled every `feed_interval`; returning `None` skips a tick.
    /// Must be called within a Tokio runtime.
    pub fn connect(feed_interval: Duration, feed: impl Fn() -> Option<M> + Send + Sync + 'static) -> Self {
        let channel = Self {
            dispatch: Arc::new(InMemoryChannel::new()),
            state: Arc::new(RwLock::new(ChannelState::Connecting)),
            feed: Arc::new(feed),
            feed_interval,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        };
        channel.complete_handshake();
        channel.spawn_feed();
        channel
    }

    /// The simulated handshake always succeeds immediately.
    fn complete_handshake(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = ChannelState::Connected;
        }
        tracing::debug!("simulated channel connected");
    }

    fn spawn_feed(&self) {
        let dispatch = self.dispatch.clone();
        let state = self.state.clone();
        let feed = self.feed.clone();
        let shutdown = self.shutdown.clone();
        let period = self.feed_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; swallow it so the feed starts
            // one full period after connect.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::debug!("simulated feed stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let connected = state
                            .read()
                            .map(|s| *s == ChannelState::Connected)
                            .unwrap_or(false);
                        if !connected {
                            break;
                        }
                        if let Some(event) = feed() {
                            if let Err(err) = dispatch.publish(event) {
                                tracing::warn!("simulated feed publish failed: {err}");
                            }
                        }
                    }
                }
            }
        });
    }

    /// Tear the transport down. Subscribers stop receiving events until a
    /// reconnection (see [`SimulatedChannel::on_foreground`]).
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Ok(mut state) = self.state.write() {
            *state = ChannelState::Disconnected;
        }
        tracing::debug!("simulated channel disconnected");
    }

    /// Host regained foreground visibility: reconnect when disconnected.
    pub fn on_foreground(&self) {
        let disconnected = self
            .state
            .read()
            .map(|s| *s == ChannelState::Disconnected)
            .unwrap_or(false);
        if !disconnected {
            return;
        }

        if let Ok(mut state) = self.state.write() {
            *state = ChannelState::Connecting;
        }
        self.complete_handshake();
        self.spawn_feed();
    }
}

impl<M> NotificationChannel<M> for SimulatedChannel<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn publish(&self, message: M) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        // Echo into the local dispatch table; there is no wire.
        self.dispatch.publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        self.dispatch.subscribe()
    }

    fn state(&self) -> ChannelState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ChannelState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handshake_completes_on_connect() {
        let channel: SimulatedChannel<&str> =
            SimulatedChannel::connect(Duration::from_secs(60), || None);
        assert_eq!(channel.state(), ChannelState::Connected);
        channel.stop();
    }

    #[tokio::test]
    async fn publish_echoes_to_local_subscribers() {
        let channel = SimulatedChannel::connect(Duration::from_secs(60), || None);
        let sub = channel.subscribe();

        channel.publish("ciao").unwrap();
        assert_eq!(sub.try_recv().unwrap(), "ciao");
        channel.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn feed_synthesizes_inbound_events() {
        let channel = SimulatedChannel::connect(Duration::from_millis(10), || Some("inbound"));
        let sub = channel.subscribe();

        let got = sub.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, "inbound");
        channel.stop();
    }

    #[tokio::test]
    async fn foreground_reconnects_after_stop() {
        let channel: SimulatedChannel<&str> =
            SimulatedChannel::connect(Duration::from_secs(60), || None);
        channel.stop();
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(matches!(
            channel.publish("lost"),
            Err(ChannelError::NotConnected)
        ));

        channel.on_foreground();
        assert_eq!(channel.state(), ChannelState::Connected);
        channel.stop();
    }
}
