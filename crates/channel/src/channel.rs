//! Notification channel abstraction (mechanics only).
//!
//! A pub/sub mechanism for distributing mutation notices to multiple
//! consumers. The channel is intentionally lightweight and makes minimal
//! assumptions:
//!
//! - **Transport-agnostic**: works with in-memory channels, Redis pub/sub, or
//!   a future socket transport.
//! - **At-least-once delivery**: notices may be delivered multiple times;
//!   consumers must be idempotent.
//! - **No persistence**: the channel is for distribution, not storage. The
//!   local cache and pending queue are the durable state; a missed notice is
//!   recovered by the next fetch or sync pass.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection lifecycle of a channel transport.
///
/// `Disconnected → Connecting → Connected`. A transport that loses its link
/// drops back to `Disconnected`; collaborators then fall back to
/// queue-everything behavior until reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Channel-level error, shared by all transports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is not connected; the notice was not dispatched.
    #[error("channel is not connected")]
    NotConnected,
    /// Transport-level failure (socket, broker, lock poisoning).
    #[error("transport error: {0}")]
    Transport(String),
    /// A payload could not be (de)serialized for the wire.
    #[error("serialization error: {0}")]
    Serialize(String),
}

/// A subscription to the notice stream.
///
/// Each subscription gets a copy of every published notice (broadcast
/// semantics). Unsubscribing is dropping the subscription: transports prune
/// dead receivers on the next publish.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next notice is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notice without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a notice.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<M> {
        let mut out = Vec::new();
        while let Ok(m) = self.try_recv() {
            out.push(m);
        }
        out
    }
}

/// Transport-agnostic notification channel (pub/sub abstraction).
///
/// `publish` broadcasts a notice to every subscriber; `subscribe` returns a
/// receiving end. `state` exposes the transport's connection lifecycle so the
/// sync engine can decide whether peers will actually hear a notice.
///
/// The trait requires `Send + Sync`: implementations must be safe to share
/// across tasks, and multiple tasks may publish concurrently.
pub trait NotificationChannel<M>: Send + Sync {
    fn publish(&self, message: M) -> Result<(), ChannelError>;

    fn subscribe(&self) -> Subscription<M>;

    fn state(&self) -> ChannelState;

    fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }
}

impl<M, C> NotificationChannel<M> for Arc<C>
where
    C: NotificationChannel<M> + ?Sized,
{
    fn publish(&self, message: M) -> Result<(), ChannelError> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }

    fn state(&self) -> ChannelState {
        (**self).state()
    }
}
