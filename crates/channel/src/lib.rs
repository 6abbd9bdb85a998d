//! `magazzino-channel` — realtime notification channel.
//!
//! Pub/sub transport used to broadcast successful mutations to other connected
//! clients and to receive server-pushed updates. The contract is
//! transport-agnostic: the sync engine only sees [`NotificationChannel`], and
//! the concrete transport (in-memory fake, connectivity simulation, Redis
//! pub/sub) is selected at construction time.

pub mod channel;
pub mod event;
pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_pubsub;
pub mod simulated;

pub use channel::{ChannelError, ChannelState, NotificationChannel, Subscription};
pub use event::{ChannelEvent, EVENT_INVENTORY_UPDATED, EVENT_MAGAZZINO_UPDATE, EVENT_MOVEMENT_ADDED};
pub use in_memory::InMemoryChannel;
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisChannel;
pub use simulated::SimulatedChannel;
