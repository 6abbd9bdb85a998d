//! `magazzino-sync` — offline-aware synchronization core.
//!
//! Queues local mutations while the remote system is unreachable, replays them
//! in dependency order (create → update → delete) when connectivity returns,
//! maintains a local cache mirror per entity type, and notifies peers over the
//! notification channel. The engine is explicitly constructed with injected
//! capabilities ([`store::KeyValueStore`], [`connectivity::ReachabilityProbe`],
//! [`remote::RemoteApi`], a notification channel) so it runs the same in a
//! desktop shell, a headless worker, or a test harness.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod queue;
pub mod remote;
pub mod store;
pub mod types;
pub mod worker;

pub use cache::LocalCache;
pub use config::SyncConfig;
pub use connectivity::{HttpProbe, ManualProbe, ReachabilityProbe};
pub use engine::{SyncEngine, SyncError};
pub use queue::PendingQueue;
pub use remote::{HttpRemote, ListOptions, RemoteApi, RemoteError};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::{
    PendingOperation, Snapshot, SyncIssue, SyncOutcome, SyncReport, SyncStatus,
};
pub use worker::SyncWorker;
