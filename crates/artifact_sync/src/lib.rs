//! Incremental synchronization of experiment artifacts from a remote store.
//!
//! Metric records are discovered and pulled by the [`SyncEngine`]; serving
//! artifacts of leaderboard winners are pulled by the [`FetchPool`].

mod fetch_pool;
mod store;
mod sync;

pub use fetch_pool::{FetchOutcome, FetchPool, FetchPoolConfig, FetchReport, FetchTask};
pub use store::{ArtifactStore, ObjectArtifactStore, RemoteObject, TransferError};
pub use sync::{SyncEngine, SyncOutcome, SyncWatermark};
