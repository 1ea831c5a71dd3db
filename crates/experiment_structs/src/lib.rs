//! Common structs for experiment records shared across crates.
//!
//! Everything the tracker, the database layer and the serving side agree on
//! lives here: experiment identity, metric records, the best-model pointer,
//! label mappings and the on-disk layout of the local experiment cache.

mod details;
mod key;
mod layout;
mod metrics;
mod pointer;

pub use details::*;
pub use key::*;
pub use layout::*;
pub use metrics::*;
pub use pointer::*;
