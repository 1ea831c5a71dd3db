//! Serving side of the tracker: keeps the published best model loaded and
//! answers predictions with it.
//!
//! The [`ModelGuard`] swaps to a new model only once it has fully loaded, so
//! a failed reload never leaves the service without a model.

mod error;
mod guard;
mod scorer;

pub use error::*;
pub use guard::*;
pub use scorer::*;
