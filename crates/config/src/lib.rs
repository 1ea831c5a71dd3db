//! Process configuration for the experiment tracker.

mod config;

pub use config::*;
