//! Experiment tracker
//!
//! Keeps a local mirror of experiment metric records, ranks them into a
//! per-contributor leaderboard, publishes it and stages the best model for
//! serving.

pub mod aggregate;
pub mod commands;
pub mod pipeline;
pub mod scheduler;
pub mod tables;
