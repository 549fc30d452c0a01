//! masterswap - one-at-a-time control-plane machineset replacement
//!
//! See [`cluster`] for the replacement cycle and [`cluster::ReplacementOrchestrator`]
//! for the entry point.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod retry;
