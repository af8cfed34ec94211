//! Core domain and application logic for the channel sweeper.
//!
//! The chat workspace lives behind [`ports::ChannelService`]; the Slack
//! adapter is a separate crate. Everything here runs against that trait, so
//! a sweep can be exercised end to end with an in-memory service.

pub mod actions;
pub mod activity;
pub mod config;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod membership;
pub mod orchestrator;
pub mod ports;
pub mod prefilter;
pub mod throttle;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
