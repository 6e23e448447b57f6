//! Core domain + application logic for the channel-link translation relay.
//!
//! This crate is framework-agnostic. Discord, the translation providers and
//! the database live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod languages;
pub mod ledger;
pub mod links;
pub mod logging;
pub mod markup;
pub mod model;
pub mod registry;
pub mod relay;
pub mod services;
pub mod store;
pub mod sync;
pub mod translation;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
