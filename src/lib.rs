//! sticklab: decoding of delta-encoded stick (OHLCV) payloads and the
//! research tools built on top of them.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
pub mod logging;
