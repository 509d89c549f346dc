//! Domain core for fieldledger: offline operations, decision records, and
//! the per-tenant hash chain that ties them together.
//!
//! No I/O and no internal deps; every other crate builds on it.

pub mod action;
pub mod chain;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod decision;
pub mod error;
pub mod operation;
pub mod record;
pub mod types;
