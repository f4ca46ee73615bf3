//! # simultrans
//!
//! Policy-gradient training of read/write policies for simultaneous machine
//! translation. A policy decides, token by token, whether to WAIT for more
//! source or COMMIT the translator's next target word.
//!
//! ## Modules
//!
//! - [`stats`] — BLEU, latency and reward computation over action traces
//! - [`decode`] — Episode runner: the WAIT/COMMIT/FINISH protocol
//! - [`policy`] — Policy trait, wait-k baseline, REINFORCE linear policy
//! - [`corpus`] — Parallel text corpora and batching
//! - [`training`] — Training loop, validation, metrics, remote display
//! - [`checkpoint`] — Checkpoint persistence, pruning and resume
//! - [`config`] — TOML configuration, overrides and workspace layout
//! - [`error`] — Structured error types

pub mod checkpoint;
pub mod config;
pub mod corpus;
pub mod decode;
pub mod error;
pub mod policy;
pub mod stats;
pub mod training;
