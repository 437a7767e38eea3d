//! Core of the triPOD job pipeline.
//!
//! Identifier codec, workspace allocation, argument-vector construction,
//! external process execution and result aggregation. Nothing here knows
//! about HTTP or the worker pool; those live in `tripod-api` and
//! `tripod-worker`.

pub mod command;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod process;
pub mod redact;
pub mod results;
pub mod types;
pub mod workspace;
