//! Shared types, storage adapter traits, and core utilities for stratum.
//!
//! This crate contains the vocabulary shared between the resolution engine
//! and every storage adapter implementation: the error type, property
//! tokens, owners and the storage contract itself.

pub mod error;
pub mod owner;
pub mod prelude;
pub mod property;
pub mod storage_adapter;
pub mod types;
pub mod utils;

// vim: ts=4
