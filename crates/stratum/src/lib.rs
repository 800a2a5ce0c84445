//! stratum is a hierarchical configuration option engine.
//!
//! # Features
//!
//! - Typed options, multi and submulti lists, nested and dynamic groups
//! - Leader/follower groups kept index-aligned
//! - Values, defaults and properties computed by calculations over other options
//! - Layered property/permissive policy (read-only and read-write modes)
//! - Meta-configurations whose children inherit values
//! - Pluggable storage: in-memory or SQLite

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

// Re-export shared types and the storage contract from stratum-types
pub use stratum_types::error;
pub use stratum_types::owner;
pub use stratum_types::property;
pub use stratum_types::storage_adapter;
pub use stratum_types::types;
pub use stratum_types::utils;

pub use stratum_types::props;

// Engine re-exports
pub use stratum_core::{calculation, config, group, option, options, schema, settings};
pub use stratum_core::{
	CalcArgs, CalcError, Calculation, Config, ConfigBuilder, DefaultValue, EngineOptions,
	EngineOptionsBuilder, GroupBuilder, GroupDef, GroupKind, Mode, ModeSets, Node, OptionBuilder,
	OptionDef, OptionType, Param, ParamOption, Propagation, Schema, SchemaBuilder, SchemaNode,
	SymLinkDef, When,
};

// Storage backends
#[cfg(feature = "memory")]
pub use stratum_storage_adapter_memory::StorageAdapterMemory;
#[cfg(feature = "sqlite")]
pub use stratum_storage_adapter_sqlite::StorageAdapterSqlite;

pub mod prelude;

/// Install a fmt subscriber filtered by `RUST_LOG`
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.try_init();
}

// vim: ts=4
