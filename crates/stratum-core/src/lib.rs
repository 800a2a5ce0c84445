//! Resolution engine for stratum.
//!
//! This crate holds the schema model and everything that turns it into
//! values: the calculation engine, the property resolver, the leadership
//! manager, value and owner resolution with its caches, and the public
//! [`Config`] handle tying them to a storage session.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod bag;
mod cache;
pub mod calculation;
pub mod config;
pub mod group;
mod kernel;
mod leadership;
pub mod option;
pub mod options;
pub mod prelude;
pub mod schema;
pub mod settings;
mod validation;
mod values;

// Re-export commonly used types
pub use calculation::{CalcArgs, CalcError, Calculation, Param, ParamOption};
pub use config::{Config, ConfigBuilder, Propagation};
pub use group::{GroupBuilder, GroupDef, GroupKind, Node};
pub use option::{DefaultValue, OptionBuilder, OptionDef, OptionType, SymLinkDef};
pub use options::{EngineOptions, EngineOptionsBuilder};
pub use schema::{Schema, SchemaBuilder, SchemaNode};
pub use settings::{Mode, ModeSets, When};

// vim: ts=4
