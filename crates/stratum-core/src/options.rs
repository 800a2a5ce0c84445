//! Engine tunables

use serde::{Deserialize, Serialize};
use std::time::Duration;

use stratum_types::property::default_properties;

use crate::prelude::*;
use crate::settings::ModeSets;

pub const DEFAULT_EXPIRATION_TIME: u64 = 5;
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
	/// Lifetime in seconds of cache entries for options carrying `expire`
	pub expiration_time: u64,
	/// Context properties of a config that never stored any
	pub default_properties: PropertySet,
	#[serde(flatten)]
	pub modes: ModeSets,
	/// Entries kept by each per-config cache
	pub cache_capacity: usize,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			expiration_time: DEFAULT_EXPIRATION_TIME,
			default_properties: default_properties(),
			modes: ModeSets::default(),
			cache_capacity: DEFAULT_CACHE_CAPACITY,
		}
	}
}

impl EngineOptions {
	pub fn builder() -> EngineOptionsBuilder {
		EngineOptionsBuilder::default()
	}

	pub fn expiration(&self) -> Duration {
		Duration::from_secs(self.expiration_time)
	}
}

/// Builder for EngineOptions with fluent API
#[derive(Debug, Default)]
pub struct EngineOptionsBuilder {
	options: EngineOptions,
}

impl EngineOptionsBuilder {
	pub fn expiration_time(mut self, seconds: u64) -> Self {
		self.options.expiration_time = seconds;
		self
	}

	pub fn default_properties(mut self, props: PropertySet) -> Self {
		self.options.default_properties = props;
		self
	}

	pub fn modes(mut self, modes: ModeSets) -> Self {
		self.options.modes = modes;
		self
	}

	pub fn cache_capacity(mut self, capacity: usize) -> Self {
		self.options.cache_capacity = capacity;
		self
	}

	pub fn build(self) -> ClResult<EngineOptions> {
		if self.options.cache_capacity == 0 {
			return Err(Error::config("cache capacity must be greater than 0"));
		}
		Ok(self.options)
	}
}


// vim: ts=4
