//! Adapter that persists the per-session state of a configuration.
//!
//! A session owns four independent stores addressed by `(path, index)`:
//! properties, permissives, values with their owners, and free-form
//! information. A `None` path addresses the context itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::prelude::*;

/// Selects which of the two property-shaped stores an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyStore {
	#[serde(rename = "P")]
	Properties,
	#[serde(rename = "R")]
	Permissives,
}

impl PropertyStore {
	pub fn as_str(self) -> &'static str {
		match self {
			PropertyStore::Properties => "P",
			PropertyStore::Permissives => "R",
		}
	}
}

/// `{path: {index: properties}}`
pub type PropertiesExport = BTreeMap<Option<Box<str>>, BTreeMap<Option<Index>, PropertySet>>;

/// `{path: {key: value}}`
pub type InformationExport = BTreeMap<Option<Box<str>>, BTreeMap<Box<str>, Value>>;

/// Values exported as four parallel columns, one row per `(path, index)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuesExport {
	pub paths: Vec<Option<Box<str>>>,
	pub indices: Vec<Option<Index>>,
	pub values: Vec<Value>,
	pub owners: Vec<Owner>,
}

impl ValuesExport {
	pub fn push(&mut self, path: Option<Box<str>>, index: Option<Index>, value: Value, owner: Owner) {
		self.paths.push(path);
		self.indices.push(index);
		self.values.push(value);
		self.owners.push(owner);
	}

	pub fn len(&self) -> usize {
		self.paths.len()
	}

	pub fn is_empty(&self) -> bool {
		self.paths.is_empty()
	}

	/// Iterate rows, rejecting columns of unequal length
	pub fn rows(&self) -> ClResult<impl Iterator<Item = (Option<&str>, Option<Index>, &Value, &Owner)>> {
		let len = self.paths.len();
		if self.indices.len() != len || self.values.len() != len || self.owners.len() != len {
			return Err(Error::config("exported values have columns of different lengths"));
		}
		Ok(self
			.paths
			.iter()
			.zip(self.indices.iter())
			.zip(self.values.iter())
			.zip(self.owners.iter())
			.map(|(((path, index), value), owner)| (path.as_deref(), *index, value, owner)))
	}
}

/// Complete state of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
	pub properties: PropertiesExport,
	pub permissives: PropertiesExport,
	pub values: ValuesExport,
	pub information: InformationExport,
}

#[async_trait]
pub trait StorageAdapter: Debug + Send + Sync {
	/// Create a session. Existing sessions are kept unless `delete_old` is set.
	async fn create_session(&self, session_id: &str, delete_old: bool) -> ClResult<()>;

	/// List known sessions
	async fn list_sessions(&self) -> ClResult<Vec<Box<str>>>;

	/// Delete a session and everything stored for it. Unknown ids are ignored.
	async fn delete_session(&self, session_id: &str) -> ClResult<()>;

	/// Open a connection scoped to one logical operation
	///
	/// Dropping the connection without calling [`StorageConnection::commit`]
	/// discards its writes on backends that support transactions.
	async fn connection(&self, session_id: &str) -> ClResult<Box<dyn StorageConnection>>;
}

#[async_trait]
pub trait StorageConnection: Debug + Send + Sync {
	fn session_id(&self) -> &str;

	// Properties and permissives
	//****************************
	async fn set_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
		properties: &PropertySet,
	) -> ClResult<()>;

	/// Stored properties, `None` if nothing is stored at this address
	async fn get_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<PropertySet>>;

	async fn del_properties(
		&self,
		store: PropertyStore,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<()>;

	async fn export_properties(&self, store: PropertyStore) -> ClResult<PropertiesExport>;

	/// Replace the whole store with `data`
	async fn import_properties(&self, store: PropertyStore, data: &PropertiesExport) -> ClResult<()>;

	// Values and owners
	//*******************
	async fn set_value(
		&self,
		path: Option<&str>,
		value: &Value,
		owner: &Owner,
		index: Option<Index>,
	) -> ClResult<()>;

	/// Owner and stored value at exactly `(path, index)`
	async fn get_owner(
		&self,
		path: Option<&str>,
		index: Option<Index>,
	) -> ClResult<Option<(Owner, Value)>>;

	/// Change the owner of a stored value, `NotFound` if nothing is stored
	async fn set_owner(&self, path: &str, owner: &Owner, index: Option<Index>) -> ClResult<()>;

	/// With `index == None` this is true if anything is stored for `path`
	async fn has_value(&self, path: &str, index: Option<Index>) -> ClResult<bool>;

	/// Remove every stored entry of `path`
	async fn reset_value(&self, path: &str) -> ClResult<()>;

	async fn reset_value_index(&self, path: &str, index: Index) -> ClResult<()>;

	/// Move the entry stored at `index` to `index - 1`
	async fn reduce_index(&self, path: &str, index: Index) -> ClResult<()>;

	/// One past the highest stored index of `path`, 0 if none
	async fn get_max_length(&self, path: &str) -> ClResult<usize>;

	async fn export_values(&self) -> ClResult<ValuesExport>;

	async fn import_values(&self, data: &ValuesExport) -> ClResult<()>;

	// Information
	//*************
	async fn set_information(&self, path: Option<&str>, key: &str, value: &Value) -> ClResult<()>;

	async fn get_information(&self, path: Option<&str>, key: &str) -> ClResult<Option<Value>>;

	/// `NotFound` if the key is not set
	async fn del_information(&self, path: Option<&str>, key: &str) -> ClResult<()>;

	async fn list_information(&self, path: Option<&str>) -> ClResult<Vec<Box<str>>>;

	async fn export_information(&self) -> ClResult<InformationExport>;

	async fn import_information(&self, data: &InformationExport) -> ClResult<()>;

	/// Make every write of this connection durable
	async fn commit(&self) -> ClResult<()>;
}

// vim: ts=4
