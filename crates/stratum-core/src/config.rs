//! Public configuration handle
//!
//! A [`Config`] binds a [`Schema`] to one storage session. Every call opens a
//! storage connection, resolves its path against the current context policy
//! and commits when it wrote something.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use stratum_types::property::forbidden_set_properties;
use stratum_types::storage_adapter::{PropertyStore, SessionExport, StorageAdapter};
use stratum_types::utils::random_id;

use crate::bag::{ConfigBag, OptionBag};
use crate::kernel::{Access, ConfigInner, ConfigKind};
use crate::leadership;
use crate::options::EngineOptions;
use crate::prelude::*;
use crate::schema::Schema;
use crate::settings::{Mode, When};

/// How a value written through a meta-config reaches its children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Propagation {
	/// Reset the option in every child
	pub force_default: bool,
	/// Children keep the value they see now as a local one
	pub force_dont_change_value: bool,
	/// Reset children whose local value equals the new one
	pub force_default_if_same: bool,
	/// Write into the leaf configs only, the meta-configs are left untouched
	pub only_config: bool,
}

impl Propagation {
	fn forces(&self) -> bool {
		self.force_default || self.force_dont_change_value || self.force_default_if_same
	}
}

/// Keep a per-child failure, storage failures abort the whole write
fn collect(errors: &mut Vec<Error>, res: ClResult<()>) -> ClResult<()> {
	match res {
		Ok(()) => Ok(()),
		Err(err @ (Error::DbError | Error::Io(_))) => Err(err),
		Err(err) => {
			debug!("propagated write failed: {}", err);
			errors.push(err);
			Ok(())
		}
	}
}

/// Builder for Config with fluent API
pub struct ConfigBuilder {
	schema: Arc<Schema>,
	storage: Arc<dyn StorageAdapter>,
	session_id: Option<Box<str>>,
	delete_old: bool,
	options: EngineOptions,
	kind: ConfigKind,
}

impl ConfigBuilder {
	pub fn session_id(mut self, session_id: impl Into<Box<str>>) -> Self {
		self.session_id = Some(session_id.into());
		self
	}

	/// Drop a stored session with the same id instead of reusing it
	pub fn delete_old(mut self, delete_old: bool) -> Self {
		self.delete_old = delete_old;
		self
	}

	pub fn options(mut self, options: EngineOptions) -> Self {
		self.options = options;
		self
	}

	/// Build a meta-config other configs can inherit from
	pub fn meta(mut self) -> Self {
		self.kind = ConfigKind::MetaConfig;
		self
	}

	pub async fn build(self) -> ClResult<Config> {
		let session_id: Box<str> = match self.session_id {
			Some(session_id) => session_id,
			None => random_id()?.into(),
		};
		self.storage.create_session(&session_id, self.delete_old).await?;
		let inner = ConfigInner::new(self.kind, session_id, self.schema, self.storage, self.options);
		info!("config \"{}\" opened ({:?})", inner.session_id, inner.kind);

		let config_bag = inner.config_bag().await?;
		if config_bag.has(&Property::ForceStoreValue) {
			inner.materialize_force_store(&config_bag).await?;
			config_bag.connection.commit().await?;
		}
		Ok(Config { inner })
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	inner: Arc<ConfigInner>,
}

impl Config {
	pub fn builder(schema: Arc<Schema>, storage: Arc<dyn StorageAdapter>) -> ConfigBuilder {
		ConfigBuilder {
			schema,
			storage,
			session_id: None,
			delete_old: false,
			options: EngineOptions::default(),
			kind: ConfigKind::Config,
		}
	}

	/// Config with a random session id and default options
	pub async fn new(schema: Arc<Schema>, storage: Arc<dyn StorageAdapter>) -> ClResult<Config> {
		Self::builder(schema, storage).build().await
	}

	pub fn session_id(&self) -> &str {
		&self.inner.session_id
	}

	pub fn schema(&self) -> &Arc<Schema> {
		&self.inner.schema
	}

	pub fn is_meta(&self) -> bool {
		self.inner.kind == ConfigKind::MetaConfig
	}

	async fn option_bag(&self, path: &str, index: Option<Index>, access: Access) -> ClResult<OptionBag> {
		let config_bag = self.inner.config_bag().await?;
		self.inner.resolve(&config_bag, path, index, access).await
	}

	/// Option bag resolved with every raising property lifted
	async fn unrestrained_bag(&self, path: &str, index: Option<Index>, access: Access) -> ClResult<OptionBag> {
		let mut config_bag = self.inner.config_bag().await?;
		config_bag.unrestraint();
		self.inner.resolve(&config_bag, path, index, access).await
	}

	// Values
	//********
	pub async fn get(&self, path: &str) -> ClResult<Value> {
		self.get_at(path, None).await
	}

	/// Value of `path`, at `index` for followers
	pub async fn get_at(&self, path: &str, index: Option<Index>) -> ClResult<Value> {
		let bag = self.option_bag(path, index, Access::Read).await?;
		let value = self.inner.getattr(&bag).await?;
		if !(bag.is_follower() && index.is_none()) {
			self.inner.settings.validate_mandatory(&bag, &value)?;
		}
		Ok(value)
	}

	pub async fn set(&self, path: &str, value: Value) -> ClResult<()> {
		self.set_at(path, None, value).await
	}

	pub async fn set_at(&self, path: &str, index: Option<Index>, value: Value) -> ClResult<()> {
		let bag = self.option_bag(path, index, Access::Write).await?;
		self.inner.setattr(&bag, value).await?;
		bag.config_bag.connection.commit().await
	}

	pub async fn reset(&self, path: &str) -> ClResult<()> {
		self.reset_at(path, None).await
	}

	/// Drop the local value; followers are reset one index at a time
	pub async fn reset_at(&self, path: &str, index: Option<Index>) -> ClResult<()> {
		let bag = self.option_bag(path, index, Access::Write).await?;
		self.inner.settings.validate_properties(&bag).await?;
		if bag.is_follower() {
			self.inner.values.reset_follower(&bag).await?;
		} else {
			self.inner.values.reset(&bag).await?;
		}
		bag.config_bag.connection.commit().await
	}

	/// Value the option would have without a local override
	pub async fn default(&self, path: &str) -> ClResult<Value> {
		self.default_at(path, None).await
	}

	pub async fn default_at(&self, path: &str, index: Option<Index>) -> ClResult<Value> {
		let bag = self.option_bag(path, index, Access::Read).await?;
		self.inner.settings.validate_properties(&bag).await?;
		self.inner.values.getdefaultvalue(&bag).await
	}

	/// Length of the leadership `path` belongs to
	pub async fn len(&self, path: &str) -> ClResult<usize> {
		let bag = self.option_bag(path, None, Access::Read).await?;
		if !(bag.is_leader() || bag.is_follower()) {
			return Err(Error::config(format!("\"{}\" is not in a leadership", path)));
		}
		self.inner.settings.validate_properties(&bag).await?;
		leadership::get_length(&bag).await
	}

	/// Remove entry `index` of a leader and of all its followers
	pub async fn pop(&self, path: &str, index: Index) -> ClResult<()> {
		let bag = self.option_bag(path, None, Access::Write).await?;
		if !bag.is_leader() {
			return Err(Error::config(format!("pop is only available for a leader, not \"{}\"", path)));
		}
		self.inner.settings.validate_properties(&bag).await?;
		self.inner.values.reset_leadership(&bag, index).await?;
		bag.config_bag.connection.commit().await
	}

	// Owners
	//********
	pub async fn owner(&self, path: &str) -> ClResult<Owner> {
		self.owner_at(path, None).await
	}

	pub async fn owner_at(&self, path: &str, index: Option<Index>) -> ClResult<Owner> {
		let bag = self.owner_bag(path, index, Access::Read).await?;
		self.inner.values.getowner(&bag, true).await
	}

	pub async fn is_default(&self, path: &str) -> ClResult<bool> {
		self.is_default_at(path, None).await
	}

	pub async fn is_default_at(&self, path: &str, index: Option<Index>) -> ClResult<bool> {
		let bag = self.owner_bag(path, index, Access::Read).await?;
		self.inner.values.is_default_owner(&bag, true).await
	}

	/// Bag for an owner query or change; followers are only addressed per index
	async fn owner_bag(&self, path: &str, index: Option<Index>, access: Access) -> ClResult<OptionBag> {
		let bag = self.option_bag(path, index, access).await?;
		if bag.is_follower() && index.is_none() {
			return Err(Error::config(format!("index is mandatory for the follower option \"{}\"", path)));
		}
		self.inner.settings.validate_properties(&bag).await?;
		Ok(bag)
	}

	pub async fn set_owner(&self, path: &str, owner: &str) -> ClResult<()> {
		self.set_owner_at(path, None, owner).await
	}

	pub async fn set_owner_at(&self, path: &str, index: Option<Index>, owner: &str) -> ClResult<()> {
		let owner = Owner::parse_assignable(owner)?;
		let bag = self.owner_bag(path, index, Access::Write).await?;
		self.inner.values.setowner(&bag, &owner).await?;
		bag.config_bag.connection.commit().await
	}

	/// Owner recorded for every write of this config
	pub async fn context_owner(&self) -> ClResult<Owner> {
		let connection = self.inner.connection().await?;
		Ok(connection.get_owner(None, None).await?.map_or(Owner::User, |(owner, _)| owner))
	}

	pub async fn set_context_owner(&self, owner: &str) -> ClResult<()> {
		let owner = Owner::parse_assignable(owner)?;
		let connection = self.inner.connection().await?;
		connection.set_value(None, &Value::Null, &owner, None).await?;
		connection.commit().await
	}

	// Option properties and permissives
	//***********************************
	pub async fn properties(&self, path: &str) -> ClResult<PropertySet> {
		self.properties_at(path, None).await
	}

	/// Effective properties of a node, calculated ones included
	pub async fn properties_at(&self, path: &str, index: Option<Index>) -> ClResult<PropertySet> {
		Ok(self.unrestrained_bag(path, index, Access::Read).await?.properties)
	}

	pub async fn add_property(&self, path: &str, prop: impl Into<Property>) -> ClResult<()> {
		let prop = prop.into();
		if forbidden_set_properties().contains(&prop) {
			return Err(Error::config(format!("cannot add this property: \"{}\"", prop)));
		}
		let bag = self.unrestrained_bag(path, None, Access::Write).await?;
		let mut props = self.inner.settings.stored_or_declared(&bag).await?;
		props.insert(prop);
		self.inner.settings.set_properties(&bag, &props).await?;
		bag.config_bag.connection.commit().await
	}

	pub async fn pop_property(&self, path: &str, prop: impl Into<Property>) -> ClResult<()> {
		let bag = self.unrestrained_bag(path, None, Access::Write).await?;
		let mut props = self.inner.settings.stored_or_declared(&bag).await?;
		if props.remove(&prop.into()) {
			self.inner.settings.set_properties(&bag, &props).await?;
			bag.config_bag.connection.commit().await?;
		}
		Ok(())
	}

	/// Back to the declared properties
	pub async fn reset_properties(&self, path: &str) -> ClResult<()> {
		let bag = self.unrestrained_bag(path, None, Access::Write).await?;
		self.inner.settings.reset(&bag).await?;
		bag.config_bag.connection.commit().await
	}

	pub async fn permissives(&self, path: &str) -> ClResult<PropertySet> {
		let bag = self.unrestrained_bag(path, None, Access::Read).await?;
		self.inner.settings.get_permissives(&bag).await
	}

	pub async fn set_permissives(&self, path: &str, permissives: PropertySet) -> ClResult<()> {
		let bag = self.unrestrained_bag(path, None, Access::Write).await?;
		self.inner.settings.set_permissives(&bag, &permissives).await?;
		bag.config_bag.connection.commit().await
	}

	pub async fn reset_permissives(&self, path: &str) -> ClResult<()> {
		let bag = self.unrestrained_bag(path, None, Access::Write).await?;
		self.inner.settings.reset_permissives(&bag).await?;
		bag.config_bag.connection.commit().await
	}

	// Context properties and permissives
	//************************************
	pub async fn context_properties(&self) -> ClResult<PropertySet> {
		Ok(self.inner.config_bag().await?.properties)
	}

	pub async fn set_context_properties(&self, props: PropertySet) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		let added = props.difference(&config_bag.properties);
		let forbidden = added.intersection(&forbidden_set_properties());
		if !forbidden.is_empty() {
			return Err(Error::config(format!("cannot add those properties: {}", forbidden)));
		}
		self.inner.set_context_properties(&config_bag, props).await?;
		config_bag.connection.commit().await
	}

	pub async fn add_context_property(&self, prop: impl Into<Property>) -> ClResult<()> {
		let mut props = self.context_properties().await?;
		props.insert(prop.into());
		self.set_context_properties(props).await
	}

	pub async fn pop_context_property(&self, prop: impl Into<Property>) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		let mut props = config_bag.properties.clone();
		if props.remove(&prop.into()) {
			self.inner.set_context_properties(&config_bag, props).await?;
			config_bag.connection.commit().await?;
		}
		Ok(())
	}

	/// Back to the engine's default context properties
	pub async fn reset_context_properties(&self) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		let props = self.inner.settings.default_properties.clone();
		self.inner.set_context_properties(&config_bag, props).await?;
		config_bag.connection.del_properties(PropertyStore::Properties, None, None).await?;
		config_bag.connection.commit().await
	}

	pub async fn context_permissives(&self) -> ClResult<PropertySet> {
		Ok(self.inner.config_bag().await?.permissives)
	}

	pub async fn set_context_permissives(&self, permissives: PropertySet) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		self.inner.set_context_permissives(&config_bag, &permissives).await?;
		config_bag.connection.commit().await
	}

	pub async fn add_context_permissive(&self, prop: impl Into<Property>) -> ClResult<()> {
		let mut permissives = self.context_permissives().await?;
		permissives.insert(prop.into());
		self.set_context_permissives(permissives).await
	}

	pub async fn pop_context_permissive(&self, prop: impl Into<Property>) -> ClResult<()> {
		let mut permissives = self.context_permissives().await?;
		if permissives.remove(&prop.into()) {
			self.set_context_permissives(permissives).await?;
		}
		Ok(())
	}

	pub async fn reset_context_permissives(&self) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		config_bag.connection.del_properties(PropertyStore::Permissives, None, None).await?;
		self.inner.reset_all_caches();
		config_bag.connection.commit().await
	}

	// Modes
	//*******
	pub async fn read_only(&self) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		self.inner.read_only(&config_bag).await?;
		config_bag.connection.commit().await
	}

	pub async fn read_write(&self) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		self.inner.read_write(&config_bag).await?;
		config_bag.connection.commit().await
	}

	pub fn mode_properties(&self, mode: Mode, when: When) -> PropertySet {
		self.inner.settings.modes.read().get(mode, when).clone()
	}

	pub fn set_mode_properties(&self, mode: Mode, when: When, props: PropertySet) {
		self.inner.settings.modes.write().set(mode, when, props);
	}

	// Information
	//*************
	async fn information_path(&self, config_bag: &ConfigBag, path: Option<&str>) -> ClResult<()> {
		if let Some(path) = path {
			let mut config_bag = config_bag.clone();
			config_bag.unrestraint();
			self.inner.resolve(&config_bag, path, None, Access::Read).await?;
		}
		Ok(())
	}

	pub async fn set_information(&self, path: Option<&str>, key: &str, value: Value) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		self.information_path(&config_bag, path).await?;
		config_bag.connection.set_information(path, key, &value).await?;
		config_bag.connection.commit().await
	}

	/// Stored information, `default` when the key is not set
	///
	/// Without a default a missing key is `NotFound`.
	pub async fn get_information(&self, path: Option<&str>, key: &str, default: Option<Value>) -> ClResult<Value> {
		let config_bag = self.inner.config_bag().await?;
		self.information_path(&config_bag, path).await?;
		match config_bag.connection.get_information(path, key).await? {
			Some(value) => Ok(value),
			None => default.ok_or(Error::NotFound),
		}
	}

	pub async fn del_information(&self, path: Option<&str>, key: &str) -> ClResult<()> {
		let config_bag = self.inner.config_bag().await?;
		self.information_path(&config_bag, path).await?;
		config_bag.connection.del_information(path, key).await?;
		config_bag.connection.commit().await
	}

	pub async fn list_information(&self, path: Option<&str>) -> ClResult<Vec<Box<str>>> {
		let config_bag = self.inner.config_bag().await?;
		self.information_path(&config_bag, path).await?;
		config_bag.connection.list_information(path).await
	}

	// Sessions
	//**********
	pub async fn export(&self) -> ClResult<SessionExport> {
		let connection = self.inner.connection().await?;
		Ok(SessionExport {
			properties: connection.export_properties(PropertyStore::Properties).await?,
			permissives: connection.export_properties(PropertyStore::Permissives).await?,
			values: connection.export_values().await?,
			information: connection.export_information().await?,
		})
	}

	/// Replace the four stores of this session
	pub async fn import(&self, data: &SessionExport) -> ClResult<()> {
		let connection = self.inner.connection().await?;
		connection.import_properties(PropertyStore::Properties, &data.properties).await?;
		connection.import_properties(PropertyStore::Permissives, &data.permissives).await?;
		connection.import_values(&data.values).await?;
		connection.import_information(&data.information).await?;
		self.inner.reset_all_caches();
		connection.commit().await?;
		debug!("imported {} values into \"{}\"", data.values.len(), self.inner.session_id);
		Ok(())
	}

	/// New config over the same schema and storage holding a copy of this one
	pub async fn duplicate(&self, session_id: Option<&str>) -> ClResult<Config> {
		let mut builder = Config::builder(self.inner.schema.clone(), self.inner.storage.clone())
			.options(self.inner.options.clone())
			.delete_old(true);
		if let Some(session_id) = session_id {
			builder = builder.session_id(session_id);
		}
		let config = builder.build().await?;
		config.import(&self.export().await?).await?;
		Ok(config)
	}

	// Meta-configs
	//**************
	/// Link `child` so it inherits values and owners from this meta-config
	pub fn add_config(&self, child: &Config) -> ClResult<()> {
		self.inner.add_child(&child.inner)
	}

	pub fn configs(&self) -> Vec<Config> {
		self.inner.children().into_iter().map(|inner| Config { inner }).collect()
	}

	/// Create a config (or a meta-config) and link it as a child
	///
	/// A session that did not exist yet starts with the context policy of
	/// this meta-config.
	pub async fn new_config(&self, session_id: &str, meta: bool) -> ClResult<Config> {
		if !self.is_meta() {
			return Err(Error::config(format!("\"{}\" is not a meta-config", self.session_id())));
		}
		if self.inner.children().iter().any(|child| &*child.session_id == session_id) {
			return Err(Error::config(format!(
				"a config \"{}\" is already a child of \"{}\"",
				session_id,
				self.session_id()
			)));
		}
		let is_new = !self.inner.storage.list_sessions().await?.iter().any(|s| &**s == session_id);
		let mut options = self.inner.options.clone();
		options.modes = self.inner.settings.modes.read().clone();
		let mut builder = Config::builder(self.inner.schema.clone(), self.inner.storage.clone())
			.session_id(session_id)
			.options(options);
		if meta {
			builder = builder.meta();
		}
		let config = builder.build().await?;
		if is_new {
			let parent_bag = self.inner.config_bag().await?;
			let config_bag = config.inner.config_bag().await?;
			config.inner.set_context_properties(&config_bag, parent_bag.properties.clone()).await?;
			config.inner.set_context_permissives(&config_bag, &parent_bag.permissives).await?;
			config_bag.connection.commit().await?;
		}
		self.add_config(&config)?;
		Ok(config)
	}

	/// Unlink the child with `session_id`; its stored session is kept
	pub fn pop_config(&self, session_id: &str) -> ClResult<Config> {
		Ok(Config { inner: self.inner.remove_child(session_id)? })
	}

	/// Write a value through a meta-config
	///
	/// Failures of individual children are returned instead of aborting
	/// the write. Only storage failures are raised.
	pub async fn set_propagated(
		&self,
		path: &str,
		index: Option<Index>,
		value: Value,
		propagation: Propagation,
	) -> ClResult<Vec<Error>> {
		if !self.is_meta() {
			return Err(Error::config(format!("\"{}\" is not a meta-config", self.session_id())));
		}
		if propagation.only_config {
			if propagation.forces() {
				return Err(Error::config(
					"force_default, force_default_if_same or force_dont_change_value cannot be set with only_config",
				));
			}
			return self.set_in_leaves(path, index, &value).await;
		}
		if propagation.force_default && propagation.force_dont_change_value {
			return Err(Error::config("force_default and force_dont_change_value cannot be set together"));
		}
		let mut errors = Vec::new();
		if propagation.forces() {
			for child in self.configs() {
				let res = child.propagate_into(path, index, &value, propagation).await;
				collect(&mut errors, res)?;
			}
		}
		let res = self.set_at(path, index, value).await;
		collect(&mut errors, res)?;
		Ok(errors)
	}

	async fn propagate_into(
		&self,
		path: &str,
		index: Option<Index>,
		value: &Value,
		propagation: Propagation,
	) -> ClResult<()> {
		let same = propagation.force_default_if_same
			&& self.has_local_value(path, index).await?
			&& self.get_at(path, index).await? == *value;
		if propagation.force_default || same {
			self.reset_at(path, index).await?;
		}
		if propagation.force_dont_change_value {
			let current = self.get_at(path, index).await?;
			if current != *value {
				self.set_at(path, index, current).await?;
			}
		}
		Ok(())
	}

	async fn has_local_value(&self, path: &str, index: Option<Index>) -> ClResult<bool> {
		let bag = self.option_bag(path, index, Access::Read).await?;
		bag.config_bag.connection.has_value(&bag.path, bag.storage_index()).await
	}

	fn set_in_leaves<'a>(
		&'a self,
		path: &'a str,
		index: Option<Index>,
		value: &'a Value,
	) -> BoxFuture<'a, ClResult<Vec<Error>>> {
		async move {
			let mut errors = Vec::new();
			for child in self.configs() {
				if child.is_meta() {
					errors.extend(child.set_in_leaves(path, index, value).await?);
				} else {
					let res = child.set_at(path, index, value.clone()).await;
					collect(&mut errors, res)?;
				}
			}
			Ok(errors)
		}
		.boxed()
	}

	// Whole tree
	//************
	pub async fn mandatory_paths(&self) -> ClResult<Vec<String>> {
		let config_bag = self.inner.config_bag().await?;
		self.inner.mandatory_paths(&config_bag).await
	}

	pub async fn dict(&self) -> ClResult<serde_json::Map<String, Value>> {
		let config_bag = self.inner.config_bag().await?;
		self.inner.dict(&config_bag).await
	}

	/// Paths of the readable options named `name`
	///
	/// With a value, only options holding it are kept; a list matches when
	/// it contains the value.
	pub async fn find(&self, name: &str, value: Option<&Value>) -> ClResult<Vec<String>> {
		let config_bag = self.inner.config_bag().await?;
		let mut res = Vec::new();
		for bag in self.inner.walk(self.inner.schema.root().clone(), String::new(), None, &config_bag).await? {
			if bag.path.rsplit('.').next() != Some(name) {
				continue;
			}
			let current = match self.inner.getattr(&bag).await {
				Ok(current) => current,
				Err(err) if err.is_property_error() => continue,
				Err(err) => return Err(err),
			};
			let found = match (value, &current) {
				(None, _) => true,
				(Some(value), Value::Array(items)) => items.contains(value),
				(Some(value), current) => current == value,
			};
			if found {
				res.push(bag.path.to_string());
			}
		}
		if res.is_empty() {
			return Err(Error::NotFound);
		}
		Ok(res)
	}

	/// Drain the validation warnings collected so far
	pub fn take_warnings(&self) -> Vec<String> {
		self.inner.take_warnings()
	}
}

// vim: ts=4
