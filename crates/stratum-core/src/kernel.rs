//! Config kernel
//!
//! [`ConfigInner`] is the state shared by every handle of one config: the
//! schema, its storage session, the per-config caches and the links to parent
//! and child meta-configs. It resolves paths to option bags and runs the
//! read/write paths on top of settings and values.

use futures::future::{BoxFuture, FutureExt};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

use stratum_types::property::{forbidden_set_permissives, special_properties};
use stratum_types::storage_adapter::{PropertyStore, StorageAdapter, StorageConnection};
use stratum_types::utils::normalize_suffix;

use crate::bag::{ConfigBag, DynPath, NodeRef, OptionBag};
use crate::group::{GroupDef, GroupKind};
use crate::leadership;
use crate::options::EngineOptions;
use crate::prelude::*;
use crate::schema::{Schema, SchemaNode};
use crate::settings::{Settings, check_permissives};
use crate::values::Values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
	Config,
	MetaConfig,
}

/// How a path is going to be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
	Read,
	Write,
}

pub(crate) struct ConfigInner {
	pub kind: ConfigKind,
	pub session_id: Box<str>,
	pub schema: Arc<Schema>,
	pub storage: Arc<dyn StorageAdapter>,
	pub options: EngineOptions,
	pub settings: Settings,
	pub values: Values,
	parents: RwLock<Vec<Weak<ConfigInner>>>,
	children: RwLock<Vec<Arc<ConfigInner>>>,
	warnings: Mutex<Vec<String>>,
}

impl fmt::Debug for ConfigInner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConfigInner")
			.field("kind", &self.kind)
			.field("session_id", &self.session_id)
			.field("storage", &self.storage)
			.finish()
	}
}

fn join(parent: &str, name: &str) -> String {
	if parent.is_empty() { name.to_string() } else { format!("{}.{}", parent, name) }
}

impl ConfigInner {
	pub fn new(
		kind: ConfigKind,
		session_id: Box<str>,
		schema: Arc<Schema>,
		storage: Arc<dyn StorageAdapter>,
		options: EngineOptions,
	) -> Arc<Self> {
		let settings = Settings::new(
			options.default_properties.clone(),
			options.modes.clone(),
			options.cache_capacity,
		);
		let values = Values::new(options.cache_capacity);
		Arc::new(Self {
			kind,
			session_id,
			schema,
			storage,
			options,
			settings,
			values,
			parents: RwLock::new(Vec::new()),
			children: RwLock::new(Vec::new()),
			warnings: Mutex::new(Vec::new()),
		})
	}

	pub async fn connection(&self) -> ClResult<Arc<dyn StorageConnection>> {
		Ok(Arc::from(self.storage.connection(&self.session_id).await?))
	}

	/// Snapshot of the context policy for one logical operation
	pub async fn config_bag(self: &Arc<Self>) -> ClResult<ConfigBag> {
		let connection = self.connection().await?;
		let properties = connection
			.get_properties(PropertyStore::Properties, None, None)
			.await?
			.unwrap_or_else(|| self.settings.default_properties.clone());
		let permissives = connection
			.get_properties(PropertyStore::Permissives, None, None)
			.await?
			.unwrap_or_default();
		Ok(ConfigBag {
			context: self.clone(),
			true_properties: properties.clone(),
			properties,
			permissives,
			connection,
			expiration_time: self.options.expiration(),
			is_unrestraint: false,
		})
	}

	// Meta-config links
	//*******************
	pub fn parents(&self) -> Vec<Arc<ConfigInner>> {
		self.parents.read().iter().filter_map(Weak::upgrade).collect()
	}

	pub fn children(&self) -> Vec<Arc<ConfigInner>> {
		self.children.read().clone()
	}

	pub fn add_child(self: &Arc<Self>, child: &Arc<ConfigInner>) -> ClResult<()> {
		if self.kind != ConfigKind::MetaConfig {
			return Err(Error::config(format!("\"{}\" is not a meta-config", self.session_id)));
		}
		if !Arc::ptr_eq(&self.schema, &child.schema) {
			return Err(Error::config(format!(
				"config \"{}\" does not share the schema of \"{}\"",
				child.session_id, self.session_id
			)));
		}
		if Arc::ptr_eq(self, child) || self.has_ancestor(child) {
			return Err(Error::config(format!(
				"config \"{}\" cannot be a child of \"{}\"",
				child.session_id, self.session_id
			)));
		}
		child.parents.write().push(Arc::downgrade(self));
		self.children.write().push(child.clone());
		child.reset_all_caches();
		info!("config \"{}\" added to meta-config \"{}\"", child.session_id, self.session_id);
		Ok(())
	}

	/// Unlink the child with `session_id`, returning it
	pub fn remove_child(self: &Arc<Self>, session_id: &str) -> ClResult<Arc<ConfigInner>> {
		let child = {
			let mut children = self.children.write();
			let pos = children
				.iter()
				.position(|child| &*child.session_id == session_id)
				.ok_or_else(|| Error::config(format!("cannot find the config \"{}\"", session_id)))?;
			children.remove(pos)
		};
		child.parents.write().retain(|parent| !parent.upgrade().is_some_and(|p| Arc::ptr_eq(&p, self)));
		child.reset_all_caches();
		info!("config \"{}\" removed from meta-config \"{}\"", child.session_id, self.session_id);
		Ok(child)
	}

	fn has_ancestor(&self, other: &Arc<ConfigInner>) -> bool {
		let mut queue: VecDeque<Arc<ConfigInner>> = self.parents().into();
		let mut visited = HashSet::new();
		while let Some(parent) = queue.pop_front() {
			if Arc::ptr_eq(&parent, other) {
				return true;
			}
			if visited.insert(Arc::as_ptr(&parent)) {
				queue.extend(parent.parents());
			}
		}
		false
	}

	// Warnings
	//**********
	pub fn push_warning(&self, message: String) {
		warn!("{}", message);
		self.warnings.lock().push(message);
	}

	pub fn take_warnings(&self) -> Vec<String> {
		std::mem::take(&mut *self.warnings.lock())
	}

	// Caches
	//********
	/// Invalidate a template path and everything computed from it
	pub fn reset_option_cache(&self, template: &str) {
		let mut queue: VecDeque<Box<str>> = VecDeque::from([Box::from(template)]);
		let mut seen = HashSet::new();
		while let Some(path) = queue.pop_front() {
			if !seen.insert(path.clone()) {
				continue;
			}
			self.values.cache.reset_template(&path);
			self.settings.cache.reset_template(&path);
			queue.extend(self.schema.dependents(&path).iter().cloned());
		}
		for child in self.children() {
			child.reset_option_cache(template);
		}
	}

	pub fn reset_all_caches(&self) {
		debug!("resetting caches of \"{}\"", self.session_id);
		self.values.cache.reset_all();
		self.settings.cache.reset_all();
		for child in self.children() {
			child.reset_all_caches();
		}
	}

	// Path resolution
	//*****************
	/// Suffixes of a dynamic group
	pub async fn suffixes(&self, group: &Arc<GroupDef>, config_bag: &ConfigBag) -> ClResult<Vec<String>> {
		let GroupKind::Dynamic(calc) = &group.kind else {
			return Ok(Vec::new());
		};
		let bag = OptionBag::new(NodeRef::Group(group.clone()), group.path.clone(), None, None, config_bag.clone());
		let items = match calc.execute(&bag, false, None, false).await? {
			Value::Null => return Ok(Vec::new()),
			Value::Array(items) => items,
			other => {
				return Err(Error::config(format!(
					"suffixes of the dynamic group \"{}\" must be a list, not {}",
					group.path, other
				)));
			}
		};
		let mut res: Vec<String> = Vec::with_capacity(items.len());
		for item in items {
			let suffix = match item {
				Value::Null => continue,
				Value::String(s) => normalize_suffix(&s),
				Value::Number(n) => normalize_suffix(&n.to_string()),
				other => {
					return Err(Error::config(format!(
						"invalid suffix {} for the dynamic group \"{}\"",
						other, group.path
					)));
				}
			};
			res.push(suffix);
		}
		if let Some(dup) = res.iter().duplicates().next() {
			return Err(Error::config(format!(
				"dynamic group \"{}\" has the duplicate suffix \"{}\"",
				group.path, dup
			)));
		}
		Ok(res)
	}

	/// Child of `group` matching one path segment, with its suffix for dynamic groups
	async fn find_child(
		&self,
		group: &GroupDef,
		segment: &str,
		config_bag: &ConfigBag,
	) -> ClResult<Option<(SchemaNode, Option<String>)>> {
		let children: Vec<&SchemaNode> =
			group.child_paths.iter().filter_map(|path| self.schema.node(path)).collect();
		for child in &children {
			let is_dynamic = matches!(child, SchemaNode::Group(g) if g.is_dynamic());
			if !is_dynamic && child.name() == segment {
				return Ok(Some(((*child).clone(), None)));
			}
		}
		for child in children {
			let SchemaNode::Group(sub) = child else {
				continue;
			};
			if !sub.is_dynamic() {
				continue;
			}
			let Some(suffix) = segment.strip_prefix(sub.name()).filter(|s| !s.is_empty()) else {
				continue;
			};
			if self.suffixes(sub, config_bag).await?.iter().any(|s| s == suffix) {
				return Ok(Some((child.clone(), Some(suffix.to_string()))));
			}
		}
		Ok(None)
	}

	/// Build the option bag addressing `path`
	///
	/// Groups along the way are checked against the context policy.
	/// Symlinks are followed for reads and rejected for writes.
	pub fn resolve<'a>(
		&'a self,
		config_bag: &'a ConfigBag,
		path: &'a str,
		index: Option<Index>,
		access: Access,
	) -> BoxFuture<'a, ClResult<OptionBag>> {
		async move {
			let unknown = || Error::config(format!("unknown option \"{}\"", path));
			if path.is_empty() {
				return Err(unknown());
			}
			let segments: Vec<&str> = path.split('.').collect();
			let mut group = self.schema.root().clone();
			let mut concrete = String::new();
			let mut dyn_path: Option<DynPath> = None;
			for (pos, segment) in segments.iter().enumerate() {
				let last = pos + 1 == segments.len();
				let (node, suffix) =
					self.find_child(&group, segment, config_bag).await?.ok_or_else(unknown)?;
				concrete = join(&concrete, segment);
				if let (SchemaNode::Group(sub), Some(suffix)) = (&node, suffix) {
					dyn_path = Some(DynPath {
						template: sub.path.clone(),
						concrete: concrete.as_str().into(),
						suffix: suffix.into(),
					});
				}
				match node {
					SchemaNode::Option(opt) if last => {
						let mut bag = OptionBag::new(
							NodeRef::Option(opt),
							concrete,
							index,
							dyn_path,
							config_bag.clone(),
						);
						bag.properties = self.settings.get_properties(&bag, true).await?;
						return Ok(bag);
					}
					SchemaNode::SymLink(link) if last => {
						if access == Access::Write {
							return Err(Error::config(format!(
								"cannot modify the symlink \"{}\", modify \"{}\" instead",
								path, link.target
							)));
						}
						let target = match &dyn_path {
							Some(dyn_path) => dyn_path.translate(&link.target).unwrap_or_else(|| link.target.clone()),
							None => link.target.clone(),
						};
						return self.resolve(config_bag, &target, index, access).await;
					}
					SchemaNode::Group(sub) => {
						let mut bag = OptionBag::new(
							NodeRef::Group(sub.clone()),
							concrete.as_str(),
							None,
							dyn_path.clone(),
							config_bag.clone(),
						);
						bag.properties = self.settings.get_properties(&bag, true).await?;
						if last {
							return Ok(bag);
						}
						self.settings.validate_properties(&bag).await?;
						group = sub;
					}
					_ => return Err(unknown()),
				}
			}
			Err(unknown())
		}
		.boxed()
	}

	// Read and write paths
	//**********************
	/// Value of the option addressed by `bag`
	///
	/// A follower read without index yields one entry per leader index.
	pub fn getattr<'a>(&'a self, bag: &'a OptionBag) -> BoxFuture<'a, ClResult<Value>> {
		async move {
			let opt = bag.option()?;
			if opt.is_follower() {
				let length = leadership::get_length(bag).await?;
				let stored = bag.config_bag.connection.get_max_length(&bag.path).await?;
				if stored > length {
					return Err(Error::leadership(format!(
						"the follower option \"{}\" has greater length ({}) than the leader length ({})",
						bag.path, stored, length
					)));
				}
				match bag.index {
					None => {
						self.settings.validate_properties(bag).await?;
						let mut values = Vec::with_capacity(length);
						for idx in 0..length {
							let mut index_bag = bag.at_index(Some(idx));
							index_bag.properties = self.settings.get_properties(&index_bag, true).await?;
							let res = match self.settings.validate_properties(&index_bag).await {
								Ok(()) => self.values.get_cached_value(&index_bag).await,
								Err(err) => Err(err),
							};
							match res {
								Ok(value) => values.push(value),
								Err(err @ Error::PropertiesOptionError { .. }) => {
									values.push(serde_json::json!({ "propertyerror": err.to_string() }));
								}
								Err(err) => return Err(err),
							}
						}
						return Ok(Value::Array(values));
					}
					Some(idx) if idx >= length => {
						return Err(Error::IndexError(format!(
							"index \"{}\" is greater than the leadership length \"{}\" for option \"{}\"",
							idx, length, bag.path
						)));
					}
					Some(_) => {}
				}
			}
			self.settings.validate_properties(bag).await?;
			self.values.get_cached_value(bag).await
		}
		.boxed()
	}

	pub async fn setattr(&self, bag: &OptionBag, value: Value) -> ClResult<()> {
		let opt = bag.option()?;
		if opt.is_follower() {
			let Some(idx) = bag.index else {
				return Err(Error::config(format!(
					"index is mandatory for the follower option \"{}\"",
					bag.path
				)));
			};
			let length = leadership::get_length(bag).await?;
			if idx >= length {
				return Err(Error::IndexError(format!(
					"index \"{}\" is greater than the leadership length \"{}\" for option \"{}\"",
					idx, length, bag.path
				)));
			}
		}
		self.settings.validate_properties(bag).await?;
		if opt.is_leader() {
			let length = leadership::get_length(bag).await?;
			let new_length = value.as_array().map_or(0, Vec::len);
			if new_length < length {
				return Err(Error::leadership(format!(
					"cannot reduce length of the leader \"{}\"",
					bag.path
				)));
			}
		}
		self.values.setvalue(bag, value).await
	}

	// Context properties
	//********************
	/// Store new context properties, materializing forced values when needed
	pub async fn set_context_properties(&self, config_bag: &ConfigBag, props: PropertySet) -> ClResult<()> {
		let newly_forced = props.contains(&Property::ForceStoreValue)
			&& !config_bag.properties.contains(&Property::ForceStoreValue);
		config_bag
			.connection
			.set_properties(PropertyStore::Properties, None, None, &props)
			.await?;
		self.reset_all_caches();
		if newly_forced {
			let mut forced_bag = config_bag.clone();
			forced_bag.true_properties = props.clone();
			forced_bag.properties = props;
			self.materialize_force_store(&forced_bag).await?;
		}
		Ok(())
	}

	pub async fn set_context_permissives(&self, config_bag: &ConfigBag, permissives: &PropertySet) -> ClResult<()> {
		check_permissives(permissives)?;
		config_bag
			.connection
			.set_properties(PropertyStore::Permissives, None, None, permissives)
			.await?;
		self.reset_all_caches();
		Ok(())
	}

	pub async fn read_only(&self, config_bag: &ConfigBag) -> ClResult<()> {
		let modes = self.settings.modes.read().clone();
		let props = config_bag.properties.difference(&modes.ro_remove).union(&modes.ro_append);
		self.set_context_properties(config_bag, props).await
	}

	pub async fn read_write(&self, config_bag: &ConfigBag) -> ClResult<()> {
		let modes = self.settings.modes.read().clone();
		let props = config_bag.properties.difference(&modes.rw_remove).union(&modes.rw_append);
		self.set_context_properties(config_bag, props).await?;
		let extra = modes
			.rw_append
			.difference(&modes.ro_append)
			.difference(&special_properties())
			.difference(&forbidden_set_permissives());
		let permissives = config_bag.permissives.union(&extra);
		self.set_context_permissives(config_bag, &permissives).await
	}

	/// Store the computed value of every `force_store_value` option lacking one
	pub async fn materialize_force_store(&self, config_bag: &ConfigBag) -> ClResult<()> {
		info!("storing forced values for \"{}\"", self.session_id);
		let conn = &config_bag.connection;
		for path in self.schema.force_store() {
			let opt = self.schema.option(path)?;
			if opt.dyn_group.is_some() {
				continue;
			}
			let mut bag = OptionBag::new(NodeRef::Option(opt.clone()), path.clone(), None, None, config_bag.clone());
			bag.properties = self.settings.get_properties(&bag, true).await?;
			if !bag.has(&Property::ForceStoreValue) {
				continue;
			}
			if opt.is_follower() {
				let length = leadership::get_length(&bag).await?;
				for idx in 0..length {
					if conn.has_value(path, Some(idx)).await? {
						continue;
					}
					let mut index_bag = bag.at_index(Some(idx));
					index_bag.properties = bag.properties.clone();
					let value = self.values.getvalue(&index_bag).await?;
					self.values.store(&index_bag, &value, &Owner::Forced).await?;
				}
			} else if !conn.has_value(path, None).await? {
				let value = self.values.getvalue(&bag).await?;
				self.values.store(&bag, &value, &Owner::Forced).await?;
			}
		}
		Ok(())
	}

	// Tree walks
	//************
	/// Every reachable option, skipping groups that raise a property
	pub fn walk<'a>(
		&'a self,
		group: Arc<GroupDef>,
		concrete: String,
		dyn_path: Option<DynPath>,
		config_bag: &'a ConfigBag,
	) -> BoxFuture<'a, ClResult<Vec<OptionBag>>> {
		async move {
			let mut res = Vec::new();
			for child_path in &group.child_paths {
				match self.schema.node(child_path) {
					Some(SchemaNode::Option(opt)) => {
						let mut bag = OptionBag::new(
							NodeRef::Option(opt.clone()),
							join(&concrete, opt.name()),
							None,
							dyn_path.clone(),
							config_bag.clone(),
						);
						bag.properties = self.settings.get_properties(&bag, true).await?;
						res.push(bag);
					}
					Some(SchemaNode::Group(sub)) => {
						let targets: Vec<(String, Option<DynPath>)> = if sub.is_dynamic() {
							let mut targets = Vec::new();
							for suffix in self.suffixes(sub, config_bag).await? {
								let path = format!("{}{}", join(&concrete, sub.name()), suffix);
								let dyn_path = DynPath {
									template: sub.path.clone(),
									concrete: path.as_str().into(),
									suffix: suffix.into(),
								};
								targets.push((path, Some(dyn_path)));
							}
							targets
						} else {
							vec![(join(&concrete, sub.name()), dyn_path.clone())]
						};
						for (path, sub_dyn) in targets {
							let mut bag = OptionBag::new(
								NodeRef::Group(sub.clone()),
								path.as_str(),
								None,
								sub_dyn.clone(),
								config_bag.clone(),
							);
							bag.properties = self.settings.get_properties(&bag, true).await?;
							match self.settings.validate_properties(&bag).await {
								Ok(()) => {}
								Err(err) if err.is_property_error() => continue,
								Err(err) => return Err(err),
							}
							res.extend(self.walk(sub.clone(), path, sub_dyn, config_bag).await?);
						}
					}
					_ => {}
				}
			}
			Ok(res)
		}
		.boxed()
	}

	/// Flattened `path -> value` map of every readable option
	pub async fn dict(&self, config_bag: &ConfigBag) -> ClResult<serde_json::Map<String, Value>> {
		let mut res = serde_json::Map::new();
		for bag in self.walk(self.schema.root().clone(), String::new(), None, config_bag).await? {
			match self.getattr(&bag).await {
				Ok(value) => {
					res.insert(bag.path.to_string(), value);
				}
				Err(err) if err.is_property_error() => {}
				Err(err) => return Err(err),
			}
		}
		Ok(res)
	}

	/// Paths of mandatory options that have no value
	pub async fn mandatory_paths(&self, config_bag: &ConfigBag) -> ClResult<Vec<String>> {
		let mut config_bag = config_bag.clone();
		config_bag.properties.insert(Property::Mandatory);
		config_bag.remove_warnings();
		config_bag.true_properties = config_bag.properties.clone();

		let mut res = Vec::new();
		for bag in self.walk(self.schema.root().clone(), String::new(), None, &config_bag).await? {
			match self.settings.validate_properties(&bag).await {
				Ok(()) => {}
				Err(err) if err.is_property_error() => continue,
				Err(err) => return Err(err),
			}
			let indexes: Vec<Option<Index>> = if bag.is_follower() {
				(0..leadership::get_length(&bag).await?).map(Some).collect()
			} else {
				vec![None]
			};
			for index in indexes {
				let mut index_bag = bag.at_index(index);
				index_bag.properties = self.settings.get_properties(&index_bag, true).await?;
				let value = match self.values.get_cached_value(&index_bag).await {
					Ok(value) => value,
					Err(err) if err.is_property_error() => continue,
					Err(err) => return Err(err),
				};
				if self.settings.validate_mandatory(&index_bag, &value).is_err() {
					res.push(bag.path.to_string());
					break;
				}
			}
		}
		Ok(res)
	}
}

// vim: ts=4
