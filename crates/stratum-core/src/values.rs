//! Value and owner resolution
//!
//! A value comes from, in order: the local store, a parent meta-config
//! holding an override, the option's callback, and finally its declared
//! default. Validated values are cached per concrete path and index.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::Arc;

use stratum_types::storage_adapter::PropertyStore;

use crate::bag::OptionBag;
use crate::cache::{Cache, CacheHit};
use crate::calculation::Calculation;
use crate::kernel::{ConfigInner, ConfigKind};
use crate::leadership;
use crate::option::{DefaultValue, OptionDef};
use crate::prelude::*;
use crate::validation::validate;

#[derive(Debug)]
pub(crate) struct Values {
	pub cache: Cache<Value>,
}

impl Values {
	pub fn new(capacity: usize) -> Self {
		Self { cache: Cache::new(capacity) }
	}

	/// Resolved and validated value of the option addressed by `bag`
	pub fn get_cached_value<'a>(&'a self, bag: &'a OptionBag) -> BoxFuture<'a, ClResult<Value>> {
		async move {
			let config_bag = &bag.config_bag;
			let hit = self.cache.get(
				&bag.path,
				bag.index,
				&config_bag.properties,
				Some(&bag.properties),
				config_bag.expiration_time,
			);
			let is_cached = hit.is_some();
			let value = match hit {
				Some(CacheHit { value, validated: true }) => value,
				_ => {
					let value = self.getvalue(bag).await?;
					validate(bag, &value, true).await?;
					let validator = config_bag.validator_active();
					if !is_cached || validator {
						self.cache.set(
							&bag.path,
							bag.index,
							bag.template(),
							value.clone(),
							&bag.properties,
							&config_bag.properties,
							validator,
						);
					}
					value
				}
			};
			if config_bag.has(&Property::Warnings) {
				validate(bag, &value, false).await?;
			}
			Ok(value)
		}
		.boxed()
	}

	/// Raw value, before validation
	pub async fn getvalue(&self, bag: &OptionBag) -> ClResult<Value> {
		let stored = bag
			.config_bag
			.connection
			.get_owner(Some(&bag.path), bag.storage_index())
			.await?;
		match stored {
			Some((owner, value)) if owner != Owner::Default => {
				let frozen = bag.is_frozen()
					&& (bag.has(&Property::ForceDefaultOnFreeze) || self.force_to_metaconfig(bag).await?);
				if frozen { self.getdefaultvalue(bag).await } else { Ok(value) }
			}
			_ => self.getdefaultvalue(bag).await,
		}
	}

	/// Whether a frozen option must take its value from the parent meta-config
	async fn force_to_metaconfig(&self, bag: &OptionBag) -> ClResult<bool> {
		if !bag.has(&Property::ForceMetaconfigOnFreeze) {
			return Ok(false);
		}
		let opt = bag.option()?;
		let declared = opt.static_properties().contains(&Property::ForceMetaconfigOnFreeze);
		let stored = bag
			.config_bag
			.connection
			.get_properties(PropertyStore::Properties, Some(&bag.path), None)
			.await?;
		if declared && stored.is_none() {
			Ok(bag.context().kind == ConfigKind::Config)
		} else {
			Ok(true)
		}
	}

	/// Value the option has without a local override
	pub async fn getdefaultvalue(&self, bag: &OptionBag) -> ClResult<Value> {
		if let Some(parent_bag) = self.modified_parent(bag).await? {
			return parent_bag.context().values.get_cached_value(&parent_bag).await;
		}
		let opt = bag.option()?;
		if let Some(callback) = &opt.callback {
			if let Some(value) = self.calculate_value(bag, opt, callback).await? {
				return Ok(value);
			}
		}
		let value = calc_default(bag, &opt.default).await?;
		match (bag.index, value) {
			(Some(index), Value::Array(items)) if opt.is_multi() => {
				match (items.into_iter().nth(index), &opt.default_multi) {
					(Some(value), _) => Ok(value),
					(None, Some(default_multi)) => calc_default(bag, default_multi).await,
					(None, None) if opt.is_submulti() => Ok(Value::Array(Vec::new())),
					(None, None) => Ok(Value::Null),
				}
			}
			(_, value) => Ok(value),
		}
	}

	/// Evaluate the callback, shaping the result for multi and submulti options
	///
	/// `None` means the callback produced nothing usable and the declared
	/// default applies.
	async fn calculate_value(
		&self,
		bag: &OptionBag,
		opt: &OptionDef,
		callback: &Calculation,
	) -> ClResult<Option<Value>> {
		let value = callback.execute(bag, false, None, false).await?;
		let is_list_of_lists = |items: &[Value]| items.first().is_some_and(Value::is_array);
		let shaped = match (value, bag.index) {
			(Value::Null, _) => None,
			(Value::Array(items), Some(_)) if opt.is_submulti() && !is_list_of_lists(&items) => {
				Some(Value::Array(items))
			}
			(Value::Array(items), Some(index)) => items.into_iter().nth(index),
			(Value::Array(items), None) if opt.is_submulti() && !items.is_empty() && !is_list_of_lists(&items) => {
				Some(Value::Array(vec![Value::Array(items)]))
			}
			(Value::Array(items), None) => Some(Value::Array(items)),
			(value, Some(_)) if opt.is_submulti() => Some(Value::Array(vec![value])),
			(value, None) if opt.is_submulti() => Some(Value::Array(vec![Value::Array(vec![value])])),
			(value, None) if opt.is_multi() => Some(Value::Array(vec![value])),
			(value, _) => Some(value),
		};
		if let Some(value) = &shaped {
			self.reset_on_change(bag, value);
		}
		Ok(shaped)
	}

	/// Options with `expire` invalidate their dependents when a fresh computation differs
	fn reset_on_change(&self, bag: &OptionBag, value: &Value) {
		if !bag.has(&Property::Expire) {
			return;
		}
		if let Some(previous) = self.cache.peek(&bag.path, bag.index) {
			if previous != *value {
				debug!("calculated value of \"{}\" changed, resetting cache", bag.path);
				bag.context().reset_option_cache(bag.template());
			}
		}
	}

	/// Nearest ancestor config holding a value for the option
	///
	/// The returned bag is bound to that ancestor, unrestrained, and carries
	/// its own connection.
	async fn modified_parent(&self, bag: &OptionBag) -> ClResult<Option<OptionBag>> {
		let mut stack: Vec<Arc<ConfigInner>> = bag.context().parents();
		if stack.is_empty() {
			return Ok(None);
		}
		stack.reverse();
		let mut visited: HashSet<usize> = HashSet::new();
		while let Some(parent) = stack.pop() {
			if !visited.insert(Arc::as_ptr(&parent) as usize) {
				continue;
			}
			let connection = parent.connection().await?;
			if connection.has_value(&bag.path, bag.storage_index()).await? {
				let mut parent_bag = bag.clone();
				parent_bag.config_bag.context = parent;
				parent_bag.config_bag.connection = connection;
				parent_bag.config_bag.unrestraint();
				parent_bag.properties.remove(&Property::ForceMetaconfigOnFreeze);
				return Ok(Some(parent_bag));
			}
			let mut grand_parents = parent.parents();
			grand_parents.reverse();
			stack.extend(grand_parents);
		}
		Ok(None)
	}

	pub async fn getowner(&self, bag: &OptionBag, validate_meta: bool) -> ClResult<Owner> {
		let frozen = bag.is_frozen();
		if frozen && bag.has(&Property::ForceDefaultOnFreeze) {
			return Ok(Owner::Default);
		}
		let owner = bag
			.config_bag
			.connection
			.get_owner(Some(&bag.path), bag.storage_index())
			.await?
			.map_or(Owner::Default, |(owner, _)| owner);
		let force_meta = frozen && bag.has(&Property::ForceMetaconfigOnFreeze);
		if validate_meta && (owner == Owner::Default || force_meta) {
			if let Some(parent_bag) = self.modified_parent(bag).await? {
				let parent_owner = parent_bag
					.config_bag
					.connection
					.get_owner(Some(&bag.path), bag.storage_index())
					.await?;
				return Ok(parent_owner.map_or(Owner::Default, |(owner, _)| owner));
			}
			if force_meta {
				return Ok(Owner::Default);
			}
		}
		Ok(owner)
	}

	pub async fn is_default_owner(&self, bag: &OptionBag, validate_meta: bool) -> ClResult<bool> {
		Ok(self.getowner(bag, validate_meta).await? == Owner::Default)
	}

	pub async fn setvalue(&self, bag: &OptionBag, value: Value) -> ClResult<()> {
		let config_bag = &bag.config_bag;
		let owner = context_owner(bag).await?;
		self.setvalue_validation(bag, &value).await?;
		self.store(bag, &value, &owner).await?;
		if config_bag.validator_active() {
			self.cache.set(
				&bag.path,
				bag.index,
				bag.template(),
				value.clone(),
				&bag.properties,
				&config_bag.properties,
				true,
			);
		}
		if config_bag.has(&Property::ForceStoreValue) && bag.is_leader() {
			leadership::follower_force_store_value(self, bag, &value, &Owner::Forced).await?;
		}
		Ok(())
	}

	/// Every check a new value must pass before it is stored
	pub async fn setvalue_validation(&self, bag: &OptionBag, value: &Value) -> ClResult<()> {
		let ctx = bag.context();
		ctx.settings.validate_frozen(bag)?;
		if !bag.config_bag.has(&Property::Validator) {
			return Ok(());
		}
		ctx.settings.validate_mandatory(bag, value)?;
		validate(bag, value, true).await?;
		if bag.config_bag.has(&Property::Warnings) {
			validate(bag, value, false).await?;
		}
		Ok(())
	}

	/// Write without validation
	pub async fn store(&self, bag: &OptionBag, value: &Value, owner: &Owner) -> ClResult<()> {
		bag.context().reset_option_cache(bag.template());
		bag.config_bag
			.connection
			.set_value(Some(&bag.path), value, owner, bag.storage_index())
			.await
	}

	/// Drop the local value of an option (every index for a follower)
	pub async fn reset(&self, bag: &OptionBag) -> ClResult<()> {
		let config_bag = &bag.config_bag;
		let conn = &config_bag.connection;
		let has_value = conn.has_value(&bag.path, None).await?;
		if has_value && config_bag.has(&Property::Validator) {
			let default = self.getdefaultvalue(bag).await?;
			self.setvalue_validation(bag, &default).await?;
		}
		if bag.is_leader() {
			leadership::reset(self, bag).await?;
		}
		let force_store =
			config_bag.has(&Property::ForceStoreValue) && bag.has(&Property::ForceStoreValue);
		let mut value = None;
		if has_value {
			if force_store {
				let default = self.getdefaultvalue(bag).await?;
				self.store(bag, &default, &Owner::Forced).await?;
				value = Some(default);
			} else {
				conn.reset_value(&bag.path).await?;
			}
			bag.context().reset_option_cache(bag.template());
		}
		if config_bag.has(&Property::ForceStoreValue) && bag.is_leader() {
			let value = match value {
				Some(value) => value,
				None => self.getdefaultvalue(bag).await?,
			};
			leadership::follower_force_store_value(self, bag, &value, &Owner::Forced).await?;
		}
		Ok(())
	}

	/// Drop the value of a follower at one index
	pub async fn reset_follower(&self, bag: &OptionBag) -> ClResult<()> {
		let config_bag = &bag.config_bag;
		let conn = &config_bag.connection;
		let Some(index) = bag.index else {
			return Err(Error::config(format!("index is mandatory to reset the follower \"{}\"", bag.path)));
		};
		if !conn.has_value(&bag.path, Some(index)).await? {
			return Ok(());
		}
		if config_bag.has(&Property::Validator) {
			let default = self.getdefaultvalue(bag).await?;
			self.setvalue_validation(bag, &default).await?;
		}
		if config_bag.has(&Property::ForceStoreValue) && bag.has(&Property::ForceStoreValue) {
			let default = self.getdefaultvalue(bag).await?;
			self.store(bag, &default, &Owner::Forced).await?;
		} else {
			conn.reset_value_index(&bag.path, index).await?;
		}
		bag.context().reset_option_cache(bag.template());
		Ok(())
	}

	/// Remove one entry of a leader and the matching follower entries
	pub async fn reset_leadership(&self, bag: &OptionBag, index: Index) -> ClResult<()> {
		bag.context().settings.validate_frozen(bag)?;
		let mut current = self.get_cached_value(bag).await?;
		let Some(items) = current.as_array_mut() else {
			return Err(Error::config(format!("value of leader \"{}\" is not a list", bag.path)));
		};
		if index >= items.len() {
			return Err(Error::IndexError(format!(
				"index {} is greater than the length {} for option \"{}\"",
				index,
				items.len(),
				bag.path
			)));
		}
		items.remove(index);
		// Followers are shifted in place, so the shortened leader is checked first
		self.setvalue_validation(bag, &current).await?;
		leadership::pop(bag, index).await?;
		self.setvalue(bag, current).await
	}

	pub async fn setowner(&self, bag: &OptionBag, owner: &Owner) -> ClResult<()> {
		if owner.is_reserved() {
			return Err(Error::config(format!("set owner \"{}\" is forbidden", owner)));
		}
		let conn = &bag.config_bag.connection;
		if !conn.has_value(&bag.path, bag.storage_index()).await? {
			return Err(Error::config(format!(
				"no value for \"{}\" cannot change owner to \"{}\"",
				bag.path, owner
			)));
		}
		bag.context().settings.validate_frozen(bag)?;
		conn.set_owner(&bag.path, owner, bag.storage_index()).await
	}
}

/// Owner recorded for every write of this config
pub(crate) async fn context_owner(bag: &OptionBag) -> ClResult<Owner> {
	Ok(bag
		.config_bag
		.connection
		.get_owner(None, None)
		.await?
		.map_or(Owner::User, |(owner, _)| owner))
}

/// Evaluate a declared default, running embedded calculations
fn calc_default<'a>(bag: &'a OptionBag, default: &'a DefaultValue) -> BoxFuture<'a, ClResult<Value>> {
	async move {
		match default {
			DefaultValue::Static(value) => Ok(value.clone()),
			DefaultValue::Calculated(calc) => calc.execute(bag, false, None, false).await,
			DefaultValue::List(items) => {
				let mut res = Vec::with_capacity(items.len());
				for item in items {
					res.push(calc_default(bag, item).await?);
				}
				Ok(Value::Array(res))
			}
		}
	}
	.boxed()
}

// vim: ts=4
