//! Property resolution
//!
//! Computes the effective property set of a node and checks it against the
//! context-wide policy. `frozen`, `mandatory`, `empty` and
//! `force_store_value` need the value itself, so they have dedicated checks
//! instead of going through [`Settings::validate_properties`].

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use stratum_types::property::{allowed_leader_properties, special_properties};
use stratum_types::storage_adapter::PropertyStore;

use crate::bag::{NodeRef, OptionBag};
use crate::cache::Cache;
use crate::option::{OptionDef, PropertyDecl};
use crate::prelude::*;

/// Global mode selected by `read_only`/`read_write`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
	#[serde(rename = "read_only")]
	ReadOnly,
	#[serde(rename = "read_write")]
	ReadWrite,
}

/// Whether a mode set is added to or removed from the context properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum When {
	#[serde(rename = "append")]
	Append,
	#[serde(rename = "remove")]
	Remove,
}

/// The four sets applied by the mode switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeSets {
	pub ro_append: PropertySet,
	pub ro_remove: PropertySet,
	pub rw_append: PropertySet,
	pub rw_remove: PropertySet,
}

impl Default for ModeSets {
	fn default() -> Self {
		use stratum_types::property::{ro_append, ro_remove, rw_append, rw_remove};
		Self {
			ro_append: ro_append(),
			ro_remove: ro_remove(),
			rw_append: rw_append(),
			rw_remove: rw_remove(),
		}
	}
}

impl ModeSets {
	pub fn get(&self, mode: Mode, when: When) -> &PropertySet {
		match (mode, when) {
			(Mode::ReadOnly, When::Append) => &self.ro_append,
			(Mode::ReadOnly, When::Remove) => &self.ro_remove,
			(Mode::ReadWrite, When::Append) => &self.rw_append,
			(Mode::ReadWrite, When::Remove) => &self.rw_remove,
		}
	}

	pub fn set(&mut self, mode: Mode, when: When, props: PropertySet) {
		match (mode, when) {
			(Mode::ReadOnly, When::Append) => self.ro_append = props,
			(Mode::ReadOnly, When::Remove) => self.ro_remove = props,
			(Mode::ReadWrite, When::Append) => self.rw_append = props,
			(Mode::ReadWrite, When::Remove) => self.rw_remove = props,
		}
	}
}

#[derive(Debug)]
pub(crate) struct Settings {
	pub default_properties: PropertySet,
	pub modes: RwLock<ModeSets>,
	pub cache: Cache<PropertySet>,
}

fn declared(bag: &OptionBag) -> &[PropertyDecl] {
	match &bag.node {
		NodeRef::Option(opt) => &opt.properties,
		NodeRef::Group(group) => &group.properties,
	}
}

impl Settings {
	pub fn new(default_properties: PropertySet, modes: ModeSets, capacity: usize) -> Self {
		Self { default_properties, modes: RwLock::new(modes), cache: Cache::new(capacity) }
	}

	/// Effective properties of the node addressed by `bag`
	///
	/// Calculated properties are only evaluated when `apply_requires` is set.
	pub fn get_properties<'a>(
		&'a self,
		bag: &'a OptionBag,
		apply_requires: bool,
	) -> BoxFuture<'a, ClResult<PropertySet>> {
		async move {
			let config_bag = &bag.config_bag;
			let use_cache = apply_requires && !config_bag.is_unrestraint;
			if use_cache {
				if let Some(hit) = self.cache.get(
					&bag.path,
					bag.index,
					&config_bag.properties,
					None,
					config_bag.expiration_time,
				) {
					return Ok(hit.value);
				}
			}

			let conn = &config_bag.connection;
			let mut props = self.stored_or_declared(bag).await?;
			if apply_requires {
				for decl in declared(bag) {
					let PropertyDecl::Calculated(calc) = decl else {
						continue;
					};
					let prop = match calc.execute(bag, true, None, false).await? {
						Value::Null => continue,
						Value::String(name) => Property::from(name),
						other => {
							return Err(Error::config(format!(
								"invalid property type {} for \"{}\" with \"{}\" function",
								other,
								bag.path,
								calc.name()
							)));
						}
					};
					if bag.is_leader() && !allowed_leader_properties().contains(&prop) {
						return Err(Error::leadership(format!(
							"leader cannot have \"{}\" property",
							prop
						)));
					}
					props.insert(prop);
				}
			}
			if bag.index.is_some() {
				if let Some(stored) =
					conn.get_properties(PropertyStore::Properties, Some(&bag.path), bag.index).await?
				{
					props.extend(&stored);
				}
			}
			let props = props.difference(&self.get_permissives(bag).await?);

			if use_cache {
				self.cache.set(
					&bag.path,
					bag.index,
					bag.template(),
					props.clone(),
					&props,
					&config_bag.properties,
					true,
				);
			}
			Ok(props)
		}
		.boxed()
	}

	/// Literal properties of a node: the stored set when there is one, the declared set otherwise
	pub async fn stored_or_declared(&self, bag: &OptionBag) -> ClResult<PropertySet> {
		let stored = bag
			.config_bag
			.connection
			.get_properties(PropertyStore::Properties, Some(&bag.path), None)
			.await?;
		Ok(stored.unwrap_or_else(|| {
			declared(bag)
				.iter()
				.filter_map(|decl| match decl {
					PropertyDecl::Static(prop) => Some(prop.clone()),
					PropertyDecl::Calculated(_) => None,
				})
				.collect()
		}))
	}

	/// Permissives stored for the node
	pub async fn get_permissives(&self, bag: &OptionBag) -> ClResult<PropertySet> {
		Ok(bag
			.config_bag
			.connection
			.get_properties(PropertyStore::Permissives, Some(&bag.path), None)
			.await?
			.unwrap_or_default())
	}

	/// Replace the stored properties of a node
	pub async fn set_properties(&self, bag: &OptionBag, props: &PropertySet) -> ClResult<()> {
		if let Some(opt) = bag.opt() {
			if opt.is_leader() {
				check_leader_properties(opt, props)?;
			}
		}
		bag.config_bag
			.connection
			.set_properties(PropertyStore::Properties, Some(&bag.path), None, props)
			.await?;
		bag.context().reset_option_cache(bag.template());
		Ok(())
	}

	pub async fn set_permissives(&self, bag: &OptionBag, permissives: &PropertySet) -> ClResult<()> {
		check_permissives(permissives)?;
		bag.config_bag
			.connection
			.set_properties(PropertyStore::Permissives, Some(&bag.path), None, permissives)
			.await?;
		bag.context().reset_option_cache(bag.template());
		Ok(())
	}

	pub async fn reset(&self, bag: &OptionBag) -> ClResult<()> {
		bag.config_bag
			.connection
			.del_properties(PropertyStore::Properties, Some(&bag.path), None)
			.await?;
		bag.context().reset_option_cache(bag.template());
		Ok(())
	}

	pub async fn reset_permissives(&self, bag: &OptionBag) -> ClResult<()> {
		bag.config_bag
			.connection
			.del_properties(PropertyStore::Permissives, Some(&bag.path), None)
			.await?;
		bag.context().reset_option_cache(bag.template());
		Ok(())
	}

	/// Raise if one of the node's properties is forbidden by the context
	pub async fn validate_properties(&self, bag: &OptionBag) -> ClResult<()> {
		let config_bag = &bag.config_bag;
		let ctx = &config_bag.properties;
		if ctx.is_empty() || (ctx.len() == 1 && ctx.contains(&Property::Cache)) {
			return Ok(());
		}
		let mut raises = ctx.difference(&special_properties());
		if ctx.contains(&Property::Permissive) {
			raises = raises.difference(&config_bag.permissives);
		}
		let forbidden = bag.properties.intersection(&raises);
		if forbidden.is_empty() {
			return Ok(());
		}
		let help = self.help(bag, &forbidden).await;
		Err(Error::PropertiesOptionError {
			path: bag.path.clone(),
			index: bag.index,
			properties: forbidden,
			help,
		})
	}

	/// Explanations of the calculated properties among `raised`
	async fn help(&self, bag: &OptionBag, raised: &PropertySet) -> Vec<String> {
		let mut res = Vec::new();
		for decl in declared(bag) {
			let PropertyDecl::Calculated(calc) = decl else {
				continue;
			};
			if calc.help.is_none() {
				continue;
			}
			let Ok(Value::String(name)) = calc.execute(bag, true, None, false).await else {
				continue;
			};
			if !raised.contains(&Property::from(name.as_str())) {
				continue;
			}
			match calc.explain(bag, true).await {
				Ok(Value::String(msg)) => res.push(msg),
				Ok(Value::Null) => {}
				Ok(other) => res.push(other.to_string()),
				Err(err) => debug!("help for \"{}\" failed: {}", bag.path, err),
			}
		}
		res
	}

	/// Raise if the value is missing while `mandatory` or `empty` applies
	pub fn validate_mandatory(&self, bag: &OptionBag, value: &Value) -> ClResult<()> {
		let config_bag = &bag.config_bag;
		if !config_bag.has(&Property::Mandatory) {
			return Ok(());
		}
		let opt = bag.option()?;
		let permissive = config_bag.has(&Property::Permissive)
			&& config_bag.permissives.contains(&Property::Mandatory);
		let mut is_mandatory = false;
		if !permissive
			&& bag.has(&Property::Mandatory)
			&& is_empty(opt, value, opt.is_follower(), bag.index)
		{
			is_mandatory = true;
		}
		if bag.has(&Property::Empty) && is_empty(opt, value, true, bag.index) {
			is_mandatory = true;
		}
		if is_mandatory {
			return Err(Error::PropertiesOptionError {
				path: bag.path.clone(),
				index: bag.index,
				properties: PropertySet::from_iter([Property::Mandatory]),
				help: Vec::new(),
			});
		}
		Ok(())
	}

	/// Raise if the option cannot be modified
	pub fn validate_frozen(&self, bag: &OptionBag) -> ClResult<()> {
		let config_bag = &bag.config_bag;
		if config_bag.has(&Property::Permissive)
			&& config_bag.permissives.contains(&Property::Frozen)
		{
			return Ok(());
		}
		if config_bag.has(&Property::EverythingFrozen)
			|| (config_bag.has(&Property::Frozen) && bag.has(&Property::Frozen))
		{
			return Err(Error::PropertiesOptionError {
				path: bag.path.clone(),
				index: bag.index,
				properties: PropertySet::from_iter([Property::Frozen]),
				help: Vec::new(),
			});
		}
		Ok(())
	}
}

/// True if the value counts as "no value" for `mandatory`/`empty`
pub(crate) fn is_empty(
	opt: &OptionDef,
	value: &Value,
	force_allow_empty_list: bool,
	index: Option<Index>,
) -> bool {
	let blank = |v: &Value| v.is_null() || v.as_str() == Some("");
	if opt.is_multi() && index.is_none() {
		match value {
			Value::Null => true,
			Value::Array(items) => {
				(!force_allow_empty_list && items.is_empty()) || items.iter().any(blank)
			}
			_ => false,
		}
	} else {
		blank(value) || (opt.is_submulti() && value.as_array().is_some_and(Vec::is_empty))
	}
}

pub(crate) fn check_leader_properties(opt: &OptionDef, props: &PropertySet) -> ClResult<()> {
	let allowed = allowed_leader_properties();
	if let Some(prop) = props.iter().find(|p| !allowed.contains(p)) {
		return Err(Error::leadership(format!(
			"a leader (\"{}\") cannot have \"{}\" property",
			opt.path, prop
		)));
	}
	let on_freeze = props.contains(&Property::ForceDefaultOnFreeze)
		|| props.contains(&Property::ForceMetaconfigOnFreeze);
	if on_freeze && !props.contains(&Property::Frozen) {
		return Err(Error::leadership(format!(
			"a leader (\"{}\") cannot have \"force_default_on_freeze\" or \"force_metaconfig_on_freeze\" property without \"frozen\"",
			opt.path
		)));
	}
	Ok(())
}

pub(crate) fn check_permissives(permissives: &PropertySet) -> ClResult<()> {
	let forbidden = permissives.intersection(&stratum_types::property::forbidden_set_permissives());
	if !forbidden.is_empty() {
		return Err(Error::config(format!("cannot add those permissives: {}", forbidden)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::option::OptionType;
	use serde_json::json;
	use stratum_types::props;

	#[test]
	fn test_is_empty_multi() {
		let opt = OptionDef::builder("a", OptionType::Str).multi().build().expect("option");
		assert!(is_empty(&opt, &json!([]), false, None));
		assert!(!is_empty(&opt, &json!([]), true, None));
		assert!(is_empty(&opt, &json!(["a", ""]), true, None));
		assert!(!is_empty(&opt, &json!(["a"]), false, None));
		assert!(is_empty(&opt, &json!(null), false, Some(0)));
	}

	#[test]
	fn test_leader_property_checks() {
		let opt = OptionDef::builder("a", OptionType::Str).multi().build().expect("option");
		assert!(check_leader_properties(&opt, &props!["mandatory", "frozen"]).is_ok());
		assert!(check_leader_properties(&opt, &props!["hidden"]).is_err());
		assert!(check_leader_properties(&opt, &props!["force_default_on_freeze"]).is_err());
	}

	#[test]
	fn test_forbidden_permissives() {
		assert!(check_permissives(&props!["hidden"]).is_ok());
		assert!(check_permissives(&props!["force_store_value"]).is_err());
	}
}

// vim: ts=4
