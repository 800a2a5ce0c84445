//! Resolution contexts
//!
//! A [`ConfigBag`] is the snapshot of a config's context-wide policy for one
//! logical operation. An [`OptionBag`] pairs it with one schema node and an
//! optional index. Both are cheap to clone and never shared between
//! concurrent operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use stratum_types::storage_adapter::StorageConnection;

use crate::group::GroupDef;
use crate::kernel::ConfigInner;
use crate::option::OptionDef;
use crate::prelude::*;

#[derive(Clone)]
pub(crate) struct ConfigBag {
	pub context: Arc<ConfigInner>,
	pub properties: PropertySet,
	/// Properties as they were before `unrestraint`
	pub true_properties: PropertySet,
	pub permissives: PropertySet,
	pub connection: Arc<dyn StorageConnection>,
	pub expiration_time: Duration,
	pub is_unrestraint: bool,
}

impl ConfigBag {
	pub fn has(&self, prop: &Property) -> bool {
		self.properties.contains(prop)
	}

	pub fn remove_warnings(&mut self) {
		self.properties.remove(&Property::Warnings);
	}

	pub fn remove_validation(&mut self) {
		self.properties.remove(&Property::Validator);
	}

	/// Drop every raising property, keeping only the cache
	pub fn unrestraint(&mut self) {
		if !self.is_unrestraint {
			self.true_properties = self.properties.clone();
		}
		self.is_unrestraint = true;
		self.properties = PropertySet::from_iter([Property::Cache]);
	}

	pub fn set_permissive(&mut self) {
		self.properties.insert(Property::Permissive);
	}

	/// Validators run and their errors are not demoted
	pub fn validator_active(&self) -> bool {
		self.has(&Property::Validator) && !self.has(&Property::DemotingErrorWarning)
	}
}

impl fmt::Debug for ConfigBag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConfigBag")
			.field("session", &self.context.session_id)
			.field("properties", &self.properties)
			.field("permissives", &self.permissives)
			.field("is_unrestraint", &self.is_unrestraint)
			.finish()
	}
}

/// Schema node addressed by an option bag
#[derive(Debug, Clone)]
pub(crate) enum NodeRef {
	Option(Arc<OptionDef>),
	Group(Arc<GroupDef>),
}

/// Concrete location of a node inside a dynamic group
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DynPath {
	/// Template path of the dynamic group
	pub template: Box<str>,
	/// Path of the group including its suffix
	pub concrete: Box<str>,
	pub suffix: Box<str>,
}

impl DynPath {
	/// Translate a template path below the dynamic group to its concrete path
	pub fn translate(&self, template: &str) -> Option<Box<str>> {
		let rest = template.strip_prefix(&*self.template)?;
		if rest.is_empty() || rest.starts_with('.') {
			Some(format!("{}{}", self.concrete, rest).into())
		} else {
			None
		}
	}
}

#[derive(Debug, Clone)]
pub(crate) struct OptionBag {
	pub node: NodeRef,
	/// Concrete path
	pub path: Box<str>,
	pub index: Option<Index>,
	pub dyn_path: Option<DynPath>,
	pub config_bag: ConfigBag,
	pub properties: PropertySet,
}

impl OptionBag {
	pub fn new(
		node: NodeRef,
		path: impl Into<Box<str>>,
		index: Option<Index>,
		dyn_path: Option<DynPath>,
		config_bag: ConfigBag,
	) -> Self {
		Self { node, path: path.into(), index, dyn_path, config_bag, properties: PropertySet::new() }
	}

	pub fn context(&self) -> &Arc<ConfigInner> {
		&self.config_bag.context
	}

	pub fn option(&self) -> ClResult<&Arc<OptionDef>> {
		match &self.node {
			NodeRef::Option(opt) => Ok(opt),
			NodeRef::Group(group) => {
				Err(Error::config(format!("\"{}\" is a group, not an option", group.path)))
			}
		}
	}

	pub fn opt(&self) -> Option<&Arc<OptionDef>> {
		match &self.node {
			NodeRef::Option(opt) => Some(opt),
			NodeRef::Group(_) => None,
		}
	}

	pub fn template(&self) -> &str {
		match &self.node {
			NodeRef::Option(opt) => &opt.path,
			NodeRef::Group(group) => &group.path,
		}
	}

	pub fn is_leader(&self) -> bool {
		self.opt().is_some_and(|opt| opt.is_leader())
	}

	pub fn is_follower(&self) -> bool {
		self.opt().is_some_and(|opt| opt.is_follower())
	}

	/// Index used to address storage: only followers are stored per index
	pub fn storage_index(&self) -> Option<Index> {
		if self.is_follower() { self.index } else { None }
	}

	pub fn has(&self, prop: &Property) -> bool {
		self.properties.contains(prop)
	}

	/// Option is frozen and the context enforces it
	pub fn is_frozen(&self) -> bool {
		self.has(&Property::Frozen)
			&& (self.config_bag.has(&Property::Frozen) || self.config_bag.has(&Property::EverythingFrozen))
	}

	/// Same node at another index, properties not yet computed
	pub fn at_index(&self, index: Option<Index>) -> OptionBag {
		OptionBag {
			node: self.node.clone(),
			path: self.path.clone(),
			index,
			dyn_path: self.dyn_path.clone(),
			config_bag: self.config_bag.clone(),
			properties: PropertySet::new(),
		}
	}

	/// Concrete path of another option, located relative to this bag's dynamic group
	pub fn locate(&self, opt: &OptionDef) -> ClResult<(Box<str>, Option<DynPath>)> {
		match (&opt.dyn_group, &self.dyn_path) {
			(None, _) => Ok((opt.path.clone(), None)),
			(Some(group), Some(dyn_path)) if group.as_ref() == dyn_path.template.as_ref() => {
				let path = dyn_path.translate(&opt.path).ok_or_else(|| {
					Error::config(format!("cannot locate \"{}\" in \"{}\"", opt.path, dyn_path.concrete))
				})?;
				Ok((path, Some(dyn_path.clone())))
			}
			(Some(_), _) => Err(Error::config(format!(
				"option \"{}\" is in a dynamic group and cannot be referenced from \"{}\"",
				opt.path, self.path
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_dyn_path_translate() {
		let dyn_path =
			DynPath { template: "net.if".into(), concrete: "net.ifeth0".into(), suffix: "eth0".into() };
		assert_eq!(dyn_path.translate("net.if.addr").as_deref(), Some("net.ifeth0.addr"));
		assert_eq!(dyn_path.translate("net.iface"), None);
	}
}

// vim: ts=4
