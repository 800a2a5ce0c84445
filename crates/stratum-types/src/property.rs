//! Property tokens and copy-on-write property sets
//!
//! The built-in tokens have engine-defined meaning. Any other token is a
//! free-form user property carried as [`Property::Custom`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Property {
	Hidden,
	Disabled,
	Frozen,
	Mandatory,
	Empty,
	Unique,
	Permissive,
	ForceStoreValue,
	ForceDefaultOnFreeze,
	ForceMetaconfigOnFreeze,
	EverythingFrozen,
	Validator,
	Warnings,
	Cache,
	Expire,
	DemotingErrorWarning,
	Custom(Box<str>),
}

impl Property {
	pub fn as_str(&self) -> &str {
		match self {
			Property::Hidden => "hidden",
			Property::Disabled => "disabled",
			Property::Frozen => "frozen",
			Property::Mandatory => "mandatory",
			Property::Empty => "empty",
			Property::Unique => "unique",
			Property::Permissive => "permissive",
			Property::ForceStoreValue => "force_store_value",
			Property::ForceDefaultOnFreeze => "force_default_on_freeze",
			Property::ForceMetaconfigOnFreeze => "force_metaconfig_on_freeze",
			Property::EverythingFrozen => "everything_frozen",
			Property::Validator => "validator",
			Property::Warnings => "warnings",
			Property::Cache => "cache",
			Property::Expire => "expire",
			Property::DemotingErrorWarning => "demoting_error_warning",
			Property::Custom(name) => name,
		}
	}
}

impl From<&str> for Property {
	fn from(name: &str) -> Self {
		match name {
			"hidden" => Property::Hidden,
			"disabled" => Property::Disabled,
			"frozen" => Property::Frozen,
			"mandatory" => Property::Mandatory,
			"empty" => Property::Empty,
			"unique" => Property::Unique,
			"permissive" => Property::Permissive,
			"force_store_value" => Property::ForceStoreValue,
			"force_default_on_freeze" => Property::ForceDefaultOnFreeze,
			"force_metaconfig_on_freeze" => Property::ForceMetaconfigOnFreeze,
			"everything_frozen" => Property::EverythingFrozen,
			"validator" => Property::Validator,
			"warnings" => Property::Warnings,
			"cache" => Property::Cache,
			"expire" => Property::Expire,
			"demoting_error_warning" => Property::DemotingErrorWarning,
			other => Property::Custom(other.into()),
		}
	}
}

impl From<String> for Property {
	fn from(name: String) -> Self {
		Property::from(name.as_str())
	}
}

impl From<Property> for String {
	fn from(prop: Property) -> Self {
		prop.as_str().to_string()
	}
}

impl fmt::Display for Property {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Immutable, cheaply clonable set of properties
///
/// Mutating methods clone the underlying set only when it is shared, so a
/// snapshot handed to a nested resolution never observes later changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySet(Arc<BTreeSet<Property>>);

impl PropertySet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn contains(&self, prop: &Property) -> bool {
		self.0.contains(prop)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Property> {
		self.0.iter()
	}

	pub fn insert(&mut self, prop: Property) -> bool {
		if self.0.contains(&prop) {
			return false;
		}
		Arc::make_mut(&mut self.0).insert(prop)
	}

	pub fn remove(&mut self, prop: &Property) -> bool {
		if !self.0.contains(prop) {
			return false;
		}
		Arc::make_mut(&mut self.0).remove(prop)
	}

	pub fn extend(&mut self, other: &PropertySet) {
		if other.0.iter().all(|p| self.0.contains(p)) {
			return;
		}
		Arc::make_mut(&mut self.0).extend(other.0.iter().cloned());
	}

	pub fn union(&self, other: &PropertySet) -> PropertySet {
		let mut res = self.clone();
		res.extend(other);
		res
	}

	pub fn difference(&self, other: &PropertySet) -> PropertySet {
		if !self.0.iter().any(|p| other.0.contains(p)) {
			return self.clone();
		}
		self.0.iter().filter(|p| !other.0.contains(p)).cloned().collect()
	}

	pub fn intersection(&self, other: &PropertySet) -> PropertySet {
		self.0.iter().filter(|p| other.0.contains(p)).cloned().collect()
	}

	pub fn is_subset(&self, other: &PropertySet) -> bool {
		self.0.is_subset(&other.0)
	}

	/// True if both handles point at the same allocation
	pub fn ptr_eq(&self, other: &PropertySet) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl FromIterator<Property> for PropertySet {
	fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
		Self(Arc::new(iter.into_iter().collect()))
	}
}

impl<'a> IntoIterator for &'a PropertySet {
	type Item = &'a Property;
	type IntoIter = std::collections::btree_set::Iter<'a, Property>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

impl fmt::Display for PropertySet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("{")?;
		for (i, prop) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			write!(f, "{}", prop)?;
		}
		f.write_str("}")
	}
}

/// Builds a [`PropertySet`] from property tokens
#[macro_export]
macro_rules! props {
	($($prop:expr),* $(,)?) => {
		$crate::property::PropertySet::from_iter([$($crate::property::Property::from($prop)),*])
	};
}

/// Context properties active on a fresh config
pub fn default_properties() -> PropertySet {
	props!["cache", "validator", "warnings"]
}

/// Properties checked at value sites rather than by `validate_properties`
pub fn special_properties() -> PropertySet {
	props!["frozen", "mandatory", "empty", "force_store_value"]
}

pub fn ro_append() -> PropertySet {
	props![
		"frozen",
		"disabled",
		"validator",
		"everything_frozen",
		"mandatory",
		"empty",
		"force_store_value"
	]
}

pub fn ro_remove() -> PropertySet {
	props!["permissive", "hidden"]
}

pub fn rw_append() -> PropertySet {
	props!["frozen", "disabled", "validator", "hidden", "force_store_value"]
}

pub fn rw_remove() -> PropertySet {
	props!["permissive", "everything_frozen", "mandatory", "empty"]
}

/// Properties that may not be set directly on the context
pub fn forbidden_set_properties() -> PropertySet {
	props!["force_store_value"]
}

/// Properties that may not be used as permissives
pub fn forbidden_set_permissives() -> PropertySet {
	props!["force_default_on_freeze", "force_metaconfig_on_freeze", "force_store_value"]
}

/// Properties a leader may carry
pub fn allowed_leader_properties() -> PropertySet {
	props![
		"empty",
		"unique",
		"force_store_value",
		"mandatory",
		"force_default_on_freeze",
		"force_metaconfig_on_freeze",
		"frozen"
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_copy_on_write() {
		let base = props!["cache", "validator"];
		let mut derived = base.clone();
		assert!(derived.ptr_eq(&base));
		derived.remove(&Property::Validator);
		assert!(base.contains(&Property::Validator));
		assert!(!derived.contains(&Property::Validator));
		assert!(!derived.ptr_eq(&base));
	}

	#[test]
	fn test_custom_round_trip() {
		let prop = Property::from("my_flag");
		assert_eq!(prop, Property::Custom("my_flag".into()));
		assert_eq!(Property::from("hidden"), Property::Hidden);
		let json = serde_json::to_string(&props!["hidden", "my_flag"]).expect("json");
		let back: PropertySet = serde_json::from_str(&json).expect("parse");
		assert_eq!(back, props!["hidden", "my_flag"]);
	}

	#[test]
	fn test_set_algebra() {
		let a = props!["hidden", "disabled", "frozen"];
		let b = props!["frozen"];
		assert_eq!(a.difference(&b), props!["hidden", "disabled"]);
		assert_eq!(a.intersection(&b), props!["frozen"]);
		assert!(b.is_subset(&a));
	}
}

// vim: ts=4
