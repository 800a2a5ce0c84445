//! Leader/follower consistency
//!
//! The leader's value length is authoritative for every follower. Follower
//! values are stored per index, so removing an entry means shifting every
//! later index down by one.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use crate::bag::{NodeRef, OptionBag};
use crate::group::Node;
use crate::option::OptionDef;
use crate::prelude::*;
use crate::settings::check_leader_properties;
use crate::values::Values;

/// Structural checks run when the schema is built
pub(crate) fn validate_leadership(path: &str, children: &[Node]) -> ClResult<()> {
	if children.len() < 2 {
		return Err(Error::leadership(format!(
			"a leadership needs a leader and at least one follower, \"{}\" has {} children",
			path,
			children.len()
		)));
	}
	for (idx, child) in children.iter().enumerate() {
		let Node::Option(opt) = child else {
			return Err(Error::leadership(format!(
				"leadership \"{}\" can only contain options, \"{}\" is not one",
				path,
				child.name()
			)));
		};
		if !opt.is_multi() {
			return Err(Error::leadership(format!(
				"leadership \"{}\" contains the non multi option \"{}\"",
				path, opt.name
			)));
		}
		if idx == 0 {
			check_leader_properties(opt, &opt.static_properties())?;
		} else if !(opt.default.is_empty() || opt.default.has_calculation()) {
			return Err(Error::leadership(format!(
				"follower \"{}\" of \"{}\" cannot have a static default value",
				opt.name, path
			)));
		}
	}
	Ok(())
}

fn group_of(opt: &OptionDef) -> ClResult<&str> {
	opt.leadership()
		.ok_or_else(|| Error::config(format!("\"{}\" is not in a leadership", opt.path)))
}

/// Bag addressing another member of the same leadership
fn member_bag(bag: &OptionBag, member: Arc<OptionDef>, index: Option<Index>) -> ClResult<OptionBag> {
	let (path, dyn_path) = bag.locate(&member)?;
	Ok(OptionBag::new(NodeRef::Option(member), path, index, dyn_path, bag.config_bag.clone()))
}

pub(crate) fn followers(bag: &OptionBag) -> ClResult<Vec<Arc<OptionDef>>> {
	let opt = bag.option()?;
	bag.context().schema.followers(group_of(opt)?)
}

/// Current length of the leadership, read through the leader value
pub(crate) async fn get_length(bag: &OptionBag) -> ClResult<usize> {
	let opt = bag.option()?;
	let ctx = bag.context();
	let leader = ctx.schema.leader(group_of(opt)?)?;
	let mut leader_bag = member_bag(bag, leader, None)?;
	leader_bag.properties = ctx.settings.get_properties(&leader_bag, true).await?;
	let value = ctx.values.get_cached_value(&leader_bag).await?;
	Ok(value.as_array().map_or(0, Vec::len))
}

/// Reset every follower of the leader addressed by `bag`
pub(crate) fn reset<'a>(values: &'a Values, bag: &'a OptionBag) -> BoxFuture<'a, ClResult<()>> {
	async move {
		let mut config_bag = bag.config_bag.clone();
		config_bag.remove_validation();
		for follower in followers(bag)? {
			let mut follower_bag = member_bag(bag, follower, None)?;
			follower_bag.config_bag = config_bag.clone();
			follower_bag.properties =
				bag.context().settings.get_properties(&follower_bag, true).await?;
			values.reset(&follower_bag).await?;
		}
		Ok(())
	}
	.boxed()
}

/// Remove index `index` from every follower, shifting later entries down
///
/// Must run before the shortened leader value is stored.
pub(crate) async fn pop(bag: &OptionBag, index: Index) -> ClResult<()> {
	let conn = &bag.config_bag.connection;
	for follower in followers(bag)? {
		let follower_bag = member_bag(bag, follower, Some(index))?;
		let path = &follower_bag.path;
		let length = conn.get_max_length(path).await?;
		if length > index && conn.has_value(path, Some(index)).await? {
			conn.reset_value_index(path, index).await?;
		}
		for idx in index + 1..length {
			if conn.has_value(path, Some(idx)).await? {
				conn.reduce_index(path, idx).await?;
			}
		}
		bag.context().reset_option_cache(follower_bag.template());
	}
	debug!("popped index {} from leadership of \"{}\"", index, bag.path);
	Ok(())
}

/// Store the computed value of every `force_store_value` follower
pub(crate) async fn follower_force_store_value(
	values: &Values,
	bag: &OptionBag,
	value: &Value,
	owner: &Owner,
) -> ClResult<()> {
	let length = value.as_array().map_or(0, Vec::len);
	if length == 0 {
		return Ok(());
	}
	let ctx = bag.context();
	let conn = &bag.config_bag.connection;
	for follower in followers(bag)? {
		let mut follower_bag = member_bag(bag, follower, None)?;
		follower_bag.properties = ctx.settings.get_properties(&follower_bag, true).await?;
		if !follower_bag.has(&Property::ForceStoreValue) {
			continue;
		}
		for idx in 0..length {
			if conn.has_value(&follower_bag.path, Some(idx)).await? {
				continue;
			}
			let index_bag = follower_bag.at_index(Some(idx));
			let value = values.getvalue(&index_bag).await?;
			values.store(&index_bag, &value, owner).await?;
		}
	}
	Ok(())
}


// vim: ts=4
