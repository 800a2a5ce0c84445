//! Immutable schema tree
//!
//! Building a [`Schema`] assigns dotted template paths to every node, links
//! leaderships and dynamic groups to their children, resolves symlinks used
//! in calculation parameters and records which options must be invalidated
//! when another one changes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::calculation::Param;
use crate::group::{GroupDef, GroupKind, Node};
use crate::leadership::validate_leadership;
use crate::option::{LeadershipRef, OptionDef, PropertyDecl, SymLinkDef};
use crate::prelude::*;

#[derive(Debug, Clone)]
pub enum SchemaNode {
	Option(Arc<OptionDef>),
	SymLink(Arc<SymLinkDef>),
	Group(Arc<GroupDef>),
}

impl SchemaNode {
	pub fn name(&self) -> &str {
		match self {
			SchemaNode::Option(opt) => opt.name(),
			SchemaNode::SymLink(link) => link.name(),
			SchemaNode::Group(group) => group.name(),
		}
	}
}

#[derive(Debug)]
pub struct Schema {
	root: Arc<GroupDef>,
	nodes: HashMap<Box<str>, SchemaNode>,
	/// Template path -> template paths whose cached state depends on it
	dependents: HashMap<Box<str>, Vec<Box<str>>>,
	/// Options that may carry `force_store_value`, in tree order
	///
	/// Options with calculated properties are listed too: whether they are
	/// forced is only known once their properties are evaluated.
	force_store: Vec<Box<str>>,
}

impl Schema {
	pub fn builder() -> SchemaBuilder {
		SchemaBuilder::default()
	}

	pub fn root(&self) -> &Arc<GroupDef> {
		&self.root
	}

	pub fn node(&self, path: &str) -> Option<&SchemaNode> {
		if path.is_empty() {
			return None;
		}
		self.nodes.get(path)
	}

	pub fn option(&self, path: &str) -> ClResult<Arc<OptionDef>> {
		match self.node(path) {
			Some(SchemaNode::Option(opt)) => Ok(opt.clone()),
			Some(_) => Err(Error::config(format!("\"{}\" is not an option", path))),
			None => Err(Error::config(format!("unknown option \"{}\"", path))),
		}
	}

	pub fn group(&self, path: &str) -> ClResult<Arc<GroupDef>> {
		if path.is_empty() {
			return Ok(self.root.clone());
		}
		match self.node(path) {
			Some(SchemaNode::Group(group)) => Ok(group.clone()),
			Some(_) => Err(Error::config(format!("\"{}\" is not a group", path))),
			None => Err(Error::config(format!("unknown group \"{}\"", path))),
		}
	}

	/// Leader of a leadership group
	pub fn leader(&self, group: &str) -> ClResult<Arc<OptionDef>> {
		let group = self.group(group)?;
		let first = group
			.child_paths
			.first()
			.ok_or_else(|| Error::leadership(format!("leadership \"{}\" is empty", group.path)))?;
		self.option(first)
	}

	/// Followers of a leadership group, in declaration order
	pub fn followers(&self, group: &str) -> ClResult<Vec<Arc<OptionDef>>> {
		let group = self.group(group)?;
		group.child_paths.iter().skip(1).map(|path| self.option(path)).collect()
	}

	pub fn dependents(&self, path: &str) -> &[Box<str>] {
		self.dependents.get(path).map_or(&[], Vec::as_slice)
	}

	pub fn force_store(&self) -> &[Box<str>] {
		&self.force_store
	}

	/// Every option, in tree order
	pub fn options(&self) -> Vec<Arc<OptionDef>> {
		let mut res = Vec::new();
		let mut queue: VecDeque<&Box<str>> = self.root.child_paths.iter().collect();
		while let Some(path) = queue.pop_front() {
			match self.nodes.get(path) {
				Some(SchemaNode::Option(opt)) => res.push(opt.clone()),
				Some(SchemaNode::Group(group)) => queue.extend(group.child_paths.iter()),
				_ => {}
			}
		}
		res
	}
}

/// Owned node collected while walking the declaration tree
enum Pending {
	Option(OptionDef),
	SymLink(SymLinkDef),
	Group(GroupDef),
}

#[derive(Default)]
pub struct SchemaBuilder {
	children: Vec<Node>,
}

impl SchemaBuilder {
	pub fn child(mut self, child: impl Into<Node>) -> Self {
		self.children.push(child.into());
		self
	}

	pub fn children(mut self, children: impl IntoIterator<Item = impl Into<Node>>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	pub fn build(self) -> ClResult<Arc<Schema>> {
		let mut root = GroupDef::builder("root").children(self.children).build()?;
		root.name = "".into();

		let mut pending: Vec<(Box<str>, Pending)> = Vec::new();
		let children = std::mem::take(&mut root.children);
		root.child_paths = collect(children, "", None, None, &mut pending)?;

		// Symlinks can only point at options
		let kinds: HashMap<Box<str>, bool> = pending
			.iter()
			.filter(|(_, node)| !matches!(node, Pending::SymLink(_)))
			.map(|(path, node)| (path.clone(), matches!(node, Pending::Option(_))))
			.collect();
		let mut links: HashMap<Box<str>, Box<str>> = HashMap::new();
		for (path, node) in &pending {
			if let Pending::SymLink(link) = node {
				match kinds.get(&link.target) {
					Some(true) => {}
					Some(false) => {
						return Err(Error::config(format!(
							"symlink \"{}\" must point to an option, \"{}\" is a group",
							path, link.target
						)));
					}
					None => {
						return Err(Error::config(format!(
							"symlink \"{}\" points to unknown option \"{}\"",
							path, link.target
						)));
					}
				}
				links.insert(path.clone(), link.target.clone());
			}
		}

		// Point calculation parameters at real options
		for (owner, node) in pending.iter_mut() {
			let calcs = match node {
				Pending::Option(opt) => opt.calculations_mut(),
				Pending::Group(group) => group.calculations_mut(),
				Pending::SymLink(_) => continue,
			};
			for calc in calcs {
				for param in calc.params_mut() {
					let Param::Option(po) = param else {
						continue;
					};
					if let Some(target) = links.get(&po.path) {
						po.path = target.clone();
					}
					match kinds.get(&po.path) {
						Some(true) => {}
						_ => {
							return Err(Error::config(format!(
								"option \"{}\" has a calculation referencing unknown option \"{}\"",
								owner, po.path
							)));
						}
					}
				}
			}
		}

		let mut nodes = HashMap::new();
		let mut dependents: HashMap<Box<str>, Vec<Box<str>>> = HashMap::new();
		let mut force_store = Vec::new();
		for (path, node) in pending {
			let node = match node {
				Pending::Option(opt) => {
					for calc in opt.calculations() {
						for target in calc.option_paths() {
							dependents.entry(target.into()).or_default().push(path.clone());
						}
					}
					let calculated = opt.properties.iter().any(|decl| matches!(decl, PropertyDecl::Calculated(_)));
					if calculated || opt.static_properties().contains(&Property::ForceStoreValue) {
						force_store.push(path.clone());
					}
					SchemaNode::Option(Arc::new(opt))
				}
				Pending::SymLink(link) => SchemaNode::SymLink(Arc::new(link)),
				Pending::Group(group) => {
					for calc in group.calculations() {
						for target in calc.option_paths() {
							dependents.entry(target.into()).or_default().push(path.clone());
						}
					}
					// A group's state feeds the whole subtree
					dependents.entry(path.clone()).or_default().extend(group.child_paths.iter().cloned());
					SchemaNode::Group(Arc::new(group))
				}
			};
			nodes.insert(path, node);
		}

		// Followers depend on the leader length
		for node in nodes.values() {
			if let SchemaNode::Group(group) = node {
				if group.is_leadership() {
					if let Some((leader, followers)) = group.child_paths.split_first() {
						dependents.entry(leader.clone()).or_default().extend(followers.iter().cloned());
					}
				}
			}
		}

		let schema = Schema { root: Arc::new(root), nodes, dependents, force_store };
		check_leader_calculations(&schema)?;
		debug!("schema built with {} nodes", schema.nodes.len());
		Ok(Arc::new(schema))
	}
}

fn join(parent: &str, name: &str) -> Box<str> {
	if parent.is_empty() { name.into() } else { format!("{}.{}", parent, name).into() }
}

/// Move children into `pending`, returning their template paths
fn collect(
	children: Vec<Node>,
	parent: &str,
	leadership: Option<&str>,
	dyn_group: Option<&str>,
	pending: &mut Vec<(Box<str>, Pending)>,
) -> ClResult<Vec<Box<str>>> {
	let mut paths = Vec::with_capacity(children.len());
	for (idx, child) in children.into_iter().enumerate() {
		let path = join(parent, child.name());
		match child {
			Node::Option(mut opt) => {
				opt.path = path.clone();
				opt.dyn_group = dyn_group.map(Into::into);
				opt.leadership = leadership
					.map(|group| LeadershipRef { group: group.into(), is_leader: idx == 0 });
				pending.push((path.clone(), Pending::Option(opt)));
			}
			Node::SymLink(mut link) => {
				if leadership.is_some() {
					return Err(Error::leadership(format!(
						"leadership \"{}\" cannot contain the symlink \"{}\"",
						parent, link.name
					)));
				}
				link.path = path.clone();
				pending.push((path.clone(), Pending::SymLink(link)));
			}
			Node::Group(mut group) => {
				if leadership.is_some() {
					return Err(Error::leadership(format!(
						"leadership \"{}\" cannot contain the group \"{}\"",
						parent, group.name
					)));
				}
				let is_dynamic = matches!(group.kind, GroupKind::Dynamic(_));
				if is_dynamic && dyn_group.is_some() {
					return Err(Error::config(format!(
						"dynamic group \"{}\" cannot be inside another dynamic group",
						path
					)));
				}
				group.path = path.clone();
				group.dyn_group = dyn_group.map(Into::into);
				let sub_dyn = if is_dynamic { Some(&*path) } else { dyn_group };
				let grandchildren = std::mem::take(&mut group.children);
				let sub_leadership = if group.is_leadership() {
					validate_leadership(&path, &grandchildren)?;
					Some(&*path)
				} else {
					None
				};
				group.child_paths = collect(grandchildren, &path, sub_leadership, sub_dyn, pending)?;
				pending.push((path.clone(), Pending::Group(group)));
			}
		}
		paths.push(path);
	}
	Ok(paths)
}

/// A leader must not be computed from its own followers
fn check_leader_calculations(schema: &Schema) -> ClResult<()> {
	for node in schema.nodes.values() {
		let SchemaNode::Option(opt) = node else {
			continue;
		};
		let Some(group) = opt.leadership().filter(|_| opt.is_leader()) else {
			continue;
		};
		let group_def = schema.group(group)?;
		let followers: HashSet<&str> =
			group_def.child_paths.iter().skip(1).map(|p| &**p).collect();
		for calc in opt.calculations() {
			if let Some(path) = calc.option_paths().find(|p| followers.contains(p)) {
				return Err(Error::config(format!(
					"leader \"{}\" has a calculation referencing its follower \"{}\"",
					opt.path, path
				)));
			}
		}
	}
	Ok(())
}


// vim: ts=4
