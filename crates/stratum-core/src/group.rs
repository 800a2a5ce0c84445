//! Option groups: plain groups, leaderships and dynamic groups

use crate::calculation::Calculation;
use crate::option::{OptionDef, PropertyDecl, SymLinkDef};
use crate::prelude::*;

#[derive(Debug, Clone)]
pub enum GroupKind {
	Plain,
	/// First child is the leader, the others are followers
	Leadership,
	/// Children are replicated once per suffix returned by the calculation
	Dynamic(Calculation),
}

/// A node of the schema tree before it is built
#[derive(Debug, Clone)]
pub enum Node {
	Option(OptionDef),
	SymLink(SymLinkDef),
	Group(GroupDef),
}

impl Node {
	pub fn name(&self) -> &str {
		match self {
			Node::Option(opt) => &opt.name,
			Node::SymLink(link) => &link.name,
			Node::Group(group) => &group.name,
		}
	}
}

impl From<OptionDef> for Node {
	fn from(opt: OptionDef) -> Self {
		Node::Option(opt)
	}
}

impl From<SymLinkDef> for Node {
	fn from(link: SymLinkDef) -> Self {
		Node::SymLink(link)
	}
}

impl From<GroupDef> for Node {
	fn from(group: GroupDef) -> Self {
		Node::Group(group)
	}
}

#[derive(Debug, Clone)]
pub struct GroupDef {
	pub(crate) name: Box<str>,
	pub(crate) doc: Option<Box<str>>,
	pub(crate) kind: GroupKind,
	pub(crate) properties: Vec<PropertyDecl>,
	/// Owned children, moved into the schema when it is built
	pub(crate) children: Vec<Node>,

	// Filled in when the schema is built
	pub(crate) path: Box<str>,
	pub(crate) child_paths: Vec<Box<str>>,
	pub(crate) dyn_group: Option<Box<str>>,
}

impl GroupDef {
	pub fn builder(name: impl Into<Box<str>>) -> GroupBuilder {
		GroupBuilder::new(name, GroupKind::Plain)
	}

	pub fn leadership(name: impl Into<Box<str>>) -> GroupBuilder {
		GroupBuilder::new(name, GroupKind::Leadership)
	}

	pub fn dynamic(name: impl Into<Box<str>>, suffixes: Calculation) -> GroupBuilder {
		GroupBuilder::new(name, GroupKind::Dynamic(suffixes))
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn doc(&self) -> Option<&str> {
		self.doc.as_deref()
	}

	pub fn kind(&self) -> &GroupKind {
		&self.kind
	}

	pub fn is_leadership(&self) -> bool {
		matches!(self.kind, GroupKind::Leadership)
	}

	pub fn is_dynamic(&self) -> bool {
		matches!(self.kind, GroupKind::Dynamic(_))
	}

	/// Template paths of the direct children
	pub fn child_paths(&self) -> &[Box<str>] {
		&self.child_paths
	}

	pub(crate) fn calculations(&self) -> Vec<&Calculation> {
		let mut res: Vec<&Calculation> = self
			.properties
			.iter()
			.filter_map(|decl| match decl {
				PropertyDecl::Calculated(calc) => Some(calc),
				PropertyDecl::Static(_) => None,
			})
			.collect();
		if let GroupKind::Dynamic(calc) = &self.kind {
			res.push(calc);
		}
		res
	}

	pub(crate) fn calculations_mut(&mut self) -> Vec<&mut Calculation> {
		let mut res: Vec<&mut Calculation> = self
			.properties
			.iter_mut()
			.filter_map(|decl| match decl {
				PropertyDecl::Calculated(calc) => Some(calc),
				PropertyDecl::Static(_) => None,
			})
			.collect();
		if let GroupKind::Dynamic(calc) = &mut self.kind {
			res.push(calc);
		}
		res
	}
}

/// Builder for GroupDef with fluent API
pub struct GroupBuilder {
	name: Box<str>,
	doc: Option<Box<str>>,
	kind: GroupKind,
	properties: Vec<PropertyDecl>,
	children: Vec<Node>,
}

impl GroupBuilder {
	pub fn new(name: impl Into<Box<str>>, kind: GroupKind) -> Self {
		Self { name: name.into(), doc: None, kind, properties: Vec::new(), children: Vec::new() }
	}

	pub fn doc(mut self, doc: impl Into<Box<str>>) -> Self {
		self.doc = Some(doc.into());
		self
	}

	pub fn property(mut self, prop: impl Into<Property>) -> Self {
		self.properties.push(PropertyDecl::Static(prop.into()));
		self
	}

	pub fn property_calc(mut self, calc: Calculation) -> Self {
		self.properties.push(PropertyDecl::Calculated(calc));
		self
	}

	pub fn child(mut self, child: impl Into<Node>) -> Self {
		self.children.push(child.into());
		self
	}

	pub fn children(mut self, children: impl IntoIterator<Item = impl Into<Node>>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	pub fn build(self) -> ClResult<GroupDef> {
		if self.name.is_empty() || self.name.contains('.') {
			return Err(Error::config(format!("invalid group name \"{}\"", self.name)));
		}
		let mut names = std::collections::HashSet::new();
		for child in &self.children {
			if !names.insert(child.name()) {
				return Err(Error::config(format!(
					"duplicate option name \"{}\" in group \"{}\"",
					child.name(),
					self.name
				)));
			}
		}
		Ok(GroupDef {
			name: self.name,
			doc: self.doc,
			kind: self.kind,
			properties: self.properties,
			children: self.children,
			path: "".into(),
			child_paths: Vec::new(),
			dyn_group: None,
		})
	}
}

// vim: ts=4
