//! Option definitions and their builders
//!
//! An [`OptionDef`] is a typed configuration leaf. It is immutable once the
//! schema that contains it has been built.

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr};

use crate::calculation::Calculation;
use crate::prelude::*;

/// Declared type of an option's values
#[derive(Debug, Clone, PartialEq)]
pub enum OptionType {
	Str,
	Password,
	Int,
	Float,
	Bool,
	Choice(Vec<Value>),
	Port,
	DomainName,
	Ip,
	Network,
	Netmask,
	Email,
	Url,
	Filename,
}

fn regex_match(pattern: &str, value: &str) -> Result<bool, String> {
	let re = Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
	Ok(re.is_match(value))
}

fn as_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, String> {
	value.as_str().ok_or_else(|| format!("invalid {}", what))
}

impl OptionType {
	pub fn name(&self) -> &'static str {
		match self {
			OptionType::Str => "string",
			OptionType::Password => "password",
			OptionType::Int => "integer",
			OptionType::Float => "float",
			OptionType::Bool => "boolean",
			OptionType::Choice(_) => "choice",
			OptionType::Port => "port",
			OptionType::DomainName => "domain name",
			OptionType::Ip => "IP",
			OptionType::Network => "network address",
			OptionType::Netmask => "netmask address",
			OptionType::Email => "email address",
			OptionType::Url => "URL",
			OptionType::Filename => "file name",
		}
	}

	/// Check a single, non-null value against this type
	pub fn validate(&self, value: &Value) -> Result<(), String> {
		let name = self.name();
		match self {
			OptionType::Str | OptionType::Password => {
				as_str(value, name)?;
			}
			OptionType::Int => {
				if !(value.is_i64() || value.is_u64()) {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Float => {
				if !value.is_number() {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Bool => {
				if !value.is_boolean() {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Choice(values) => {
				if !values.contains(value) {
					let choices: Vec<String> = values.iter().map(display_value).collect();
					return Err(format!("only \"{}\" are allowed", choices.join("\", \"")));
				}
			}
			OptionType::Port => {
				let port = match value {
					Value::Number(n) => n.as_u64(),
					Value::String(s) => s.parse::<u64>().ok(),
					_ => None,
				};
				if !port.is_some_and(|p| p <= 65535) {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::DomainName => {
				let s = as_str(value, name)?;
				let pattern = r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";
				if s.len() > 255 || !regex_match(pattern, s)? {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Ip => {
				let s = as_str(value, name)?;
				s.parse::<IpAddr>().map_err(|_| format!("invalid {}", name))?;
			}
			OptionType::Network => {
				let s = as_str(value, name)?;
				let (addr, prefix) = s.split_once('/').ok_or_else(|| format!("invalid {}", name))?;
				let addr = addr.parse::<IpAddr>().map_err(|_| format!("invalid {}", name))?;
				let max = if addr.is_ipv4() { 32 } else { 128 };
				match prefix.parse::<u8>() {
					Ok(p) if p <= max => {}
					_ => return Err(format!("invalid {}", name)),
				}
			}
			OptionType::Netmask => {
				let s = as_str(value, name)?;
				let mask = s.parse::<Ipv4Addr>().map_err(|_| format!("invalid {}", name))?;
				let bits = u32::from(mask);
				if bits.leading_ones() + bits.trailing_zeros() != 32 {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Email => {
				let s = as_str(value, name)?;
				if !regex_match(r"^[^@\s]+@[^@\s]+\.[^@\s]+$", s)? {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Url => {
				let s = as_str(value, name)?;
				if !regex_match(r"^https?://[^\s/$.?#][^\s]*$", s)? {
					return Err(format!("invalid {}", name));
				}
			}
			OptionType::Filename => {
				let s = as_str(value, name)?;
				if !regex_match(r"^[a-zA-Z0-9\-\._~/+]+$", s)? {
					return Err(format!("invalid {}", name));
				}
			}
		}
		Ok(())
	}
}

/// Multiplicity of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multi {
	Single,
	Multi,
	Submulti,
}

/// A default value, possibly embedding calculations
#[derive(Debug, Clone)]
pub enum DefaultValue {
	Static(Value),
	Calculated(Calculation),
	List(Vec<DefaultValue>),
}

impl DefaultValue {
	pub fn has_calculation(&self) -> bool {
		match self {
			DefaultValue::Static(_) => false,
			DefaultValue::Calculated(_) => true,
			DefaultValue::List(items) => items.iter().any(DefaultValue::has_calculation),
		}
	}

	/// True for `null`, `[]` and an empty list of defaults
	pub fn is_empty(&self) -> bool {
		match self {
			DefaultValue::Static(Value::Null) => true,
			DefaultValue::Static(Value::Array(items)) => items.is_empty(),
			DefaultValue::List(items) => items.is_empty(),
			_ => false,
		}
	}

	pub(crate) fn calculations(&self) -> Vec<&Calculation> {
		match self {
			DefaultValue::Static(_) => Vec::new(),
			DefaultValue::Calculated(calc) => vec![calc],
			DefaultValue::List(items) => items.iter().flat_map(DefaultValue::calculations).collect(),
		}
	}

	pub(crate) fn calculations_mut(&mut self) -> Vec<&mut Calculation> {
		match self {
			DefaultValue::Static(_) => Vec::new(),
			DefaultValue::Calculated(calc) => vec![calc],
			DefaultValue::List(items) => {
				items.iter_mut().flat_map(DefaultValue::calculations_mut).collect()
			}
		}
	}
}

impl From<Value> for DefaultValue {
	fn from(value: Value) -> Self {
		DefaultValue::Static(value)
	}
}

impl From<Calculation> for DefaultValue {
	fn from(calc: Calculation) -> Self {
		DefaultValue::Calculated(calc)
	}
}

/// A declared property: either a literal token or a calculation yielding one
#[derive(Debug, Clone)]
pub enum PropertyDecl {
	Static(Property),
	Calculated(Calculation),
}

/// Position of an option inside a leadership group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadershipRef {
	/// Template path of the leadership group
	pub group: Box<str>,
	pub is_leader: bool,
}

#[derive(Debug, Clone)]
pub struct OptionDef {
	pub(crate) name: Box<str>,
	pub(crate) doc: Option<Box<str>>,
	pub(crate) typ: OptionType,
	pub(crate) multi: Multi,
	pub(crate) default: DefaultValue,
	pub(crate) default_multi: Option<DefaultValue>,
	pub(crate) callback: Option<Calculation>,
	pub(crate) properties: Vec<PropertyDecl>,
	pub(crate) validators: Vec<Calculation>,
	pub(crate) warnings_only: bool,

	// Filled in when the schema is built
	pub(crate) path: Box<str>,
	pub(crate) leadership: Option<LeadershipRef>,
	pub(crate) dyn_group: Option<Box<str>>,
}

impl OptionDef {
	pub fn builder(name: impl Into<Box<str>>, typ: OptionType) -> OptionBuilder {
		OptionBuilder::new(name, typ)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Template path (dynamic groups appear without suffix)
	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn doc(&self) -> Option<&str> {
		self.doc.as_deref()
	}

	pub fn display_name(&self) -> &str {
		self.doc.as_deref().unwrap_or(&self.name)
	}

	pub fn option_type(&self) -> &OptionType {
		&self.typ
	}

	pub fn is_multi(&self) -> bool {
		self.multi != Multi::Single
	}

	pub fn is_submulti(&self) -> bool {
		self.multi == Multi::Submulti
	}

	pub fn is_leader(&self) -> bool {
		self.leadership.as_ref().is_some_and(|l| l.is_leader)
	}

	pub fn is_follower(&self) -> bool {
		self.leadership.as_ref().is_some_and(|l| !l.is_leader)
	}

	pub fn leadership(&self) -> Option<&str> {
		self.leadership.as_ref().map(|l| &*l.group)
	}

	pub fn has_callback(&self) -> bool {
		self.callback.is_some()
	}

	/// Statically declared literal properties
	pub fn static_properties(&self) -> PropertySet {
		self.properties
			.iter()
			.filter_map(|decl| match decl {
				PropertyDecl::Static(p) => Some(p.clone()),
				PropertyDecl::Calculated(_) => None,
			})
			.collect()
	}

	/// Value this option uses when it has neither a stored nor a computed value
	pub fn empty_value(&self) -> Value {
		if self.is_multi() { Value::Array(Vec::new()) } else { Value::Null }
	}

	/// Every calculation attached to this option
	pub(crate) fn calculations(&self) -> Vec<&Calculation> {
		let mut res: Vec<&Calculation> = self.callback.iter().collect();
		res.extend(self.default.calculations());
		res.extend(self.default_multi.iter().flat_map(DefaultValue::calculations));
		res.extend(self.properties.iter().filter_map(|decl| match decl {
			PropertyDecl::Calculated(calc) => Some(calc),
			PropertyDecl::Static(_) => None,
		}));
		res.extend(self.validators.iter());
		res
	}

	pub(crate) fn calculations_mut(&mut self) -> Vec<&mut Calculation> {
		let mut res: Vec<&mut Calculation> = self.callback.iter_mut().collect();
		res.extend(self.default.calculations_mut());
		res.extend(self.default_multi.iter_mut().flat_map(DefaultValue::calculations_mut));
		res.extend(self.properties.iter_mut().filter_map(|decl| match decl {
			PropertyDecl::Calculated(calc) => Some(calc),
			PropertyDecl::Static(_) => None,
		}));
		res.extend(self.validators.iter_mut());
		res
	}
}

/// Alias to another option
#[derive(Debug, Clone)]
pub struct SymLinkDef {
	pub(crate) name: Box<str>,
	pub(crate) target: Box<str>,
	pub(crate) path: Box<str>,
}

impl SymLinkDef {
	pub fn new(name: impl Into<Box<str>>, target: impl Into<Box<str>>) -> Self {
		Self { name: name.into(), target: target.into(), path: "".into() }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	/// Path of the aliased option
	pub fn target(&self) -> &str {
		&self.target
	}
}

/// Builder for OptionDef with fluent API
pub struct OptionBuilder {
	name: Box<str>,
	doc: Option<Box<str>>,
	typ: OptionType,
	multi: Multi,
	default: Option<DefaultValue>,
	default_multi: Option<DefaultValue>,
	callback: Option<Calculation>,
	properties: Vec<PropertyDecl>,
	validators: Vec<Calculation>,
	warnings_only: bool,
}

impl OptionBuilder {
	pub fn new(name: impl Into<Box<str>>, typ: OptionType) -> Self {
		Self {
			name: name.into(),
			doc: None,
			typ,
			multi: Multi::Single,
			default: None,
			default_multi: None,
			callback: None,
			properties: Vec::new(),
			validators: Vec::new(),
			warnings_only: false,
		}
	}

	pub fn doc(mut self, doc: impl Into<Box<str>>) -> Self {
		self.doc = Some(doc.into());
		self
	}

	pub fn multi(mut self) -> Self {
		self.multi = Multi::Multi;
		self
	}

	pub fn submulti(mut self) -> Self {
		self.multi = Multi::Submulti;
		self
	}

	/// Static default, or a list mixing literals and calculations
	pub fn default(mut self, default: impl Into<DefaultValue>) -> Self {
		self.default = Some(default.into());
		self
	}

	/// Computed default, evaluated when there is no stored value
	pub fn callback(mut self, calc: Calculation) -> Self {
		self.callback = Some(calc);
		self
	}

	/// Value used for new entries of a multi option, possibly calculated
	pub fn default_multi(mut self, value: impl Into<DefaultValue>) -> Self {
		self.default_multi = Some(value.into());
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

	pub fn validator(mut self, calc: Calculation) -> Self {
		self.validators.push(calc);
		self
	}

	/// Every validator of this option only emits warnings
	pub fn warnings_only(mut self) -> Self {
		self.warnings_only = true;
		self
	}

	pub fn build(self) -> ClResult<OptionDef> {
		if self.name.is_empty() || self.name.contains('.') {
			return Err(Error::config(format!("invalid option name \"{}\"", self.name)));
		}
		let is_multi = self.multi != Multi::Single;
		if self.default_multi.is_some() && !is_multi {
			return Err(Error::config(format!(
				"default_multi is set whereas multi is False in option \"{}\"",
				self.name
			)));
		}
		let default = match self.default {
			Some(default) => {
				if self.callback.is_some() && !default.is_empty() {
					return Err(Error::config(format!(
						"option \"{}\" has a callback, it cannot also have a default value",
						self.name
					)));
				}
				if is_multi && matches!(default, DefaultValue::Static(ref v) if !v.is_array() && !v.is_null()) {
					return Err(Error::config(format!(
						"default value of the multi option \"{}\" must be a list",
						self.name
					)));
				}
				match default {
					DefaultValue::Static(Value::Null) if is_multi => {
						DefaultValue::Static(Value::Array(Vec::new()))
					}
					other => other,
				}
			}
			None if is_multi => DefaultValue::Static(Value::Array(Vec::new())),
			None => DefaultValue::Static(Value::Null),
		};
		if let DefaultValue::Static(ref value) = default {
			check_static_default(&self.name, &self.typ, self.multi, value)?;
		}
		if let Some(DefaultValue::Static(ref value)) = self.default_multi {
			check_static_default(&self.name, &self.typ, Multi::Single, value)?;
		}

		Ok(OptionDef {
			name: self.name,
			doc: self.doc,
			typ: self.typ,
			multi: self.multi,
			default,
			default_multi: self.default_multi,
			callback: self.callback,
			properties: self.properties,
			validators: self.validators,
			warnings_only: self.warnings_only,
			path: "".into(),
			leadership: None,
			dyn_group: None,
		})
	}
}

fn check_static_default(name: &str, typ: &OptionType, multi: Multi, value: &Value) -> ClResult<()> {
	let check = |v: &Value| -> ClResult<()> {
		if v.is_null() {
			return Ok(());
		}
		typ.validate(v)
			.map_err(|msg| Error::config(format!("invalid default value for option \"{}\": {}", name, msg)))
	};
	match (multi, value) {
		(Multi::Single, v) => check(v),
		(Multi::Multi, Value::Array(items)) => items.iter().try_for_each(check),
		(Multi::Submulti, Value::Array(items)) => items
			.iter()
			.filter_map(Value::as_array)
			.flatten()
			.try_for_each(check),
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_type_validation() {
		assert!(OptionType::Int.validate(&json!(3)).is_ok());
		assert!(OptionType::Int.validate(&json!("3")).is_err());
		assert!(OptionType::Port.validate(&json!("8080")).is_ok());
		assert!(OptionType::Port.validate(&json!(70000)).is_err());
		assert!(OptionType::Ip.validate(&json!("192.168.1.1")).is_ok());
		assert!(OptionType::Netmask.validate(&json!("255.255.255.0")).is_ok());
		assert!(OptionType::Netmask.validate(&json!("255.0.255.0")).is_err());
		assert!(OptionType::Network.validate(&json!("10.0.0.0/8")).is_ok());
		assert!(OptionType::DomainName.validate(&json!("example.org")).is_ok());
		assert!(OptionType::DomainName.validate(&json!("-bad.org")).is_err());
		assert!(OptionType::Email.validate(&json!("a@example.org")).is_ok());
		assert!(OptionType::Choice(vec![json!("a"), json!("b")]).validate(&json!("c")).is_err());
	}

	#[test]
	fn test_builder_rejects_default_multi_on_single() {
		let res = OptionDef::builder("a", OptionType::Str).default_multi(json!("x")).build();
		assert!(matches!(res, Err(Error::ConfigError(_))));
	}

	#[test]
	fn test_builder_multi_default_is_list() {
		let opt = OptionDef::builder("a", OptionType::Str).multi().build().expect("option");
		assert!(matches!(opt.default, DefaultValue::Static(Value::Array(ref v)) if v.is_empty()));
		let res = OptionDef::builder("b", OptionType::Int).multi().default(json!(1)).build();
		assert!(res.is_err());
	}
}

// vim: ts=4
