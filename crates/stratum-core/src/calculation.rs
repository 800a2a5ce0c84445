//! Calculation engine
//!
//! A [`Calculation`] is a plain function plus a list of parameter
//! descriptors. Parameters are resolved against the current option bag every
//! time the calculation runs; the function itself never sees the engine.

use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::bag::{DynPath, NodeRef, OptionBag};
use crate::option::OptionDef;
use crate::prelude::*;

/// Error returned by a calculation function
#[derive(Debug, Clone, PartialEq)]
pub enum CalcError {
	/// The value is invalid (used by validators)
	Value(String),
	/// The value is acceptable but suspicious
	Warning(String),
	/// Any other failure
	Other(String),
}

impl fmt::Display for CalcError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CalcError::Value(msg) | CalcError::Warning(msg) | CalcError::Other(msg) => {
				f.write_str(msg)
			}
		}
	}
}

/// Resolved arguments handed to a calculation function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcArgs {
	pub args: Vec<Value>,
	pub kwargs: BTreeMap<String, Value>,
}

static NULL: Value = Value::Null;

impl CalcArgs {
	/// Positional argument, `null` if absent
	pub fn arg(&self, idx: usize) -> &Value {
		self.args.get(idx).unwrap_or(&NULL)
	}

	/// Keyword argument, `null` if absent
	pub fn kwarg(&self, name: &str) -> &Value {
		self.kwargs.get(name).unwrap_or(&NULL)
	}

	/// True if a resolved argument is a property error placeholder
	pub fn is_property_error(value: &Value) -> bool {
		value.get("propertyerror").is_some()
	}
}

pub type CalcFn = Arc<dyn Fn(&CalcArgs) -> Result<Value, CalcError> + Send + Sync>;

/// Reference to another option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamOption {
	pub(crate) path: Box<str>,
	/// Property errors become a `{"propertyerror": ...}` placeholder
	pub(crate) notraisepropertyerror: bool,
	/// Property errors propagate unchanged
	pub(crate) raisepropertyerror: bool,
	/// Wrap the value as `{"name": ..., "value": ...}`
	pub(crate) todict: bool,
	/// Never carry the current index, even inside the same leadership
	pub(crate) whole: bool,
}

impl ParamOption {
	pub fn new(path: impl Into<Box<str>>) -> Self {
		Self {
			path: path.into(),
			notraisepropertyerror: false,
			raisepropertyerror: false,
			todict: false,
			whole: false,
		}
	}

	pub fn notraisepropertyerror(mut self) -> Self {
		self.notraisepropertyerror = true;
		self
	}

	pub fn raisepropertyerror(mut self) -> Self {
		self.raisepropertyerror = true;
		self
	}

	pub fn todict(mut self) -> Self {
		self.todict = true;
		self
	}

	pub fn whole(mut self) -> Self {
		self.whole = true;
		self
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
	Value(Value),
	Index,
	Suffix,
	SelfOption { whole: Option<bool>, todict: bool },
	Option(ParamOption),
}

impl Param {
	pub fn value(value: Value) -> Self {
		Param::Value(value)
	}

	pub fn option(path: impl Into<Box<str>>) -> Self {
		Param::Option(ParamOption::new(path))
	}

	pub fn self_option() -> Self {
		Param::SelfOption { whole: None, todict: false }
	}
}

impl From<ParamOption> for Param {
	fn from(param: ParamOption) -> Self {
		Param::Option(param)
	}
}

enum Resolved {
	Value(Value),
	/// The parameter cannot be computed yet and is left out
	Skip,
}

#[derive(Clone)]
pub struct Calculation {
	pub(crate) name: Box<str>,
	pub(crate) function: CalcFn,
	pub(crate) help: Option<CalcFn>,
	pub(crate) args: Vec<Param>,
	pub(crate) kwargs: Vec<(Box<str>, Param)>,
	pub(crate) warnings_only: bool,
}

impl fmt::Debug for Calculation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Calculation")
			.field("name", &self.name)
			.field("args", &self.args)
			.field("kwargs", &self.kwargs)
			.field("warnings_only", &self.warnings_only)
			.finish()
	}
}

impl Calculation {
	pub fn new<F>(name: impl Into<Box<str>>, function: F) -> Self
	where
		F: Fn(&CalcArgs) -> Result<Value, CalcError> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			function: Arc::new(function),
			help: None,
			args: Vec::new(),
			kwargs: Vec::new(),
			warnings_only: false,
		}
	}

	pub fn arg(mut self, param: impl Into<Param>) -> Self {
		self.args.push(param.into());
		self
	}

	pub fn kwarg(mut self, name: impl Into<Box<str>>, param: impl Into<Param>) -> Self {
		self.kwargs.push((name.into(), param.into()));
		self
	}

	/// Function producing the explanation shown in property errors
	pub fn help<F>(mut self, function: F) -> Self
	where
		F: Fn(&CalcArgs) -> Result<Value, CalcError> + Send + Sync + 'static,
	{
		self.help = Some(Arc::new(function));
		self
	}

	/// As a validator, this calculation only emits warnings
	pub fn warnings_only(mut self) -> Self {
		self.warnings_only = true;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn params(&self) -> impl Iterator<Item = &Param> {
		self.args.iter().chain(self.kwargs.iter().map(|(_, p)| p))
	}

	pub(crate) fn params_mut(&mut self) -> impl Iterator<Item = &mut Param> {
		self.args.iter_mut().chain(self.kwargs.iter_mut().map(|(_, p)| p))
	}

	/// Paths of every option this calculation reads
	pub fn option_paths(&self) -> impl Iterator<Item = &str> {
		self.params().filter_map(|p| match p {
			Param::Option(po) => Some(&*po.path),
			_ => None,
		})
	}

	pub(crate) fn execute<'a>(
		&'a self,
		bag: &'a OptionBag,
		leadership_must_have_index: bool,
		orig_value: Option<&'a Value>,
		allow_raises: bool,
	) -> BoxFuture<'a, ClResult<Value>> {
		async move {
			let args = self.resolve_args(bag, leadership_must_have_index, orig_value).await?;
			self.calculate(&self.function, bag, &args, allow_raises)
		}
		.boxed()
	}

	/// Like `execute` but calls the help function when there is one
	pub(crate) fn explain<'a>(
		&'a self,
		bag: &'a OptionBag,
		leadership_must_have_index: bool,
	) -> BoxFuture<'a, ClResult<Value>> {
		async move {
			let args = self.resolve_args(bag, leadership_must_have_index, None).await?;
			let function = self.help.as_ref().unwrap_or(&self.function);
			self.calculate(function, bag, &args, false)
		}
		.boxed()
	}

	async fn resolve_args(
		&self,
		bag: &OptionBag,
		leadership_must_have_index: bool,
		orig_value: Option<&Value>,
	) -> ClResult<CalcArgs> {
		let mut args = CalcArgs::default();
		for param in &self.args {
			if let Some(value) = resolve_tolerant(param, bag, orig_value, leadership_must_have_index).await? {
				args.args.push(value);
			}
		}
		for (name, param) in &self.kwargs {
			if let Some(value) = resolve_tolerant(param, bag, orig_value, leadership_must_have_index).await? {
				args.kwargs.insert(name.to_string(), value);
			}
		}
		Ok(args)
	}

	fn calculate(
		&self,
		function: &CalcFn,
		bag: &OptionBag,
		args: &CalcArgs,
		allow_raises: bool,
	) -> ClResult<Value> {
		let value = match function(args) {
			Ok(value) => value,
			Err(CalcError::Value(message)) if allow_raises => {
				return Err(Error::ValueError { path: bag.path.clone(), index: bag.index, message });
			}
			Err(CalcError::Warning(message)) => {
				return Err(Error::ValueWarning { path: bag.path.clone(), message });
			}
			Err(CalcError::Value(msg) | CalcError::Other(msg)) => {
				debug!("calculation \"{}\" failed for \"{}\": {}", self.name, bag.path, msg);
				return Err(Error::config(format!(
					"unexpected error \"{}\" in function \"{}\" with arguments \"{:?}\" and \"{:?}\" for option \"{}\"",
					msg, self.name, args.args, args.kwargs, bag.path
				)));
			}
		};
		if value.is_array() && bag.index.is_none() && bag.is_follower() {
			return Err(Error::leadership(format!(
				"the \"{}\" function with positional arguments \"{:?}\" and keyword arguments \"{:?}\" must not return a list (\"{}\") for the follower option \"{}\"",
				self.name, args.args, args.kwargs, value, bag.path
			)));
		}
		Ok(value)
	}
}

/// Resolve one parameter, applying the property error policy
async fn resolve_tolerant(
	param: &Param,
	bag: &OptionBag,
	orig_value: Option<&Value>,
	leadership_must_have_index: bool,
) -> ClResult<Option<Value>> {
	match resolve_param(param, bag, orig_value, leadership_must_have_index).await {
		Ok(Resolved::Value(value)) => Ok(Some(value)),
		Ok(Resolved::Skip) => Ok(None),
		Err(err @ Error::PropertiesOptionError { .. }) => match param {
			Param::Option(po) if po.notraisepropertyerror && !po.raisepropertyerror => {
				Ok(Some(serde_json::json!({ "propertyerror": err.to_string() })))
			}
			_ => Err(err),
		},
		Err(err) => Err(err),
	}
}

fn todict(opt: &OptionDef, value: Value) -> Value {
	serde_json::json!({ "name": opt.display_name(), "value": value })
}

/// Index a self reference is evaluated at
fn calc_index(whole: Option<bool>, index: Option<Index>, same_leadership: bool) -> Option<Index> {
	let index = index?;
	if whole.unwrap_or(!same_leadership) { None } else { Some(index) }
}

async fn resolve_param(
	param: &Param,
	bag: &OptionBag,
	orig_value: Option<&Value>,
	leadership_must_have_index: bool,
) -> ClResult<Resolved> {
	match param {
		Param::Value(value) => Ok(Resolved::Value(value.clone())),
		Param::Index => Ok(Resolved::Value(bag.index.map_or(Value::Null, Value::from))),
		Param::Suffix => match &bag.dyn_path {
			Some(dyn_path) => Ok(Resolved::Value(Value::from(&*dyn_path.suffix))),
			None => Err(Error::config(format!(
				"option \"{}\" is not in a dynamic group, a suffix parameter cannot be used",
				bag.path
			))),
		},
		Param::SelfOption { whole, todict: to_dict } => {
			let opt = bag.option()?.clone();
			if leadership_must_have_index && opt.leadership.is_some() && bag.index.is_none() {
				return Ok(Resolved::Skip);
			}
			let is_follower = opt.is_follower();
			let apply_index = calc_index(*whole, bag.index, is_follower);
			let value = match orig_value {
				Some(value) if !(apply_index.is_none() && is_follower) => match apply_index {
					Some(idx) if !is_follower => value.get(idx).cloned().unwrap_or(Value::Null),
					_ => value.clone(),
				},
				_ => {
					let sub_bag = option_bag_for(
						bag,
						opt.clone(),
						bag.path.clone(),
						bag.dyn_path.clone(),
						apply_index,
						true,
					)
					.await?;
					let mut value = get_value(bag, &sub_bag, None).await?;
					if let (None, true, Some(orig), Some(idx)) = (apply_index, is_follower, orig_value, bag.index) {
						if let Some(slot) = value.as_array_mut().and_then(|list| list.get_mut(idx)) {
							*slot = orig.clone();
						}
					}
					value
				}
			};
			Ok(Resolved::Value(if *to_dict { todict(&opt, value) } else { value }))
		}
		Param::Option(po) => {
			let target = bag.context().schema.option(&po.path)?;
			if leadership_must_have_index && target.leadership.is_some() && bag.index.is_none() {
				return Ok(Resolved::Skip);
			}
			let same_leadership = bag.index.is_some()
				&& !po.whole
				&& target.leadership.is_some()
				&& bag.opt().is_some_and(|opt| opt.leadership() == target.leadership());
			let (index, with_index) = match (same_leadership, target.is_leader()) {
				(true, true) => (None, bag.index),
				(true, false) => (bag.index, None),
				(false, _) => (None, None),
			};
			let (path, dyn_path) = bag.locate(&target)?;
			let sub_bag = option_bag_for(bag, target.clone(), path, dyn_path, index, false).await?;
			let mut value = get_value(bag, &sub_bag, Some(po)).await?;
			if let Some(idx) = with_index {
				value = value.get(idx).cloned().unwrap_or(Value::Null);
			}
			Ok(Resolved::Value(if po.todict { todict(&target, value) } else { value }))
		}
	}
}

/// Build the bag used to read an option referenced by a calculation
async fn option_bag_for(
	bag: &OptionBag,
	opt: Arc<OptionDef>,
	path: Box<str>,
	dyn_path: Option<DynPath>,
	index: Option<Index>,
	self_calc: bool,
) -> ClResult<OptionBag> {
	let mut config_bag = bag.config_bag.clone();
	config_bag.properties = config_bag.true_properties.clone();
	config_bag.remove_warnings();
	config_bag.set_permissive();
	if self_calc {
		config_bag.unrestraint();
		config_bag.remove_validation();
	}
	let mut sub_bag = OptionBag::new(NodeRef::Option(opt), path, index, dyn_path, config_bag);
	sub_bag.properties =
		sub_bag.context().settings.get_properties(&sub_bag, !self_calc).await?;
	Ok(sub_bag)
}

async fn get_value(bag: &OptionBag, sub_bag: &OptionBag, param: Option<&ParamOption>) -> ClResult<Value> {
	match sub_bag.context().getattr(sub_bag).await {
		Ok(value) => Ok(value),
		Err(err @ Error::PropertiesOptionError { .. }) => {
			if param.is_some_and(|p| p.notraisepropertyerror || p.raisepropertyerror) {
				Err(err)
			} else {
				Err(Error::config(format!(
					"unable to carry out a calculation for \"{}\", {}",
					bag.path, err
				)))
			}
		}
		Err(Error::ValueError { message, .. }) => Err(Error::ValueError {
			path: bag.path.clone(),
			index: bag.index,
			message: format!(
				"the option \"{}\" is used in a calculation but is invalid ({})",
				sub_bag.path, message
			),
		}),
		Err(err) => Err(err),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_calc_index() {
		// Follower reading itself keeps its index unless asked for the whole list
		assert_eq!(calc_index(None, Some(2), true), Some(2));
		assert_eq!(calc_index(Some(true), Some(2), true), None);
		// Outside a leadership the whole value is used by default
		assert_eq!(calc_index(None, Some(2), false), None);
		assert_eq!(calc_index(Some(false), Some(2), false), Some(2));
		assert_eq!(calc_index(None, None, true), None);
	}

	#[test]
	fn test_calc_args_accessors() {
		let mut args = CalcArgs::default();
		args.args.push(Value::from(1));
		args.kwargs.insert("x".into(), Value::from("y"));
		assert_eq!(args.arg(0), &Value::from(1));
		assert_eq!(args.arg(3), &Value::Null);
		assert_eq!(args.kwarg("x"), &Value::from("y"));
		assert!(CalcArgs::is_property_error(&serde_json::json!({"propertyerror": "x"})));
	}
}

// vim: ts=4
