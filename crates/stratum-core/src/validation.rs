//! Value validation
//!
//! Validation runs in two passes. The error pass (`check_error`) checks types,
//! uniqueness and regular validators and fails on the first problem. The
//! warnings pass only runs warnings-only validators and never fails.

use crate::bag::OptionBag;
use crate::option::OptionDef;
use crate::prelude::*;

pub(crate) async fn validate(bag: &OptionBag, value: &Value, check_error: bool) -> ClResult<()> {
	let config_bag = &bag.config_bag;
	if check_error && !config_bag.has(&Property::Validator) {
		return Ok(());
	}
	let opt = bag.option()?;
	match validate_shape(bag, opt, value, check_error).await {
		Err(Error::ValueError { message, .. })
			if config_bag.has(&Property::DemotingErrorWarning) =>
		{
			bag.context().push_warning(format!("\"{}\": {}", bag.path, message));
			Ok(())
		}
		res => res,
	}
}

fn invalid(bag: &OptionBag, message: impl Into<String>) -> Error {
	Error::ValueError { path: bag.path.clone(), index: bag.index, message: message.into() }
}

async fn validate_shape(bag: &OptionBag, opt: &OptionDef, value: &Value, check_error: bool) -> ClResult<()> {
	if !opt.is_multi() {
		return validate_item(bag, opt, value, value, None, check_error).await;
	}
	if let Some(index) = bag.index {
		if !opt.is_submulti() {
			return validate_item(bag, opt, value, value, Some(index), check_error).await;
		}
		let Some(items) = value.as_array() else {
			return Err(invalid(bag, format!("\"{}\" which must be a list", display_value(value))));
		};
		if check_error {
			check_unique(bag, items)?;
		}
		for item in items {
			validate_item(bag, opt, value, item, Some(index), check_error).await?;
		}
		return Ok(());
	}
	let Some(items) = value.as_array() else {
		return Err(invalid(bag, format!("\"{}\" which must be a list", display_value(value))));
	};
	if opt.is_submulti() {
		for (idx, list) in items.iter().enumerate() {
			let Some(sub_items) = list.as_array() else {
				return Err(invalid(
					bag,
					format!("\"{}\" which \"{}\" must be a list of list", display_value(value), list),
				));
			};
			if check_error {
				check_unique(bag, sub_items)?;
			}
			for item in sub_items {
				validate_item(bag, opt, value, item, Some(idx), check_error).await?;
			}
		}
	} else {
		if check_error {
			check_unique(bag, items)?;
		}
		for (idx, item) in items.iter().enumerate() {
			validate_item(bag, opt, value, item, Some(idx), check_error).await?;
		}
	}
	Ok(())
}

fn check_unique(bag: &OptionBag, items: &[Value]) -> ClResult<()> {
	if !bag.has(&Property::Unique) {
		return Ok(());
	}
	for (idx, item) in items.iter().enumerate() {
		if items[idx + 1..].contains(item) {
			return Err(invalid(bag, format!("the value \"{}\" is not unique", display_value(item))));
		}
	}
	Ok(())
}

async fn validate_item(
	bag: &OptionBag,
	opt: &OptionDef,
	whole: &Value,
	item: &Value,
	index: Option<Index>,
	check_error: bool,
) -> ClResult<()> {
	if item.is_null() {
		return Ok(());
	}
	if item.is_array() && !opt.is_submulti() {
		return Err(invalid(bag, format!("\"{}\" which must not be a list", item)));
	}
	if check_error {
		if let Err(msg) = opt.typ.validate(item) {
			return Err(invalid(
				bag,
				format!("\"{}\" is an invalid {} for \"{}\", {}", display_value(item), opt.typ.name(), opt.display_name(), msg),
			));
		}
	}

	for validator in &opt.validators {
		let warnings_only = validator.warnings_only || opt.warnings_only;
		if check_error == warnings_only {
			continue;
		}
		let sub_bag = if index == bag.index {
			bag.clone()
		} else {
			let mut sub_bag = bag.at_index(index);
			sub_bag.properties = bag.properties.clone();
			sub_bag
		};
		match validator.execute(&sub_bag, true, Some(whole), true).await {
			Ok(_) => {}
			Err(Error::ValueWarning { message, .. }) => {
				bag.context().push_warning(warning(opt, item, &message));
			}
			Err(Error::ValueError { message, .. }) if warnings_only => {
				bag.context().push_warning(warning(opt, item, &message));
			}
			Err(Error::ValueError { message, .. }) => {
				return Err(invalid(
					bag,
					format!(
						"\"{}\" is an invalid {} for \"{}\", {}",
						display_value(item),
						opt.typ.name(),
						opt.display_name(),
						message
					),
				));
			}
			Err(err) => return Err(err),
		}
	}
	Ok(())
}

fn warning(opt: &OptionDef, item: &Value, message: &str) -> String {
	format!(
		"attention, \"{}\" could be an invalid {} for \"{}\", {}",
		display_value(item),
		opt.typ.name(),
		opt.display_name(),
		message
	)
}

// vim: ts=4
