//! Owners record who last wrote a stored value

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Owner {
	Default,
	User,
	Forced,
	Custom(Box<str>),
}

impl Owner {
	pub fn as_str(&self) -> &str {
		match self {
			Owner::Default => "default",
			Owner::User => "user",
			Owner::Forced => "forced",
			Owner::Custom(name) => name,
		}
	}

	/// `default` and `forced` are managed by the engine only
	pub fn is_reserved(&self) -> bool {
		matches!(self, Owner::Default | Owner::Forced)
	}

	/// Parse an owner name that a caller wants to assign
	pub fn parse_assignable(name: &str) -> ClResult<Owner> {
		if name.is_empty() {
			return Err(Error::config("owner name cannot be empty"));
		}
		let owner = Owner::from(name);
		if owner.is_reserved() {
			return Err(Error::config(format!("set owner \"{}\" is forbidden", owner)));
		}
		Ok(owner)
	}
}

impl From<&str> for Owner {
	fn from(name: &str) -> Self {
		match name {
			"default" => Owner::Default,
			"user" => Owner::User,
			"forced" => Owner::Forced,
			other => Owner::Custom(other.into()),
		}
	}
}

impl From<String> for Owner {
	fn from(name: String) -> Self {
		Owner::from(name.as_str())
	}
}

impl From<Owner> for String {
	fn from(owner: Owner) -> Self {
		owner.as_str().to_string()
	}
}

impl fmt::Display for Owner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}


// vim: ts=4
