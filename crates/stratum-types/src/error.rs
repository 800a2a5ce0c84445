//! Error type shared by the engine and the storage adapters

use itertools::Itertools;

use crate::property::PropertySet;
use crate::types::Index;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// The option is currently not accessible because of raised properties
	PropertiesOptionError {
		path: Box<str>,
		index: Option<Index>,
		properties: PropertySet,
		help: Vec<String>,
	},
	/// A leader/follower structural invariant is violated
	LeadershipError(String),
	/// Engine misuse or a calculation that failed unexpectedly
	ConfigError(String),
	/// A value was rejected by type or custom validation
	ValueError { path: Box<str>, index: Option<Index>, message: String },
	/// A validation failure demoted to a warning
	ValueWarning { path: Box<str>, message: String },
	IndexError(String),
	NotFound,
	DbError,

	// externals
	Io(std::io::Error),
}

impl Error {
	pub fn config(msg: impl Into<String>) -> Self {
		Self::ConfigError(msg.into())
	}

	pub fn leadership(msg: impl Into<String>) -> Self {
		Self::LeadershipError(msg.into())
	}

	pub fn is_property_error(&self) -> bool {
		matches!(self, Self::PropertiesOptionError { .. })
	}

	/// Property names carried by a `PropertiesOptionError`
	pub fn properties(&self) -> Option<&PropertySet> {
		match self {
			Self::PropertiesOptionError { properties, .. } => Some(properties),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::PropertiesOptionError { path, index, properties, help } => {
				let props = properties.iter().map(|p| format!("\"{}\"", p)).join(", ");
				let noun = if properties.len() > 1 { "properties" } else { "property" };
				match index {
					Some(idx) => write!(
						f,
						"cannot access to option \"{}\" at index {} because has {} {}",
						path, idx, noun, props
					)?,
					None => write!(
						f,
						"cannot access to option \"{}\" because has {} {}",
						path, noun, props
					)?,
				}
				if !help.is_empty() {
					write!(f, " ({})", help.join(", "))?;
				}
				Ok(())
			}
			Error::LeadershipError(msg) => write!(f, "leadership error: {}", msg),
			Error::ConfigError(msg) => write!(f, "config error: {}", msg),
			Error::ValueError { path, index: Some(idx), message } => {
				write!(f, "invalid value for option \"{}\" at index {}: {}", path, idx, message)
			}
			Error::ValueError { path, index: None, message } => {
				write!(f, "invalid value for option \"{}\": {}", path, message)
			}
			Error::ValueWarning { path, message } => {
				write!(f, "warning for option \"{}\": {}", path, message)
			}
			Error::IndexError(msg) => write!(f, "index error: {}", msg),
			Error::NotFound => write!(f, "not found"),
			Error::DbError => write!(f, "database error"),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::property::Property;

	#[test]
	fn test_property_error_display() {
		let err = Error::PropertiesOptionError {
			path: "a.b".into(),
			index: None,
			properties: PropertySet::from_iter([Property::Disabled]),
			help: Vec::new(),
		};
		assert_eq!(
			err.to_string(),
			"cannot access to option \"a.b\" because has property \"disabled\""
		);
		assert!(err.is_property_error());
	}
}

// vim: ts=4
