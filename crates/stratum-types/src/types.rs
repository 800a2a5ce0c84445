//! Basic value and addressing types

/// Every option value is carried as JSON. `null` stands for "no value".
pub use serde_json::Value;

/// Position inside a multi-valued option
pub type Index = usize;

/// Renders a value for messages: strings without quotes, everything else as JSON
pub fn display_value(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

// vim: ts=4
