//! Decoding of raw event payloads.
//!
//! Hosts hand the runtime a [`serde_json::Value`] describing the native event, restricted to the
//! property paths a binding asked to [`include`](`crate::attribute::Attribute::include`).
//! Handlers read what they need from it with the helpers in this module.

use crate::attribute::Handler;
use serde_json::Value;
use std::rc::Rc;
use thiserror::Error;

/// Why an event payload did not produce a message.
///
/// A failed decode is not dispatched, but the attempt still counts as activity at its path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("missing field `{path}`")]
	MissingField { path: String },
	#[error("expected {expected} at `{path}`, found {found}")]
	UnexpectedType {
		expected: &'static str,
		found: &'static str,
		path: String,
	},
	#[error("no handler registered for `{name}` events at {path:?}")]
	NoHandler { path: String, name: String },
	#[error("{0}")]
	Custom(String),
}

fn describe(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

/// Walks `path` through nested objects.
///
/// # Errors
///
/// Iff a segment is missing or the value on the way is not an object.
pub fn field<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, DecodeError> {
	let mut current = value;
	for (depth, segment) in path.iter().enumerate() {
		current = current.get(segment).ok_or_else(|| DecodeError::MissingField { path: path[..=depth].join(".") })?;
	}
	Ok(current)
}

/// # Errors
///
/// Iff the field is missing or not a string.
pub fn string_at(value: &Value, path: &[&str]) -> Result<String, DecodeError> {
	let found = field(value, path)?;
	found.as_str().map(str::to_owned).ok_or_else(|| DecodeError::UnexpectedType {
		expected: "a string",
		found: describe(found),
		path: path.join("."),
	})
}

/// # Errors
///
/// Iff the field is missing or not a boolean.
pub fn bool_at(value: &Value, path: &[&str]) -> Result<bool, DecodeError> {
	let found = field(value, path)?;
	found.as_bool().ok_or_else(|| DecodeError::UnexpectedType {
		expected: "a boolean",
		found: describe(found),
		path: path.join("."),
	})
}

/// # Errors
///
/// Iff the field is missing or not a number.
pub fn f64_at(value: &Value, path: &[&str]) -> Result<f64, DecodeError> {
	let found = field(value, path)?;
	found.as_f64().ok_or_else(|| DecodeError::UnexpectedType {
		expected: "a number",
		found: describe(found),
		path: path.join("."),
	})
}

/// A handler that ignores the payload and always produces `message`.
pub fn success<Msg: Clone + 'static>(message: Msg) -> Handler<Msg> {
	Rc::new(move |_| Ok(message.clone()))
}

/// A handler built from a plain decoding function.
pub fn handler<Msg: 'static>(decode: impl Fn(&Value) -> Result<Msg, DecodeError> + 'static) -> Handler<Msg> {
	Rc::new(decode)
}
