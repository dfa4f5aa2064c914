//! Attributes, properties and event bindings.
//!
//! Every [`VNode`](`crate::VNode`) with attributes stores them in canonical order (see [`canonicalize`]),
//! which lets the differ compare two lists with a single merge-join.

use crate::decode::{self, DecodeError};
use core::fmt::{self, Debug, Formatter};
use serde_json::Value;
use std::rc::Rc;

/// Decodes a raw event payload into a message.
pub type Handler<Msg> = Rc<dyn Fn(&Value) -> Result<Msg, DecodeError>>;

/// Rate limit applied to an event binding before it reaches the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
	NoLimit,
	/// Dispatch only after this many milliseconds without another event.
	Debounce(u32),
	/// Drop events arriving within this many milliseconds of the last dispatched one.
	Throttle(u32),
}

impl Default for Limit {
	fn default() -> Self {
		Self::NoLimit
	}
}

/// Event names that must dispatch synchronously instead of waiting for the next frame.
pub const IMMEDIATE_EVENTS: &[&str] = &["input", "change", "focus", "focusin", "focusout", "blur", "select"];

#[must_use]
pub fn is_immediate_event(name: &str) -> bool {
	IMMEDIATE_EVENTS.contains(&name)
}

pub struct EventBinding<Msg> {
	pub name: String,
	pub handler: Handler<Msg>,
	/// Dotted property paths of the native event the host should copy into the payload.
	pub include: Vec<String>,
	pub prevent_default: bool,
	pub stop_propagation: bool,
	pub immediate: bool,
	pub limit: Limit,
}

impl<Msg> EventBinding<Msg> {
	/// Whether the native-side behaviour of both bindings is the same.
	///
	/// Handlers are closures and can't be compared, so they're re-registered regardless.
	#[must_use]
	pub fn same_policy(&self, other: &Self) -> bool {
		self.prevent_default == other.prevent_default && self.stop_propagation == other.stop_propagation && self.immediate == other.immediate && self.limit == other.limit
	}
}

impl<Msg> Clone for EventBinding<Msg> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			handler: self.handler.clone(),
			include: self.include.clone(),
			prevent_default: self.prevent_default,
			stop_propagation: self.stop_propagation,
			immediate: self.immediate,
			limit: self.limit,
		}
	}
}

impl<Msg> Debug for EventBinding<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventBinding")
			.field("name", &self.name)
			.field("handler", &format_args!("{:p}", Rc::as_ptr(&self.handler)))
			.field("include", &self.include)
			.field("prevent_default", &self.prevent_default)
			.field("stop_propagation", &self.stop_propagation)
			.field("immediate", &self.immediate)
			.field("limit", &self.limit)
			.finish()
	}
}

pub enum Attribute<Msg> {
	/// A plain string attribute.
	Attribute { name: String, value: String },
	/// A value assigned directly on the live node.
	Property { name: String, value: Value },
	Event(EventBinding<Msg>),
}

impl<Msg> Clone for Attribute<Msg> {
	fn clone(&self) -> Self {
		match self {
			Self::Attribute { name, value } => Self::Attribute {
				name: name.clone(),
				value: value.clone(),
			},
			Self::Property { name, value } => Self::Property {
				name: name.clone(),
				value: value.clone(),
			},
			Self::Event(binding) => Self::Event(binding.clone()),
		}
	}
}

impl<Msg> Debug for Attribute<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Attribute { name, value } => f.debug_struct("Attribute").field("name", name).field("value", value).finish(),
			Self::Property { name, value } => f.debug_struct("Property").field("name", name).field("value", value).finish(),
			Self::Event(binding) => binding.fmt(f),
		}
	}
}

impl<Msg> Attribute<Msg> {
	#[must_use]
	pub fn name(&self) -> &str {
		match self {
			Self::Attribute { name, .. } | Self::Property { name, .. } => name,
			Self::Event(binding) => &binding.name,
		}
	}

	#[must_use]
	pub fn is_event(&self) -> bool {
		matches!(self, Self::Event(_))
	}

	fn map_binding(mut self, f: impl FnOnce(&mut EventBinding<Msg>)) -> Self {
		if let Self::Event(binding) = &mut self {
			f(binding);
		}
		self
	}

	/// Calls `preventDefault` on the native event. Has no effect on non-event attributes.
	#[must_use]
	pub fn prevent_default(self) -> Self {
		self.map_binding(|binding| binding.prevent_default = true)
	}

	#[must_use]
	pub fn stop_propagation(self) -> Self {
		self.map_binding(|binding| binding.stop_propagation = true)
	}

	/// Adds dotted property paths of the native event to the decoded payload.
	#[must_use]
	pub fn include<I: IntoIterator<Item = S>, S: Into<String>>(self, properties: I) -> Self {
		self.map_binding(|binding| binding.include.extend(properties.into_iter().map(Into::into)))
	}

	#[must_use]
	pub fn debounce(self, delay: u32) -> Self {
		self.map_binding(|binding| binding.limit = Limit::Debounce(delay))
	}

	#[must_use]
	pub fn throttle(self, delay: u32) -> Self {
		self.map_binding(|binding| binding.limit = Limit::Throttle(delay))
	}
}

fn drops_when_empty<Msg>(attribute: &Attribute<Msg>) -> bool {
	matches!(attribute, Attribute::Attribute { name, value } if value.is_empty() && (name == "class" || name == "style"))
}

fn join_into(target: &mut String, addition: &str, separator: char) {
	if !target.ends_with(separator) {
		target.push(separator);
	}
	target.push_str(addition);
}

/// Sorts `attributes` by name, descending, and merges adjacent `class` (space-joined) and
/// `style` (semicolon-joined) attributes. Empty `class` and `style` attributes are dropped.
///
/// The result is a fixed point: canonicalizing it again changes nothing.
#[must_use]
pub fn canonicalize<Msg>(attributes: Vec<Attribute<Msg>>) -> Vec<Attribute<Msg>> {
	let mut attributes: Vec<_> = attributes.into_iter().filter(|attribute| !drops_when_empty(attribute)).collect();
	// Stable, so repeated `class`es keep their written order.
	attributes.sort_by(|a, b| b.name().cmp(a.name()));

	let mut merged: Vec<Attribute<Msg>> = Vec::with_capacity(attributes.len());
	for attribute in attributes {
		if let Attribute::Attribute { name, value } = &attribute {
			if let Some(Attribute::Attribute {
				name: last_name,
				value: last_value,
			}) = merged.last_mut()
			{
				if last_name == name {
					match name.as_str() {
						"class" => {
							join_into(last_value, value, ' ');
							continue;
						}
						"style" => {
							join_into(last_value, value, ';');
							continue;
						}
						_ => (),
					}
				}
			}
		}
		merged.push(attribute);
	}
	merged
}

pub fn attribute<Msg>(name: impl Into<String>, value: impl Into<String>) -> Attribute<Msg> {
	Attribute::Attribute {
		name: name.into(),
		value: value.into(),
	}
}

pub fn property<Msg>(name: impl Into<String>, value: impl Into<Value>) -> Attribute<Msg> {
	Attribute::Property {
		name: name.into(),
		value: value.into(),
	}
}

/// Present as an empty attribute when `on`, otherwise forced off through the property.
pub fn boolean_attribute<Msg>(name: impl Into<String>, on: bool) -> Attribute<Msg> {
	if on {
		attribute(name, "")
	} else {
		property(name, false)
	}
}

pub fn class<Msg>(name: impl Into<String>) -> Attribute<Msg> {
	attribute("class", name)
}

/// Joins the names whose flag is set into a single `class`.
pub fn classes<'a, Msg>(names: impl IntoIterator<Item = (&'a str, bool)>) -> Attribute<Msg> {
	let names: Vec<&str> = names.into_iter().filter_map(|(name, on)| if on { Some(name) } else { None }).collect();
	class(names.join(" "))
}

pub fn style<Msg>(property: &str, value: &str) -> Attribute<Msg> {
	if property.is_empty() || value.is_empty() {
		class("")
	} else {
		attribute("style", format!("{}:{};", property, value))
	}
}

pub fn id<Msg>(id: impl Into<String>) -> Attribute<Msg> {
	attribute("id", id)
}

pub fn value<Msg>(value: impl Into<String>) -> Attribute<Msg> {
	attribute("value", value)
}

pub fn checked<Msg>(on: bool) -> Attribute<Msg> {
	boolean_attribute("checked", on)
}

pub fn selected<Msg>(on: bool) -> Attribute<Msg> {
	boolean_attribute("selected", on)
}

pub fn disabled<Msg>(on: bool) -> Attribute<Msg> {
	boolean_attribute("disabled", on)
}

pub fn placeholder<Msg>(text: impl Into<String>) -> Attribute<Msg> {
	attribute("placeholder", text)
}

pub fn href<Msg>(url: impl Into<String>) -> Attribute<Msg> {
	attribute("href", url)
}

pub fn src<Msg>(url: impl Into<String>) -> Attribute<Msg> {
	attribute("src", url)
}

pub fn for_<Msg>(id: impl Into<String>) -> Attribute<Msg> {
	attribute("for", id)
}

pub fn type_<Msg>(name: impl Into<String>) -> Attribute<Msg> {
	attribute("type", name)
}

/// Binds `handler` to events called `name`.
///
/// Whether the binding dispatches synchronously is derived from the name, see [`IMMEDIATE_EVENTS`].
pub fn on<Msg>(name: impl Into<String>, handler: Handler<Msg>) -> Attribute<Msg> {
	let name = name.into();
	Attribute::Event(EventBinding {
		immediate: is_immediate_event(&name),
		name,
		handler,
		include: Vec::new(),
		prevent_default: false,
		stop_propagation: false,
		limit: Limit::NoLimit,
	})
}

pub fn on_click<Msg: Clone + 'static>(message: Msg) -> Attribute<Msg> {
	on("click", decode::success(message))
}

pub fn on_submit<Msg: Clone + 'static>(message: Msg) -> Attribute<Msg> {
	on("submit", decode::success(message)).prevent_default()
}

pub fn on_focus<Msg: Clone + 'static>(message: Msg) -> Attribute<Msg> {
	on("focus", decode::success(message))
}

pub fn on_blur<Msg: Clone + 'static>(message: Msg) -> Attribute<Msg> {
	on("blur", decode::success(message))
}

/// Reads `target.value`.
pub fn on_input<Msg: 'static>(to_message: impl Fn(String) -> Msg + 'static) -> Attribute<Msg> {
	on("input", decode::handler(move |event| decode::string_at(event, &["target", "value"]).map(&to_message)))
}

/// Reads `target.value`.
pub fn on_change<Msg: 'static>(to_message: impl Fn(String) -> Msg + 'static) -> Attribute<Msg> {
	on("change", decode::handler(move |event| decode::string_at(event, &["target", "value"]).map(&to_message)))
}

/// Reads `target.checked` from `change` events.
pub fn on_check<Msg: 'static>(to_message: impl Fn(bool) -> Msg + 'static) -> Attribute<Msg> {
	on("change", decode::handler(move |event| decode::bool_at(event, &["target", "checked"]).map(&to_message)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn names(attributes: &[Attribute<()>]) -> Vec<&str> {
		attributes.iter().map(Attribute::name).collect()
	}

	#[test]
	fn sorted_descending() {
		let canonical = canonicalize::<()>(vec![id("x"), attribute("alt", "y"), property("value", 1)]);
		assert_eq!(names(&canonical), ["value", "id", "alt"]);
	}

	#[test]
	fn classes_merge_in_written_order() {
		let canonical = canonicalize::<()>(vec![class("a"), id("x"), class("b")]);
		match &canonical[..] {
			[Attribute::Attribute { name: id_name, .. }, Attribute::Attribute { name, value }] => {
				assert_eq!(id_name, "id");
				assert_eq!(name, "class");
				assert_eq!(value, "a b");
			}
			other => panic!("unexpected canonical list: {:?}", other),
		}
	}

	#[test]
	fn styles_merge_and_empties_drop() {
		let canonical = canonicalize::<()>(vec![style("color", "red"), class(""), style("", "x"), style("margin", "0")]);
		match &canonical[..] {
			[Attribute::Attribute { name, value }] => {
				assert_eq!(name, "style");
				assert_eq!(value, "color:red;margin:0;");
			}
			other => panic!("unexpected canonical list: {:?}", other),
		}
	}

	#[test]
	fn fixed_point() {
		let once = canonicalize::<()>(vec![class("a"), class("b"), style("color", "red"), id("x"), on_click(())]);
		let twice = canonicalize(once.clone());
		assert_eq!(format!("{:?}", once), format!("{:?}", twice));
	}

	#[test]
	fn immediacy_follows_name() {
		assert!(matches!(on_input::<String>(|v| v), Attribute::Event(EventBinding { immediate: true, .. })));
		assert!(matches!(on_click(()), Attribute::Event(EventBinding { immediate: false, .. })));
	}
}
