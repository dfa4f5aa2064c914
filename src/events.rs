//! The event registry: which handler answers an event at which path.
//!
//! It's rebuilt incrementally by the differ and consulted whenever the reconciler reports a native
//! event. It also remembers where events happened during the previous cycle, which is how form
//! controls are recognised as controlled.

use crate::{
	attribute::{Attribute, Handler},
	decode::DecodeError,
	path::{self, Path},
	vnode::{Mapper, VNode},
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, trace};

pub struct Events<Msg> {
	handlers: HashMap<String, Handler<Msg>>,
	dispatched_paths: Vec<String>,
	next_dispatched_paths: Vec<String>,
}

impl<Msg> Default for Events<Msg> {
	fn default() -> Self {
		Self {
			handlers: HashMap::new(),
			dispatched_paths: Vec::new(),
			next_dispatched_paths: Vec::new(),
		}
	}
}

impl<Msg> Debug for Events<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Events")
			.field("handlers", &self.handlers.keys().collect::<Vec<_>>())
			.field("dispatched_paths", &self.dispatched_paths)
			.field("next_dispatched_paths", &self.next_dispatched_paths)
			.finish()
	}
}

impl<Msg> Events<Msg> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts a new cycle: paths that dispatched since the last tick become the reference for
	/// [`has_dispatched_events`](`Events::has_dispatched_events`).
	pub fn tick(&mut self) {
		self.dispatched_paths = core::mem::take(&mut self.next_dispatched_paths);
	}

	pub fn remove_event(&mut self, path: &Path, name: &str) {
		self.handlers.remove(&path.event_key(name));
	}

	/// Whether an event was dispatched at or below `path` during the previous cycle.
	#[must_use]
	pub fn has_dispatched_events(&self, path: &Path) -> bool {
		path.matches(&self.dispatched_paths)
	}

	#[must_use]
	pub fn handler_count(&self) -> usize {
		self.handlers.len()
	}

	/// The registry keys of all handlers, sorted.
	#[must_use]
	pub fn registered(&self) -> Vec<&str> {
		let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
		keys.sort_unstable();
		keys
	}

	/// Takes over every handler of `other`, replacing same-key ones.
	pub(crate) fn absorb(&mut self, other: Self) {
		self.handlers.extend(other.handlers);
	}

	#[must_use]
	pub fn contains(&self, path: &Path, name: &str) -> bool {
		self.handlers.contains_key(&path.event_key(name))
	}

	/// Decodes `event` with the handler registered for `name` at `path`.
	///
	/// The path is recorded as having dispatched whether or not decoding succeeds.
	///
	/// # Errors
	///
	/// Iff no handler is registered there or the handler rejects the payload.
	pub fn handle(&mut self, path: &str, name: &str, event: &Value) -> Result<Msg, DecodeError> {
		self.next_dispatched_paths.push(path.to_owned());
		match self.handlers.get(&path::event_key(path, name)) {
			Some(handler) => {
				let result = handler(event);
				if let Err(error) = &result {
					debug!(path, name, %error, "Event payload rejected");
				}
				result
			}
			None => {
				debug!(path, name, "No handler registered");
				Err(DecodeError::NoHandler {
					path: path.to_owned(),
					name: name.to_owned(),
				})
			}
		}
	}
}

impl<Msg: 'static> Events<Msg> {
	/// Registers `handler` for `name` at `path`, with `mapper` applied to its messages.
	pub fn add_event(&mut self, mapper: &Mapper<Msg>, path: &Path, name: &str, handler: &Handler<Msg>) {
		let handler = if mapper.is_identity() {
			handler.clone()
		} else {
			let (mapper, handler) = (mapper.clone(), handler.clone());
			Rc::new(move |event: &Value| handler(event).map(|message| mapper.apply(message))) as Handler<Msg>
		};
		self.handlers.insert(path.event_key(name), handler);
	}

	/// Registers every binding of `child` and its descendants.
	///
	/// `index` is the child's position among its live siblings below `parent`.
	pub fn add_child(&mut self, mapper: &Mapper<Msg>, parent: &Path, index: usize, child: &VNode<Msg>) {
		match child {
			VNode::Element(element) => {
				let mapper = mapper.compose(&element.mapper);
				let path = parent.add(index, &element.key);
				self.add_attributes(&mapper, &path, &element.attributes);
				self.add_children(&mapper, &path, 0, &element.children);
			}
			VNode::Fragment(fragment) => {
				let mapper = mapper.compose(&fragment.mapper);
				self.add_children(&mapper, parent, index + 1, &fragment.children);
			}
			VNode::RawHtml(raw) => {
				let mapper = mapper.compose(&raw.mapper);
				let path = parent.add(index, &raw.key);
				self.add_attributes(&mapper, &path, &raw.attributes);
			}
			VNode::Text(_) => (),
		}
	}

	/// Registers consecutive siblings, the first of them at `index`.
	pub fn add_children(&mut self, mapper: &Mapper<Msg>, parent: &Path, index: usize, children: &[VNode<Msg>]) {
		let mut index = index;
		for child in children {
			self.add_child(mapper, parent, index, child);
			index += child.advance();
		}
	}

	fn add_attributes(&mut self, mapper: &Mapper<Msg>, path: &Path, attributes: &[Attribute<Msg>]) {
		for attribute in attributes {
			if let Attribute::Event(binding) = attribute {
				trace!(name = %binding.name, path = %path, "Registering handler");
				self.add_event(mapper, path, &binding.name, &binding.handler);
			}
		}
	}

	/// Removes every binding of `child` and its descendants.
	pub fn remove_child(&mut self, parent: &Path, index: usize, child: &VNode<Msg>) {
		match child {
			VNode::Element(element) => {
				let path = parent.add(index, &element.key);
				self.remove_attributes(&path, &element.attributes);
				self.remove_children(&path, 0, &element.children);
			}
			VNode::Fragment(fragment) => self.remove_children(parent, index + 1, &fragment.children),
			VNode::RawHtml(raw) => {
				let path = parent.add(index, &raw.key);
				self.remove_attributes(&path, &raw.attributes);
			}
			VNode::Text(_) => (),
		}
	}

	fn remove_children(&mut self, parent: &Path, index: usize, children: &[VNode<Msg>]) {
		let mut index = index;
		for child in children {
			self.remove_child(parent, index, child);
			index += child.advance();
		}
	}

	fn remove_attributes(&mut self, path: &Path, attributes: &[Attribute<Msg>]) {
		for attribute in attributes {
			if let Attribute::Event(binding) = attribute {
				self.remove_event(path, &binding.name);
			}
		}
	}
}
