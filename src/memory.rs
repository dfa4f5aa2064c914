//! An in-memory [`Surface`] and a manually driven [`Host`].
//!
//! Nodes live in an arena and are addressed by index. Nothing is ever freed, which keeps handles
//! unambiguous for the lifetime of the surface.

use crate::{
	render::{escape_attribute, escape_text},
	runtime::{Application, Runtime},
	surface::{FrameId, Host, NodeKind, Surface, TimerId, Timers},
	vnode::is_void_element,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Data {
	Element {
		namespace: String,
		tag: String,
		attributes: Vec<(String, String)>,
		properties: BTreeMap<String, Value>,
		/// Event name → passive.
		listeners: BTreeMap<String, bool>,
		inner_html: Option<String>,
	},
	Text(String),
	Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
	data: Data,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct MemorySurface {
	slots: Vec<Slot>,
	focused: Option<NodeId>,
	playing: BTreeSet<NodeId>,
	moves: usize,
	released: usize,
}

/// A comparable picture of a live subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
	Element {
		namespace: String,
		tag: String,
		attributes: BTreeMap<String, String>,
		properties: BTreeMap<String, Value>,
		listeners: BTreeSet<String>,
		inner_html: Option<String>,
		children: Vec<Snapshot>,
	},
	Text(String),
	Comment(String),
}

impl MemorySurface {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn push(&mut self, data: Data) -> NodeId {
		self.slots.push(Slot {
			data,
			parent: None,
			children: Vec::new(),
		});
		NodeId(self.slots.len() - 1)
	}

	fn slot(&self, node: NodeId) -> Option<&Slot> {
		self.slots.get(node.0)
	}

	fn slot_mut(&mut self, node: NodeId) -> Option<&mut Slot> {
		self.slots.get_mut(node.0)
	}

	/// A detached `<main>` to mount into.
	pub fn create_root(&mut self) -> NodeId {
		self.create_element("", "main")
	}

	pub fn create_comment(&mut self, content: &str) -> NodeId {
		self.push(Data::Comment(content.to_owned()))
	}

	pub fn append(&mut self, parent: NodeId, child: NodeId) {
		self.insert_before(&parent, &child, None);
	}

	fn detach(&mut self, node: NodeId) {
		let parent = match self.slot_mut(node).and_then(|slot| slot.parent.take()) {
			Some(parent) => parent,
			None => return,
		};
		if let Some(parent) = self.slot_mut(parent) {
			parent.children.retain(|child| *child != node);
		}
	}

	fn element_data_mut(&mut self, node: NodeId) -> Option<&mut Data> {
		match self.slot_mut(node) {
			Some(Slot { data: data @ Data::Element { .. }, .. }) => Some(data),
			_ => {
				warn!(?node, "Not an element");
				None
			}
		}
	}

	#[must_use]
	pub fn property(&self, node: NodeId, name: &str) -> Option<&Value> {
		match self.slot(node).map(|slot| &slot.data) {
			Some(Data::Element { properties, .. }) => properties.get(name),
			_ => None,
		}
	}

	/// Names of the native listeners installed on `node`.
	#[must_use]
	pub fn listeners(&self, node: NodeId) -> Vec<String> {
		match self.slot(node).map(|slot| &slot.data) {
			Some(Data::Element { listeners, .. }) => listeners.keys().cloned().collect(),
			_ => Vec::new(),
		}
	}

	#[must_use]
	pub fn is_passive(&self, node: NodeId, name: &str) -> Option<bool> {
		match self.slot(node).map(|slot| &slot.data) {
			Some(Data::Element { listeners, .. }) => listeners.get(name).copied(),
			_ => None,
		}
	}

	#[must_use]
	pub fn focused(&self) -> Option<NodeId> {
		self.focused
	}

	#[must_use]
	pub fn is_playing(&self, node: NodeId) -> bool {
		self.playing.contains(&node)
	}

	/// How often [`move_before`](`Surface::move_before`) was used.
	#[must_use]
	pub fn move_count(&self) -> usize {
		self.moves
	}

	/// How many nodes were [`release`](`Surface::release`)d.
	#[must_use]
	pub fn released_count(&self) -> usize {
		self.released
	}

	/// The first element called `tag` at or below `root`, in document order.
	#[must_use]
	pub fn find(&self, root: NodeId, tag: &str) -> Option<NodeId> {
		self.find_all(root, tag).into_iter().next()
	}

	#[must_use]
	pub fn find_all(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
		let mut found = Vec::new();
		let mut stack = vec![root];
		while let Some(node) = stack.pop() {
			if let Some(slot) = self.slot(node) {
				if matches!(&slot.data, Data::Element { tag: t, .. } if t == tag) {
					found.push(node);
				}
				stack.extend(slot.children.iter().rev().copied());
			}
		}
		found
	}

	/// Concatenated text below `node`.
	#[must_use]
	pub fn text_content(&self, node: NodeId) -> String {
		let mut text = String::new();
		self.collect_text(node, &mut text);
		text
	}

	fn collect_text(&self, node: NodeId, text: &mut String) {
		if let Some(slot) = self.slot(node) {
			if let Data::Text(content) = &slot.data {
				text.push_str(content);
			}
			for child in &slot.children {
				self.collect_text(*child, text);
			}
		}
	}

	#[must_use]
	pub fn snapshot(&self, node: NodeId) -> Option<Snapshot> {
		let slot = self.slot(node)?;
		Some(match &slot.data {
			Data::Element {
				namespace,
				tag,
				attributes,
				properties,
				listeners,
				inner_html,
			} => Snapshot::Element {
				namespace: namespace.clone(),
				tag: tag.clone(),
				attributes: attributes.iter().cloned().collect(),
				properties: properties.clone(),
				listeners: listeners.keys().cloned().collect(),
				inner_html: inner_html.clone(),
				children: slot.children.iter().filter_map(|child| self.snapshot(*child)).collect(),
			},
			Data::Text(content) => Snapshot::Text(content.clone()),
			Data::Comment(content) => Snapshot::Comment(content.clone()),
		})
	}

	/// Markup of `node`'s children, attributes sorted by name.
	#[must_use]
	pub fn inner_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		if let Some(slot) = self.slot(node) {
			match &slot.data {
				Data::Element { inner_html: Some(inner_html), .. } => html.push_str(inner_html),
				_ => {
					for child in &slot.children {
						self.write_html(*child, &mut html);
					}
				}
			}
		}
		html
	}

	#[must_use]
	pub fn outer_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		self.write_html(node, &mut html);
		html
	}

	fn write_html(&self, node: NodeId, html: &mut String) {
		let slot = match self.slot(node) {
			Some(slot) => slot,
			None => return,
		};
		match &slot.data {
			Data::Element { namespace, tag, attributes, .. } => {
				html.push('<');
				html.push_str(tag);
				let mut attributes: Vec<_> = attributes.iter().collect();
				attributes.sort();
				for (name, value) in attributes {
					html.push(' ');
					html.push_str(name);
					html.push_str("=\"");
					html.push_str(&escape_attribute(value));
					html.push('"');
				}
				html.push('>');
				if is_void_element(tag, namespace) {
					return;
				}
				html.push_str(&self.inner_html(node));
				html.push_str("</");
				html.push_str(tag);
				html.push('>');
			}
			Data::Text(content) => html.push_str(&escape_text(content)),
			Data::Comment(content) => {
				html.push_str("<!--");
				html.push_str(content);
				html.push_str("-->");
			}
		}
	}
}

impl Surface for MemorySurface {
	type Node = NodeId;

	fn create_element(&mut self, namespace: &str, tag: &str) -> NodeId {
		self.push(Data::Element {
			namespace: namespace.to_owned(),
			tag: tag.to_owned(),
			attributes: Vec::new(),
			properties: BTreeMap::new(),
			listeners: BTreeMap::new(),
			inner_html: None,
		})
	}

	fn create_text(&mut self, content: &str) -> NodeId {
		self.push(Data::Text(content.to_owned()))
	}

	fn insert_before(&mut self, parent: &NodeId, node: &NodeId, reference: Option<&NodeId>) {
		if reference == Some(node) {
			return;
		}
		self.detach(*node);
		let parent_slot = match self.slot_mut(*parent) {
			Some(slot) => slot,
			None => return warn!(?parent, "Unknown parent"),
		};
		match reference.and_then(|reference| parent_slot.children.iter().position(|child| child == reference)) {
			Some(index) => parent_slot.children.insert(index, *node),
			None => parent_slot.children.push(*node),
		}
		if let Some(slot) = self.slot_mut(*node) {
			slot.parent = Some(*parent);
		}
	}

	fn move_before(&mut self, parent: &NodeId, node: &NodeId, reference: Option<&NodeId>) {
		self.moves += 1;
		self.insert_before(parent, node, reference);
	}

	fn remove_child(&mut self, parent: &NodeId, node: &NodeId) {
		if self.parent(node).as_ref() == Some(parent) {
			self.detach(*node);
		} else {
			warn!(?parent, ?node, "Not a child");
		}
	}

	fn parent(&self, node: &NodeId) -> Option<NodeId> {
		self.slot(*node).and_then(|slot| slot.parent)
	}

	fn children(&self, node: &NodeId) -> Vec<NodeId> {
		self.slot(*node).map(|slot| slot.children.clone()).unwrap_or_default()
	}

	fn child_at(&self, parent: &NodeId, index: usize) -> Option<NodeId> {
		self.slot(*parent).and_then(|slot| slot.children.get(index).copied())
	}

	fn child_count(&self, parent: &NodeId) -> usize {
		self.slot(*parent).map_or(0, |slot| slot.children.len())
	}

	fn next_sibling(&self, node: &NodeId) -> Option<NodeId> {
		let parent = self.parent(node)?;
		let siblings = &self.slot(parent)?.children;
		let index = siblings.iter().position(|sibling| sibling == node)?;
		siblings.get(index + 1).copied()
	}

	fn kind(&self, node: &NodeId) -> NodeKind {
		match self.slot(*node).map(|slot| &slot.data) {
			Some(Data::Element { namespace, tag, .. }) => NodeKind::Element {
				namespace: namespace.clone(),
				tag: tag.clone(),
			},
			Some(Data::Text(content)) => NodeKind::Text(content.clone()),
			Some(Data::Comment(_)) | None => NodeKind::Other,
		}
	}

	fn attributes(&self, node: &NodeId) -> Vec<(String, String)> {
		match self.slot(*node).map(|slot| &slot.data) {
			Some(Data::Element { attributes, .. }) => attributes.clone(),
			_ => Vec::new(),
		}
	}

	fn get_attribute(&self, node: &NodeId, name: &str) -> Option<String> {
		match self.slot(*node).map(|slot| &slot.data) {
			Some(Data::Element { attributes, .. }) => attributes.iter().find(|(n, _)| n == name).map(|(_, value)| value.clone()),
			_ => None,
		}
	}

	fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
		if let Some(Data::Element { attributes, .. }) = self.element_data_mut(*node) {
			match attributes.iter_mut().find(|(n, _)| n == name) {
				Some((_, existing)) => *existing = value.to_owned(),
				None => attributes.push((name.to_owned(), value.to_owned())),
			}
		}
	}

	fn remove_attribute(&mut self, node: &NodeId, name: &str) {
		if let Some(Data::Element { attributes, .. }) = self.element_data_mut(*node) {
			attributes.retain(|(n, _)| n != name);
		}
	}

	fn set_property(&mut self, node: &NodeId, name: &str, value: &Value) {
		if let Some(Data::Element { properties, .. }) = self.element_data_mut(*node) {
			properties.insert(name.to_owned(), value.clone());
		}
	}

	fn set_text(&mut self, node: &NodeId, content: &str) {
		match self.slot_mut(*node) {
			Some(Slot { data: Data::Text(text), .. }) => *text = content.to_owned(),
			_ => warn!(?node, "Not a text node"),
		}
	}

	fn set_inner_html(&mut self, node: &NodeId, html: &str) {
		for child in self.children(node) {
			self.detach(child);
		}
		if let Some(Data::Element { inner_html, .. }) = self.element_data_mut(*node) {
			*inner_html = Some(html.to_owned());
		}
	}

	fn add_event_listener(&mut self, node: &NodeId, name: &str, passive: bool) {
		if let Some(Data::Element { listeners, .. }) = self.element_data_mut(*node) {
			listeners.insert(name.to_owned(), passive);
		}
	}

	fn remove_event_listener(&mut self, node: &NodeId, name: &str) {
		if let Some(Data::Element { listeners, .. }) = self.element_data_mut(*node) {
			listeners.remove(name);
		}
	}

	fn focus(&mut self, node: &NodeId) {
		self.focused = Some(*node);
	}

	fn play(&mut self, node: &NodeId) {
		self.playing.insert(*node);
	}

	fn release(&mut self, node: &NodeId) {
		self.released += 1;
		if self.focused == Some(*node) {
			self.focused = None;
		}
		self.playing.remove(node);
	}
}

/// A [`Host`] whose clock, frames, microtasks and timers only advance when told to.
#[derive(Debug, Default)]
pub struct MemoryHost {
	now: f64,
	next_id: u32,
	frames: Vec<FrameId>,
	microtasks: usize,
	/// With due time.
	timers: Vec<(TimerId, f64)>,
}

impl MemoryHost {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn next_id(&mut self) -> u32 {
		self.next_id += 1;
		self.next_id
	}

	pub fn set_now(&mut self, now: f64) {
		self.now = now;
	}

	#[must_use]
	pub fn pending_frames(&self) -> usize {
		self.frames.len()
	}

	#[must_use]
	pub fn pending_microtasks(&self) -> usize {
		self.microtasks
	}

	#[must_use]
	pub fn pending_timers(&self) -> usize {
		self.timers.len()
	}

	pub fn take_frames(&mut self) -> Vec<FrameId> {
		core::mem::take(&mut self.frames)
	}

	pub fn take_microtasks(&mut self) -> usize {
		core::mem::take(&mut self.microtasks)
	}

	/// Removes and returns the earliest timer due by now, if any.
	pub fn take_due_timer(&mut self) -> Option<TimerId> {
		let now = self.now;
		let (index, _) = self
			.timers
			.iter()
			.enumerate()
			.filter(|(_, (_, due))| *due <= now)
			.min_by(|(_, (a_id, a_due)), (_, (b_id, b_due))| a_due.partial_cmp(b_due).unwrap_or(core::cmp::Ordering::Equal).then(a_id.cmp(b_id)))?;
		Some(self.timers.remove(index).0)
	}
}

impl Timers for MemoryHost {
	fn now(&self) -> f64 {
		self.now
	}

	fn set_timeout(&mut self, delay: u32) -> TimerId {
		let id = TimerId(self.next_id());
		self.timers.push((id, self.now + f64::from(delay)));
		id
	}

	fn clear_timeout(&mut self, id: TimerId) {
		self.timers.retain(|(timer, _)| *timer != id);
	}
}

impl Host for MemoryHost {
	fn request_animation_frame(&mut self) -> FrameId {
		let id = FrameId(self.next_id());
		self.frames.push(id);
		id
	}

	fn cancel_animation_frame(&mut self, id: FrameId) {
		self.frames.retain(|frame| *frame != id);
	}

	fn queue_microtask(&mut self) {
		self.microtasks += 1;
	}
}

impl<A: Application> Runtime<A, MemorySurface, MemoryHost> {
	/// Runs queued microtasks, then pending animation frames, until the host is idle.
	pub fn settle(&mut self) {
		loop {
			let microtasks = self.host_mut().take_microtasks();
			if microtasks > 0 {
				for _ in 0..microtasks {
					self.run_microtask();
				}
				continue;
			}

			let frames = self.host_mut().take_frames();
			if frames.is_empty() {
				break;
			}
			for frame in frames {
				self.animation_frame(frame);
			}
		}
	}

	/// Moves the clock forward by `milliseconds`, firing every timer that comes due in order.
	pub fn advance(&mut self, milliseconds: f64) {
		let now = self.host().now() + milliseconds;
		self.host_mut().set_now(now);
		while let Some(timer) = self.host_mut().take_due_timer() {
			self.timer_fired(timer);
		}
	}
}
