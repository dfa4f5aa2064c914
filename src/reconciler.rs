//! Applies [`Patch`]es to a live tree.
//!
//! The reconciler owns its [`Surface`] and keeps a side table of per-node metadata: the node's key,
//! its keyed children, its event listeners and their rate limiting state. Native events come back
//! in through [`Reconciler::handle_event`], which turns them into [`Dispatch`]es addressed by path.

use crate::{
	attribute::{Attribute, Limit},
	loggable,
	patch::{Change, Patch},
	path::{SEPARATOR_INDEX, SEPARATOR_KEY},
	surface::{Surface, TimerId, Timers},
	vnode::VNode,
};
use core::{
	fmt::{self, Debug, Formatter},
	slice,
};
use hashbrown::HashMap;
use serde_json::Value;
use tracing::{debug, error, trace, trace_span, warn};

#[derive(Debug, Clone)]
struct Listener {
	include: Vec<String>,
	prevent_default: bool,
	stop_propagation: bool,
	immediate: bool,
}

#[derive(Debug, Clone, Copy)]
struct Throttle {
	delay: u32,
	last: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Debounce {
	delay: u32,
	timer: Option<TimerId>,
}

#[derive(Debug)]
pub(crate) struct NodeMeta<N> {
	key: String,
	keyed_children: HashMap<String, N>,
	listeners: HashMap<String, Listener>,
	throttles: HashMap<String, Throttle>,
	debouncers: HashMap<String, Debounce>,
}

impl<N> NodeMeta<N> {
	fn new(key: &str) -> Self {
		Self {
			key: key.to_owned(),
			keyed_children: HashMap::new(),
			listeners: HashMap::new(),
			throttles: HashMap::new(),
			debouncers: HashMap::new(),
		}
	}
}

/// A native event that should be decoded by the event registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
	/// Serialised path of the node the listener is installed on.
	pub path: String,
	pub name: String,
	pub event: Value,
	/// Render synchronously instead of on the next frame.
	pub immediate: bool,
}

/// What the host should do with the native event, and what (if anything) to dispatch right away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutcome {
	pub prevent_default: bool,
	pub stop_propagation: bool,
	pub dispatch: Option<Dispatch>,
}

#[derive(Debug)]
struct Pending<N> {
	node: N,
	name: String,
	dispatch: Dispatch,
}

pub struct Reconciler<S: Surface> {
	surface: S,
	root: S::Node,
	offset: usize,
	meta: HashMap<S::Node, NodeMeta<S::Node>>,
	pending: HashMap<TimerId, Pending<S::Node>>,
}

impl<S: Surface> Debug for Reconciler<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reconciler")
			.field("root", &self.root)
			.field("offset", &self.offset)
			.field("tracked_nodes", &self.meta.len())
			.field("pending_dispatches", &self.pending.len())
			.finish_non_exhaustive()
	}
}

impl<S: Surface> Reconciler<S> {
	/// Manages the children of `root`.
	pub fn new(surface: S, root: S::Node) -> Self {
		let mut meta = HashMap::new();
		meta.insert(root.clone(), NodeMeta::new(""));
		Self {
			surface,
			root,
			offset: 0,
			meta,
			pending: HashMap::new(),
		}
	}

	pub fn surface(&self) -> &S {
		&self.surface
	}

	pub fn surface_mut(&mut self) -> &mut S {
		&mut self.surface
	}

	pub fn root(&self) -> &S::Node {
		&self.root
	}

	pub fn into_surface(self) -> S {
		self.surface
	}

	#[must_use]
	pub fn offset(&self) -> usize {
		self.offset
	}

	/// Skips `offset` leading children of the root that aren't managed by this reconciler.
	pub fn set_offset(&mut self, offset: usize) {
		self.offset = offset;
	}

	/// Appends a live rendition of `vnode` to the root.
	pub fn mount<Msg>(&mut self, vnode: &VNode<Msg>) {
		let span = trace_span!("mount");
		let _enter = span.enter();
		let root = self.root.clone();
		self.insert(&root, slice::from_ref(vnode), usize::MAX);
	}

	/// Applies `patch`, which must have been computed from the tree the live one currently reflects.
	pub fn push<Msg, T: Timers + ?Sized>(&mut self, timers: &mut T, patch: Patch<Msg>) {
		let span = trace_span!("push");
		let _enter = span.enter();

		let mut patch = patch;
		if self.offset > 0 {
			for change in &mut patch.changes {
				change.offset(self.offset);
			}
			for child in &mut patch.children {
				child.index += self.offset;
			}
		}

		let mut stack = vec![(self.root.clone(), patch)];
		while let Some((node, patch)) = stack.pop() {
			let Patch { removed, changes, children, .. } = patch;

			for change in changes {
				self.apply(timers, &node, change);
			}

			if removed > 0 {
				match self.surface.child_count(&node).checked_sub(removed) {
					Some(from) => self.remove(timers, &node, from, removed),
					None => error!(?node, removed, "Fewer live children than trailing removals"),
				}
			}

			for child in children {
				match self.surface.child_at(&node, child.index) {
					Some(live) => stack.push((live, child)),
					None => error!(?node, index = child.index, "Patched child is missing"),
				}
			}
		}
	}

	fn apply<Msg, T: Timers + ?Sized>(&mut self, timers: &mut T, node: &S::Node, change: Change<Msg>) {
		match change {
			Change::Insert { children, before } => {
				trace!(count = children.len(), before, "Insert");
				self.insert(node, &children, before);
			}
			Change::Move { key, before, count } => {
				trace!(key = %key, before, count, "Move");
				self.move_keyed(node, &key, before, count);
			}
			Change::RemoveKey { key, count } => {
				trace!(key = %key, count, "RemoveKey");
				match self.keyed_child(node, &key) {
					Some(child) => self.remove_from(timers, node, child, count),
					None => error!(?node, key = %key, "Keyed child to remove is missing"),
				}
			}
			Change::Remove { from, count } => {
				trace!(from, count, "Remove");
				self.remove(timers, node, from, count);
			}
			Change::Replace { from, count, with } => {
				trace!(from, count, "Replace");
				self.replace(timers, node, from, count, &with);
			}
			Change::ReplaceText(content) => {
				trace!(content = loggable(&content), "ReplaceText");
				self.surface.set_text(node, &content);
			}
			Change::ReplaceInnerHtml(html) => {
				trace!(html = loggable(&html), "ReplaceInnerHtml");
				self.surface.set_inner_html(node, &html);
			}
			Change::Update { added, removed } => {
				trace!(added = added.len(), removed = removed.len(), "Update");
				self.update(timers, node, &added, &removed);
			}
		}
	}

	fn create<Msg>(&mut self, vnode: &VNode<Msg>) -> Vec<S::Node> {
		let mut nodes = Vec::with_capacity(vnode.advance());
		self.create_into(vnode, &mut nodes);
		nodes
	}

	fn create_into<Msg>(&mut self, vnode: &VNode<Msg>, nodes: &mut Vec<S::Node>) {
		match vnode {
			VNode::Element(element) => {
				let node = self.surface.create_element(&element.namespace, &element.tag);
				self.meta.insert(node.clone(), NodeMeta::new(&element.key));
				for attribute in &element.attributes {
					self.create_attribute(&node, attribute);
				}
				self.insert(&node, &element.children, 0);
				nodes.push(node);
			}
			VNode::Text(text) => {
				let node = self.surface.create_text(&text.content);
				self.meta.insert(node.clone(), NodeMeta::new(&text.key));
				nodes.push(node);
			}
			VNode::Fragment(fragment) => {
				let anchor = self.surface.create_fragment_anchor();
				self.meta.insert(anchor.clone(), NodeMeta::new(&fragment.key));
				nodes.push(anchor);
				for child in &fragment.children {
					self.create_into(child, nodes);
				}
			}
			VNode::RawHtml(raw) => {
				let node = self.surface.create_element(&raw.namespace, &raw.tag);
				self.meta.insert(node.clone(), NodeMeta::new(&raw.key));
				for attribute in &raw.attributes {
					self.create_attribute(&node, attribute);
				}
				self.surface.set_inner_html(&node, &raw.inner_html);
				nodes.push(node);
			}
		}
	}

	/// Tracks `node` under `key` without creating anything.
	pub(crate) fn remember(&mut self, node: &S::Node, key: &str) {
		self.meta.insert(node.clone(), NodeMeta::new(key));
	}

	/// Makes `node` findable by its key among `parent`'s children, if it has one.
	pub(crate) fn register_keyed(&mut self, parent: &S::Node, node: &S::Node) {
		let key = match self.meta.get(node) {
			Some(meta) if !meta.key.is_empty() => meta.key.clone(),
			_ => return,
		};
		match self.meta.get_mut(parent) {
			Some(parent_meta) => {
				parent_meta.keyed_children.insert(key, node.clone());
			}
			None => warn!(?parent, "Keyed child below an untracked parent"),
		}
	}

	fn keyed_child(&self, parent: &S::Node, key: &str) -> Option<S::Node> {
		self.meta.get(parent)?.keyed_children.get(key).cloned()
	}

	fn insert<Msg>(&mut self, parent: &S::Node, children: &[VNode<Msg>], before: usize) {
		let reference = self.surface.child_at(parent, before);
		for child in children {
			for node in self.create(child) {
				self.register_keyed(parent, &node);
				self.surface.insert_before(parent, &node, reference.as_ref());
			}
		}
	}

	fn move_keyed(&mut self, parent: &S::Node, key: &str, before: usize, count: usize) {
		let mut node = match self.keyed_child(parent, key) {
			Some(node) => node,
			None => return error!(?parent, key, "Keyed child to move is missing"),
		};
		let reference = self.surface.child_at(parent, before);
		for moved in 0..count {
			let next = self.surface.next_sibling(&node);
			self.surface.move_before(parent, &node, reference.as_ref());
			match next {
				Some(next) => node = next,
				None if moved + 1 < count => return error!(?parent, key, count, "Ran out of siblings to move"),
				None => break,
			}
		}
	}

	fn remove<T: Timers + ?Sized>(&mut self, timers: &mut T, parent: &S::Node, from: usize, count: usize) {
		match self.surface.child_at(parent, from) {
			Some(child) => self.remove_from(timers, parent, child, count),
			None => error!(?parent, from, count, "Child to remove is missing"),
		}
	}

	fn remove_from<T: Timers + ?Sized>(&mut self, timers: &mut T, parent: &S::Node, child: S::Node, count: usize) {
		let mut current = Some(child);
		for _ in 0..count {
			let node = match current.take() {
				Some(node) => node,
				None => return error!(?parent, count, "Ran out of siblings to remove"),
			};
			current = self.surface.next_sibling(&node);

			let key = self.meta.get(&node).map(|meta| meta.key.clone()).unwrap_or_default();
			if !key.is_empty() {
				if let Some(parent_meta) = self.meta.get_mut(parent) {
					if parent_meta.keyed_children.get(&key) == Some(&node) {
						parent_meta.keyed_children.remove(&key);
					}
				}
			}

			self.surface.remove_child(parent, &node);
			self.forget(timers, &node);
		}
	}

	/// Drops all metadata of `node` and its descendants and cancels their pending dispatches.
	fn forget<T: Timers + ?Sized>(&mut self, timers: &mut T, node: &S::Node) {
		let mut stack = vec![node.clone()];
		while let Some(node) = stack.pop() {
			stack.extend(self.surface.children(&node));
			if let Some(meta) = self.meta.remove(&node) {
				for timer in meta.debouncers.values().filter_map(|debounce| debounce.timer) {
					timers.clear_timeout(timer);
					self.pending.remove(&timer);
				}
			}
			self.surface.release(&node);
		}
	}

	fn replace<Msg, T: Timers + ?Sized>(&mut self, timers: &mut T, parent: &S::Node, from: usize, count: usize, with: &VNode<Msg>) {
		self.remove(timers, parent, from, count);
		self.insert(parent, slice::from_ref(with), from);
	}

	fn update<Msg, T: Timers + ?Sized>(&mut self, timers: &mut T, node: &S::Node, added: &[Attribute<Msg>], removed: &[Attribute<Msg>]) {
		for attribute in removed {
			match attribute {
				Attribute::Event(binding) => {
					let name = binding.name.as_str();
					self.surface.remove_event_listener(node, name);
					if let Some(meta) = self.meta.get_mut(node) {
						meta.listeners.remove(name);
						meta.throttles.remove(name);
						if let Some(Debounce { timer: Some(timer), .. }) = meta.debouncers.remove(name) {
							timers.clear_timeout(timer);
							self.pending.remove(&timer);
						}
					}
				}
				Attribute::Attribute { name, .. } | Attribute::Property { name, .. } => {
					self.surface.remove_attribute(node, name);
					if matches!(name.as_str(), "checked" | "selected") {
						self.surface.set_property(node, name, &Value::Bool(false));
					}
				}
			}
		}

		for attribute in added {
			self.create_attribute(node, attribute);
		}
	}

	fn create_attribute<Msg>(&mut self, node: &S::Node, attribute: &Attribute<Msg>) {
		match attribute {
			Attribute::Attribute { name, value } => {
				if self.surface.get_attribute(node, name).as_deref() != Some(value.as_str()) {
					trace!(name = %name, value = loggable(value), "Setting attribute");
					self.surface.set_attribute(node, name, value);
				}
				match name.as_str() {
					"checked" | "selected" => self.surface.set_property(node, name, &Value::Bool(true)),
					"value" => self.surface.set_property(node, name, &Value::String(value.clone())),
					"autofocus" => self.surface.focus(node),
					"autoplay" => self.surface.play(node),
					_ => (),
				}
			}

			Attribute::Property { name, value } => self.surface.set_property(node, name, value),

			Attribute::Event(binding) => {
				let meta = match self.meta.get_mut(node) {
					Some(meta) => meta,
					None => return error!(?node, name = %binding.name, "Binding an event on an untracked node"),
				};
				let name = binding.name.as_str();

				let previous = meta.listeners.insert(
					name.to_owned(),
					Listener {
						include: binding.include.clone(),
						prevent_default: binding.prevent_default,
						stop_propagation: binding.stop_propagation,
						immediate: binding.immediate,
					},
				);
				match previous {
					None => self.surface.add_event_listener(node, name, !binding.prevent_default),
					Some(previous) if previous.prevent_default != binding.prevent_default => {
						self.surface.remove_event_listener(node, name);
						self.surface.add_event_listener(node, name, !binding.prevent_default);
					}
					Some(_) => (),
				}

				// A replaced debouncer's timer may still fire, but won't find anything to dispatch.
				if !matches!(binding.limit, Limit::Debounce(_)) {
					if let Some(Debounce { timer: Some(timer), .. }) = meta.debouncers.remove(name) {
						self.pending.remove(&timer);
					}
				}
				if !matches!(binding.limit, Limit::Throttle(_)) {
					meta.throttles.remove(name);
				}
				match binding.limit {
					Limit::NoLimit => (),
					Limit::Throttle(delay) => {
						meta.throttles.entry(name.to_owned()).and_modify(|throttle| throttle.delay = delay).or_insert(Throttle { delay, last: None });
					}
					Limit::Debounce(delay) => {
						meta.debouncers.entry(name.to_owned()).and_modify(|debounce| debounce.delay = delay).or_insert(Debounce { delay, timer: None });
					}
				}
			}
		}
	}

	/// The serialised path of `node`, as the differ computed it, or [`None`] if it's detached.
	#[must_use]
	pub fn path_of(&self, node: &S::Node) -> Option<String> {
		let mut segments = Vec::new();
		let mut current = node.clone();
		while current != self.root {
			let parent = self.surface.parent(&current)?;
			let key = self.meta.get(&current).map_or("", |meta| meta.key.as_str());
			if key.is_empty() {
				let mut index = self.surface.index_of(&parent, &current)?;
				if parent == self.root {
					index = index.checked_sub(self.offset)?;
				}
				segments.push(format!("{}{}", SEPARATOR_INDEX, index));
			} else {
				segments.push(format!("{}{}", SEPARATOR_KEY, key));
			}
			current = parent;
		}

		let mut path: String = segments.into_iter().rev().collect();
		if !path.is_empty() {
			path.remove(0);
		}
		Some(path)
	}

	/// Reports a native `name` event on `node`.
	///
	/// `payload` is called with the properties the binding wants included, only if the event gets
	/// as far as being dispatched or debounced.
	pub fn handle_event<T: Timers + ?Sized>(&mut self, timers: &mut T, node: &S::Node, name: &str, payload: impl FnOnce(&[String]) -> Value) -> EventOutcome {
		let span = trace_span!("handle_event", name);
		let _enter = span.enter();

		let listener = match self.meta.get(node).and_then(|meta| meta.listeners.get(name)) {
			Some(listener) => listener.clone(),
			None => {
				debug!(?node, "No listener installed");
				return EventOutcome::default();
			}
		};
		let mut outcome = EventOutcome {
			prevent_default: listener.prevent_default,
			stop_propagation: listener.stop_propagation,
			dispatch: None,
		};
		let path = match self.path_of(node) {
			Some(path) => path,
			None => {
				warn!(?node, "Event on a node outside the managed tree");
				return outcome;
			}
		};
		let dispatch = Dispatch {
			path,
			name: name.to_owned(),
			event: payload(&listener.include),
			immediate: listener.immediate,
		};

		if let Some(meta) = self.meta.get_mut(node) {
			if let Some(throttle) = meta.throttles.get_mut(name) {
				let now = timers.now();
				match throttle.last {
					Some(last) if now <= last + f64::from(throttle.delay) => {
						trace!(now, last, "Throttled");
						outcome.prevent_default = true;
						return outcome;
					}
					_ => throttle.last = Some(now),
				}
			} else if let Some(debounce) = meta.debouncers.get_mut(name) {
				if let Some(timer) = debounce.timer.take() {
					timers.clear_timeout(timer);
					self.pending.remove(&timer);
				}
				let timer = timers.set_timeout(debounce.delay);
				debounce.timer = Some(timer);
				trace!(?timer, delay = debounce.delay, "Debounced");
				self.pending.insert(
					timer,
					Pending {
						node: node.clone(),
						name: name.to_owned(),
						dispatch,
					},
				);
				return outcome;
			}
		}

		if dispatch.immediate {
			self.cancel_debounced(timers, node);
		}
		outcome.dispatch = Some(dispatch);
		outcome
	}

	/// Pending debounced dispatches on `node` would arrive after, and overwrite, this newer state.
	fn cancel_debounced<T: Timers + ?Sized>(&mut self, timers: &mut T, node: &S::Node) {
		if let Some(meta) = self.meta.get_mut(node) {
			for debounce in meta.debouncers.values_mut() {
				if let Some(timer) = debounce.timer.take() {
					trace!(?timer, "Cancelling debounced dispatch");
					timers.clear_timeout(timer);
					self.pending.remove(&timer);
				}
			}
		}
	}

	/// The debounced dispatch waiting for `timer`, if it's still wanted.
	pub fn fire_timer(&mut self, timer: TimerId) -> Option<Dispatch> {
		let Pending { node, name, dispatch } = self.pending.remove(&timer)?;
		if let Some(debounce) = self.meta.get_mut(&node).and_then(|meta| meta.debouncers.get_mut(&name)) {
			if debounce.timer == Some(timer) {
				debounce.timer = None;
			}
		}
		Some(dispatch)
	}

	/// Cancels every pending debounced dispatch.
	pub fn clear_timers<T: Timers + ?Sized>(&mut self, timers: &mut T) {
		for (timer, _) in self.pending.drain() {
			timers.clear_timeout(timer);
		}
		for meta in self.meta.values_mut() {
			for debounce in meta.debouncers.values_mut() {
				debounce.timer = None;
			}
		}
	}
}
