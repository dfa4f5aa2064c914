//! What the reconciler and runtime need from the world they run in.

use core::{fmt::Debug, hash::Hash};
use serde_json::Value;

/// What a live node is, as far as [`virtualize`](`crate::Reconciler::virtualize`) is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	/// `namespace` is empty for HTML.
	Element { namespace: String, tag: String },
	Text(String),
	/// Comments, processing instructions and anything else that can't be represented.
	Other,
}

/// A mutable output tree.
///
/// Handles are cheap identifiers of live nodes; the reconciler keeps its own per-node metadata in a
/// side table keyed by them.
pub trait Surface {
	type Node: Clone + Eq + Hash + Debug;

	fn create_element(&mut self, namespace: &str, tag: &str) -> Self::Node;
	fn create_text(&mut self, content: &str) -> Self::Node;

	/// The live placeholder in front of a fragment's children.
	fn create_fragment_anchor(&mut self) -> Self::Node {
		self.create_text("")
	}

	/// Inserts (or relocates) `node` before `reference`, or at the end if there is none.
	fn insert_before(&mut self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>);

	/// Like [`insert_before`](`Surface::insert_before`), but for a node that's already attached and
	/// should keep its live state (focus, playback, …) where the surface can manage that.
	fn move_before(&mut self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>) {
		self.insert_before(parent, node, reference);
	}

	fn remove_child(&mut self, parent: &Self::Node, node: &Self::Node);

	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
	fn child_at(&self, parent: &Self::Node, index: usize) -> Option<Self::Node>;
	fn child_count(&self, parent: &Self::Node) -> usize;
	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

	fn index_of(&self, parent: &Self::Node, node: &Self::Node) -> Option<usize> {
		self.children(parent).iter().position(|child| child == node)
	}

	fn kind(&self, node: &Self::Node) -> NodeKind;

	/// All attributes of an element, in live order.
	fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;
	fn get_attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
	fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&mut self, node: &Self::Node, name: &str);
	fn set_property(&mut self, node: &Self::Node, name: &str, value: &Value);

	fn set_text(&mut self, node: &Self::Node, content: &str);
	fn set_inner_html(&mut self, node: &Self::Node, html: &str);

	/// Installs the native listener for `name` on `node`.
	///
	/// The host is expected to report matching events through
	/// [`Reconciler::handle_event`](`crate::Reconciler::handle_event`).
	fn add_event_listener(&mut self, node: &Self::Node, name: &str, passive: bool);
	fn remove_event_listener(&mut self, node: &Self::Node, name: &str);

	fn focus(&mut self, _node: &Self::Node) {}
	fn play(&mut self, _node: &Self::Node) {}

	/// Called once for each node (descendants included) the reconciler removed and forgot.
	fn release(&mut self, _node: &Self::Node) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

/// Wall clock and one-shot timers, used for debouncing and throttling.
pub trait Timers {
	/// Milliseconds, from any fixed origin.
	fn now(&self) -> f64;

	/// The host must call [`Runtime::timer_fired`](`crate::Runtime::timer_fired`) with the returned
	/// id after `delay` milliseconds, unless it's cleared first.
	fn set_timeout(&mut self, delay: u32) -> TimerId;
	fn clear_timeout(&mut self, id: TimerId);
}

/// Scheduling primitives of the host the [`Runtime`](`crate::Runtime`) runs in.
pub trait Host: Timers {
	/// The host must call [`Runtime::animation_frame`](`crate::Runtime::animation_frame`) with the
	/// returned id before its next paint, unless it's cancelled first.
	fn request_animation_frame(&mut self) -> FrameId;
	fn cancel_animation_frame(&mut self, id: FrameId);

	/// The host must call [`Runtime::run_microtask`](`crate::Runtime::run_microtask`) once per call,
	/// after the current task and before painting.
	fn queue_microtask(&mut self);
}
