//! Adoption of pre-existing (for example server-rendered) markup.

use crate::{
	attribute::Attribute,
	loggable,
	reconciler::Reconciler,
	surface::{NodeKind, Surface},
	vnode::{advanced, fragment, none, text, KeyedChildren, VNode},
	KEY_ATTRIBUTE,
};
use tracing::{debug, trace, trace_span};

impl<S: Surface> Reconciler<S> {
	/// Reads the root's current children (after the [offset](`Reconciler::set_offset`)) into a
	/// virtual tree and starts tracking them, so that the first diff can patch them in place.
	///
	/// Keys are read from (and removed as) [`KEY_ATTRIBUTE`]. Nodes other than elements and text
	/// can't be represented and are removed from the live tree. An empty root gets a single empty
	/// text node, and several children are adopted as a fragment with a freshly inserted anchor.
	pub fn virtualize<Msg: 'static>(&mut self) -> VNode<Msg> {
		let span = trace_span!("virtualize");
		let _enter = span.enter();

		let root = self.root().clone();
		let live: Vec<_> = self.surface().children(&root).into_iter().skip(self.offset()).collect();
		let mut children = self.virtualize_children(&root, live);

		match children.len() {
			0 => {
				debug!("Nothing to adopt");
				let placeholder = self.surface_mut().create_text("");
				self.surface_mut().insert_before(&root, &placeholder, None);
				self.remember(&placeholder, "");
				none()
			}
			1 => children.remove(0),
			count => {
				debug!(count, "Adopting several children as a fragment");
				let first = self.surface().child_at(&root, self.offset());
				let anchor = self.surface_mut().create_fragment_anchor();
				self.surface_mut().insert_before(&root, &anchor, first.as_ref());
				self.remember(&anchor, "");
				fragment(children)
			}
		}
	}

	fn virtualize_children<Msg: 'static>(&mut self, parent: &S::Node, live: Vec<S::Node>) -> Vec<VNode<Msg>> {
		let mut children = Vec::with_capacity(live.len());
		for node in live {
			match self.surface().kind(&node) {
				NodeKind::Element { namespace, tag } => {
					let key = self.surface().get_attribute(&node, KEY_ATTRIBUTE).unwrap_or_default();
					if !key.is_empty() {
						self.surface_mut().remove_attribute(&node, KEY_ATTRIBUTE);
					}
					trace!(tag = %tag, key = %key, "Adopting element");

					let attributes = self
						.surface()
						.attributes(&node)
						.into_iter()
						.filter(|(name, _)| name != KEY_ATTRIBUTE)
						.map(|(name, value)| Attribute::Attribute { name, value })
						.collect();

					self.remember(&node, &key);
					let grandchildren = self.surface().children(&node);
					let element_children = self.virtualize_children(&node, grandchildren);
					let keyed_children: KeyedChildren<Msg> = element_children.iter().filter(|child| !child.key().is_empty()).map(|child| (child.key().to_owned(), child.clone())).collect();

					let element = advanced(namespace, tag, attributes, element_children, keyed_children, false);
					children.push(if key.is_empty() { element } else { element.with_key(&key) });
					self.register_keyed(parent, &node);
				}
				NodeKind::Text(content) => {
					trace!(content = loggable(&content), "Adopting text");
					self.remember(&node, "");
					children.push(text(content));
				}
				NodeKind::Other => {
					trace!(?node, "Removing node that can't be adopted");
					self.surface_mut().remove_child(parent, &node);
				}
			}
		}
		children
	}
}
