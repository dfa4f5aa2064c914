//! The virtual tree.
//!
//! [`VNode`]s are immutable and cheap to clone: every variant is reference-counted, so patches and
//! keyed indices can share subtrees with the tree they were built from.

use crate::attribute::{canonicalize, Attribute};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use std::rc::Rc;

pub type KeyedChildren<Msg> = HashMap<String, VNode<Msg>>;

/// Message transformation applied to everything a subtree's handlers produce.
pub struct Mapper<Msg>(Option<Rc<dyn Fn(Msg) -> Msg>>);

impl<Msg> Clone for Mapper<Msg> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<Msg> Default for Mapper<Msg> {
	fn default() -> Self {
		Self::identity()
	}
}

impl<Msg> Debug for Mapper<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.0 {
			None => f.write_str("Mapper(identity)"),
			Some(mapper) => write!(f, "Mapper({:p})", Rc::as_ptr(mapper)),
		}
	}
}

impl<Msg: 'static> Mapper<Msg> {
	pub fn new(f: impl Fn(Msg) -> Msg + 'static) -> Self {
		Self(Some(Rc::new(f)))
	}

	/// `self` applied after `child`.
	#[must_use]
	pub fn compose(&self, child: &Self) -> Self {
		match (&self.0, &child.0) {
			(_, None) => self.clone(),
			(None, Some(_)) => child.clone(),
			(Some(parent), Some(child)) => {
				let (parent, child) = (parent.clone(), child.clone());
				Self(Some(Rc::new(move |message| parent(child(message)))))
			}
		}
	}
}

impl<Msg> Mapper<Msg> {
	#[must_use]
	pub fn identity() -> Self {
		Self(None)
	}

	#[must_use]
	pub fn is_identity(&self) -> bool {
		self.0.is_none()
	}

	pub fn apply(&self, message: Msg) -> Msg {
		match &self.0 {
			None => message,
			Some(mapper) => mapper(message),
		}
	}
}

pub struct Fragment<Msg> {
	pub key: String,
	pub mapper: Mapper<Msg>,
	pub children: Vec<VNode<Msg>>,
	pub keyed_children: KeyedChildren<Msg>,
	/// Number of live nodes the children occupy, anchors of nested fragments included.
	pub children_count: usize,
}

pub struct Element<Msg> {
	pub key: String,
	pub mapper: Mapper<Msg>,
	/// Empty for HTML.
	pub namespace: String,
	pub tag: String,
	/// Canonical, see [`canonicalize`].
	pub attributes: Vec<Attribute<Msg>>,
	pub children: Vec<VNode<Msg>>,
	pub keyed_children: KeyedChildren<Msg>,
	pub self_closing: bool,
	pub void: bool,
}

pub struct Text<Msg> {
	pub key: String,
	pub mapper: Mapper<Msg>,
	pub content: String,
}

/// An element whose children are opaque markup, compared only by equality.
pub struct RawHtml<Msg> {
	pub key: String,
	pub mapper: Mapper<Msg>,
	pub namespace: String,
	pub tag: String,
	pub attributes: Vec<Attribute<Msg>>,
	pub inner_html: String,
}

pub enum VNode<Msg> {
	Fragment(Rc<Fragment<Msg>>),
	Element(Rc<Element<Msg>>),
	Text(Rc<Text<Msg>>),
	RawHtml(Rc<RawHtml<Msg>>),
}

impl<Msg> Clone for VNode<Msg> {
	fn clone(&self) -> Self {
		match self {
			Self::Fragment(fragment) => Self::Fragment(fragment.clone()),
			Self::Element(element) => Self::Element(element.clone()),
			Self::Text(text) => Self::Text(text.clone()),
			Self::RawHtml(raw) => Self::RawHtml(raw.clone()),
		}
	}
}

impl<Msg> Debug for VNode<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Fragment(fragment) => f.debug_struct("Fragment").field("key", &fragment.key).field("children", &fragment.children).finish(),
			Self::Element(element) => f
				.debug_struct("Element")
				.field("key", &element.key)
				.field("namespace", &element.namespace)
				.field("tag", &element.tag)
				.field("attributes", &element.attributes)
				.field("children", &element.children)
				.finish(),
			Self::Text(text) => f.debug_struct("Text").field("key", &text.key).field("content", &text.content).finish(),
			Self::RawHtml(raw) => f
				.debug_struct("RawHtml")
				.field("key", &raw.key)
				.field("tag", &raw.tag)
				.field("inner_html", &raw.inner_html)
				.finish(),
		}
	}
}

impl<Msg> VNode<Msg> {
	#[must_use]
	pub fn key(&self) -> &str {
		match self {
			Self::Fragment(fragment) => &fragment.key,
			Self::Element(element) => &element.key,
			Self::Text(text) => &text.key,
			Self::RawHtml(raw) => &raw.key,
		}
	}

	#[must_use]
	pub fn mapper(&self) -> &Mapper<Msg> {
		match self {
			Self::Fragment(fragment) => &fragment.mapper,
			Self::Element(element) => &element.mapper,
			Self::Text(text) => &text.mapper,
			Self::RawHtml(raw) => &raw.mapper,
		}
	}

	/// How many live siblings this node occupies.
	///
	/// A fragment places an empty anchor text node before its children.
	#[must_use]
	pub fn advance(&self) -> usize {
		match self {
			Self::Fragment(fragment) => 1 + fragment.children_count,
			Self::Element(_) | Self::Text(_) | Self::RawHtml(_) => 1,
		}
	}
}

impl<Msg: 'static> VNode<Msg> {
	/// Composes `f` onto every message this subtree's handlers produce.
	#[must_use]
	pub fn map(self, f: impl Fn(Msg) -> Msg + 'static) -> Self {
		let mapper = Mapper::new(f).compose(self.mapper());
		self.with_mapper(mapper)
	}

	fn with_mapper(self, mapper: Mapper<Msg>) -> Self {
		match self {
			Self::Fragment(fragment) => Self::Fragment(Rc::new(Fragment {
				mapper,
				key: fragment.key.clone(),
				children: fragment.children.clone(),
				keyed_children: fragment.keyed_children.clone(),
				children_count: fragment.children_count,
			})),
			Self::Element(element) => Self::Element(Rc::new(Element {
				mapper,
				key: element.key.clone(),
				namespace: element.namespace.clone(),
				tag: element.tag.clone(),
				attributes: element.attributes.clone(),
				children: element.children.clone(),
				keyed_children: element.keyed_children.clone(),
				self_closing: element.self_closing,
				void: element.void,
			})),
			Self::Text(text) => Self::Text(Rc::new(Text {
				mapper,
				key: text.key.clone(),
				content: text.content.clone(),
			})),
			Self::RawHtml(raw) => Self::RawHtml(Rc::new(RawHtml {
				mapper,
				key: raw.key.clone(),
				namespace: raw.namespace.clone(),
				tag: raw.tag.clone(),
				attributes: raw.attributes.clone(),
				inner_html: raw.inner_html.clone(),
			})),
		}
	}

	/// Re-keys this node. A fragment's children are re-keyed below it, see [`keyed`].
	#[must_use]
	pub fn with_key(self, key: &str) -> Self {
		match self {
			Self::Fragment(fragment) => {
				let (children, keyed_children) = if key.is_empty() {
					(fragment.children.clone(), fragment.keyed_children.clone())
				} else {
					fragment_children_with_key(key, &fragment.children)
				};
				Self::Fragment(Rc::new(Fragment {
					key: key.to_owned(),
					mapper: fragment.mapper.clone(),
					children,
					keyed_children,
					children_count: fragment.children_count,
				}))
			}
			Self::Element(element) => Self::Element(Rc::new(Element {
				key: key.to_owned(),
				mapper: element.mapper.clone(),
				namespace: element.namespace.clone(),
				tag: element.tag.clone(),
				attributes: element.attributes.clone(),
				children: element.children.clone(),
				keyed_children: element.keyed_children.clone(),
				self_closing: element.self_closing,
				void: element.void,
			})),
			Self::Text(text) => Self::Text(Rc::new(Text {
				key: key.to_owned(),
				mapper: text.mapper.clone(),
				content: text.content.clone(),
			})),
			Self::RawHtml(raw) => Self::RawHtml(Rc::new(RawHtml {
				key: key.to_owned(),
				mapper: raw.mapper.clone(),
				namespace: raw.namespace.clone(),
				tag: raw.tag.clone(),
				attributes: raw.attributes.clone(),
				inner_html: raw.inner_html.clone(),
			})),
		}
	}
}

/// Scopes a keyed fragment's children under its key, so they stay unique among its siblings.
fn fragment_children_with_key<Msg: 'static>(key: &str, children: &[VNode<Msg>]) -> (Vec<VNode<Msg>>, KeyedChildren<Msg>) {
	let mut keyed_children = KeyedChildren::new();
	let children = children
		.iter()
		.enumerate()
		.map(|(index, child)| match child {
			VNode::Fragment(_) if child.key().is_empty() => child.clone().with_key(&format!("{}::{}", key, index)),
			_ if !child.key().is_empty() => {
				let child_key = format!("{}::{}", key, child.key());
				let child = child.clone().with_key(&child_key);
				keyed_children.insert(child_key, child.clone());
				child
			}
			_ => child.clone(),
		})
		.collect();
	(children, keyed_children)
}

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

#[must_use]
pub fn is_void_element(tag: &str, namespace: &str) -> bool {
	namespace.is_empty() && VOID_ELEMENTS.contains(&tag)
}

pub fn element<Msg>(tag: impl Into<String>, attributes: Vec<Attribute<Msg>>, children: Vec<VNode<Msg>>) -> VNode<Msg> {
	namespaced("", tag, attributes, children)
}

pub fn namespaced<Msg>(namespace: impl Into<String>, tag: impl Into<String>, attributes: Vec<Attribute<Msg>>, children: Vec<VNode<Msg>>) -> VNode<Msg> {
	advanced(namespace, tag, attributes, children, KeyedChildren::new(), false)
}

/// Full control over an element's construction.
pub fn advanced<Msg>(
	namespace: impl Into<String>,
	tag: impl Into<String>,
	attributes: Vec<Attribute<Msg>>,
	children: Vec<VNode<Msg>>,
	keyed_children: KeyedChildren<Msg>,
	self_closing: bool,
) -> VNode<Msg> {
	let namespace = namespace.into();
	let tag = tag.into();
	VNode::Element(Rc::new(Element {
		key: String::new(),
		mapper: Mapper::identity(),
		void: is_void_element(&tag, &namespace),
		namespace,
		tag,
		attributes: canonicalize(attributes),
		children,
		keyed_children,
		self_closing,
	}))
}

pub fn text<Msg>(content: impl Into<String>) -> VNode<Msg> {
	VNode::Text(Rc::new(Text {
		key: String::new(),
		mapper: Mapper::identity(),
		content: content.into(),
	}))
}

/// Renders nothing. It still occupies one (empty) live text node.
pub fn none<Msg>() -> VNode<Msg> {
	text("")
}

pub fn fragment<Msg>(children: Vec<VNode<Msg>>) -> VNode<Msg> {
	VNode::Fragment(Rc::new(Fragment {
		key: String::new(),
		mapper: Mapper::identity(),
		children_count: children.iter().map(VNode::advance).sum(),
		children,
		keyed_children: KeyedChildren::new(),
	}))
}

/// An element whose content is set as markup and never diffed structurally.
pub fn raw_html<Msg>(namespace: impl Into<String>, tag: impl Into<String>, attributes: Vec<Attribute<Msg>>, inner_html: impl Into<String>) -> VNode<Msg> {
	VNode::RawHtml(Rc::new(RawHtml {
		key: String::new(),
		mapper: Mapper::identity(),
		namespace: namespace.into(),
		tag: tag.into(),
		attributes: canonicalize(attributes),
		inner_html: inner_html.into(),
	}))
}

/// Builders whose children carry keys, so that reordering them produces moves instead of rebuilds.
pub mod keyed {
	use super::{advanced, KeyedChildren, VNode};
	use crate::attribute::Attribute;

	fn split<Msg: 'static>(children: Vec<(String, VNode<Msg>)>) -> (Vec<VNode<Msg>>, KeyedChildren<Msg>) {
		let mut keyed_children = KeyedChildren::with_capacity(children.len());
		let children = children
			.into_iter()
			.map(|(key, child)| {
				let child = child.with_key(&key);
				if !key.is_empty() {
					keyed_children.insert(key, child.clone());
				}
				child
			})
			.collect();
		(children, keyed_children)
	}

	pub fn element<Msg: 'static>(tag: impl Into<String>, attributes: Vec<Attribute<Msg>>, children: Vec<(String, VNode<Msg>)>) -> VNode<Msg> {
		namespaced("", tag, attributes, children)
	}

	pub fn namespaced<Msg: 'static>(namespace: impl Into<String>, tag: impl Into<String>, attributes: Vec<Attribute<Msg>>, children: Vec<(String, VNode<Msg>)>) -> VNode<Msg> {
		let (children, keyed_children) = split(children);
		advanced(namespace, tag, attributes, children, keyed_children, false)
	}

	pub fn fragment<Msg: 'static>(children: Vec<(String, VNode<Msg>)>) -> VNode<Msg> {
		let (children, keyed_children) = split(children);
		match super::fragment(children) {
			VNode::Fragment(mut fragment) => {
				if let Some(fragment) = std::rc::Rc::get_mut(&mut fragment) {
					fragment.keyed_children = keyed_children;
				}
				VNode::Fragment(fragment)
			}
			other => other,
		}
	}
}
