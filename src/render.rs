//! Static HTML rendering of virtual trees.

use crate::{
	attribute::Attribute,
	vnode::{VNode, RawHtml},
	KEY_ATTRIBUTE,
};
use std::fmt::Write as _;

#[must_use]
pub fn escape_text(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			c => escaped.push(c),
		}
	}
	escaped
}

#[must_use]
pub fn escape_attribute(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'"' => escaped.push_str("&quot;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			c => escaped.push(c),
		}
	}
	escaped
}

/// Serialises `vnode` as markup that [`virtualize`](`crate::Reconciler::virtualize`) can adopt.
///
/// Properties and event bindings have no markup representation and are left out. Keys are written
/// to [`KEY_ATTRIBUTE`]. Fragments contribute only their children.
#[must_use]
pub fn to_html<Msg>(vnode: &VNode<Msg>) -> String {
	let mut html = String::new();
	write_node(vnode, &mut html);
	html
}

fn write_node<Msg>(vnode: &VNode<Msg>, html: &mut String) {
	match vnode {
		VNode::Fragment(fragment) => {
			for child in &fragment.children {
				write_node(child, html);
			}
		}
		VNode::Text(text) => html.push_str(&escape_text(&text.content)),
		VNode::Element(element) => {
			write_open_tag(&element.tag, &element.key, &element.attributes, html);
			if element.void {
				html.push('>');
			} else if element.self_closing && element.children.is_empty() {
				html.push_str("/>");
			} else {
				html.push('>');
				for child in &element.children {
					write_node(child, html);
				}
				write_close_tag(&element.tag, html);
			}
		}
		VNode::RawHtml(raw) => {
			let RawHtml { tag, key, attributes, inner_html, .. } = &**raw;
			write_open_tag(tag, key, attributes, html);
			html.push('>');
			html.push_str(inner_html);
			write_close_tag(tag, html);
		}
	}
}

fn write_open_tag<Msg>(tag: &str, key: &str, attributes: &[Attribute<Msg>], html: &mut String) {
	html.push('<');
	html.push_str(tag);
	if !key.is_empty() {
		let _ = write!(html, " {}=\"{}\"", KEY_ATTRIBUTE, escape_attribute(key));
	}
	// Canonical order is descending, markup reads better ascending.
	for attribute in attributes.iter().rev() {
		if let Attribute::Attribute { name, value } = attribute {
			let _ = write!(html, " {}=\"{}\"", name, escape_attribute(value));
		}
	}
}

fn write_close_tag(tag: &str, html: &mut String) {
	html.push_str("</");
	html.push_str(tag);
	html.push('>');
}
