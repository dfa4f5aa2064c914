#![cfg(not(target_arch = "wasm32"))]

use proptest::{collection::vec, prelude::*, sample::subsequence};
use vellum_dom::{
	attribute::{class, on_blur, on_click},
	diff,
	memory::Snapshot,
	path::Path,
	vnode::{element, fragment, keyed, raw_html, text, Mapper},
	Diff, Events, MemoryHost, MemorySurface, Reconciler, VNode,
};

#[derive(Debug, Clone, PartialEq)]
enum Msg {
	Click,
	Blur,
}

const KEYS: &[&str] = &["a", "b", "c", "d", "e"];

/// `(shape, variant)` of one generated node.
type Look = (u8, u8);

fn node(label: &str, (shape, variant): Look) -> VNode<Msg> {
	match shape {
		0 => element("li", vec![class(label)], vec![text(format!("{}{}", label, variant))]),
		1 => {
			let mut attributes = vec![on_click(Msg::Click)];
			if variant > 0 {
				attributes.push(on_blur(Msg::Blur));
			}
			element("p", attributes, vec![text(label)])
		}
		2 => raw_html("", "span", vec![], format!("<b>{}{}</b>", label, variant)),
		_ => fragment((0..=variant).map(|i| element("i", vec![on_click(Msg::Click)], vec![text(format!("{}{}", label, i))])).collect()),
	}
}

fn tree(loose: &[Look], items: &[(&str, Look)]) -> VNode<Msg> {
	element(
		"div",
		vec![],
		vec![
			fragment(loose.iter().enumerate().map(|(i, look)| node(&i.to_string(), *look)).collect()),
			keyed::element("ul", vec![], items.iter().map(|(key, look)| ((*key).to_owned(), node(key, *look))).collect()),
			element("button", vec![on_click(Msg::Click)], vec![]),
		],
	)
}

fn look() -> impl Strategy<Value = Look> {
	(0_u8..4, 0_u8..3)
}

fn side() -> impl Strategy<Value = (Vec<Look>, Vec<(&'static str, Look)>)> {
	(vec(look(), 0..4), subsequence(KEYS.to_vec(), 0..=KEYS.len()).prop_shuffle(), vec(look(), KEYS.len()))
		.prop_map(|(loose, keys, looks)| (loose, keys.into_iter().zip(looks).collect()))
}

fn mounted(vnode: &VNode<Msg>) -> Reconciler<MemorySurface> {
	let mut surface = MemorySurface::new();
	let root = surface.create_root();
	let mut reconciler = Reconciler::new(surface, root);
	reconciler.mount(vnode);
	reconciler
}

fn snapshot(reconciler: &Reconciler<MemorySurface>) -> Option<Snapshot> {
	reconciler.surface().snapshot(*reconciler.root())
}

fn registered(vnode: &VNode<Msg>) -> Events<Msg> {
	let mut events = Events::new();
	events.add_child(&Mapper::identity(), &Path::root(), 0, vnode);
	events
}

proptest! {
	#[test]
	fn patching_matches_a_fresh_mount((old_loose, old_items) in side(), (new_loose, new_items) in side()) {
		let old = tree(&old_loose, &old_items);
		let new = tree(&new_loose, &new_items);

		let mut patched = mounted(&old);
		let Diff { patch, events } = diff(registered(&old), &old, &new);
		patched.push(&mut MemoryHost::new(), patch);

		let fresh = mounted(&new);
		prop_assert_eq!(snapshot(&patched), snapshot(&fresh));
		let expected = registered(&new);
		prop_assert_eq!(events.registered(), expected.registered());
	}
}
