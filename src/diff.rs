//! Computes [`Patch`]es between two virtual trees.
//!
//! Each sibling list is walked once, left to right. `node_index` counts live nodes of the new list
//! placed so far, `moved_offset` is how far earlier moves, insertions and removals have shifted the
//! old live list, and their difference is the live position every emitted change refers to.
//!
//! Changes are collected front to back, so a list's changes are applied right to left and never
//! disturb the positions of the changes applied after them.

use crate::{
	attribute::{Attribute, Handler},
	events::Events,
	patch::{Change, Patch},
	path::Path,
	vnode::{Fragment, KeyedChildren, Mapper, VNode},
};
use core::{convert::TryFrom, slice};
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;
use tracing::{trace, trace_span};

/// The outcome of [`diff`]: an edit script and the event registry matching the new tree.
pub struct Diff<Msg> {
	pub patch: Patch<Msg>,
	pub events: Events<Msg>,
}

/// Computes the [`Patch`] that turns a live tree built from `old` into one built from `new`.
///
/// `events` must be the registry produced alongside `old`. It's ticked, then updated for every
/// binding that was added, removed or re-registered.
///
/// This never fails: any mismatch it can't reconcile more precisely is replaced wholesale.
pub fn diff<Msg: 'static>(events: Events<Msg>, old: &VNode<Msg>, new: &VNode<Msg>) -> Diff<Msg> {
	let span = trace_span!("diff");
	let _enter = span.enter();

	let mut events = events;
	events.tick();
	let mut bindings = Bindings { events, added: Events::new() };

	let no_keys = KeyedChildren::new();
	let root = Path::root();
	let patch = diff_children(
		&mut bindings,
		Siblings {
			old: slice::from_ref(old),
			old_keyed: &no_keys,
			old_index: 0,
			old_path: &root,
			new: slice::from_ref(new),
			new_keyed: &no_keys,
			node_index: 0,
			path: &root,
			mapper: &Mapper::identity(),
		},
		0,
		0,
		VecDeque::new(),
		Vec::new(),
	);
	trace!(changes = patch.changes.len(), children = patch.children.len(), "Diff complete");
	Diff {
		patch,
		events: bindings.finish(),
	}
}

/// The registry while a diff is under way.
///
/// Old bindings are removed at their old paths right away. New ones are only registered once the
/// walk is done, since a shifted sibling's new path may be another one's old path.
struct Bindings<Msg> {
	events: Events<Msg>,
	added: Events<Msg>,
}

impl<Msg: 'static> Bindings<Msg> {
	fn is_controlled(&self, namespace: &str, tag: &str, old_path: &Path) -> bool {
		namespace.is_empty() && matches!(tag, "input" | "select" | "textarea") && self.events.has_dispatched_events(old_path)
	}

	fn add_event(&mut self, mapper: &Mapper<Msg>, path: &Path, name: &str, handler: &Handler<Msg>) {
		self.added.add_event(mapper, path, name, handler);
	}

	fn add_child(&mut self, mapper: &Mapper<Msg>, path: &Path, index: usize, child: &VNode<Msg>) {
		self.added.add_child(mapper, path, index, child);
	}

	fn add_children(&mut self, mapper: &Mapper<Msg>, path: &Path, index: usize, children: &[VNode<Msg>]) {
		self.added.add_children(mapper, path, index, children);
	}

	fn remove_event(&mut self, old_path: &Path, name: &str) {
		self.events.remove_event(old_path, name);
	}

	fn remove_child(&mut self, old_path: &Path, old_index: usize, child: &VNode<Msg>) {
		self.events.remove_child(old_path, old_index, child);
	}

	fn finish(self) -> Events<Msg> {
		let Self { mut events, added } = self;
		events.absorb(added);
		events
	}
}

/// Two sibling lists and where each of them starts.
///
/// `old_index` and `old_path` address the old list in the old tree, which is where its bindings
/// were registered. `node_index` and `path` do the same for the new list.
struct Siblings<'a, Msg> {
	old: &'a [VNode<Msg>],
	old_keyed: &'a KeyedChildren<Msg>,
	old_index: usize,
	old_path: &'a Path,
	new: &'a [VNode<Msg>],
	new_keyed: &'a KeyedChildren<Msg>,
	node_index: usize,
	path: &'a Path,
	mapper: &'a Mapper<Msg>,
}

fn signed(count: usize) -> isize {
	isize::try_from(count).unwrap_or(isize::MAX)
}

/// The live position `node_index` corresponds to in the not yet patched sibling list.
fn position(node_index: usize, moved_offset: isize) -> usize {
	let position = signed(node_index) - moved_offset;
	debug_assert!(position >= 0, "Negative live position: {} - {}", node_index, moved_offset);
	usize::try_from(position).unwrap_or(0)
}

/// Whether `prev`'s live node can be patched into `next` rather than rebuilt.
fn is_compatible<Msg>(prev: &VNode<Msg>, next: &VNode<Msg>) -> bool {
	match (prev, next) {
		(VNode::Element(prev), VNode::Element(next)) => prev.namespace == next.namespace && prev.tag == next.tag,
		(VNode::RawHtml(prev), VNode::RawHtml(next)) => prev.namespace == next.namespace && prev.tag == next.tag,
		(VNode::Text(_), VNode::Text(_)) | (VNode::Fragment(_), VNode::Fragment(_)) => true,
		_ => false,
	}
}

#[allow(clippy::too_many_lines)]
fn diff_children<Msg: 'static>(
	bindings: &mut Bindings<Msg>,
	siblings: Siblings<'_, Msg>,
	mut moved_offset: isize,
	patch_index: usize,
	mut changes: VecDeque<Change<Msg>>,
	mut children: Vec<Patch<Msg>>,
) -> Patch<Msg> {
	let Siblings {
		old: old_list,
		old_keyed,
		old_index,
		old_path,
		mut new,
		new_keyed,
		mut node_index,
		path,
		mapper,
	} = siblings;

	// Each old node is paired with its position in the old tree.
	let mut old = VecDeque::with_capacity(old_list.len());
	let mut old_positions = HashMap::<&str, usize>::new();
	let mut index = old_index;
	for prev in old_list {
		if !prev.key().is_empty() {
			old_positions.insert(prev.key(), index);
		}
		old.push_back((index, prev.clone()));
		index += prev.advance();
	}

	let mut moved = HashSet::<String>::new();
	// Keys whose old node was superseded by a freshly built one.
	let mut dropped = HashSet::<String>::new();
	let mut removed = 0;

	loop {
		let next = match new.first() {
			Some(next) => next,
			None => {
				for (prev_index, prev) in old.drain(..) {
					// Moved nodes live on elsewhere, along with their bindings.
					if prev.key().is_empty() || !moved.contains(prev.key()) {
						removed += prev.advance();
						bindings.remove_child(old_path, prev_index, &prev);
					}
				}
				break;
			}
		};

		let (prev_index, prev) = match old.pop_front() {
			Some(prev) => prev,
			None => {
				bindings.add_children(mapper, path, node_index, new);
				changes.push_front(Change::Insert {
					children: new.to_vec(),
					before: position(node_index, moved_offset),
				});
				break;
			}
		};

		if prev.key() != next.key() {
			let next_did_exist = old_keyed.get(next.key());
			let prev_does_exist = new_keyed.contains_key(prev.key()) && !dropped.contains(prev.key());

			match (prev_does_exist, next_did_exist) {
				// Already moved into place ahead of here.
				(true, Some(_)) if moved.contains(prev.key()) => moved_offset -= signed(prev.advance()),
				(true, Some(matched)) if is_compatible(matched, next) => {
					let count = matched.advance();
					let before = position(node_index, moved_offset);
					let matched_index = old_positions.get(next.key()).copied().unwrap_or(prev_index);
					trace!(key = next.key(), count, "Move");
					moved.insert(next.key().to_owned());

					if let (VNode::Fragment(matched), VNode::Fragment(next_fragment)) = (matched, next) {
						// Its inner changes assume it has already moved, so they run after the move.
						children = diff_fragments(
							bindings,
							matched,
							next_fragment,
							(matched_index, old_path),
							(node_index, path),
							mapper,
							moved_offset,
							&mut changes,
							children,
						);
						changes.push_front(Change::Move {
							key: next.key().to_owned(),
							before,
							count,
						});
						let next_count = next.advance();
						moved_offset += signed(next_count);
						node_index += next_count;
						new = &new[1..];
						old.push_front((prev_index, prev));
					} else {
						changes.push_front(Change::Move {
							key: next.key().to_owned(),
							before,
							count,
						});
						moved_offset += signed(count);
						old.push_front((prev_index, prev));
						old.push_front((matched_index, matched.clone()));
					}
				}
				(true, next_did_exist) => {
					if next_did_exist.is_some() {
						// Changed kind or tag, so the old node goes and a new one is built.
						dropped.insert(next.key().to_owned());
					}
					let count = next.advance();
					changes.push_front(Change::Insert {
						children: vec![next.clone()],
						before: position(node_index, moved_offset),
					});
					bindings.add_child(mapper, path, node_index, next);
					moved_offset += signed(count);
					node_index += count;
					new = &new[1..];
					old.push_front((prev_index, prev));
				}
				(false, Some(_)) => {
					let count = prev.advance();
					if prev.key().is_empty() {
						changes.push_front(Change::Remove {
							from: position(node_index, moved_offset),
							count,
						});
					} else {
						changes.push_front(Change::RemoveKey { key: prev.key().to_owned(), count });
					}
					bindings.remove_child(old_path, prev_index, &prev);
					moved_offset -= signed(count);
				}
				(false, None) => {
					replace(bindings, &mut changes, (prev_index, old_path), (&mut node_index, path), mapper, &mut moved_offset, &prev, next);
					new = &new[1..];
				}
			}
			continue;
		}

		new = &new[1..];
		match (&prev, next) {
			(VNode::Fragment(prev), VNode::Fragment(next)) => {
				children = diff_fragments(bindings, prev, next, (prev_index, old_path), (node_index, path), mapper, moved_offset, &mut changes, children);
				moved_offset += signed(next.children_count) - signed(prev.children_count);
				node_index += 1 + next.children_count;
			}

			(VNode::Element(prev), VNode::Element(next)) if prev.namespace == next.namespace && prev.tag == next.tag => {
				let mapper = mapper.compose(&next.mapper);
				let child_path = path.add(node_index, &next.key);
				let old_child_path = old_path.add(prev_index, &prev.key);
				let controlled = bindings.is_controlled(&next.namespace, &next.tag, &old_child_path);
				let (added, removed_attributes) = diff_attributes(controlled, (&old_child_path, &child_path), &mapper, bindings, &prev.attributes, &next.attributes);

				let mut initial = VecDeque::new();
				if !added.is_empty() || !removed_attributes.is_empty() {
					initial.push_back(Change::Update {
						added,
						removed: removed_attributes,
					});
				}

				let child = diff_children(
					bindings,
					Siblings {
						old: &prev.children,
						old_keyed: &prev.keyed_children,
						old_index: 0,
						old_path: &old_child_path,
						new: &next.children,
						new_keyed: &next.keyed_children,
						node_index: 0,
						path: &child_path,
						mapper: &mapper,
					},
					0,
					node_index,
					initial,
					Vec::new(),
				);
				if !child.is_empty() {
					children.push(child);
				}
				node_index += 1;
			}

			(VNode::Text(prev), VNode::Text(next)) => {
				if prev.content != next.content {
					children.push(Patch::new(node_index, 0, vec![Change::ReplaceText(next.content.clone())], Vec::new()));
				}
				node_index += 1;
			}

			(VNode::RawHtml(prev), VNode::RawHtml(next)) if prev.namespace == next.namespace && prev.tag == next.tag => {
				let mapper = mapper.compose(&next.mapper);
				let child_path = path.add(node_index, &next.key);
				let old_child_path = old_path.add(prev_index, &prev.key);
				let (added, removed_attributes) = diff_attributes(false, (&old_child_path, &child_path), &mapper, bindings, &prev.attributes, &next.attributes);

				let mut raw_changes = Vec::new();
				if prev.inner_html != next.inner_html {
					raw_changes.push(Change::ReplaceInnerHtml(next.inner_html.clone()));
				}
				if !added.is_empty() || !removed_attributes.is_empty() {
					raw_changes.push(Change::Update {
						added,
						removed: removed_attributes,
					});
				}
				if !raw_changes.is_empty() {
					children.push(Patch::new(node_index, 0, raw_changes, Vec::new()));
				}
				node_index += 1;
			}

			_ => replace(bindings, &mut changes, (prev_index, old_path), (&mut node_index, path), mapper, &mut moved_offset, &prev, next),
		}
	}

	Patch::new(patch_index, removed, Vec::from(changes), children)
}
/// Diffs two fragments whose anchors sit at `prev_at` in the old tree and `next_at` in the new one.
///
/// Fragments have no live parent, so their changes join the enclosing list's `changes`. Returns the
/// enclosing list's child patches, with the fragment's own appended.
#[allow(clippy::too_many_arguments)]
fn diff_fragments<Msg: 'static>(
	bindings: &mut Bindings<Msg>,
	prev: &Fragment<Msg>,
	next: &Fragment<Msg>,
	prev_at: (usize, &Path),
	next_at: (usize, &Path),
	mapper: &Mapper<Msg>,
	moved_offset: isize,
	changes: &mut VecDeque<Change<Msg>>,
	children: Vec<Patch<Msg>>,
) -> Vec<Patch<Msg>> {
	let (prev_index, old_path) = prev_at;
	let (node_index, path) = next_at;
	let inner_index = node_index + 1;
	let Patch {
		removed: shrunk,
		changes: inner_changes,
		children,
		..
	} = diff_children(
		bindings,
		Siblings {
			old: &prev.children,
			old_keyed: &prev.keyed_children,
			old_index: prev_index + 1,
			old_path,
			new: &next.children,
			new_keyed: &next.keyed_children,
			node_index: inner_index,
			path,
			mapper: &mapper.compose(&next.mapper),
		},
		moved_offset,
		0,
		VecDeque::new(),
		children,
	);

	if shrunk > 0 {
		changes.push_front(Change::Remove {
			from: position(inner_index + next.children_count, moved_offset),
			count: shrunk,
		});
	}
	for change in inner_changes.into_iter().rev() {
		changes.push_front(change);
	}
	children
}

#[allow(clippy::too_many_arguments)]
fn replace<Msg: 'static>(
	bindings: &mut Bindings<Msg>,
	changes: &mut VecDeque<Change<Msg>>,
	prev_at: (usize, &Path),
	next_at: (&mut usize, &Path),
	mapper: &Mapper<Msg>,
	moved_offset: &mut isize,
	prev: &VNode<Msg>,
	next: &VNode<Msg>,
) {
	let (prev_index, old_path) = prev_at;
	let (node_index, path) = next_at;
	let prev_count = prev.advance();
	let next_count = next.advance();
	changes.push_front(Change::Replace {
		from: position(*node_index, *moved_offset),
		count: prev_count,
		with: next.clone(),
	});
	bindings.remove_child(old_path, prev_index, prev);
	bindings.add_child(mapper, path, *node_index, next);
	*moved_offset += signed(next_count) - signed(prev_count);
	*node_index += next_count;
}

/// Values that live form controls change on their own, so they're re-asserted while controlled.
fn is_synced(name: &str) -> bool {
	matches!(name, "value" | "checked" | "selected")
}

/// Merge-joins two canonical attribute lists into `(added, removed)`.
///
/// Event bindings present in `new` are (re-)registered at the new path along the way. Ones only in
/// `old`, or all of them if the node's path changed, are unregistered at the old path.
fn diff_attributes<Msg: 'static>(
	controlled: bool,
	paths: (&Path, &Path),
	mapper: &Mapper<Msg>,
	bindings: &mut Bindings<Msg>,
	old: &[Attribute<Msg>],
	new: &[Attribute<Msg>],
) -> (Vec<Attribute<Msg>>, Vec<Attribute<Msg>>) {
	let (old_path, path) = paths;
	if old_path != path {
		for attribute in old {
			if let Attribute::Event(binding) = attribute {
				bindings.remove_event(old_path, &binding.name);
			}
		}
	}

	let mut added = Vec::new();
	let mut removed = Vec::new();

	let (mut i, mut j) = (0, 0);
	loop {
		match (old.get(i), new.get(j)) {
			(None, None) => break,

			// Both lists descend by name, so the greater name is the one missing on the other side.
			(Some(prev), next) if next.map_or(true, |next| prev.name() > next.name()) => {
				if let Attribute::Event(binding) = prev {
					bindings.remove_event(old_path, &binding.name);
				}
				removed.push(prev.clone());
				i += 1;
			}
			(prev, Some(next)) if prev.map_or(true, |prev| prev.name() < next.name()) => {
				if let Attribute::Event(binding) = next {
					bindings.add_event(mapper, path, &binding.name, &binding.handler);
				}
				added.push(next.clone());
				j += 1;
			}

			(Some(prev), Some(next)) => {
				match (prev, next) {
					(Attribute::Attribute { name, value: old_value }, Attribute::Attribute { value: new_value, .. }) => {
						if old_value != new_value || (controlled && is_synced(name)) {
							added.push(next.clone());
						}
					}
					(Attribute::Property { name, value: old_value }, Attribute::Property { value: new_value, .. }) => {
						let changed = match name.as_str() {
							"scrollLeft" | "scrollRight" => true,
							name if is_synced(name) => controlled || old_value != new_value,
							_ => old_value != new_value,
						};
						if changed {
							added.push(next.clone());
						}
					}
					(Attribute::Event(old_binding), Attribute::Event(new_binding)) => {
						bindings.add_event(mapper, path, &new_binding.name, &new_binding.handler);
						if !old_binding.same_policy(new_binding) {
							added.push(next.clone());
						}
					}
					(Attribute::Event(old_binding), _) => {
						bindings.remove_event(old_path, &old_binding.name);
						removed.push(prev.clone());
						added.push(next.clone());
					}
					(_, Attribute::Event(new_binding)) => {
						bindings.add_event(mapper, path, &new_binding.name, &new_binding.handler);
						removed.push(prev.clone());
						added.push(next.clone());
					}
					_ => {
						removed.push(prev.clone());
						added.push(next.clone());
					}
				}
				i += 1;
				j += 1;
			}

			(None, Some(_)) | (Some(_), None) => unreachable!("handled by the guarded arms above"),
		}
	}

	(added, removed)
}
