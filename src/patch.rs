//! Edit scripts produced by [`diff`](`crate::diff::diff`) and consumed by the [`Reconciler`](`crate::Reconciler`).

use crate::{attribute::Attribute, vnode::VNode};
use core::fmt::{self, Debug, Formatter};

/// Edits to the children (and own content) of one live node.
pub struct Patch<Msg> {
	/// Position of the patched node among its live siblings, once the parent's changes are applied.
	pub index: usize,
	/// Number of trailing live children to remove after [`changes`](`Patch::changes`).
	pub removed: usize,
	/// In application order.
	pub changes: Vec<Change<Msg>>,
	pub children: Vec<Patch<Msg>>,
}

impl<Msg> Patch<Msg> {
	#[must_use]
	pub fn new(index: usize, removed: usize, changes: Vec<Change<Msg>>, children: Vec<Patch<Msg>>) -> Self {
		Self { index, removed, changes, children }
	}

	/// Whether applying this patch would do nothing at all.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.removed == 0 && self.changes.is_empty() && self.children.is_empty()
	}

	/// Visits this patch and all nested ones, depth first.
	pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
		visit(self);
		for child in &self.children {
			child.walk(visit);
		}
	}
}

impl<Msg> Debug for Patch<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Patch")
			.field("index", &self.index)
			.field("removed", &self.removed)
			.field("changes", &self.changes)
			.field("children", &self.children)
			.finish()
	}
}

pub enum Change<Msg> {
	ReplaceText(String),
	ReplaceInnerHtml(String),
	Update { added: Vec<Attribute<Msg>>, removed: Vec<Attribute<Msg>> },
	/// Moves the live node registered under `key` and its `count - 1` following siblings before the
	/// child currently at `before`.
	Move { key: String, before: usize, count: usize },
	RemoveKey { key: String, count: usize },
	Replace { from: usize, count: usize, with: VNode<Msg> },
	Insert { children: Vec<VNode<Msg>>, before: usize },
	Remove { from: usize, count: usize },
}

impl<Msg> Change<Msg> {
	/// Shifts top-level positions by `offset`, for trees mounted after foreign siblings.
	pub(crate) fn offset(&mut self, offset: usize) {
		match self {
			Self::Move { before, .. } | Self::Insert { before, .. } => *before += offset,
			Self::Replace { from, .. } | Self::Remove { from, .. } => *from += offset,
			Self::ReplaceText(_) | Self::ReplaceInnerHtml(_) | Self::Update { .. } | Self::RemoveKey { .. } => (),
		}
	}
}

impl<Msg> Debug for Change<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::ReplaceText(content) => f.debug_tuple("ReplaceText").field(content).finish(),
			Self::ReplaceInnerHtml(html) => f.debug_tuple("ReplaceInnerHtml").field(html).finish(),
			Self::Update { added, removed } => f.debug_struct("Update").field("added", added).field("removed", removed).finish(),
			Self::Move { key, before, count } => f.debug_struct("Move").field("key", key).field("before", before).field("count", count).finish(),
			Self::RemoveKey { key, count } => f.debug_struct("RemoveKey").field("key", key).field("count", count).finish(),
			Self::Replace { from, count, with } => f.debug_struct("Replace").field("from", from).field("count", count).field("with", with).finish(),
			Self::Insert { children, before } => f.debug_struct("Insert").field("children", children).field("before", before).finish(),
			Self::Remove { from, count } => f.debug_struct("Remove").field("from", from).field("count", count).finish(),
		}
	}
}
