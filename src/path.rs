//! Addresses of tree locations, used as event registry keys.
//!
//! A path is a persistent linked list from a node up to the root. Its string form joins the
//! segments with separators that can't appear in rendered indices, so the same string can be
//! recomputed from the live tree when a native event fires.

use core::fmt::{self, Display, Formatter};
use std::rc::Rc;

pub const SEPARATOR_INDEX: char = '\n';
pub const SEPARATOR_KEY: char = '\t';
pub const SEPARATOR_EVENT: char = '\u{c}';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
	Key(String, Path),
	Index(usize, Path),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path(Option<Rc<Segment>>);

impl Path {
	#[must_use]
	pub fn root() -> Self {
		Self(None)
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.0.is_none()
	}

	/// The path of a child at `index` (or with `key`, if not empty) below `self`.
	#[must_use]
	pub fn add(&self, index: usize, key: &str) -> Self {
		let segment = if key.is_empty() {
			Segment::Index(index, self.clone())
		} else {
			Segment::Key(key.to_owned(), self.clone())
		};
		Self(Some(Rc::new(segment)))
	}

	/// The registry key of events called `name` at this path.
	#[must_use]
	pub fn event_key(&self, name: &str) -> String {
		event_key(&self.to_string(), name)
	}

	/// Whether this path is any of the `candidates` or lies below one of them.
	#[must_use]
	pub fn matches(&self, candidates: &[String]) -> bool {
		if candidates.is_empty() {
			return false;
		}
		let path = self.to_string();
		candidates.iter().any(|candidate| match path.strip_prefix(candidate.as_str()) {
			Some(rest) => rest.is_empty() || rest.starts_with(&[SEPARATOR_INDEX, SEPARATOR_KEY][..]),
			None => false,
		})
	}
}

/// Joins an already serialised path and an event name.
#[must_use]
pub fn event_key(path: &str, name: &str) -> String {
	let mut key = String::with_capacity(path.len() + 1 + name.len());
	key.push_str(path);
	key.push(SEPARATOR_EVENT);
	key.push_str(name);
	key
}

impl Display for Path {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut segments = Vec::new();
		let mut current = self;
		while let Some(segment) = &current.0 {
			segments.push(segment.as_ref());
			current = match segment.as_ref() {
				Segment::Key(_, parent) | Segment::Index(_, parent) => parent,
			};
		}

		for (i, segment) in segments.into_iter().rev().enumerate() {
			match segment {
				Segment::Key(key, _) => {
					if i > 0 {
						write!(f, "{}", SEPARATOR_KEY)?;
					}
					f.write_str(key)?;
				}
				Segment::Index(index, _) => {
					if i > 0 {
						write!(f, "{}", SEPARATOR_INDEX)?;
					}
					write!(f, "{}", index)?;
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serialisation() {
		let path = Path::root().add(0, "").add(3, "row-7").add(1, "");
		assert_eq!(path.to_string(), "0\trow-7\n1");
		assert_eq!(path.event_key("click"), "0\trow-7\n1\u{c}click");
		assert_eq!(Path::root().to_string(), "");
	}

	#[test]
	fn prefix_matching() {
		let input = Path::root().add(0, "").add(2, "");
		assert!(input.matches(&["0\n2".to_owned()]));
		assert!(input.matches(&["1".to_owned(), "0".to_owned()]));
		assert!(!input.matches(&["0\n3".to_owned()]));
		assert!(!input.matches(&[]));
	}

	#[test]
	fn prefixes_end_at_segment_boundaries() {
		let tenth = Path::root().add(0, "").add(10, "");
		assert!(!tenth.matches(&["0\n1".to_owned()]));
		assert!(tenth.matches(&["0\n10".to_owned()]));

		let keyed = Path::root().add(0, "").add(4, "row-1").add(0, "");
		assert!(!keyed.matches(&["0\trow".to_owned()]));
		assert!(keyed.matches(&["0\trow-1".to_owned()]));
	}
}
