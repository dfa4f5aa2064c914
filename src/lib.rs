#![doc(html_root_url = "https://docs.rs/vellum-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A keyed virtual tree differ and reconciler with an Elm-style update loop.
//!
//! [`diff`] compares two [`VNode`] trees and produces a [`Patch`], which a [`Reconciler`] applies to
//! any [`Surface`]. A [`Runtime`] ties both to an [`Application`]'s update and view functions.
//! [`web`] implements all of it in the browser.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod attribute;
pub mod decode;
pub mod diff;
pub mod effect;
pub mod events;
pub mod memory;
pub mod patch;
pub mod path;
pub mod reconciler;
pub mod render;
pub mod runtime;
pub mod surface;
mod virtualize;
pub mod vnode;
pub mod web;

pub use attribute::{Attribute, EventBinding, Limit};
pub use decode::DecodeError;
pub use diff::{diff, Diff};
pub use effect::{Actions, Effect};
pub use events::Events;
pub use memory::{MemoryHost, MemorySurface, NodeId};
pub use patch::{Change, Patch};
pub use reconciler::{Dispatch, EventOutcome, Reconciler};
pub use runtime::{Application, Phase, Runtime};
pub use surface::{FrameId, Host, NodeKind, Surface, TimerId, Timers};
pub use vnode::VNode;

/// Attribute that carries element keys through server-rendered markup.
pub const KEY_ATTRIBUTE: &str = "data-vellum-key";

/// Page content as it may appear in log fields.
#[cfg(feature = "dangerous-logging")]
pub(crate) fn loggable(value: &str) -> &str {
	value
}

#[cfg(not(feature = "dangerous-logging"))]
pub(crate) fn loggable(_value: &str) -> &str {
	"(redacted)"
}
