//! Side effects returned from [`Application::update`](`crate::Application::update`).

use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// A deferred side effect. It can dispatch messages through the [`Actions`] it's handed.
pub type Task<Msg> = Box<dyn FnOnce(&mut Actions<Msg>)>;

/// Lets effects feed messages back into the update loop.
///
/// Messages are queued and processed in dispatch order once the effect returns, never re-entrantly.
pub struct Actions<Msg> {
	queued: Vec<(Msg, bool)>,
}

impl<Msg> Debug for Actions<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Actions").field("queued", &self.queued.len()).finish()
	}
}

impl<Msg> Actions<Msg> {
	pub(crate) fn new() -> Self {
		Self { queued: Vec::new() }
	}

	/// Queues `message`. The resulting render waits for the next animation frame.
	pub fn dispatch(&mut self, message: Msg) {
		self.queued.push((message, false));
	}

	/// Queues `message` and renders synchronously once the queue is drained.
	pub fn dispatch_immediate(&mut self, message: Msg) {
		self.queued.push((message, true));
	}

	pub(crate) fn drain(&mut self) -> impl Iterator<Item = (Msg, bool)> + '_ {
		self.queued.drain(..)
	}
}

/// Three ordered batches of [`Task`]s.
///
/// `synchronous` tasks run right after the update that returned them. `before_paint` tasks run as a
/// microtask after the following render, and `after_paint` tasks on the animation frame after that.
pub struct Effect<Msg> {
	pub(crate) synchronous: Vec<Task<Msg>>,
	pub(crate) before_paint: Vec<Task<Msg>>,
	pub(crate) after_paint: Vec<Task<Msg>>,
}

impl<Msg> Default for Effect<Msg> {
	fn default() -> Self {
		Self::none()
	}
}

impl<Msg> Debug for Effect<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Effect")
			.field("synchronous", &self.synchronous.len())
			.field("before_paint", &self.before_paint.len())
			.field("after_paint", &self.after_paint.len())
			.finish()
	}
}

impl<Msg> Effect<Msg> {
	#[must_use]
	pub fn none() -> Self {
		Self {
			synchronous: Vec::new(),
			before_paint: Vec::new(),
			after_paint: Vec::new(),
		}
	}

	#[must_use]
	pub fn is_none(&self) -> bool {
		self.synchronous.is_empty() && self.before_paint.is_empty() && self.after_paint.is_empty()
	}

	/// Concatenates all batches, in order.
	pub fn batch(effects: impl IntoIterator<Item = Self>) -> Self {
		effects.into_iter().fold(Self::none(), |mut batch, effect| {
			batch.synchronous.extend(effect.synchronous);
			batch.before_paint.extend(effect.before_paint);
			batch.after_paint.extend(effect.after_paint);
			batch
		})
	}

	pub(crate) fn from_tasks(synchronous: Vec<Task<Msg>>) -> Self {
		Self {
			synchronous,
			..Self::none()
		}
	}
}

impl<Msg: 'static> Effect<Msg> {
	pub fn from_fn(task: impl FnOnce(&mut Actions<Msg>) + 'static) -> Self {
		Self::from_tasks(vec![Box::new(task)])
	}

	/// Dispatches `message` as soon as the effect runs.
	pub fn message(message: Msg) -> Self {
		Self::from_fn(move |actions| actions.dispatch(message))
	}

	pub fn before_paint(task: impl FnOnce(&mut Actions<Msg>) + 'static) -> Self {
		Self {
			before_paint: vec![Box::new(task)],
			..Self::none()
		}
	}

	pub fn after_paint(task: impl FnOnce(&mut Actions<Msg>) + 'static) -> Self {
		Self {
			after_paint: vec![Box::new(task)],
			..Self::none()
		}
	}

	/// Lifts this effect into a parent application's message type.
	pub fn map<Outer: 'static>(self, f: impl Fn(Msg) -> Outer + 'static) -> Effect<Outer> {
		let f: Rc<dyn Fn(Msg) -> Outer> = Rc::new(f);
		let lift = |tasks: Vec<Task<Msg>>| -> Vec<Task<Outer>> {
			tasks
				.into_iter()
				.map(|task| {
					let f = f.clone();
					Box::new(move |outer: &mut Actions<Outer>| {
						let mut inner = Actions::new();
						task(&mut inner);
						outer.queued.extend(inner.drain().map(|(message, immediate)| (f(message), immediate)));
					}) as Task<Outer>
				})
				.collect()
		};
		Effect {
			synchronous: lift(self.synchronous),
			before_paint: lift(self.before_paint),
			after_paint: lift(self.after_paint),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn run<Msg>(tasks: Vec<Task<Msg>>) -> Vec<(Msg, bool)> {
		let mut actions = Actions::new();
		for task in tasks {
			task(&mut actions);
		}
		actions.drain().collect()
	}

	#[test]
	fn batch_keeps_order_per_phase() {
		let effect = Effect::batch(vec![
			Effect::message(1),
			Effect::after_paint(|actions| actions.dispatch(10)),
			Effect::from_fn(|actions| actions.dispatch_immediate(2)),
			Effect::before_paint(|actions| actions.dispatch(5)),
		]);
		assert!(!effect.is_none());
		let Effect { synchronous, before_paint, after_paint } = effect;
		assert_eq!(run(synchronous), vec![(1, false), (2, true)]);
		assert_eq!(run(before_paint), vec![(5, false)]);
		assert_eq!(run(after_paint), vec![(10, false)]);
	}

	#[test]
	fn map_lifts_messages() {
		let effect = Effect::from_fn(|actions| {
			actions.dispatch(1);
			actions.dispatch_immediate(2);
		})
		.map(|n: i32| format!("#{}", n));
		assert_eq!(run(effect.synchronous), vec![("#1".to_owned(), false), ("#2".to_owned(), true)]);
	}
}
