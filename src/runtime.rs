//! The update loop.
//!
//! A [`Runtime`] owns the model, the current virtual tree with its event registry, and the
//! [`Reconciler`] that keeps the live tree in sync. It moves through three phases:
//!
//! - [`Phase::Idle`]: nothing to do until the host calls in.
//! - [`Phase::Updating`]: draining the message queue. Anything dispatched meanwhile is queued.
//! - [`Phase::RenderScheduled`]: waiting for the animation frame that will render.
//!
//! Hosts drive it by forwarding their callbacks: [`Runtime::animation_frame`],
//! [`Runtime::run_microtask`], [`Runtime::timer_fired`] and [`Runtime::handle_event`].

use crate::{
	diff::{diff, Diff},
	effect::{Actions, Effect, Task},
	events::Events,
	reconciler::{Dispatch, EventOutcome, Reconciler},
	surface::{FrameId, Host, Surface, TimerId},
	vnode::VNode,
};
use core::{
	fmt::{self, Debug, Formatter},
	mem,
};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, instrument, trace, trace_span};

/// The application logic a [`Runtime`] drives.
pub trait Application {
	type Model;
	type Message: 'static;

	fn update(&self, model: &mut Self::Model, message: Self::Message) -> Effect<Self::Message>;
	fn view(&self, model: &Self::Model) -> VNode<Self::Message>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Idle,
	Updating,
	RenderScheduled,
}

pub struct Runtime<A: Application, S: Surface, H: Host> {
	app: A,
	model: A::Model,
	vdom: VNode<A::Message>,
	events: Events<A::Message>,
	reconciler: Reconciler<S>,
	host: H,
	queue: VecDeque<A::Message>,
	before_paint: Vec<Task<A::Message>>,
	after_paint: Vec<Task<A::Message>>,
	render_timer: Option<FrameId>,
	should_flush: bool,
	phase: Phase,
	microtasks: VecDeque<Effect<A::Message>>,
	after_paint_frames: Vec<(FrameId, Effect<A::Message>)>,
}

impl<A: Application, S: Surface, H: Host> Debug for Runtime<A, S, H> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("reconciler", &self.reconciler)
			.field("queued", &self.queue.len())
			.field("render_timer", &self.render_timer)
			.field("should_flush", &self.should_flush)
			.field("phase", &self.phase)
			.finish_non_exhaustive()
	}
}

impl<A: Application, S: Surface, H: Host> Runtime<A, S, H> {
	/// Adopts the children of `root` and renders `model` over them right away.
	///
	/// `effect` runs first, as if it had been returned by an update.
	pub fn new(app: A, model: A::Model, effect: Effect<A::Message>, surface: S, root: S::Node, host: H) -> Self {
		Self::with_offset(app, model, effect, surface, root, host, 0)
	}

	/// Like [`new`](`Runtime::new`), but leaves the first `offset` children of `root` alone.
	#[instrument(skip(app, model, effect, surface, host))]
	pub fn with_offset(app: A, model: A::Model, effect: Effect<A::Message>, surface: S, root: S::Node, host: H, offset: usize) -> Self {
		let mut reconciler = Reconciler::new(surface, root);
		reconciler.set_offset(offset);
		let vdom = reconciler.virtualize();

		let mut runtime = Self {
			app,
			model,
			vdom,
			events: Events::new(),
			reconciler,
			host,
			queue: VecDeque::new(),
			before_paint: Vec::new(),
			after_paint: Vec::new(),
			render_timer: None,
			should_flush: true,
			phase: Phase::Idle,
			microtasks: VecDeque::new(),
			after_paint_frames: Vec::new(),
		};
		runtime.tick(effect);
		runtime
	}

	pub fn model(&self) -> &A::Model {
		&self.model
	}

	pub fn vdom(&self) -> &VNode<A::Message> {
		&self.vdom
	}

	pub fn events(&self) -> &Events<A::Message> {
		&self.events
	}

	pub fn surface(&self) -> &S {
		self.reconciler.surface()
	}

	pub fn reconciler(&self) -> &Reconciler<S> {
		&self.reconciler
	}

	pub fn host(&self) -> &H {
		&self.host
	}

	pub fn host_mut(&mut self) -> &mut H {
		&mut self.host
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.phase
	}

	/// Skips `offset` leading children of the root from the next render on.
	pub fn set_offset(&mut self, offset: usize) {
		self.reconciler.set_offset(offset);
	}

	/// Queues `message` and processes the queue.
	///
	/// If `immediate`, the resulting render happens before this returns. Otherwise it's coalesced
	/// into the next animation frame.
	pub fn dispatch(&mut self, message: A::Message, immediate: bool) {
		self.queue.push_back(message);
		self.should_flush |= immediate;
		self.tick(Effect::none());
	}

	fn enqueue(&mut self, actions: &mut Actions<A::Message>) {
		for (message, immediate) in actions.drain() {
			self.should_flush |= immediate;
			self.queue.push_back(message);
		}
	}

	fn tick(&mut self, effect: Effect<A::Message>) {
		let span = trace_span!("tick");
		let _enter = span.enter();

		self.phase = Phase::Updating;
		let mut effect = effect;
		let mut updates = 0_usize;
		loop {
			let Effect { synchronous, before_paint, after_paint } = effect;

			let mut actions = Actions::new();
			for task in synchronous {
				task(&mut actions);
			}
			self.enqueue(&mut actions);
			self.before_paint.extend(before_paint);
			self.after_paint.extend(after_paint);

			match self.queue.pop_front() {
				Some(message) => {
					updates += 1;
					effect = self.app.update(&mut self.model, message);
				}
				None => break,
			}
		}
		trace!(updates, should_flush = self.should_flush, "Queue drained");

		if self.should_flush {
			if let Some(frame) = self.render_timer.take() {
				self.host.cancel_animation_frame(frame);
			}
			self.render();
		} else {
			if self.render_timer.is_none() {
				self.render_timer = Some(self.host.request_animation_frame());
			}
			self.phase = Phase::RenderScheduled;
		}
	}

	fn render(&mut self) {
		let span = trace_span!("render");
		let _enter = span.enter();

		self.should_flush = false;
		self.render_timer = None;

		let next = self.app.view(&self.model);
		let Diff { patch, events } = diff(mem::take(&mut self.events), &self.vdom, &next);
		self.events = events;
		self.vdom = next;
		if patch.is_empty() {
			trace!("Nothing to patch");
		} else {
			self.reconciler.push(&mut self.host, patch);
		}
		self.phase = Phase::Idle;

		if !self.before_paint.is_empty() {
			self.microtasks.push_back(Effect::from_tasks(mem::take(&mut self.before_paint)));
			self.host.queue_microtask();
		}
		if !self.after_paint.is_empty() {
			let frame = self.host.request_animation_frame();
			self.after_paint_frames.push((frame, Effect::from_tasks(mem::take(&mut self.after_paint))));
		}
	}

	/// The host's animation frame `frame` has arrived.
	pub fn animation_frame(&mut self, frame: FrameId) {
		if self.render_timer == Some(frame) {
			return self.render();
		}
		match self.after_paint_frames.iter().position(|(id, _)| *id == frame) {
			Some(index) => {
				let (_, effect) = self.after_paint_frames.remove(index);
				self.should_flush = true;
				self.tick(effect);
			}
			None => debug!(?frame, "Ignoring stale animation frame"),
		}
	}

	/// Runs the oldest batch of before-paint effects.
	pub fn run_microtask(&mut self) {
		match self.microtasks.pop_front() {
			Some(effect) => {
				self.should_flush = true;
				self.tick(effect);
			}
			None => debug!("No microtask to run"),
		}
	}

	/// The host timer `timer` has elapsed.
	pub fn timer_fired(&mut self, timer: TimerId) {
		match self.reconciler.fire_timer(timer) {
			Some(dispatch) => self.deliver(dispatch),
			None => trace!(?timer, "Timer no longer wanted"),
		}
	}

	/// Reports a native `name` event on `node`. See [`Reconciler::handle_event`].
	///
	/// Any resulting message is processed before this returns. The returned outcome's `dispatch` is
	/// always [`None`].
	pub fn handle_event(&mut self, node: &S::Node, name: &str, payload: impl FnOnce(&[String]) -> Value) -> EventOutcome {
		let mut outcome = self.reconciler.handle_event(&mut self.host, node, name, payload);
		if let Some(dispatch) = outcome.dispatch.take() {
			self.deliver(dispatch);
		}
		outcome
	}

	fn deliver(&mut self, dispatch: Dispatch) {
		let Dispatch { path, name, event, immediate } = dispatch;
		match self.events.handle(&path, &name, &event) {
			Ok(message) => self.dispatch(message, immediate),
			Err(error) => debug!(%error, ?path, name = %name, "Dropping undecodable event"),
		}
	}

	/// Cancels everything still scheduled with the host and hands back the model.
	#[instrument(skip(self))]
	pub fn shutdown(mut self) -> A::Model {
		if let Some(frame) = self.render_timer.take() {
			self.host.cancel_animation_frame(frame);
		}
		for (frame, _) in self.after_paint_frames.drain(..) {
			self.host.cancel_animation_frame(frame);
		}
		self.reconciler.clear_timers(&mut self.host);
		self.model
	}
}
