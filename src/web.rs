//! The browser: a [`Surface`] on `web-sys`, a [`Host`] on the window's scheduling functions, and
//! [`start`] to wire an [`Application`] to both.
//!
//! All native callbacks (events, animation frames, microtasks, timeouts) go through one mailbox per
//! application. A callback that arrives while the runtime is busy (for example a `focus` event fired
//! synchronously by an `autofocus` hook) is queued and handled as soon as the current one returns.

use crate::{
	effect::Effect,
	runtime::{Application, Runtime},
	surface::{FrameId, Host, NodeKind, Surface, TimerId, Timers},
};
use core::{
	cell::{Cell, RefCell},
	convert::TryFrom,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use js_sys::{Function, Reflect};
use serde_json::{Map, Number, Value};
use std::{collections::VecDeque, rc::Rc};
use tracing::{debug, error, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Name of the JavaScript property that tags live nodes with their [`DomNode`] id.
const ID_PROPERTY: &str = "__vellum";

/// A handle to a live DOM node, valid while the node is registered with its [`DomSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomNode(u32);

/// Implements [`Surface`] on a [`web_sys::Document`].
///
/// Every event listener is the same shared closure bound to the node's id, which reports
/// `(node, event)` to the callback given to [`DomSurface::new`].
///
/// # Safety
///
/// Listeners left on nodes that outlive this surface throw into JavaScript when triggered.
#[derive(Debug)]
pub struct DomSurface {
	document: web_sys::Document,
	nodes: RefCell<HashMap<u32, web_sys::Node>>,
	next_id: Cell<u32>,
	common_handler: Closure<dyn Fn(JsValue, web_sys::Event)>,
	listeners: HashMap<(DomNode, String), Function>,
}

impl DomSurface {
	#[instrument(skip(on_event))]
	pub fn new(document: web_sys::Document, on_event: impl Fn(DomNode, web_sys::Event) + 'static) -> Self {
		Self {
			document,
			nodes: RefCell::new(HashMap::new()),
			next_id: Cell::new(0),
			common_handler: Closure::wrap(Box::new(move |id: JsValue, event: web_sys::Event| {
				let span = trace_span!("common_handler", ?id, event = %event.type_());
				let _enter = span.enter();

				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let node = id.as_f64().map(|id| DomNode(id as u32));
				match node {
					Some(node) => on_event(node, event),
					None => error!("vellum-dom bug: Listener bound to invalid node id {:?}", id),
				}
			}) as Box<dyn Fn(JsValue, web_sys::Event)>),
			listeners: HashMap::new(),
		}
	}

	/// Registers `node` (if necessary) and returns its handle.
	pub fn adopt(&self, node: &web_sys::Node) -> DomNode {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let existing = Reflect::get(node, &JsValue::from_str(ID_PROPERTY)).ok().and_then(|id| id.as_f64()).map(|id| id as u32);
		if let Some(id) = existing {
			if self.nodes.borrow().get(&id).map_or(false, |known| known == node) {
				return DomNode(id);
			}
		}

		let id = self.next_id.get();
		self.next_id.set(id.wrapping_add(1));
		if let Err(error) = Reflect::set(node, &JsValue::from_str(ID_PROPERTY), &JsValue::from(id)) {
			error!("Failed to tag node with its id: {:?}", error);
		}
		self.nodes.borrow_mut().insert(id, node.clone());
		DomNode(id)
	}

	/// The live node behind `handle`.
	#[must_use]
	pub fn node(&self, handle: &DomNode) -> Option<web_sys::Node> {
		let node = self.nodes.borrow().get(&handle.0).cloned();
		if node.is_none() {
			error!("Unknown node handle {:?}", handle);
		}
		node
	}

	fn element(&self, handle: &DomNode) -> Option<web_sys::Element> {
		let node = self.node(handle)?;
		match node.dyn_into::<web_sys::Element>() {
			Ok(element) => Some(element),
			Err(node) => {
				error!("Expected `web_sys::Element` but found {:?}", node);
				None
			}
		}
	}
}

impl Surface for DomSurface {
	type Node = DomNode;

	fn create_element(&mut self, namespace: &str, tag: &str) -> DomNode {
		let element = if namespace.is_empty() {
			self.document.create_element(tag)
		} else {
			self.document.create_element_ns(Some(namespace), tag)
		};
		match element {
			Ok(element) => self.adopt(element.as_ref()),
			Err(error) => {
				error!("Failed to create <{}>, substituting an empty text node: {:?}", tag, error);
				self.create_text("")
			}
		}
	}

	fn create_text(&mut self, content: &str) -> DomNode {
		let text = self.document.create_text_node(content);
		self.adopt(text.as_ref())
	}

	fn insert_before(&mut self, parent: &DomNode, node: &DomNode, reference: Option<&DomNode>) {
		let (parent, node) = match (self.node(parent), self.node(node)) {
			(Some(parent), Some(node)) => (parent, node),
			_ => return,
		};
		let reference = reference.and_then(|reference| self.node(reference));
		if let Err(error) = parent.insert_before(&node, reference.as_ref()) {
			error!("Failed to insert node: {:?}", error);
		}
	}

	/// Uses `moveBefore` where the browser has it, which preserves focus, selection and playback.
	fn move_before(&mut self, parent: &DomNode, node: &DomNode, reference: Option<&DomNode>) {
		let (live_parent, live_node) = match (self.node(parent), self.node(node)) {
			(Some(parent), Some(node)) => (parent, node),
			_ => return,
		};
		let move_before = Reflect::get(&live_parent, &JsValue::from_str("moveBefore")).ok().and_then(|f| f.dyn_into::<Function>().ok());
		if let Some(move_before) = move_before {
			let reference = reference.and_then(|reference| self.node(reference)).map_or(JsValue::NULL, JsValue::from);
			match move_before.call2(&live_parent, &live_node, &reference) {
				Ok(_) => return,
				Err(error) => debug!("`moveBefore` failed, falling back to `insertBefore`: {:?}", error),
			}
		}
		self.insert_before(parent, node, reference);
	}

	fn remove_child(&mut self, parent: &DomNode, node: &DomNode) {
		if let (Some(parent), Some(node)) = (self.node(parent), self.node(node)) {
			if let Err(error) = parent.remove_child(&node) {
				error!("Failed to remove node: {:?}", error);
			}
		}
	}

	fn parent(&self, node: &DomNode) -> Option<DomNode> {
		let parent = self.node(node)?.parent_node()?;
		Some(self.adopt(&parent))
	}

	fn children(&self, node: &DomNode) -> Vec<DomNode> {
		let child_nodes = match self.node(node) {
			Some(node) => node.child_nodes(),
			None => return Vec::new(),
		};
		(0..child_nodes.length()).filter_map(|i| child_nodes.item(i)).map(|child| self.adopt(&child)).collect()
	}

	fn child_at(&self, parent: &DomNode, index: usize) -> Option<DomNode> {
		let index = u32::try_from(index).ok()?;
		let child = self.node(parent)?.child_nodes().item(index)?;
		Some(self.adopt(&child))
	}

	fn child_count(&self, parent: &DomNode) -> usize {
		self.node(parent).map_or(0, |parent| parent.child_nodes().length() as usize)
	}

	fn next_sibling(&self, node: &DomNode) -> Option<DomNode> {
		let sibling = self.node(node)?.next_sibling()?;
		Some(self.adopt(&sibling))
	}

	fn kind(&self, node: &DomNode) -> NodeKind {
		let node = match self.node(node) {
			Some(node) => node,
			None => return NodeKind::Other,
		};
		match node.node_type() {
			web_sys::Node::ELEMENT_NODE => match node.dyn_ref::<web_sys::Element>() {
				Some(element) => NodeKind::Element {
					namespace: element.namespace_uri().filter(|namespace| namespace != HTML_NAMESPACE).unwrap_or_default(),
					tag: element.local_name(),
				},
				None => NodeKind::Other,
			},
			web_sys::Node::TEXT_NODE => NodeKind::Text(node.text_content().unwrap_or_default()),
			_ => NodeKind::Other,
		}
	}

	fn attributes(&self, node: &DomNode) -> Vec<(String, String)> {
		let element = match self.element(node) {
			Some(element) => element,
			None => return Vec::new(),
		};
		element
			.get_attribute_names()
			.iter()
			.filter_map(|name| name.as_string())
			.filter_map(|name| {
				let value = element.get_attribute(&name)?;
				Some((name, value))
			})
			.collect()
	}

	fn get_attribute(&self, node: &DomNode, name: &str) -> Option<String> {
		self.element(node)?.get_attribute(name)
	}

	fn set_attribute(&mut self, node: &DomNode, name: &str, value: &str) {
		if let Some(element) = self.element(node) {
			if let Err(error) = element.set_attribute(name, value) {
				error!("Failed to set attribute {:?}: {:?}", name, error);
			}
		}
	}

	fn remove_attribute(&mut self, node: &DomNode, name: &str) {
		if let Some(element) = self.element(node) {
			if let Err(error) = element.remove_attribute(name) {
				error!("Failed to remove attribute {:?}: {:?}", name, error);
			}
		}
	}

	fn set_property(&mut self, node: &DomNode, name: &str, value: &Value) {
		if let Some(node) = self.node(node) {
			if let Err(error) = Reflect::set(&node, &JsValue::from_str(name), &to_js(value)) {
				error!("Failed to set property {:?}: {:?}", name, error);
			}
		}
	}

	fn set_text(&mut self, node: &DomNode, content: &str) {
		if let Some(node) = self.node(node) {
			node.set_text_content(Some(content));
		}
	}

	fn set_inner_html(&mut self, node: &DomNode, html: &str) {
		if let Some(element) = self.element(node) {
			element.set_inner_html(html);
		}
	}

	fn add_event_listener(&mut self, handle: &DomNode, name: &str, passive: bool) {
		let node = match self.node(handle) {
			Some(node) => node,
			None => return,
		};
		let listener = self.common_handler.as_ref().unchecked_ref::<Function>().bind1(&JsValue::UNDEFINED, &JsValue::from(handle.0));
		let mut options = web_sys::AddEventListenerOptions::new();
		options.passive(passive);
		match node.add_event_listener_with_callback_and_add_event_listener_options(name, &listener, &options) {
			Ok(()) => {
				if let Some(previous) = self.listeners.insert((*handle, name.to_owned()), listener) {
					warn!("Replacing existing {:?} listener on {:?}", name, handle);
					if let Err(error) = node.remove_event_listener_with_callback(name, &previous) {
						error!("Failed to remove replaced listener: {:?}", error);
					}
				}
			}
			Err(error) => error!("Failed to add {:?} listener: {:?}", name, error),
		}
	}

	fn remove_event_listener(&mut self, handle: &DomNode, name: &str) {
		let listener = match self.listeners.remove(&(*handle, name.to_owned())) {
			Some(listener) => listener,
			None => return trace!("No {:?} listener to remove on {:?}", name, handle),
		};
		if let Some(node) = self.node(handle) {
			if let Err(error) = node.remove_event_listener_with_callback(name, &listener) {
				error!("Failed to remove {:?} listener: {:?}", name, error);
			}
		}
	}

	fn focus(&mut self, node: &DomNode) {
		match self.node(node).and_then(|node| node.dyn_into::<web_sys::HtmlElement>().ok()) {
			Some(element) => {
				if let Err(error) = element.focus() {
					error!("Failed to focus: {:?}", error);
				}
			}
			None => debug!("Can't focus {:?}, which isn't an HTML element", node),
		}
	}

	fn play(&mut self, node: &DomNode) {
		match self.node(node).and_then(|node| node.dyn_into::<web_sys::HtmlMediaElement>().ok()) {
			Some(media) => {
				if let Err(error) = media.play() {
					error!("Failed to start playback: {:?}", error);
				}
			}
			None => debug!("Can't play {:?}, which isn't a media element", node),
		}
	}

	fn release(&mut self, handle: &DomNode) {
		self.listeners.retain(|(node, _), _| node != handle);
		if let Some(node) = self.nodes.borrow_mut().remove(&handle.0) {
			if let Err(error) = Reflect::delete_property(node.unchecked_ref(), &JsValue::from_str(ID_PROPERTY)) {
				error!("Failed to untag released node: {:?}", error);
			}
		}
	}
}

fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Null => JsValue::NULL,
		Value::Bool(value) => JsValue::from_bool(*value),
		Value::Number(number) => number.as_f64().map_or(JsValue::NULL, JsValue::from_f64),
		Value::String(string) => JsValue::from_str(string),
		Value::Array(_) | Value::Object(_) => js_sys::JSON::parse(&value.to_string()).unwrap_or_else(|error| {
			error!("Failed to convert property value: {:?}", error);
			JsValue::UNDEFINED
		}),
	}
}

fn to_json(value: &JsValue) -> Option<Value> {
	if let Some(flag) = value.as_bool() {
		Some(Value::Bool(flag))
	} else if let Some(number) = value.as_f64() {
		Number::from_f64(number).map(Value::Number)
	} else if let Some(string) = value.as_string() {
		Some(Value::String(string))
	} else {
		let json = js_sys::JSON::stringify(value).ok()?.as_string()?;
		serde_json::from_str(&json).ok()
	}
}

/// Builds the payload a binding's handler decodes from `event`.
///
/// Each dotted path in `include` is read from the event and copied into a nested object at the
/// same path. `input` and `change` events always carry `target.value` and `target.checked`.
#[must_use]
pub fn event_payload(event: &web_sys::Event, include: &[String]) -> Value {
	let mut payload = Map::new();
	for path in include {
		copy_path(event.as_ref(), path, &mut payload);
	}
	if matches!(event.type_().as_str(), "input" | "change") {
		copy_path(event.as_ref(), "target.value", &mut payload);
		copy_path(event.as_ref(), "target.checked", &mut payload);
	}
	Value::Object(payload)
}

fn copy_path(event: &JsValue, path: &str, payload: &mut Map<String, Value>) {
	let mut source = event.clone();
	for segment in path.split('.') {
		source = Reflect::get(&source, &JsValue::from_str(segment)).unwrap_or(JsValue::UNDEFINED);
		if source.is_undefined() || source.is_null() {
			return;
		}
	}
	let value = match to_json(&source) {
		Some(value) => value,
		None => return trace!("Can't represent {:?} as JSON", path),
	};

	let mut segments: Vec<&str> = path.split('.').collect();
	let last = match segments.pop() {
		Some(last) => last,
		None => return,
	};
	let mut object = payload;
	for segment in segments {
		let entry = object.entry(segment.to_owned()).or_insert_with(|| Value::Object(Map::new()));
		object = match entry {
			Value::Object(object) => object,
			_ => return,
		};
	}
	object.insert(last.to_owned(), value);
}

/// A scheduling callback from the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
	Frame(FrameId),
	Microtask,
	Timer(TimerId),
}

/// Implements [`Host`] on a [`web_sys::Window`], reporting each callback as a [`HostSignal`].
pub struct WebHost {
	window: web_sys::Window,
	signal: Rc<dyn Fn(HostSignal)>,
	next_id: u32,
	frames: HashMap<FrameId, i32>,
	timers: HashMap<TimerId, i32>,
}

impl Debug for WebHost {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebHost").field("frames", &self.frames).field("timers", &self.timers).finish_non_exhaustive()
	}
}

impl WebHost {
	pub fn new(window: web_sys::Window, signal: Rc<dyn Fn(HostSignal)>) -> Self {
		Self {
			window,
			signal,
			next_id: 0,
			frames: HashMap::new(),
			timers: HashMap::new(),
		}
	}

	fn next_id(&mut self) -> u32 {
		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);
		id
	}

	fn callback(&self, signal: HostSignal) -> Function {
		let callback = self.signal.clone();
		Closure::once_into_js(move || callback(signal)).unchecked_into()
	}

	/// Forgets the browser handle of a callback that has run.
	pub fn fired(&mut self, signal: HostSignal) {
		match signal {
			HostSignal::Frame(frame) => {
				self.frames.remove(&frame);
			}
			HostSignal::Timer(timer) => {
				self.timers.remove(&timer);
			}
			HostSignal::Microtask => (),
		}
	}
}

impl Timers for WebHost {
	fn now(&self) -> f64 {
		js_sys::Date::now()
	}

	fn set_timeout(&mut self, delay: u32) -> TimerId {
		let timer = TimerId(self.next_id());
		let callback = self.callback(HostSignal::Timer(timer));
		match self.window.set_timeout_with_callback_and_timeout_and_arguments_0(&callback, i32::try_from(delay).unwrap_or(i32::MAX)) {
			Ok(handle) => {
				self.timers.insert(timer, handle);
			}
			Err(error) => error!("Failed to set timeout: {:?}", error),
		}
		timer
	}

	fn clear_timeout(&mut self, timer: TimerId) {
		if let Some(handle) = self.timers.remove(&timer) {
			self.window.clear_timeout_with_handle(handle);
		}
	}
}

impl Host for WebHost {
	fn request_animation_frame(&mut self) -> FrameId {
		let frame = FrameId(self.next_id());
		let callback = self.callback(HostSignal::Frame(frame));
		match self.window.request_animation_frame(&callback) {
			Ok(handle) => {
				self.frames.insert(frame, handle);
			}
			Err(error) => error!("Failed to request animation frame: {:?}", error),
		}
		frame
	}

	fn cancel_animation_frame(&mut self, frame: FrameId) {
		if let Some(handle) = self.frames.remove(&frame) {
			if let Err(error) = self.window.cancel_animation_frame(handle) {
				error!("Failed to cancel animation frame: {:?}", error);
			}
		}
	}

	fn queue_microtask(&mut self) {
		let callback = self.callback(HostSignal::Microtask);
		let queue_microtask = Reflect::get(&self.window, &JsValue::from_str("queueMicrotask")).ok().and_then(|f| f.dyn_into::<Function>().ok());
		let queued = match queue_microtask {
			Some(queue_microtask) => queue_microtask.call1(&self.window, &callback).map(drop),
			None => {
				warn!("`queueMicrotask` is unavailable, falling back to a zero timeout");
				self.window.set_timeout_with_callback(&callback).map(drop)
			}
		};
		if let Err(error) = queued {
			error!("Failed to queue microtask: {:?}", error);
		}
	}
}

enum Signal<Msg> {
	Host(HostSignal),
	Event(DomNode, web_sys::Event),
	Dispatch(Msg, bool),
}

struct Driver<A: Application> {
	runtime: RefCell<Option<Runtime<A, DomSurface, WebHost>>>,
	mailbox: RefCell<VecDeque<Signal<A::Message>>>,
}

impl<A: Application> Driver<A> {
	fn receive(&self, signal: Signal<A::Message>) {
		self.mailbox.borrow_mut().push_back(signal);
		self.pump();
	}

	fn pump(&self) {
		let mut runtime = match self.runtime.try_borrow_mut() {
			Ok(runtime) => runtime,
			Err(_) => return trace!("Runtime busy, signal queued"),
		};
		let runtime = match runtime.as_mut() {
			Some(runtime) => runtime,
			None => return trace!("Runtime not running, signal queued"),
		};

		loop {
			let signal = match self.mailbox.borrow_mut().pop_front() {
				Some(signal) => signal,
				None => break,
			};
			match signal {
				Signal::Host(signal) => {
					runtime.host_mut().fired(signal);
					match signal {
						HostSignal::Frame(frame) => runtime.animation_frame(frame),
						HostSignal::Microtask => runtime.run_microtask(),
						HostSignal::Timer(timer) => runtime.timer_fired(timer),
					}
				}
				Signal::Event(node, event) => {
					let outcome = runtime.handle_event(&node, &event.type_(), |include| event_payload(&event, include));
					if outcome.prevent_default {
						event.prevent_default();
					}
					if outcome.stop_propagation {
						event.stop_propagation();
					}
				}
				Signal::Dispatch(message, immediate) => runtime.dispatch(message, immediate),
			}
		}
	}
}

/// A running application. Dropping it detaches the runtime, after which its listeners throw.
pub struct WebApp<A: Application> {
	driver: Rc<Driver<A>>,
}

impl<A: Application> Debug for WebApp<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebApp").field("queued", &self.driver.mailbox.borrow().len()).finish_non_exhaustive()
	}
}

impl<A: Application> WebApp<A> {
	/// Feeds a message from outside the view, for example from a network callback.
	pub fn dispatch(&self, message: A::Message, immediate: bool) {
		self.driver.receive(Signal::Dispatch(message, immediate));
	}

	/// Stops the application and hands back its model, unless it's currently running a callback.
	pub fn shutdown(self) -> Option<A::Model> {
		let runtime = self.driver.runtime.try_borrow_mut().ok()?.take()?;
		Some(runtime.shutdown())
	}
}

/// Takes over the children of `root` and starts rendering `model` into it.
///
/// # Errors
///
/// Iff there's no window or document to render into.
#[instrument(skip(app, model, effect))]
pub fn start<A>(app: A, model: A::Model, effect: Effect<A::Message>, root: &web_sys::Element) -> Result<WebApp<A>, JsValue>
where
	A: Application + 'static,
	A::Model: 'static,
{
	let window = web_sys::window().ok_or_else(|| JsValue::from_str("vellum-dom: No window found."))?;
	let document = window.document().ok_or_else(|| JsValue::from_str("vellum-dom: No document found."))?;

	let driver = Rc::new(Driver::<A> {
		runtime: RefCell::new(None),
		mailbox: RefCell::new(VecDeque::new()),
	});

	let weak = Rc::downgrade(&driver);
	let surface = DomSurface::new(document, move |node, event| match weak.upgrade() {
		Some(driver) => driver.receive(Signal::Event(node, event)),
		None => debug!("Event after shutdown"),
	});
	let weak = Rc::downgrade(&driver);
	let host = WebHost::new(
		window,
		Rc::new(move |signal: HostSignal| match weak.upgrade() {
			Some(driver) => driver.receive(Signal::Host(signal)),
			None => debug!(?signal, "Host callback after shutdown"),
		}),
	);

	let root = surface.adopt(root.as_ref());
	let runtime = Runtime::new(app, model, effect, surface, root, host);
	*driver.runtime.borrow_mut() = Some(runtime);
	driver.pump();

	Ok(WebApp { driver })
}
