#![cfg(target_arch = "wasm32")]

use std::sync::Once;
use vellum_dom::{
	attribute::{class, id},
	vnode::{element, keyed, raw_html, text},
	web, Application, Effect, VNode, KEY_ATTRIBUTE,
};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlBodyElement};

wasm_bindgen_test_configure!(run_in_browser);

static LOG_INITIALIZED: Once = Once::new();

fn container() -> web_sys::Element {
	LOG_INITIALIZED.call_once(tracing_wasm::set_as_global_default);

	let document = window().unwrap().document().unwrap();
	let body = document.body().unwrap().dyn_into::<HtmlBodyElement>().unwrap();
	let container = document.create_element("div").unwrap();
	body.append_child(&container).unwrap();
	container
}

struct List;

impl Application for List {
	type Model = Vec<&'static str>;
	type Message = Vec<&'static str>;

	fn update(&self, model: &mut Self::Model, message: Self::Message) -> Effect<Self::Message> {
		*model = message;
		Effect::none()
	}

	fn view(&self, model: &Self::Model) -> VNode<Self::Message> {
		element(
			"section",
			vec![id("list")],
			vec![
				keyed::element("ul", vec![], model.iter().map(|item| ((*item).to_owned(), element("li", vec![class(*item)], vec![text(*item)]))).collect()),
				raw_html("", "div", vec![], "<b>raw</b>"),
			],
		)
	}
}

#[wasm_bindgen_test]
fn renders_into_an_empty_root() {
	let root = container();
	let app = web::start(List, vec!["a", "b"], Effect::none(), &root).unwrap();
	assert_eq!(root.inner_html(), r#"<section id="list"><ul><li class="a">a</li><li class="b">b</li></ul><div><b>raw</b></div></section>"#);

	app.dispatch(vec!["b", "c", "a"], true);
	assert_eq!(root.inner_html(), r#"<section id="list"><ul><li class="b">b</li><li class="c">c</li><li class="a">a</li></ul><div><b>raw</b></div></section>"#);

	assert_eq!(app.shutdown(), Some(vec!["b", "c", "a"]));
}

#[wasm_bindgen_test]
fn keeps_server_rendered_nodes() {
	let root = container();
	root.set_inner_html(&format!(
		r#"<section id="list"><ul><li {key}="a" class="a">a</li><li {key}="b" class="b">b</li></ul><div><b>raw</b></div></section>"#,
		key = KEY_ATTRIBUTE
	));
	let first = root.query_selector("li.a").unwrap().unwrap();

	let app = web::start(List, vec!["b", "a"], Effect::none(), &root).unwrap();
	assert_eq!(root.inner_html(), r#"<section id="list"><ul><li class="b">b</li><li class="a">a</li></ul><div><b>raw</b></div></section>"#);

	// Moved, not rebuilt.
	let moved = root.query_selector("li.a").unwrap().unwrap();
	assert!(first.is_same_node(Some(moved.as_ref())));
	drop(app.shutdown());
}
