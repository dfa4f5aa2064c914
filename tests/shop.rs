mod support;

use serde_json::json;
use std::{cell::RefCell, rc::Rc};
use support::shop::{find_optimal, parse_decklist, Listing, Model, Shop, Source};
use vellum_dom::{Effect, MemoryHost, MemorySurface, NodeId, Runtime};

type ShopRuntime = Runtime<Shop, MemorySurface, MemoryHost>;

fn listing(title: &str, price: &str, store: &str) -> serde_json::Value {
	json!({
		"title": title,
		"price": price,
		"condition": "NM / SP",
		"store": store,
		"url": "https://shop.example/sol-ring",
		"imageUrl": "https://shop.example/sol-ring.jpg",
		"features": [],
	})
}

/// Serves `first_page` for page 1 of every card, and nothing after it.
fn source(first_page: serde_json::Value) -> Source {
	let body = first_page.to_string();
	Rc::new(move |_card: &str, page: u32| if page == 1 { body.clone() } else { "[]".to_owned() })
}

fn start(source: Source) -> ShopRuntime {
	support::init_tracing();
	let mut surface = MemorySurface::new();
	let root = surface.create_root();
	Runtime::new(Shop { source }, Model::default(), Effect::none(), surface, root, MemoryHost::new())
}

fn find(runtime: &ShopRuntime, tag: &str) -> NodeId {
	runtime.surface().find(*runtime.reconciler().root(), tag).unwrap()
}

fn submit(runtime: &mut ShopRuntime, decklist: &str) {
	let textarea = find(runtime, "textarea");
	runtime.handle_event(&textarea, "input", |_| json!({ "target": { "value": decklist } }));
	let button = find(runtime, "button");
	runtime.handle_event(&button, "click", |_| json!({}));
	runtime.settle();
}

fn best_order(runtime: &ShopRuntime) -> String {
	runtime.surface().text_content(find(runtime, "h3"))
}

#[test]
fn listings_decode_from_the_api_format() {
	let listings: Vec<Listing> = serde_json::from_value(json!([listing("Sol Ring (Foil)", "$4.99", "NZ/Card Merchant"), listing("Sol Ring", "$?", "Local")])).unwrap();
	assert_eq!(listings[0].price, 4.99);
	assert_eq!(listings[0].store, "Card Merchant");
	assert_eq!(listings[0].image_url, "https://shop.example/sol-ring.jpg");
	assert_eq!(listings[1].price, 0.0);
	assert_eq!(listings[1].store, "Local");
}

#[test]
fn decklists_have_one_card_per_line() {
	assert_eq!(parse_decklist("Sol Ring\n\n  Arcane Signet \n"), [("Sol Ring".to_owned(), 1), ("Arcane Signet".to_owned(), 1)]);
}

#[test]
fn typing_keeps_the_textarea_in_sync() {
	let mut runtime = start(source(json!([])));
	let textarea = find(&runtime, "textarea");
	runtime.handle_event(&textarea, "input", |_| json!({ "target": { "value": "Sol Ring" } }));

	assert_eq!(runtime.model(), &Model::DecklistInput("Sol Ring".to_owned()));
	assert_eq!(runtime.surface().property(textarea, "value"), Some(&json!("Sol Ring")));
	assert_eq!(runtime.surface().text_content(textarea), "Sol Ring");
}

#[test]
fn single_listing_order() {
	let mut runtime = start(source(json!([listing("Sol Ring", "$4.99", "NZ/Card Merchant")])));
	submit(&mut runtime, "Sol Ring\n1");
	assert_eq!(best_order(&runtime), "Best Order - 4.99");
}

#[test]
fn order_total_follows_the_price() {
	let mut runtime = start(source(json!([listing("Sol Ring", "$9.98", "NZ/Card Merchant")])));
	submit(&mut runtime, "Sol Ring\n1");
	assert_eq!(best_order(&runtime), "Best Order - 9.98");
}

#[test]
fn unsuitable_listings_are_skipped() {
	let mut sealed = listing("Sol Ring", "$1.00", "Cheap");
	sealed["features"] = json!(["Sealed"]);
	let mut played = listing("Sol Ring", "$2.00", "Cheap");
	played["condition"] = json!("PL");
	let mut runtime = start(source(json!([sealed, played, listing("Sol Ring", "$4.99", "Fair")])));
	submit(&mut runtime, "Sol Ring");
	assert_eq!(best_order(&runtime), "Best Order - 4.99");
}

#[test]
fn dominated_stores_lose_and_constraints_override() {
	let mut runtime = start(source(json!([listing("Sol Ring", "$4.99", "Store A"), listing("Sol Ring", "$3.50", "Store B")])));
	submit(&mut runtime, "Sol Ring");
	assert_eq!(best_order(&runtime), "Best Order - 3.5");

	let selectable: Vec<NodeId> = {
		let surface = runtime.surface();
		surface.find_all(*runtime.reconciler().root(), "div").into_iter().filter(|div| surface.listeners(*div).iter().any(|name| name == "click")).collect()
	};
	assert_eq!(selectable.len(), 2);
	assert_eq!(runtime.surface().text_content(selectable[0]), "Store ANM / SP$4.99");

	runtime.handle_event(&selectable[0], "click", |_| json!({}));
	runtime.settle();
	assert_eq!(best_order(&runtime), "Best Order - 4.99");
}

#[test]
fn loads_every_card_with_a_bounded_number_of_requests() {
	support::init_tracing();
	let requests = Rc::new(RefCell::new(Vec::new()));
	let source: Source = {
		let requests = requests.clone();
		Rc::new(move |card: &str, page: u32| {
			requests.borrow_mut().push((card.to_owned(), page));
			"[]".to_owned()
		})
	};
	let mut runtime = start(source);
	submit(&mut runtime, "a\nb\nc\nd\ne\nf\ng");

	let requested: Vec<String> = requests.borrow().iter().map(|(card, _)| card.clone()).collect();
	assert_eq!(requested, ["a", "b", "c", "d", "e", "f", "g"]);
	assert!(matches!(runtime.model(), Model::Review { decklist, .. } if decklist.len() == 7));
}

#[test]
fn cheapest_combination_within_the_store_limit() {
	let listing = |card: &str, price: f64, store: &str| Listing {
		title: card.to_owned(),
		price,
		condition: "NM / SP".to_owned(),
		store: store.to_owned(),
		url: String::new(),
		image_url: String::new(),
		features: Vec::new(),
	};
	let decklist = parse_decklist("a\nb\nc");
	let results = [
		("a".to_owned(), vec![listing("a", 1.0, "X")]),
		("b".to_owned(), vec![listing("b", 10.0, "X"), listing("b", 5.0, "Y")]),
		("c".to_owned(), vec![listing("c", 30.0, "X"), listing("c", 2.0, "Z")]),
	]
	.into_iter()
	.collect();

	// X is pinned by `a`. Adding Y saves less than a store costs, adding Z saves more.
	let (total, listings) = find_optimal(&decklist, &results, &Default::default());
	assert_eq!(total, 13.0);
	assert_eq!(listings.iter().map(|listing| listing.store.as_str()).collect::<Vec<_>>(), ["X", "X", "Z"]);
}
