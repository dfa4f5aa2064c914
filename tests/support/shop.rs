//! A small card shopping assistant: paste a decklist, collect store listings page by page, then
//! pick the cheapest order across a handful of stores.

use serde::{Deserialize, Deserializer};
use std::{
	collections::{BTreeMap, BTreeSet, VecDeque},
	rc::Rc,
};
use vellum_dom::{
	attribute::{attribute, class, href, on_click, on_input, property, src, style},
	vnode::{element, text},
	Application, Effect, VNode,
};

/// Cards requested at once while loading.
pub const PARALLEL_REQUESTS: usize = 5;
pub const MAX_STORES: usize = 5;
pub const COST_PER_STORE: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Listing {
	pub title: String,
	#[serde(deserialize_with = "price")]
	pub price: f64,
	pub condition: String,
	#[serde(deserialize_with = "store")]
	pub store: String,
	pub url: String,
	#[serde(rename = "imageUrl")]
	pub image_url: String,
	pub features: Vec<String>,
}

/// `"$4.99"` → `4.99`, anything unparsable → `0`.
fn price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
	let raw = String::deserialize(deserializer)?;
	Ok(raw.chars().skip(1).collect::<String>().parse().unwrap_or(0.0))
}

fn store<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	let raw = String::deserialize(deserializer)?;
	Ok(raw.strip_prefix("NZ/").map_or_else(|| raw.clone(), str::to_owned))
}

/// Answers a listings query for `card` and 1-based `page` with a JSON array body.
pub type Source = Rc<dyn Fn(&str, u32) -> String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
	UserUpdatedDecklist(String),
	UserSubmittedDecklist,
	UserUpdatedConstraints { card: String, index: usize },
	ApiReturnedListings { card: String, page: u32, listings: Vec<Listing> },
}

pub type Decklist = Vec<(String, u32)>;
pub type Results = BTreeMap<String, Vec<Listing>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Model {
	DecklistInput(String),
	Loading {
		results: Results,
		decklist: Decklist,
		pending: VecDeque<String>,
		in_flight: usize,
	},
	Review {
		results: Results,
		decklist: Decklist,
		constraints: BTreeMap<String, BTreeSet<usize>>,
	},
}

impl Default for Model {
	fn default() -> Self {
		Self::DecklistInput(String::new())
	}
}

pub struct Shop {
	pub source: Source,
}

impl Shop {
	fn fetch(&self, card: String, page: u32) -> Effect<Msg> {
		let source = self.source.clone();
		Effect::from_fn(move |actions| {
			let body = source(&card, page);
			let listings = serde_json::from_str::<Vec<Listing>>(&body).unwrap_or_default();
			actions.dispatch(Msg::ApiReturnedListings { card, page, listings });
		})
	}
}

pub fn parse_decklist(decklist: &str) -> Decklist {
	decklist.lines().map(str::trim).filter(|line| !line.is_empty()).map(|line| (line.to_owned(), 1)).collect()
}

/// The card name a listing title refers to: everything before the first `(`, trimmed and lowercased.
fn title_card(title: &str) -> String {
	title.split('(').next().unwrap_or_default().trim().to_lowercase()
}

fn is_sealed(listing: &Listing) -> bool {
	listing.features.iter().any(|feature| feature == "Sealed")
}

impl Application for Shop {
	type Model = Model;
	type Message = Msg;

	fn update(&self, model: &mut Model, message: Msg) -> Effect<Msg> {
		let (next, effect) = match (std::mem::take(model), message) {
			(Model::DecklistInput(_), Msg::UserUpdatedDecklist(text)) => (Model::DecklistInput(text), Effect::none()),

			(Model::DecklistInput(text), Msg::UserSubmittedDecklist) => {
				let decklist = parse_decklist(&text);
				let mut pending: VecDeque<String> = decklist.iter().map(|(card, _)| card.clone()).collect();
				let first: Vec<String> = pending.drain(..PARALLEL_REQUESTS.min(pending.len())).collect();
				if first.is_empty() {
					let review = Model::Review {
						results: Results::new(),
						decklist,
						constraints: BTreeMap::new(),
					};
					(review, Effect::none())
				} else {
					let effect = Effect::batch(first.iter().map(|card| self.fetch(card.clone(), 1)).collect::<Vec<_>>());
					let loading = Model::Loading {
						results: Results::new(),
						decklist,
						pending,
						in_flight: first.len(),
					};
					(loading, effect)
				}
			}

			(
				Model::Loading {
					mut results,
					decklist,
					mut pending,
					mut in_flight,
				},
				Msg::ApiReturnedListings { card, page, listings },
			) => {
				let wanted = card.to_lowercase();
				let plausible: Vec<Listing> = listings.into_iter().filter(|listing| title_card(&listing.title) <= wanted || is_sealed(listing)).collect();

				let effect = if plausible.is_empty() {
					// Listings are sorted by title, so this card is done.
					match pending.pop_front() {
						Some(next) => self.fetch(next, 1),
						None => {
							in_flight -= 1;
							Effect::none()
						}
					}
				} else {
					let kept = plausible.into_iter().filter(|listing| title_card(&listing.title) == wanted && !is_sealed(listing) && listing.condition == "NM / SP");
					results.entry(card.clone()).or_default().extend(kept);
					self.fetch(card, page + 1)
				};

				let next = if in_flight == 0 {
					Model::Review {
						results,
						decklist,
						constraints: BTreeMap::new(),
					}
				} else {
					Model::Loading {
						results,
						decklist,
						pending,
						in_flight,
					}
				};
				(next, effect)
			}

			(
				Model::Review {
					results,
					decklist,
					mut constraints,
				},
				Msg::UserUpdatedConstraints { card, index },
			) => {
				let indices = constraints.entry(card).or_default();
				if !indices.remove(&index) {
					indices.insert(index);
				}
				(Model::Review { results, decklist, constraints }, Effect::none())
			}

			(state, message) => {
				tracing::debug!(?message, "Ignoring message in this state");
				(state, Effect::none())
			}
		};
		*model = next;
		effect
	}

	fn view(&self, model: &Model) -> VNode<Msg> {
		match model {
			Model::DecklistInput(decklist) => element(
				"div",
				vec![class("flex"), class("flex-col")],
				vec![
					element(
						"textarea",
						vec![class("h-96"), property("value", decklist.as_str()), on_input(Msg::UserUpdatedDecklist)],
						vec![text(decklist.as_str())],
					),
					element("button", vec![on_click(Msg::UserSubmittedDecklist)], vec![text("Submit")]),
				],
			),
			Model::Loading { results, decklist, .. } => element("p", vec![], vec![text(format!("Loading {}/{}", results.len(), decklist.len()))]),
			Model::Review { results, decklist, constraints } => {
				let mut children = Vec::new();
				let (total, optimal) = find_optimal(decklist, results, constraints);
				children.push(element("h3", vec![], vec![text("Best Order - "), text(total.to_string())]));
				children.push(listings_view(&optimal, |_, _| None));
				for (card, _) in decklist {
					let listings = results.get(card).map_or(&[][..], Vec::as_slice);
					children.push(element("h3", vec![], vec![text(card.as_str())]));
					children.push(listings_view(listings, |index, _| {
						Some(Msg::UserUpdatedConstraints {
							card: card.clone(),
							index,
						})
					}));
				}
				element("div", vec![], children)
			}
		}
	}
}

fn listings_view(listings: &[Listing], on_select: impl Fn(usize, &Listing) -> Option<Msg>) -> VNode<Msg> {
	element(
		"div",
		vec![style("display", "flex"), style("gap", "20px"), class("flex-wrap")],
		listings
			.iter()
			.enumerate()
			.map(|(index, listing)| {
				let mut attributes = vec![class("listing")];
				attributes.extend(on_select(index, listing).map(on_click));
				element(
					"div",
					attributes,
					vec![
						element("p", vec![], vec![text(listing.store.as_str())]),
						element(
							"a",
							vec![href(listing.url.as_str()), attribute("target", "_blank")],
							vec![element("img", vec![src(listing.image_url.as_str()), attribute("loading", "lazy")], vec![])],
						),
						element(
							"div",
							vec![class("flex")],
							vec![
								element("p", vec![], vec![text(listing.condition.as_str())]),
								element("p", vec![], vec![text("$"), text(listing.price.to_string())]),
							],
						),
					],
				)
			})
			.collect(),
	)
}

/// The cheapest order that covers as many cards as possible, with [`COST_PER_STORE`] charged for
/// every store ordered from.
///
/// Cards with a single (allowed) listing pin their store. Of the rest, stores beaten on every card
/// by another store are never considered, and at most [`MAX_STORES`] are combined.
pub fn find_optimal(decklist: &Decklist, results: &Results, constraints: &BTreeMap<String, BTreeSet<usize>>) -> (f64, Vec<Listing>) {
	let mut per_card: Vec<Vec<&Listing>> = Vec::new();
	for (card, _) in decklist {
		let listings = results.get(card).map_or(&[][..], Vec::as_slice);
		let allowed: Vec<&Listing> = match constraints.get(card).filter(|indices| !indices.is_empty()) {
			Some(indices) => listings.iter().enumerate().filter(|(index, _)| indices.contains(index)).map(|(_, listing)| listing).collect(),
			None => listings.iter().collect(),
		};
		if !allowed.is_empty() {
			per_card.push(allowed);
		}
	}

	// Store → cheapest price per card index.
	let mut store_prices: BTreeMap<&str, BTreeMap<usize, f64>> = BTreeMap::new();
	for (card, listings) in per_card.iter().enumerate() {
		for listing in listings {
			let price = store_prices.entry(listing.store.as_str()).or_default().entry(card).or_insert(listing.price);
			if listing.price < *price {
				*price = listing.price;
			}
		}
	}

	let must_include: BTreeSet<&str> = per_card.iter().filter(|listings| listings.len() == 1).map(|listings| listings[0].store.as_str()).collect();
	let dominated = |store: &str, prices: &BTreeMap<usize, f64>| {
		store_prices.iter().any(|(other, other_prices)| {
			*other != store && prices.iter().all(|(card, price)| other_prices.get(card).map_or(false, |other_price| other_price < price))
		})
	};
	let candidates: Vec<&str> = store_prices
		.iter()
		.filter(|&(store, prices)| !must_include.contains(store) && !dominated(*store, prices))
		.map(|(store, _)| *store)
		.collect();

	let mut best: Option<(usize, f64, Vec<Listing>)> = None;
	for subset in subsets(&candidates, MAX_STORES) {
		let stores: BTreeSet<&str> = must_include.iter().copied().chain(subset).collect();
		let chosen: Vec<&Listing> = per_card
			.iter()
			.filter_map(|listings| {
				listings
					.iter()
					.copied()
					.filter(|listing| stores.contains(listing.store.as_str()))
					.fold(None, |cheapest: Option<&Listing>, listing| match cheapest {
						Some(cheapest) if cheapest.price <= listing.price => Some(cheapest),
						_ => Some(listing),
					})
			})
			.collect();
		let total: f64 = chosen.iter().map(|listing| listing.price).sum();
		#[allow(clippy::cast_precision_loss)]
		let cost = total + COST_PER_STORE * stores.len() as f64;
		let better = match &best {
			None => true,
			Some((count, best_cost, _)) => chosen.len() > *count || (chosen.len() == *count && cost < *best_cost),
		};
		if better {
			best = Some((chosen.len(), cost, chosen.into_iter().cloned().collect()));
		}
	}

	best.map_or((0.0, Vec::new()), |(_, _, listings)| {
		let total = listings.iter().map(|listing| listing.price).sum();
		(total, listings)
	})
}

/// Every subset of `items` with at most `max` elements, the empty one included.
fn subsets<'a>(items: &[&'a str], max: usize) -> Vec<Vec<&'a str>> {
	let mut all = vec![Vec::new()];
	for item in items {
		let grown: Vec<Vec<&str>> = all
			.iter()
			.filter(|subset| subset.len() < max)
			.map(|subset| {
				let mut subset = subset.clone();
				subset.push(*item);
				subset
			})
			.collect();
		all.extend(grown);
	}
	all
}
