//! Integration tests for hydration
//!
//! Server output is parsed into a [`Document`] and hydrated against the
//! view that produced it:
//! 1. Hydrated text stays bound to its signal without creating nodes
//! 2. SSR output hydrates with zero structural operations
//! 3. Listeners and holes work after hydration
//! 4. Hydrated keyed lists reconcile like rendered ones

use std::cell::Cell;
use std::rc::Rc;

use rstest::rstest;
use tessera_pages::{
	AttrValue, ComponentView, Document, DomStrategy, Event, RenderOptions, Renderer, SsrRenderer,
	View, render_to_string,
};
use tessera_reactive::{Runtime, Signal};

fn page(count: &Signal<i32>, clicks: &Rc<Cell<u32>>) -> View {
	let badge = ComponentView::new("Badge", count.read_only(), |count, _| {
		Ok(View::element("b")
			.dyn_attr("data-n", count.map(|n| AttrValue::Int(i64::from(n))))
			.child(View::dyn_text(count.map(|n| format!("#{n}"))))
			.into())
	});
	let clicks = clicks.clone();
	View::element("section")
		.attr("class", "page")
		.child(
			View::element("button")
				.on("click", move |_| clicks.set(clicks.get() + 1))
				.child("+"),
		)
		.child(
			View::element("p")
				.child("count: ")
				.child(View::dyn_text(count.read_only().map(|n| n.to_string()))),
		)
		.child(View::reactive(count.read_only().map(|n| {
			if n % 2 == 0 {
				View::element("em").child("even").into()
			} else {
				View::text("odd")
			}
		})))
		.child(badge)
		.into()
}

#[rstest]
fn test_hydrated_text_follows_signal() {
	let rt = Runtime::new();
	let count = Signal::new(&rt, 5);
	let document = Document::parse("<div>5</div>").unwrap();
	let renderer = Renderer::new(document.strategy(), RenderOptions::new());

	let root = renderer
		.hydrate(
			View::element("div").child(View::dyn_text(count.read_only().map(|n| n.to_string()))),
			document.body(),
		)
		.unwrap()
		.unwrap();
	let text = root.node().first_child().unwrap();

	count.set(10);
	rt.flush();

	assert_eq!(document.body().inner_html(), "<div>10</div>");
	assert!(root.node().first_child().unwrap().ptr_eq(&text));
	let stats = document.stats();
	assert_eq!(stats.created, 0);
	assert_eq!(stats.text_writes, 1);
	assert!(renderer.diagnostics().is_empty());
}

#[rstest]
fn test_ssr_output_hydrates_without_structural_operations() {
	let rt = Runtime::new();
	let count = Signal::new(&rt, 4);
	let clicks = Rc::new(Cell::new(0));

	let markup = render_to_string(&page(&count, &clicks)).unwrap();
	assert_eq!(
		markup,
		"<section class=\"page\"><button>+</button><p>count: <!--~-->4</p>\
		 <em>even</em><!--/--><b data-n=\"4\">#4</b></section>"
	);

	let document = Document::parse(&markup).unwrap();
	let renderer = Renderer::new(document.strategy(), RenderOptions::new());
	let _root = renderer
		.hydrate(page(&count, &clicks), document.body())
		.unwrap()
		.unwrap();

	assert_eq!(document.stats().structural(), 0);
	assert_eq!(document.body().inner_html(), markup);
	assert!(renderer.diagnostics().is_empty());
	assert_eq!(renderer.stats().adopted, 0);
}

#[rstest]
fn test_listeners_and_holes_work_after_hydration() {
	let rt = Runtime::new();
	let count = Signal::new(&rt, 4);
	let clicks = Rc::new(Cell::new(0));
	let markup = render_to_string(&page(&count, &clicks)).unwrap();
	let document = Document::parse(&markup).unwrap();
	let renderer = Renderer::new(document.strategy(), RenderOptions::new());
	let root = renderer
		.hydrate(page(&count, &clicks), document.body())
		.unwrap()
		.unwrap();

	let button = root.node().find_element("button").unwrap();
	assert_eq!(button.dispatch(&Event::new("click")), 1);
	assert_eq!(clicks.get(), 1);

	count.set(5);
	rt.flush();
	assert_eq!(
		document.body().inner_html(),
		"<section class=\"page\"><button>+</button><p>count: <!--~-->5</p>\
		 odd<!--/--><b data-n=\"5\">#5</b></section>"
	);
	assert_eq!(renderer.stats().patched, 1);

	root.unmount();
	assert_eq!(rt.subscriber_count(count.id()), 0);
	assert_eq!(button.dispatch(&Event::new("click")), 0);
	assert_eq!(document.body().child_count(), 0);
}

#[rstest]
fn test_hydrated_keyed_list_reorders() {
	let rt = Runtime::new();
	let keys = Signal::new(&rt, vec![1_i64, 2, 3]);
	let list = |keys: &Signal<Vec<i64>>| -> View {
		View::element("ol")
			.child(View::reactive(keys.read_only().map(|keys| {
				View::fragment(
					keys.into_iter()
						.map(|key| View::element("li").key(key).child(key.to_string()))
						.collect::<Vec<_>>(),
				)
			})))
			.into()
	};
	let markup = SsrRenderer::new().render(&list(&keys)).unwrap();
	let document = Document::parse(&markup).unwrap();
	let renderer: Renderer<DomStrategy> =
		Renderer::new(document.strategy(), RenderOptions::new());
	let _root = renderer.hydrate(list(&keys), document.body()).unwrap().unwrap();
	let third = document.body().find_element("ol").unwrap().children()[2].clone();

	keys.set(vec![3, 1]);
	rt.flush();

	let ol = document.body().find_element("ol").unwrap();
	assert_eq!(ol.inner_html(), "<li>3</li><li>1</li><!--/-->");
	assert!(ol.first_child().unwrap().ptr_eq(&third));
	assert_eq!(document.stats().created, 0);
	assert_eq!(renderer.stats().moved, 1);
}
