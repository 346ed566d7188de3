//! Integration tests for keyed reconciliation
//!
//! Lists are rendered through a reactive hole so every signal write runs a
//! reconciliation against the previous children:
//! 1. Reordering keyed children moves target objects without rebuilding them
//! 2. A new key builds exactly one subtree
//! 3. Keyless children are patched in place
//! 4. Keyed fragments move as a group
//! 5. Unmounting releases every subscription

use rstest::{fixture, rstest};
use tessera_pages::{Document, DomNode, DomStrategy, RenderHandle, RenderOptions, Renderer, View};
use tessera_reactive::{Runtime, Signal};

struct Harness {
	rt: Runtime,
	document: Document,
	renderer: Renderer<DomStrategy>,
}

#[fixture]
fn harness() -> Harness {
	let document = Document::new();
	let renderer = Renderer::new(document.strategy(), RenderOptions::new());
	Harness {
		rt: Runtime::new(),
		document,
		renderer,
	}
}

fn item(key: &'static str) -> View {
	View::element("li").key(key).child(key).into()
}

fn keyed_list(keys: &[&'static str]) -> View {
	View::fragment(keys.iter().copied().map(item).collect::<Vec<_>>())
}

fn mount_list(harness: &Harness, keys: Signal<Vec<&'static str>>) -> RenderHandle<DomStrategy> {
	let content = keys.read_only().map(|keys| keyed_list(&keys));
	harness
		.renderer
		.render(
			View::element("ul").child(View::reactive(content)),
			harness.document.body(),
		)
		.unwrap()
}

fn list_items(document: &Document) -> Vec<DomNode> {
	let list = document.body().find_element("ul").unwrap();
	list.children()
		.into_iter()
		.filter(|node| node.is_element())
		.collect()
}

#[rstest]
fn test_keyed_reorder_moves_without_rebuilding(harness: Harness) {
	let keys = Signal::new(&harness.rt, vec!["a", "b", "c"]);
	let _handle = mount_list(&harness, keys.clone());
	let before = list_items(&harness.document);
	assert_eq!(
		harness.document.body().inner_html(),
		"<ul><li>a</li><li>b</li><li>c</li><!--/--></ul>"
	);
	let baseline = harness.renderer.stats();
	harness.document.reset_stats();

	keys.set(vec!["c", "a"]);
	harness.rt.flush();

	let stats = harness.renderer.stats();
	assert_eq!(
		harness.document.body().inner_html(),
		"<ul><li>c</li><li>a</li><!--/--></ul>"
	);
	assert_eq!(stats.materialized, baseline.materialized);
	assert_eq!(stats.unmounted - baseline.unmounted, 1);
	assert_eq!(stats.moved - baseline.moved, 1);
	assert_eq!(harness.document.stats().created, 0);
	assert_eq!(harness.document.stats().removed, 1);

	let after = list_items(&harness.document);
	assert!(after[0].ptr_eq(&before[2]));
	assert!(after[1].ptr_eq(&before[0]));
	assert!(before[1].parent().is_none());
}

fn entry(key: &'static str) -> View {
	View::fragment([
		View::from(View::element("dt").child(key)),
		View::from(View::element("dd").child(key)),
	])
	.keyed(key)
}

#[rstest]
fn test_keyed_fragments_move_as_a_group(harness: Harness) {
	let keys = Signal::new(&harness.rt, vec!["a", "b"]);
	let content = keys.read_only().map(|keys| {
		View::fragment(keys.into_iter().map(entry).collect::<Vec<_>>())
	});
	let _handle = harness
		.renderer
		.render(
			View::element("dl").child(View::reactive(content)),
			harness.document.body(),
		)
		.unwrap();
	let before = harness.document.body().find_element("dl").unwrap().children();
	let baseline = harness.renderer.stats();
	harness.document.reset_stats();

	keys.set(vec!["b", "a"]);
	harness.rt.flush();

	let dl = harness.document.body().find_element("dl").unwrap();
	assert_eq!(
		dl.inner_html(),
		"<dt>b</dt><dd>b</dd><dt>a</dt><dd>a</dd><!--/-->"
	);
	let after = dl.children();
	assert!(after[0].ptr_eq(&before[2]));
	assert!(after[1].ptr_eq(&before[3]));
	assert!(after[2].ptr_eq(&before[0]));
	let stats = harness.renderer.stats();
	assert_eq!(stats.materialized, baseline.materialized);
	assert_eq!(stats.moved - baseline.moved, 1);
	let dom = harness.document.stats();
	assert_eq!(dom.created, 0);
	assert_eq!(dom.text_writes, 0);
}

#[rstest]
fn test_new_key_builds_one_subtree(harness: Harness) {
	let keys = Signal::new(&harness.rt, vec!["a", "c"]);
	let _handle = mount_list(&harness, keys.clone());
	let baseline = harness.renderer.stats();
	harness.document.reset_stats();

	keys.set(vec!["a", "b", "c"]);
	harness.rt.flush();

	assert_eq!(
		harness.document.body().inner_html(),
		"<ul><li>a</li><li>b</li><li>c</li><!--/--></ul>"
	);
	let stats = harness.renderer.stats();
	assert_eq!(stats.materialized - baseline.materialized, 1);
	assert_eq!(stats.moved, baseline.moved);
	let dom = harness.document.stats();
	// the text lands in the `li` before the `li` lands in the list
	assert_eq!(dom.created, 2);
	assert_eq!(dom.inserted, 2);
	assert_eq!(dom.removed, 0);
}

#[rstest]
fn test_keyless_children_patch_in_place(harness: Harness) {
	let labels = Signal::new(&harness.rt, vec!["one".to_string(), "two".to_string()]);
	let content = labels.read_only().map(|labels| {
		View::fragment(
			labels
				.into_iter()
				.map(|label| View::element("span").child(label))
				.collect::<Vec<_>>(),
		)
	});
	let _handle = harness
		.renderer
		.render(View::reactive(content), harness.document.body())
		.unwrap();
	harness.document.reset_stats();

	labels.set(vec!["uno".to_string(), "two".to_string()]);
	harness.rt.flush();

	assert_eq!(
		harness.document.body().inner_html(),
		"<span>uno</span><span>two</span><!--/-->"
	);
	let dom = harness.document.stats();
	assert_eq!(dom.structural(), 0);
	assert_eq!(dom.text_writes, 1);
}

#[rstest]
fn test_unmount_releases_subscriptions(harness: Harness) {
	let keys = Signal::new(&harness.rt, vec!["a", "b"]);
	let label = Signal::new(&harness.rt, "x".to_string());
	let handle = harness
		.renderer
		.render(
			View::fragment(vec![
				View::dyn_text(label.read_only()),
				View::reactive(keys.read_only().map(|keys| keyed_list(&keys))),
			]),
			harness.document.body(),
		)
		.unwrap();
	assert_eq!(harness.rt.subscriber_count(keys.id()), 1);
	assert_eq!(harness.rt.subscriber_count(label.id()), 1);

	handle.unmount();

	assert_eq!(harness.rt.subscriber_count(keys.id()), 0);
	assert_eq!(harness.rt.subscriber_count(label.id()), 0);
	assert_eq!(harness.renderer.mount_count(), 0);
	assert_eq!(harness.document.body().child_count(), 0);

	keys.set(vec!["c"]);
	label.set("y".to_string());
	harness.rt.flush();
	assert_eq!(harness.document.body().inner_html(), "");
}
