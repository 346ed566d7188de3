//! Integration tests for async component output
//!
//! Futures and streams are driven by a `futures` local pool handed to the
//! renderer as its spawner:
//! 1. Each stream item patches the region once
//! 2. A future resolves into its region, seeing the provided context
//! 3. Unmounting or dropping the renderer aborts the task

use futures::channel::mpsc;
use futures::executor::LocalPool;
use rstest::{fixture, rstest};
use tessera_pages::{
	ComponentOutput, ComponentView, Context, Document, DomStrategy, RenderOptions, Renderer, View,
};

struct Harness {
	pool: LocalPool,
	document: Document,
	renderer: Renderer<DomStrategy>,
}

#[fixture]
fn harness() -> Harness {
	let pool = LocalPool::new();
	let document = Document::new();
	let renderer = Renderer::new(
		document.strategy(),
		RenderOptions::new().spawner(pool.spawner()),
	);
	Harness {
		pool,
		document,
		renderer,
	}
}

#[rstest]
fn test_stream_items_patch_region(mut harness: Harness) {
	let (tx, rx) = mpsc::unbounded::<View>();
	let _handle = harness
		.renderer
		.render(ComponentOutput::stream(rx), harness.document.body())
		.unwrap();
	assert_eq!(harness.document.body().inner_html(), "<!--/-->");

	tx.unbounded_send(View::text("loading")).unwrap();
	harness.pool.run_until_stalled();
	assert_eq!(harness.document.body().inner_html(), "loading<!--/-->");
	assert_eq!(harness.renderer.stats().patched, 1);

	tx.unbounded_send(View::element("p").child("ready").into())
		.unwrap();
	harness.pool.run_until_stalled();
	assert_eq!(harness.document.body().inner_html(), "<p>ready</p><!--/-->");
	assert_eq!(harness.renderer.stats().patched, 2);

	drop(tx);
	harness.pool.run_until_stalled();
	assert_eq!(harness.document.body().inner_html(), "<p>ready</p><!--/-->");
}

#[rstest]
fn test_future_component_sees_context(mut harness: Harness) {
	let user = ComponentView::new("User", (), |_, cx: &mut Context| {
		let name = cx.use_context::<String>().unwrap_or_default();
		Ok(ComponentOutput::future(async move {
			View::from(View::element("span").child(name))
		}))
	});
	let app = ComponentView::new("App", user, |user, cx| {
		cx.provide("ada".to_string());
		Ok(View::element("div")
			.child(user.clone())
			.child("!")
			.into())
	});

	let _handle = harness
		.renderer
		.render(app, harness.document.body())
		.unwrap();
	assert_eq!(harness.document.body().inner_html(), "<div><!--/-->!</div>");

	harness.pool.run_until_stalled();
	assert_eq!(
		harness.document.body().inner_html(),
		"<div><span>ada</span><!--/-->!</div>"
	);
	assert_eq!(harness.renderer.stats().patched, 1);
}

#[rstest]
fn test_unmount_aborts_task(mut harness: Harness) {
	let (tx, rx) = mpsc::unbounded::<View>();
	let handle = harness
		.renderer
		.render(ComponentOutput::stream(rx), harness.document.body())
		.unwrap();
	harness.pool.run_until_stalled();

	handle.unmount();
	harness.pool.run_until_stalled();

	assert!(tx.is_closed());
	assert!(tx.unbounded_send(View::text("late")).is_err());
	assert_eq!(harness.document.body().child_count(), 0);
	assert_eq!(harness.renderer.stats().patched, 0);
}

#[rstest]
fn test_dropping_renderer_aborts_task(mut harness: Harness) {
	let (tx, rx) = mpsc::unbounded::<View>();
	harness
		.renderer
		.render(ComponentOutput::stream(rx), harness.document.body())
		.unwrap()
		.forget();

	drop(harness.renderer);
	harness.pool.run_until_stalled();

	assert!(tx.is_closed());
}
