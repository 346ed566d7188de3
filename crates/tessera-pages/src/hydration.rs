//! Hydration: attaching a view to target objects that already exist.
//!
//! The walk moves a cursor over the existing children of each target node
//! in document order, in lockstep with the view. At every position the
//! existing node is either
//!
//! - **matching** (same kind, same tag): bindings are attached and the walk
//!   descends; static attributes are trusted and never rewritten;
//! - **mismatched**: the node is adopted untouched and reported;
//! - **exhausted** (no node left): the missing part is materialized and
//!   inserted, and reported.
//!
//! Text-separator comments are skipped. Every reactive hole and async
//! region expects its anchor comment right after its content; a missing one
//! is inserted. While a hole's content is walked, reaching its anchor means
//! the content ran out early. An error or a panic during the walk abandons
//! the partial result: the container is cleared and the view rendered from
//! scratch.

use core::cell::Cell;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::StreamExt;
use futures::stream::LocalBoxStream;
use tessera_reactive::ReadSignal;
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{HydrationError, RenderError, RenderResult};
use crate::renderer::{
	DiagnosticKind, DynamicSource, MountId, MountKind, Mounted, RenderHandle, Renderer,
};
use crate::strategy::{NodeKind, RenderStrategy};
use crate::view::{ComponentOutput, ElementView, IntoView, Key, View};

type WalkResult<T> = Result<T, HydrationError>;

/// A hydrated root.
pub struct HydrationRoot<S: RenderStrategy> {
	node: S::Node,
	handle: RenderHandle<S>,
}

impl<S: RenderStrategy> HydrationRoot<S> {
	fn new(renderer: &Renderer<S>, root: MountId, container: &S::Node) -> Self {
		let node = renderer
			.targets(root)
			.into_iter()
			.next()
			.unwrap_or_else(|| container.clone());
		Self {
			node,
			handle: RenderHandle::new(renderer, root),
		}
	}

	/// First target object of the hydrated content.
	pub fn node(&self) -> &S::Node {
		&self.node
	}

	pub fn handle(&self) -> &RenderHandle<S> {
		&self.handle
	}

	pub fn unmount(&self) {
		self.handle.unmount();
	}

	pub fn into_handle(self) -> RenderHandle<S> {
		self.handle
	}
}

impl<S: RenderStrategy> Renderer<S> {
	/// Attach `view` to the existing content of `container`.
	///
	/// Returns `Ok(None)` with a warning when the container is empty. A walk
	/// that fails falls back to a fresh render; only a failing fallback is
	/// an error.
	pub fn hydrate(
		&self,
		view: impl IntoView,
		container: &S::Node,
	) -> RenderResult<Option<HydrationRoot<S>>> {
		let view = view.into_view();
		self.exclusive(|| {
			if self.inner.strategy.first_child(container).is_none() {
				self.diagnose(
					DiagnosticKind::EmptyContainer,
					format!("nothing to hydrate in {container:?}"),
				);
				return Ok(None);
			}

			let first = self.peek_id();
			let root = self.new_root(container);
			let walk = Walk {
				renderer: self,
				open_regions: Cell::new(0),
			};
			let outcome = catch_unwind(AssertUnwindSafe(|| walk.run(view.clone(), root, container)))
				.unwrap_or_else(|payload| Err(HydrationError::Panicked(panic_message(&*payload))));
			match outcome {
				Ok(()) => {
					debug!(root = %root, "hydrated container");
					Ok(Some(HydrationRoot::new(self, root, container)))
				}
				Err(err) => self.fall_back(first, view, container, err).map(Some),
			}
		})
	}

	/// Discard a failed walk and render `view` from scratch.
	fn fall_back(
		&self,
		first: MountId,
		view: View,
		container: &S::Node,
		err: HydrationError,
	) -> RenderResult<HydrationRoot<S>> {
		self.release_since(first);
		self.diagnose(
			DiagnosticKind::HydrationFallback,
			format!("hydration failed, rendering from scratch: {err}"),
		);

		let strategy = &self.inner.strategy;
		let mut existing = Vec::new();
		let mut cursor = strategy.first_child(container);
		while let Some(node) = cursor {
			cursor = strategy.next_sibling(&node);
			existing.push(node);
		}
		for node in &existing {
			strategy
				.remove_child(node)
				.map_err(|err| RenderError::Fallback(err.to_string()))?;
		}

		let root = self
			.mount_root(ComponentOutput::View(view), container)
			.map_err(|err| RenderError::Fallback(err.to_string()))?;
		Ok(HydrationRoot::new(self, root, container))
	}
}

struct Walk<'r, S: RenderStrategy> {
	renderer: &'r Renderer<S>,
	/// Holes entered on the current host whose anchor is still ahead.
	open_regions: Cell<usize>,
}

impl<S: RenderStrategy> Walk<'_, S> {
	fn strategy(&self) -> &S {
		&self.renderer.inner.strategy
	}

	fn run(&self, view: View, root: MountId, container: &S::Node) -> WalkResult<()> {
		let mut cursor = self.strategy().first_child(container);
		let content = self.hydrate(view, &Context::new(), root, container, &mut cursor)?;
		self.renderer.push_child(root, content);
		self.trim(container, &mut cursor)
	}

	/// The node under the cursor, past any text separators.
	fn current(&self, host: &S::Node, cursor: &mut Option<S::Node>) -> WalkResult<Option<S::Node>> {
		let strategy = self.strategy();
		let separator = &self.renderer.inner.options.text_separator;
		while let Some(node) = cursor.clone() {
			match strategy.parent(&node) {
				Some(parent) if strategy.same_node(&parent, host) => {}
				_ => {
					return Err(HydrationError::CursorLost(format!(
						"{node:?} is no longer a child of {host:?}"
					)));
				}
			}
			match strategy.inspect(&node) {
				NodeKind::Comment(text) if text == *separator => {
					*cursor = strategy.next_sibling(&node);
				}
				_ => return Ok(Some(node)),
			}
		}
		Ok(None)
	}

	/// The node under the cursor that can stand for a content item.
	///
	/// Inside an open hole the anchor comment ends the content, so it is
	/// reported as no node at all.
	fn item(&self, host: &S::Node, cursor: &mut Option<S::Node>) -> WalkResult<Option<S::Node>> {
		let current = self.current(host, cursor)?;
		if self.open_regions.get() > 0 && current.as_ref().is_some_and(|node| self.is_anchor(node)) {
			return Ok(None);
		}
		Ok(current)
	}

	fn is_anchor(&self, node: &S::Node) -> bool {
		let anchor_text = &self.renderer.inner.options.hole_anchor;
		matches!(self.strategy().inspect(node), NodeKind::Comment(text) if text == *anchor_text)
	}

	fn advance(&self, cursor: &mut Option<S::Node>, node: &S::Node) {
		*cursor = self.strategy().next_sibling(node);
	}

	fn hydrate(
		&self,
		view: View,
		cx: &Context,
		parent: MountId,
		host: &S::Node,
		cursor: &mut Option<S::Node>,
	) -> WalkResult<MountId> {
		let renderer = self.renderer;
		let key = view.key().cloned();
		match view {
			View::Element(el) => self.element(el, key, cx, parent, host, cursor),
			View::Text(text) => self.text(&text, None, key, cx, parent, host, cursor),
			View::DynText(signal) => {
				let text = signal.get();
				self.text(&text, Some(&signal), key, cx, parent, host, cursor)
			}
			View::Fragment(children) => {
				let id = renderer.insert(Mounted::new(MountKind::Fragment, Some(parent), key, cx));
				for child in children {
					let child = self.hydrate(child, cx, id, host, cursor)?;
					renderer.push_child(id, child);
				}
				Ok(id)
			}
			View::Reactive(signal) => {
				let id = renderer.reserve();
				self.open_regions.set(self.open_regions.get() + 1);
				let content = self.hydrate(signal.get(), cx, id, host, cursor);
				self.open_regions.set(self.open_regions.get() - 1);
				let content = content?;
				let anchor = self.anchor(host, cursor)?;
				let mut mounted = Mounted::new(
					MountKind::Dynamic {
						anchor,
						source: DynamicSource::Signal(signal.id()),
					},
					Some(parent),
					key,
					cx,
				);
				mounted.children.push(content);
				mounted.disposers.push(renderer.watch_hole(id, &signal));
				renderer.insert_at(id, mounted);
				Ok(id)
			}
			View::Component(component) => {
				let mut inner_cx = cx.clone();
				let name = component.name();
				match component.invoke(&mut inner_cx)? {
					ComponentOutput::View(view) => {
						let id = self.hydrate(view, &inner_cx, parent, host, cursor)?;
						if key.is_some() {
							renderer.with_mount_mut(id, |m| {
								if m.key.is_none() {
									m.key = key;
								}
							});
						}
						Ok(id)
					}
					ComponentOutput::Future(future) => {
						let stream = futures::stream::once(future).boxed_local();
						self.async_region(stream, name, key, &inner_cx, parent, host, cursor)
					}
					ComponentOutput::Stream(stream) => {
						self.async_region(stream, name, key, &inner_cx, parent, host, cursor)
					}
				}
			}
			View::Keyed(_, inner) => {
				let id = self.hydrate(*inner, cx, parent, host, cursor)?;
				renderer.with_mount_mut(id, |m| m.key = key);
				Ok(id)
			}
			View::Empty => Ok(renderer.insert(Mounted::new(MountKind::Empty, Some(parent), key, cx))),
		}
	}

	fn element(
		&self,
		el: ElementView,
		key: Option<Key>,
		cx: &Context,
		parent: MountId,
		host: &S::Node,
		cursor: &mut Option<S::Node>,
	) -> WalkResult<MountId> {
		let renderer = self.renderer;
		let Some(node) = self.item(host, cursor)? else {
			renderer.diagnose(
				DiagnosticKind::Exhausted,
				format!("expected <{}> but {host:?} has no more children", el.tag_name()),
			);
			return self.insert_missing(View::Element(el), cx, parent, host, cursor);
		};

		match self.strategy().inspect(&node) {
			NodeKind::Element(tag) if tag.eq_ignore_ascii_case(el.tag_name()) => {
				self.advance(cursor, &node);
				let kind = renderer.element_kind(node.clone(), &el, false)?;
				let id = renderer.insert(Mounted::new(kind, Some(parent), key, cx));
				let outer_regions = self.open_regions.replace(0);
				let walked = self.children(el, cx, id, &node);
				self.open_regions.set(outer_regions);
				walked.map(|()| id)
			}
			NodeKind::Element(tag) => {
				let message = format!("expected <{}> but found <{tag}>", el.tag_name());
				Ok(self.adopt(node, DiagnosticKind::TagMismatch, message, key, cx, parent, cursor))
			}
			found => {
				let message = format!("expected <{}> but found {found:?}", el.tag_name());
				Ok(self.adopt(node, DiagnosticKind::KindMismatch, message, key, cx, parent, cursor))
			}
		}
	}

	/// Walk the children of a matched element and trim what is left.
	fn children(&self, el: ElementView, cx: &Context, id: MountId, node: &S::Node) -> WalkResult<()> {
		let mut cursor = self.strategy().first_child(node);
		for child in el.into_children() {
			let child = self.hydrate(child, cx, id, node, &mut cursor)?;
			self.renderer.push_child(id, child);
		}
		self.trim(node, &mut cursor)
	}

	#[allow(clippy::too_many_arguments)]
	fn text(
		&self,
		text: &str,
		signal: Option<&ReadSignal<String>>,
		key: Option<Key>,
		cx: &Context,
		parent: MountId,
		host: &S::Node,
		cursor: &mut Option<S::Node>,
	) -> WalkResult<MountId> {
		let renderer = self.renderer;
		let current = self.item(host, cursor)?;
		let found = current
			.as_ref()
			.map(|node| self.strategy().inspect(node));

		let (node, actual) = match (current, found) {
			(Some(node), Some(NodeKind::Text(actual))) if !text.is_empty() || actual.is_empty() => {
				(node, actual)
			}
			// Markup cannot carry empty text nodes.
			(_, _) if text.is_empty() => {
				return self.insert_missing(restore_text(text, signal), cx, parent, host, cursor);
			}
			(Some(node), Some(found)) => {
				let message = format!("expected text {text:?} but found {found:?}");
				return Ok(self.adopt(node, DiagnosticKind::KindMismatch, message, key, cx, parent, cursor));
			}
			_ => {
				renderer.diagnose(
					DiagnosticKind::Exhausted,
					format!("expected text {text:?} but {host:?} has no more children"),
				);
				return self.insert_missing(restore_text(text, signal), cx, parent, host, cursor);
			}
		};
		self.advance(cursor, &node);

		let mut kept = text.to_string();
		if actual != text {
			if renderer.inner.options.hydration.correct_text {
				renderer.diagnose(
					DiagnosticKind::TextCorrected,
					format!("corrected text {actual:?} to {text:?}"),
				);
				self.strategy().set_text(&node, text)?;
			} else {
				renderer.diagnose(
					DiagnosticKind::TextCorrected,
					format!("kept text {actual:?} where {text:?} was expected"),
				);
				kept = actual;
			}
		}

		let id = renderer.insert(Mounted::new(
			MountKind::Text { node, text: kept },
			Some(parent),
			key,
			cx,
		));
		if let Some(signal) = signal {
			let watcher = renderer.watch_text(id, signal);
			renderer.with_mount_mut(id, |m| m.disposers.push(watcher));
		}
		Ok(id)
	}

	#[allow(clippy::too_many_arguments)]
	fn async_region(
		&self,
		stream: LocalBoxStream<'static, View>,
		name: &str,
		key: Option<Key>,
		cx: &Context,
		parent: MountId,
		host: &S::Node,
		cursor: &mut Option<S::Node>,
	) -> WalkResult<MountId> {
		let renderer = self.renderer;
		let id = renderer.reserve();
		let task = renderer.spawn_updates(id, name, stream)?;
		let content = renderer.insert(Mounted::new(MountKind::Empty, Some(id), None, cx));
		let anchor = self.anchor(host, cursor)?;
		let mut mounted = Mounted::new(
			MountKind::Dynamic {
				anchor,
				source: DynamicSource::Async,
			},
			Some(parent),
			key,
			cx,
		);
		mounted.children.push(content);
		mounted.disposers.push(task);
		renderer.insert_at(id, mounted);
		Ok(id)
	}

	/// Take the anchor comment under the cursor, or insert one there.
	fn anchor(&self, host: &S::Node, cursor: &mut Option<S::Node>) -> WalkResult<S::Node> {
		let strategy = self.strategy();
		let current = self.current(host, cursor)?;
		if let Some(node) = current.as_ref() {
			if self.is_anchor(node) {
				self.advance(cursor, node);
				return Ok(node.clone());
			}
		}
		let anchor = strategy.create_comment(&self.renderer.inner.options.hole_anchor)?;
		strategy.insert_before(host, &anchor, current.as_ref())?;
		trace!("inserted missing hole anchor");
		Ok(anchor)
	}

	/// Keep `node` as is in place of a view it does not match.
	#[allow(clippy::too_many_arguments)]
	fn adopt(
		&self,
		node: S::Node,
		kind: DiagnosticKind,
		message: String,
		key: Option<Key>,
		cx: &Context,
		parent: MountId,
		cursor: &mut Option<S::Node>,
	) -> MountId {
		self.advance(cursor, &node);
		self.renderer.diagnose(kind, message);
		self.renderer.count(|s| s.adopted += 1);
		self.renderer
			.insert(Mounted::new(MountKind::Adopted { node }, Some(parent), key, cx))
	}

	/// Materialize `view` and insert it before the cursor.
	fn insert_missing(
		&self,
		view: View,
		cx: &Context,
		parent: MountId,
		host: &S::Node,
		cursor: &mut Option<S::Node>,
	) -> WalkResult<MountId> {
		let renderer = self.renderer;
		let reference = self.current(host, cursor)?;
		let id = renderer.materialize(view, cx, parent)?;
		for target in renderer.targets(id) {
			self.strategy()
				.insert_before(host, &target, reference.as_ref())?;
		}
		Ok(id)
	}

	/// Report, and unless configured otherwise remove, the nodes left
	/// after the last expected one.
	fn trim(&self, host: &S::Node, cursor: &mut Option<S::Node>) -> WalkResult<()> {
		let remove = self.renderer.inner.options.hydration.remove_extraneous;
		while let Some(node) = self.current(host, cursor)? {
			self.advance(cursor, &node);
			self.renderer.diagnose(
				DiagnosticKind::Extraneous,
				format!(
					"{} extraneous {node:?} in {host:?}",
					if remove { "removed" } else { "kept" }
				),
			);
			if remove {
				self.strategy().remove_child(&node)?;
			}
		}
		Ok(())
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

fn restore_text(text: &str, signal: Option<&ReadSignal<String>>) -> View {
	match signal {
		Some(signal) => View::DynText(signal.clone()),
		None => View::text(text.to_string()),
	}
}
