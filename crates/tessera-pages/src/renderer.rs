//! The renderer: materialization, patching, keyed reconciliation and unmount.
//!
//! ## Mount records
//!
//! Every materialized node is a record in an arena owned by the renderer,
//! keyed by a [`MountId`]. A record holds at most one target-object handle
//! (none for fragments), its ordered children, its key, the context it was
//! built with, and every disposer created while building it. Target objects
//! are plain handles; the arena owns the records and releasing a record
//! releases its disposers.
//!
//! ## Updates
//!
//! Signal callbacks and async tasks never patch directly. They queue an
//! update that the renderer applies as soon as it is not in the middle of
//! another operation, so a flush triggered from inside a component cannot
//! observe a half-built tree.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future::abortable;
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use futures::task::LocalSpawnExt;
use tessera_reactive::{Disposer, NodeId, ReadSignal};
use tracing::{debug, error, trace, warn};

use crate::context::Context;
use crate::error::{RenderError, RenderResult};
use crate::options::RenderOptions;
use crate::strategy::RenderStrategy;
use crate::view::{Attr, AttrValue, ComponentOutput, ElementView, Key, View};

/// Identifier of a mount record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MountId(u64);

impl MountId {
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for MountId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Counters of renderer work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
	/// Subtrees built from descriptors.
	pub materialized: usize,
	/// Values delivered to reactive holes and async regions.
	pub patched: usize,
	/// Mounts replaced wholesale.
	pub replaced: usize,
	/// Replacements the strategy performed in place.
	pub reused: usize,
	/// Children unmounted by reconciliation.
	pub unmounted: usize,
	/// Existing children relocated by reconciliation.
	pub moved: usize,
	/// Existing nodes kept untouched after a hydration mismatch.
	pub adopted: usize,
}

/// Category of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
	TextCorrected,
	TagMismatch,
	KindMismatch,
	Exhausted,
	Extraneous,
	EmptyContainer,
	HydrationFallback,
	DuplicateKey,
	UpdateFailed,
}

/// A recovered problem, recorded alongside its log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
	pub kind: DiagnosticKind,
	pub message: String,
}

#[derive(Debug, Clone)]
pub(crate) enum AttrSnapshot {
	Static(AttrValue),
	Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DynamicSource {
	Signal(NodeId),
	Async,
}

pub(crate) enum MountKind<N> {
	Root {
		container: N,
	},
	Element {
		node: N,
		tag: String,
		attrs: BTreeMap<String, AttrSnapshot>,
		bindings: BTreeMap<String, Disposer>,
		listeners: Vec<Disposer>,
		node_ref: Option<Disposer>,
	},
	Text {
		node: N,
		text: String,
	},
	Fragment,
	/// A reactive hole or async region; `children[0]` is the content.
	Dynamic {
		anchor: N,
		source: DynamicSource,
	},
	/// An existing node kept after a hydration mismatch.
	Adopted {
		node: N,
	},
	Empty,
}

pub(crate) struct Mounted<N> {
	pub(crate) kind: MountKind<N>,
	pub(crate) parent: Option<MountId>,
	pub(crate) children: Vec<MountId>,
	pub(crate) key: Option<Key>,
	pub(crate) context: Context,
	/// Text and hole subscriptions, async abort handles.
	pub(crate) disposers: Vec<Disposer>,
}

impl<N> Mounted<N> {
	pub(crate) fn new(
		kind: MountKind<N>,
		parent: Option<MountId>,
		key: Option<Key>,
		context: &Context,
	) -> Self {
		Self {
			kind,
			parent,
			children: Vec::new(),
			key,
			context: context.clone(),
			disposers: Vec::new(),
		}
	}
}

/// Coarse shape of a record, read without holding a borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
	Root,
	Element(String),
	Text,
	Fragment,
	Hole,
	Async,
	Adopted,
	Empty,
}

pub(crate) enum Update {
	Content(MountId, View),
	Text(MountId, String),
}

pub(crate) struct State<N> {
	pub(crate) mounts: BTreeMap<MountId, Mounted<N>>,
	pub(crate) stats: RenderStats,
	pub(crate) diagnostics: VecDeque<Diagnostic>,
}

pub(crate) struct RendererInner<S: RenderStrategy> {
	pub(crate) strategy: S,
	pub(crate) options: RenderOptions,
	pub(crate) state: RefCell<State<S::Node>>,
	queue: RefCell<VecDeque<Update>>,
	busy: Cell<bool>,
	next_id: Cell<u64>,
}

struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

/// Renders views into containers of one backend.
///
/// # Example
///
/// ```ignore
/// let document = Document::new();
/// let renderer = Renderer::new(document.strategy(), RenderOptions::new());
/// let handle = renderer.render(View::element("p").child("hi"), document.body())?;
/// assert_eq!(document.body().inner_html(), "<p>hi</p>");
/// handle.unmount();
/// ```
pub struct Renderer<S: RenderStrategy> {
	pub(crate) inner: Rc<RendererInner<S>>,
}

impl<S: RenderStrategy> Clone for Renderer<S> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<S: RenderStrategy> fmt::Debug for Renderer<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.borrow();
		f.debug_struct("Renderer")
			.field("mounts", &state.mounts.len())
			.field("stats", &state.stats)
			.field("options", &self.inner.options)
			.finish()
	}
}

impl<S: RenderStrategy> Renderer<S> {
	pub fn new(strategy: S, options: RenderOptions) -> Self {
		Self {
			inner: Rc::new(RendererInner {
				strategy,
				options,
				state: RefCell::new(State {
					mounts: BTreeMap::new(),
					stats: RenderStats::default(),
					diagnostics: VecDeque::new(),
				}),
				queue: RefCell::new(VecDeque::new()),
				busy: Cell::new(false),
				next_id: Cell::new(1),
			}),
		}
	}

	pub fn strategy(&self) -> &S {
		&self.inner.strategy
	}

	pub fn options(&self) -> &RenderOptions {
		&self.inner.options
	}

	/// Render `content` at the end of `container`.
	///
	/// `content` is a view, or the future or stream a component would
	/// return. Async content needs a spawner in the options.
	pub fn render(
		&self,
		content: impl Into<ComponentOutput>,
		container: &S::Node,
	) -> RenderResult<RenderHandle<S>> {
		self.exclusive(|| {
			let root = self.mount_root(content.into(), container)?;
			debug!(root = %root, "rendered into container");
			Ok(RenderHandle::new(self, root))
		})
	}

	pub fn stats(&self) -> RenderStats {
		self.inner.state.borrow().stats
	}

	/// Recorded diagnostics, oldest first.
	pub fn diagnostics(&self) -> Vec<Diagnostic> {
		self.inner.state.borrow().diagnostics.iter().cloned().collect()
	}

	/// Recorded diagnostics, clearing the buffer.
	pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
		self.inner.state.borrow_mut().diagnostics.drain(..).collect()
	}

	/// Number of live mount records across all roots.
	pub fn mount_count(&self) -> usize {
		self.inner.state.borrow().mounts.len()
	}

	// ----- records ---------------------------------------------------------

	pub(crate) fn reserve(&self) -> MountId {
		let id = self.inner.next_id.get();
		self.inner.next_id.set(id + 1);
		MountId(id)
	}

	pub(crate) fn insert_at(&self, id: MountId, mounted: Mounted<S::Node>) {
		self.inner.state.borrow_mut().mounts.insert(id, mounted);
	}

	pub(crate) fn insert(&self, mounted: Mounted<S::Node>) -> MountId {
		let id = self.reserve();
		self.insert_at(id, mounted);
		id
	}

	pub(crate) fn new_root(&self, container: &S::Node) -> MountId {
		self.insert(Mounted::new(
			MountKind::Root {
				container: container.clone(),
			},
			None,
			None,
			&Context::new(),
		))
	}

	/// Materialize `output` under a new root and append it to `container`.
	pub(crate) fn mount_root(
		&self,
		output: ComponentOutput,
		container: &S::Node,
	) -> RenderResult<MountId> {
		let root = self.new_root(container);
		let result = self
			.materialize_output(output, "root", &Context::new(), root, None)
			.and_then(|content| {
				self.push_child(root, content);
				for target in self.targets(content) {
					self.inner.strategy.append_child(container, &target)?;
				}
				Ok(())
			});
		match result {
			Ok(()) => Ok(root),
			Err(err) => {
				self.release(root, true);
				Err(err)
			}
		}
	}

	/// The id the next record will get.
	pub(crate) fn peek_id(&self) -> MountId {
		MountId(self.inner.next_id.get())
	}

	/// Release every record allocated at or after `first`, without
	/// detaching targets.
	pub(crate) fn release_since(&self, first: MountId) {
		let ids: Vec<MountId> = self
			.inner
			.state
			.borrow()
			.mounts
			.range(first..)
			.map(|(id, _)| *id)
			.collect();
		for id in ids {
			self.release(id, false);
		}
	}

	pub(crate) fn with_mount<R>(&self, id: MountId, f: impl FnOnce(&Mounted<S::Node>) -> R) -> Option<R> {
		self.inner.state.borrow().mounts.get(&id).map(f)
	}

	pub(crate) fn with_mount_mut<R>(
		&self,
		id: MountId,
		f: impl FnOnce(&mut Mounted<S::Node>) -> R,
	) -> Option<R> {
		self.inner.state.borrow_mut().mounts.get_mut(&id).map(f)
	}

	pub(crate) fn push_child(&self, parent: MountId, child: MountId) {
		self.with_mount_mut(parent, |m| m.children.push(child));
	}

	pub(crate) fn count(&self, f: impl FnOnce(&mut RenderStats)) {
		f(&mut self.inner.state.borrow_mut().stats);
	}

	/// Log a recovered problem and record it.
	pub(crate) fn diagnose(&self, kind: DiagnosticKind, message: String) {
		match kind {
			DiagnosticKind::HydrationFallback | DiagnosticKind::UpdateFailed => {
				error!(?kind, "{message}")
			}
			_ => warn!(?kind, "{message}"),
		}
		let capacity = self.inner.options.diagnostics_capacity;
		if capacity == 0 {
			return;
		}
		let mut state = self.inner.state.borrow_mut();
		while state.diagnostics.len() >= capacity {
			state.diagnostics.pop_front();
		}
		state.diagnostics.push_back(Diagnostic { kind, message });
	}

	fn shape(&self, id: MountId) -> Option<Shape> {
		self.with_mount(id, |m| match &m.kind {
			MountKind::Root { .. } => Shape::Root,
			MountKind::Element { tag, .. } => Shape::Element(tag.clone()),
			MountKind::Text { .. } => Shape::Text,
			MountKind::Fragment => Shape::Fragment,
			MountKind::Dynamic {
				source: DynamicSource::Signal(_),
				..
			} => Shape::Hole,
			MountKind::Dynamic {
				source: DynamicSource::Async,
				..
			} => Shape::Async,
			MountKind::Adopted { .. } => Shape::Adopted,
			MountKind::Empty => Shape::Empty,
		})
	}

	// ----- target navigation -----------------------------------------------

	/// Top-level target objects of a mount, in document order.
	pub(crate) fn targets(&self, id: MountId) -> Vec<S::Node> {
		let state = self.inner.state.borrow();
		let mut targets = Vec::new();
		collect_targets(&state.mounts, id, &mut targets);
		targets
	}

	/// The target object the children of `id` are inserted into.
	pub(crate) fn host_of(&self, id: MountId) -> RenderResult<S::Node> {
		let state = self.inner.state.borrow();
		let mut current = id;
		loop {
			let mounted = state
				.mounts
				.get(&current)
				.ok_or(RenderError::Detached(current.0))?;
			match &mounted.kind {
				MountKind::Element { node, .. } => return Ok(node.clone()),
				MountKind::Root { container } => return Ok(container.clone()),
				MountKind::Fragment | MountKind::Dynamic { .. } => {
					current = mounted.parent.ok_or(RenderError::Detached(current.0))?;
				}
				_ => return Err(RenderError::Detached(current.0)),
			}
		}
	}

	/// First target object after the targets of `id` that belongs to the
	/// same host, or `None` when `id` ends its host.
	pub(crate) fn next_target_after(&self, id: MountId) -> Option<S::Node> {
		let state = self.inner.state.borrow();
		let mut current = id;
		loop {
			let parent_id = state.mounts.get(&current)?.parent?;
			let parent = state.mounts.get(&parent_id)?;
			let position = parent.children.iter().position(|c| *c == current)?;
			if let Some(next) = parent.children[position + 1..]
				.iter()
				.find_map(|sibling| first_target(&state.mounts, *sibling))
			{
				return Some(next);
			}
			match &parent.kind {
				MountKind::Dynamic { anchor, .. } => return Some(anchor.clone()),
				MountKind::Fragment => current = parent_id,
				_ => return None,
			}
		}
	}

	// ----- building --------------------------------------------------------

	/// Build a detached subtree for `view` and count it.
	pub(crate) fn materialize(
		&self,
		view: View,
		cx: &Context,
		parent: MountId,
	) -> RenderResult<MountId> {
		let id = self.build(view, cx, Some(parent))?;
		self.count(|s| s.materialized += 1);
		trace!(mount = %id, "materialized subtree");
		Ok(id)
	}

	pub(crate) fn materialize_output(
		&self,
		output: ComponentOutput,
		name: &str,
		cx: &Context,
		parent: MountId,
		key: Option<Key>,
	) -> RenderResult<MountId> {
		let id = self.build_output(output, name, cx, Some(parent), key)?;
		self.count(|s| s.materialized += 1);
		Ok(id)
	}

	/// Build target objects for `view`.
	///
	/// Targets of element children are appended to their element; the
	/// top-level targets are left detached for the caller to insert.
	pub(crate) fn build(
		&self,
		view: View,
		cx: &Context,
		parent: Option<MountId>,
	) -> RenderResult<MountId> {
		let key = view.key().cloned();
		let strategy = &self.inner.strategy;
		match view {
			View::Element(el) => {
				let node = strategy.create_element(el.tag_name())?;
				let kind = self.element_kind(node.clone(), &el, true)?;
				let id = self.insert(Mounted::new(kind, parent, key, cx));
				let built = self.build_children(id, el.into_children(), cx, Some(&node));
				self.guard(id, built)
			}
			View::Text(text) => {
				let node = strategy.create_text_node(&text)?;
				Ok(self.insert(Mounted::new(
					MountKind::Text {
						node,
						text: text.into_owned(),
					},
					parent,
					key,
					cx,
				)))
			}
			View::DynText(signal) => {
				let text = signal.get();
				let node = strategy.create_text_node(&text)?;
				let id = self.insert(Mounted::new(MountKind::Text { node, text }, parent, key, cx));
				let watcher = self.watch_text(id, &signal);
				self.with_mount_mut(id, |m| m.disposers.push(watcher));
				Ok(id)
			}
			View::Fragment(children) => {
				let id = self.insert(Mounted::new(MountKind::Fragment, parent, key, cx));
				let built = self.build_children(id, children, cx, None);
				self.guard(id, built)
			}
			View::Reactive(signal) => {
				let id = self.reserve();
				let content = self.build(signal.get(), cx, Some(id))?;
				let anchor = match strategy.create_comment(&self.inner.options.hole_anchor) {
					Ok(anchor) => anchor,
					Err(err) => {
						self.release(content, false);
						return Err(err);
					}
				};
				let mut mounted = Mounted::new(
					MountKind::Dynamic {
						anchor,
						source: DynamicSource::Signal(signal.id()),
					},
					parent,
					key,
					cx,
				);
				mounted.children.push(content);
				mounted.disposers.push(self.watch_hole(id, &signal));
				self.insert_at(id, mounted);
				Ok(id)
			}
			View::Component(component) => {
				let mut inner_cx = cx.clone();
				let output = component.invoke(&mut inner_cx)?;
				self.build_output(output, component.name(), &inner_cx, parent, key)
			}
			View::Keyed(_, inner) => {
				let id = self.build(*inner, cx, parent)?;
				self.with_mount_mut(id, |m| m.key = key);
				Ok(id)
			}
			View::Empty => Ok(self.insert(Mounted::new(MountKind::Empty, parent, key, cx))),
		}
	}

	/// Build what a component returned; `key` is the component's key.
	pub(crate) fn build_output(
		&self,
		output: ComponentOutput,
		name: &str,
		cx: &Context,
		parent: Option<MountId>,
		key: Option<Key>,
	) -> RenderResult<MountId> {
		let stream = match output {
			ComponentOutput::View(view) => {
				let id = self.build(view, cx, parent)?;
				self.inherit_key(id, key);
				return Ok(id);
			}
			ComponentOutput::Future(future) => futures::stream::once(future).boxed_local(),
			ComponentOutput::Stream(stream) => stream,
		};

		let id = self.reserve();
		let (anchor, content) = self.async_placeholder(id, name, cx)?;
		let task = match self.spawn_updates(id, name, stream) {
			Ok(task) => task,
			Err(err) => {
				self.release(content, false);
				return Err(err);
			}
		};
		let mut mounted = Mounted::new(
			MountKind::Dynamic {
				anchor,
				source: DynamicSource::Async,
			},
			parent,
			key,
			cx,
		);
		mounted.children.push(content);
		mounted.disposers.push(task);
		self.insert_at(id, mounted);
		debug!(mount = %id, component = name, "awaiting async content");
		Ok(id)
	}

	fn async_placeholder(
		&self,
		id: MountId,
		name: &str,
		cx: &Context,
	) -> RenderResult<(S::Node, MountId)> {
		if self.inner.options.spawner.is_none() {
			return Err(RenderError::NoSpawner(name.to_string()));
		}
		let anchor = self
			.inner
			.strategy
			.create_comment(&self.inner.options.hole_anchor)?;
		let content = self.build(View::Empty, cx, Some(id))?;
		Ok((anchor, content))
	}

	fn build_children(
		&self,
		id: MountId,
		views: Vec<View>,
		cx: &Context,
		host: Option<&S::Node>,
	) -> RenderResult<()> {
		for view in views {
			let child = self.build(view, cx, Some(id))?;
			self.push_child(id, child);
			if let Some(host) = host {
				for target in self.targets(child) {
					self.inner.strategy.append_child(host, &target)?;
				}
			}
		}
		Ok(())
	}

	/// Release a partially built record on failure.
	fn guard(&self, id: MountId, result: RenderResult<()>) -> RenderResult<MountId> {
		match result {
			Ok(()) => Ok(id),
			Err(err) => {
				self.release(id, false);
				Err(err)
			}
		}
	}

	fn inherit_key(&self, id: MountId, key: Option<Key>) {
		if key.is_some() {
			self.with_mount_mut(id, |m| {
				if m.key.is_none() {
					m.key = key;
				}
			});
		}
	}

	/// Element record for `node`, with attributes, listeners and ref bound.
	///
	/// Static attributes are only written when `write_static` is set;
	/// hydration trusts the ones already present.
	pub(crate) fn element_kind(
		&self,
		node: S::Node,
		el: &ElementView,
		write_static: bool,
	) -> RenderResult<MountKind<S::Node>> {
		let strategy = &self.inner.strategy;
		let mut attrs = BTreeMap::new();
		let mut bindings = BTreeMap::new();
		for (name, attr) in el.attrs() {
			match attr {
				Attr::Static(value) => {
					if write_static {
						strategy.set_property(&node, name, Some(value))?;
					}
					attrs.insert(name.to_string(), AttrSnapshot::Static(value.clone()));
				}
				Attr::Dynamic(signal) => {
					bindings.insert(
						name.to_string(),
						strategy.set_signal_property(&node, name, signal)?,
					);
					attrs.insert(name.to_string(), AttrSnapshot::Dynamic);
				}
			}
		}
		let listeners = self.attach_listeners(&node, el)?;
		let node_ref = el
			.get_node_ref()
			.map(|node_ref| strategy.set_ref(&node, node_ref))
			.transpose()?;
		Ok(MountKind::Element {
			node,
			tag: el.tag_name().to_ascii_lowercase(),
			attrs,
			bindings,
			listeners,
			node_ref,
		})
	}

	fn attach_listeners(&self, node: &S::Node, el: &ElementView) -> RenderResult<Vec<Disposer>> {
		el.event_handlers()
			.iter()
			.map(|(event, handler)| {
				self.inner
					.strategy
					.add_event_listener(node, event, handler.clone())
			})
			.collect()
	}

	// ----- updates ---------------------------------------------------------

	pub(crate) fn watch_text(&self, id: MountId, signal: &ReadSignal<String>) -> Disposer {
		let weak = Rc::downgrade(&self.inner);
		Disposer::from(signal.subscribe(move |text| {
			deliver(&weak, Update::Text(id, text.clone()));
		}))
	}

	pub(crate) fn watch_hole(&self, id: MountId, signal: &ReadSignal<View>) -> Disposer {
		let weak = Rc::downgrade(&self.inner);
		Disposer::from(signal.subscribe(move |view| {
			deliver(&weak, Update::Content(id, view.clone()));
		}))
	}

	/// Spawn a task that delivers every item of `stream` to region `id`.
	///
	/// The disposer aborts the task.
	pub(crate) fn spawn_updates(
		&self,
		id: MountId,
		name: &str,
		mut stream: LocalBoxStream<'static, View>,
	) -> RenderResult<Disposer> {
		let spawner = self
			.inner
			.options
			.spawner
			.clone()
			.ok_or_else(|| RenderError::NoSpawner(name.to_string()))?;
		let weak = Rc::downgrade(&self.inner);
		let (task, handle) = abortable(async move {
			while let Some(view) = stream.next().await {
				if weak.upgrade().is_none() {
					break;
				}
				deliver(&weak, Update::Content(id, view));
			}
		});
		spawner
			.spawn_local(async move {
				let _ = task.await;
			})
			.map_err(|err| RenderError::component(name, format!("failed to spawn async content: {err}")))?;
		Ok(Disposer::new(move || handle.abort()))
	}

	/// Run `f` as the outermost renderer operation, then apply queued
	/// updates. Nested calls just run `f`.
	pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
		if self.inner.busy.replace(true) {
			return f();
		}
		let _guard = BusyGuard(&self.inner.busy);
		let result = f();
		loop {
			let next = self.inner.queue.borrow_mut().pop_front();
			let Some(update) = next else {
				break;
			};
			self.apply(update);
		}
		result
	}

	fn apply(&self, update: Update) {
		match update {
			Update::Content(id, view) => {
				let Some((Some(content), cx)) =
					self.with_mount(id, |m| (m.children.first().copied(), m.context.clone()))
				else {
					trace!(mount = %id, "dropping update for released region");
					return;
				};
				self.count(|s| s.patched += 1);
				if let Err(err) = self.patch(content, view, &cx) {
					self.diagnose(
						DiagnosticKind::UpdateFailed,
						format!("failed to update region {id}: {err}"),
					);
				}
			}
			Update::Text(id, text) => {
				if let Err(err) = self.set_text(id, &text) {
					self.diagnose(
						DiagnosticKind::UpdateFailed,
						format!("failed to update text {id}: {err}"),
					);
				}
			}
		}
	}

	fn set_text(&self, id: MountId, text: &str) -> RenderResult<()> {
		let node = self
			.with_mount(id, |m| match &m.kind {
				MountKind::Text { node, text: current } if current != text => Some(node.clone()),
				_ => None,
			})
			.flatten();
		if let Some(node) = node {
			self.inner.strategy.set_text(&node, text)?;
			self.with_mount_mut(id, |m| {
				if let MountKind::Text { text: current, .. } = &mut m.kind {
					*current = text.to_string();
				}
			});
		}
		Ok(())
	}

	// ----- patching --------------------------------------------------------

	/// Bring mount `id` in line with `view`, reusing it where possible.
	///
	/// Returns the mount now standing at that position, which differs from
	/// `id` when the mount had to be replaced.
	pub(crate) fn patch(&self, id: MountId, view: View, cx: &Context) -> RenderResult<MountId> {
		let shape = self.shape(id).ok_or(RenderError::Detached(id.0))?;
		let parent = self.with_mount(id, |m| m.parent).flatten();
		let key = view.key().cloned();

		match (view, shape) {
			(View::Keyed(_, inner), _) => {
				let patched = self.patch(id, *inner, cx)?;
				self.with_mount_mut(patched, |m| m.key = key);
				Ok(patched)
			}
			(View::Component(component), _) => {
				let mut inner_cx = cx.clone();
				match component.invoke(&mut inner_cx)? {
					ComponentOutput::View(view) => {
						let patched = self.patch(id, view, &inner_cx)?;
						self.inherit_key(patched, key);
						Ok(patched)
					}
					output => {
						let new = self.build_output(output, component.name(), &inner_cx, parent, key)?;
						self.count(|s| s.materialized += 1);
						self.replace(id, new)
					}
				}
			}
			(View::Text(text), Shape::Text) => {
				self.patch_text(id, &text, None)?;
				self.refresh(id, key, cx);
				Ok(id)
			}
			(View::DynText(signal), Shape::Text) => {
				self.patch_text(id, &signal.get(), Some(&signal))?;
				self.refresh(id, key, cx);
				Ok(id)
			}
			(View::Element(el), Shape::Element(tag)) if tag.eq_ignore_ascii_case(el.tag_name()) => {
				self.refresh(id, key, cx);
				self.patch_element(id, el, cx)?;
				Ok(id)
			}
			(View::Fragment(children), Shape::Fragment) => {
				self.refresh(id, key, cx);
				self.reconcile_children(id, children, cx)?;
				Ok(id)
			}
			(View::Reactive(signal), Shape::Hole) => {
				self.refresh(id, key, cx);
				self.patch_hole(id, signal, cx)?;
				Ok(id)
			}
			(View::Empty, Shape::Empty) => Ok(id),
			(view, _) => {
				let new = self.build(view, cx, parent)?;
				self.count(|s| s.materialized += 1);
				self.replace(id, new)
			}
		}
	}

	fn refresh(&self, id: MountId, key: Option<Key>, cx: &Context) {
		self.with_mount_mut(id, |m| {
			m.key = key;
			m.context = cx.clone();
		});
	}

	fn patch_text(
		&self,
		id: MountId,
		text: &str,
		signal: Option<&ReadSignal<String>>,
	) -> RenderResult<()> {
		let old = self
			.with_mount_mut(id, |m| std::mem::take(&mut m.disposers))
			.unwrap_or_default();
		drop(old);
		self.set_text(id, text)?;
		if let Some(signal) = signal {
			let watcher = self.watch_text(id, signal);
			self.with_mount_mut(id, |m| m.disposers.push(watcher));
		}
		Ok(())
	}

	fn patch_element(&self, id: MountId, el: ElementView, cx: &Context) -> RenderResult<()> {
		let taken = self.with_mount_mut(id, |m| match &mut m.kind {
			MountKind::Element {
				node,
				attrs,
				bindings,
				listeners,
				node_ref,
				..
			} => Some((
				node.clone(),
				std::mem::take(attrs),
				std::mem::take(bindings),
				std::mem::take(listeners),
				node_ref.take(),
			)),
			_ => None,
		});
		let Some(Some((node, old_attrs, mut old_bindings, old_listeners, old_ref))) = taken else {
			return Err(RenderError::Detached(id.0));
		};
		let strategy = &self.inner.strategy;

		for name in old_attrs.keys() {
			if !el.attrs().iter().any(|(new_name, _)| new_name == name) {
				drop(old_bindings.remove(name));
				strategy.set_property(&node, name, None)?;
			}
		}

		let mut attrs = BTreeMap::new();
		let mut bindings = BTreeMap::new();
		for (name, attr) in el.attrs() {
			drop(old_bindings.remove(&**name));
			match attr {
				Attr::Static(value) => {
					let unchanged = matches!(
						old_attrs.get(&**name),
						Some(AttrSnapshot::Static(old)) if old == value
					);
					if !unchanged {
						strategy.set_property(&node, name, Some(value))?;
					}
					attrs.insert(name.to_string(), AttrSnapshot::Static(value.clone()));
				}
				Attr::Dynamic(signal) => {
					bindings.insert(
						name.to_string(),
						strategy.set_signal_property(&node, name, signal)?,
					);
					attrs.insert(name.to_string(), AttrSnapshot::Dynamic);
				}
			}
		}

		drop(old_listeners);
		let listeners = self.attach_listeners(&node, &el)?;
		drop(old_ref);
		let node_ref = el
			.get_node_ref()
			.map(|node_ref| strategy.set_ref(&node, node_ref))
			.transpose()?;

		self.with_mount_mut(id, |m| {
			if let MountKind::Element {
				attrs: slot_attrs,
				bindings: slot_bindings,
				listeners: slot_listeners,
				node_ref: slot_ref,
				..
			} = &mut m.kind
			{
				*slot_attrs = attrs;
				*slot_bindings = bindings;
				*slot_listeners = listeners;
				*slot_ref = node_ref;
			}
		});

		self.reconcile_children(id, el.into_children(), cx)
	}

	fn patch_hole(&self, id: MountId, signal: ReadSignal<View>, cx: &Context) -> RenderResult<()> {
		let old = self
			.with_mount_mut(id, |m| {
				if let MountKind::Dynamic { source, .. } = &mut m.kind {
					*source = DynamicSource::Signal(signal.id());
				}
				std::mem::take(&mut m.disposers)
			})
			.unwrap_or_default();
		drop(old);

		let content = self
			.with_mount(id, |m| m.children.first().copied())
			.flatten()
			.ok_or(RenderError::Detached(id.0))?;
		self.patch(content, signal.get(), cx)?;
		let watcher = self.watch_hole(id, &signal);
		self.with_mount_mut(id, |m| m.disposers.push(watcher));
		Ok(())
	}

	/// Put the detached subtree `new` where `old` stands and release `old`.
	fn replace(&self, old: MountId, new: MountId) -> RenderResult<MountId> {
		match self.swap_in(old, new) {
			Ok(id) => {
				self.count(|s| s.replaced += 1);
				Ok(id)
			}
			Err(err) => {
				self.release(new, true);
				Err(err)
			}
		}
	}

	fn swap_in(&self, old: MountId, new: MountId) -> RenderResult<MountId> {
		if let Some(reused) = self.try_reuse(old, new)? {
			return Ok(reused);
		}

		let parent = self
			.with_mount(old, |m| m.parent)
			.flatten()
			.ok_or(RenderError::Detached(old.0))?;
		let old_targets = self.targets(old);
		let new_targets = self.targets(new);
		match (old_targets.as_slice(), new_targets.as_slice()) {
			([old_node], [new_node]) => self.inner.strategy.replace_node(old_node, new_node)?,
			(_, []) => {}
			_ => {
				let host = self.host_of(parent)?;
				let reference = match old_targets.first() {
					Some(first) => Some(first.clone()),
					None => self.next_target_after(old),
				};
				for target in &new_targets {
					self.inner
						.strategy
						.insert_before(&host, target, reference.as_ref())?;
				}
			}
		}

		self.with_mount_mut(parent, |m| {
			if let Some(slot) = m.children.iter_mut().find(|c| **c == old) {
				*slot = new;
			}
		});
		self.with_mount_mut(new, |m| m.parent = Some(parent));
		self.release(old, true);
		trace!(old = %old, new = %new, "replaced mount");
		Ok(new)
	}

	/// Offer a leaf-for-leaf replacement to the strategy.
	fn try_reuse(&self, old: MountId, new: MountId) -> RenderResult<Option<MountId>> {
		let candidates = {
			let state = self.inner.state.borrow();
			match (state.mounts.get(&old), state.mounts.get(&new)) {
				(Some(old_mount), Some(new_mount))
					if old_mount.children.is_empty()
						&& new_mount.children.is_empty()
						&& new_mount.disposers.is_empty() =>
				{
					match (&old_mount.kind, &new_mount.kind) {
						(
							MountKind::Element { node: old_node, .. },
							MountKind::Element {
								node: new_node,
								bindings,
								listeners,
								node_ref: None,
								..
							},
						) if bindings.is_empty() && listeners.is_empty() => {
							Some((old_node.clone(), new_node.clone()))
						}
						_ => None,
					}
				}
				_ => None,
			}
		};
		let Some((old_node, new_node)) = candidates else {
			return Ok(None);
		};
		if !self.inner.strategy.try_reuse_node(&old_node, &new_node)? {
			return Ok(None);
		}

		let discarded = {
			let mut state = self.inner.state.borrow_mut();
			let Some(new_mount) = state.mounts.remove(&new) else {
				return Ok(None);
			};
			let Mounted {
				kind, key, context, ..
			} = new_mount;
			let (tag, attrs) = match kind {
				MountKind::Element { tag, attrs, .. } => (tag, attrs),
				_ => return Ok(None),
			};
			state.stats.reused += 1;
			state.mounts.get_mut(&old).map(|old_mount| {
				old_mount.key = key;
				old_mount.context = context;
				std::mem::replace(
					&mut old_mount.kind,
					MountKind::Element {
						node: old_node,
						tag,
						attrs,
						bindings: BTreeMap::new(),
						listeners: Vec::new(),
						node_ref: None,
					},
				)
			})
		};
		drop(discarded);
		trace!(mount = %old, "strategy reused node in place");
		Ok(Some(old))
	}

	// ----- reconciliation --------------------------------------------------

	/// Reconcile the children of `id` against `views`.
	///
	/// Keyed views match old children by key, wherever they stand; keyless
	/// views match the remaining keyless children in order. Unmatched old
	/// children are unmounted, matched ones patched and moved, the rest
	/// built fresh.
	pub(crate) fn reconcile_children(
		&self,
		id: MountId,
		views: Vec<View>,
		cx: &Context,
	) -> RenderResult<()> {
		let old_children = self.with_mount(id, |m| m.children.clone()).unwrap_or_default();

		let mut by_key = BTreeMap::new();
		let mut keyless = VecDeque::new();
		let mut unmatched = Vec::new();
		for child in old_children {
			match self.with_mount(child, |m| m.key.clone()).flatten() {
				Some(key) => {
					if let Some(shadowed) = by_key.insert(key, child) {
						unmatched.push(shadowed);
					}
				}
				None => keyless.push_back(child),
			}
		}

		let mut seen = BTreeSet::new();
		let mut plan = Vec::with_capacity(views.len());
		for view in views {
			let existing = match view.key() {
				Some(key) if !seen.insert(key.clone()) => {
					self.diagnose(
						DiagnosticKind::DuplicateKey,
						format!("key `{key}` appears more than once among siblings"),
					);
					None
				}
				Some(key) => by_key.remove(key),
				None => keyless.pop_front(),
			};
			plan.push((existing, view));
		}

		unmatched.extend(by_key.into_values());
		unmatched.extend(keyless);
		for child in unmatched {
			self.release(child, true);
			self.count(|s| s.unmounted += 1);
		}

		let mut placed: Vec<(MountId, bool)> = Vec::with_capacity(plan.len());
		for (existing, view) in plan {
			let result = match existing {
				Some(child) => self.patch(child, view, cx).map(|child| (child, false)),
				None => self.materialize(view, cx, id).map(|child| (child, true)),
			};
			match result {
				Ok(entry) => placed.push(entry),
				Err(err) => {
					for (child, fresh) in placed {
						if fresh {
							self.release(child, false);
						}
					}
					return Err(err);
				}
			}
		}

		self.with_mount_mut(id, |m| m.children = placed.iter().map(|(c, _)| *c).collect());
		self.place_children(id, &placed)
	}

	/// Insert fresh children and move displaced ones, last to first.
	fn place_children(&self, id: MountId, placed: &[(MountId, bool)]) -> RenderResult<()> {
		let strategy = &self.inner.strategy;
		let host = self.host_of(id)?;
		let mut reference = match self.with_mount(id, |m| match &m.kind {
			MountKind::Element { .. } | MountKind::Root { .. } => Some(None),
			MountKind::Dynamic { anchor, .. } => Some(Some(anchor.clone())),
			_ => None,
		}) {
			Some(Some(end)) => end,
			_ => self.next_target_after(id),
		};

		let mut moved = 0;
		for (child, fresh) in placed.iter().rev() {
			let targets = self.targets(*child);
			let (Some(first), Some(last)) = (targets.first(), targets.last()) else {
				continue;
			};
			let settled = !fresh
				&& match (strategy.next_sibling(last), reference.as_ref()) {
					(Some(next), Some(reference)) => strategy.same_node(&next, reference),
					(None, None) => true,
					_ => false,
				};
			if !settled {
				for target in &targets {
					strategy.insert_before(&host, target, reference.as_ref())?;
				}
				if !fresh {
					moved += 1;
				}
			}
			reference = Some(first.clone());
		}
		if moved > 0 {
			trace!(mount = %id, moved, "moved children");
			self.count(|s| s.moved += moved);
		}
		Ok(())
	}

	// ----- release ---------------------------------------------------------

	/// Remove `id` and its subtree from the arena, releasing every disposer.
	///
	/// With `detach`, the top-level targets are removed from their parent
	/// too. Releasing a missing id does nothing.
	pub(crate) fn release(&self, id: MountId, detach: bool) {
		let targets = if detach { self.targets(id) } else { Vec::new() };
		let removed = {
			let mut state = self.inner.state.borrow_mut();
			let Some(parent) = state.mounts.get(&id).map(|m| m.parent) else {
				return;
			};
			if let Some(parent) = parent.and_then(|p| state.mounts.get_mut(&p)) {
				parent.children.retain(|c| *c != id);
			}
			let mut stack = vec![id];
			let mut removed = Vec::new();
			while let Some(next) = stack.pop() {
				if let Some(mounted) = state.mounts.remove(&next) {
					stack.extend(mounted.children.iter().copied());
					removed.push(mounted);
				}
			}
			removed
		};
		for target in &targets {
			if let Err(err) = self.inner.strategy.remove_child(target) {
				warn!(%err, "failed to detach released node");
			}
		}
		trace!(mount = %id, records = removed.len(), "released subtree");
		drop(removed);
	}
}

/// Queue `update` on the renderer behind `weak` and apply it if idle.
fn deliver<S: RenderStrategy>(weak: &Weak<RendererInner<S>>, update: Update) {
	let Some(inner) = weak.upgrade() else {
		return;
	};
	inner.queue.borrow_mut().push_back(update);
	Renderer { inner }.exclusive(|| ());
}

fn collect_targets<N: Clone>(mounts: &BTreeMap<MountId, Mounted<N>>, id: MountId, out: &mut Vec<N>) {
	let Some(mounted) = mounts.get(&id) else {
		return;
	};
	match &mounted.kind {
		MountKind::Element { node, .. } | MountKind::Text { node, .. } | MountKind::Adopted { node } => {
			out.push(node.clone())
		}
		MountKind::Root { .. } | MountKind::Fragment => {
			for child in &mounted.children {
				collect_targets(mounts, *child, out);
			}
		}
		MountKind::Dynamic { anchor, .. } => {
			for child in &mounted.children {
				collect_targets(mounts, *child, out);
			}
			out.push(anchor.clone());
		}
		MountKind::Empty => {}
	}
}

fn first_target<N: Clone>(mounts: &BTreeMap<MountId, Mounted<N>>, id: MountId) -> Option<N> {
	let mounted = mounts.get(&id)?;
	match &mounted.kind {
		MountKind::Element { node, .. } | MountKind::Text { node, .. } | MountKind::Adopted { node } => {
			Some(node.clone())
		}
		MountKind::Root { .. } | MountKind::Fragment => mounted
			.children
			.iter()
			.find_map(|child| first_target(mounts, *child)),
		MountKind::Dynamic { anchor, .. } => mounted
			.children
			.iter()
			.find_map(|child| first_target(mounts, *child))
			.or_else(|| Some(anchor.clone())),
		MountKind::Empty => None,
	}
}

/// Keeps a rendered root alive; unmounts it when dropped.
pub struct RenderHandle<S: RenderStrategy> {
	renderer: Weak<RendererInner<S>>,
	root: MountId,
	mounted: Cell<bool>,
}

impl<S: RenderStrategy> RenderHandle<S> {
	pub(crate) fn new(renderer: &Renderer<S>, root: MountId) -> Self {
		Self {
			renderer: Rc::downgrade(&renderer.inner),
			root,
			mounted: Cell::new(true),
		}
	}

	pub fn root(&self) -> MountId {
		self.root
	}

	pub fn is_mounted(&self) -> bool {
		self.mounted.get()
	}

	/// Top-level target objects of the rendered content.
	pub fn targets(&self) -> Vec<S::Node> {
		match self.renderer.upgrade() {
			Some(inner) => Renderer { inner }.targets(self.root),
			None => Vec::new(),
		}
	}

	/// Release every subscription and detach the rendered targets.
	///
	/// Calling it again does nothing.
	pub fn unmount(&self) {
		if !self.mounted.replace(false) {
			return;
		}
		if let Some(inner) = self.renderer.upgrade() {
			let renderer = Renderer { inner };
			renderer.exclusive(|| renderer.release(self.root, true));
			debug!(root = %self.root, "unmounted root");
		}
	}

	/// Leave the content mounted for as long as the renderer lives.
	pub fn forget(self) {
		self.mounted.set(false);
	}
}

impl<S: RenderStrategy> Drop for RenderHandle<S> {
	fn drop(&mut self) {
		self.unmount();
	}
}

impl<S: RenderStrategy> fmt::Debug for RenderHandle<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderHandle")
			.field("root", &self.root)
			.field("mounted", &self.mounted.get())
			.finish()
	}
}
