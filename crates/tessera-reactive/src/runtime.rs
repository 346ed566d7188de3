//! Reactive Runtime
//!
//! This module provides the runtime that owns the dependency graph of one
//! reactive world: which derived nodes read which signals, which callbacks
//! subscribe to which nodes, and which writes are waiting to be delivered.
//!
//! ## Architecture
//!
//! 1. **Explicit handles**: every signal holds a clone of the [`Runtime`] it
//!    was created in. There is no process-wide "current observer"; derived
//!    computations receive a [`Tracker`](crate::Tracker) instead.
//! 2. **Deferred delivery**: writes only mark their node dirty. Delivery
//!    happens in a flush, scheduled as a single-shot tick through the
//!    installed [`Scheduler`], so back-to-back writes coalesce.
//! 3. **Two-phase flush**: first every derived node downstream of a dirty
//!    source is recomputed in height order (so nothing reads a stale input),
//!    then every subscriber of a node that actually changed runs once.
//!
//! ## Example
//!
//! ```ignore
//! use tessera_reactive::{Runtime, Signal};
//!
//! let rt = Runtime::new();
//! let count = Signal::new(&rt, 0);
//! let _sub = count.subscribe(|n| println!("count is {n}"));
//!
//! count.set(1);
//! count.set(2);
//! rt.flush(); // prints "count is 2" once
//! ```

use core::cell::{Cell, RefCell};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use tracing::{debug, error, trace, warn};

use crate::error::{ReactiveError, ReactiveResult};
use crate::subscription::Subscription;

/// Upper bound on flush rounds caused by subscribers writing to signals.
pub const MAX_FLUSH_ROUNDS: usize = 64;

/// Unique identifier for reactive nodes (signals, derived values, effects)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
	/// Create a new unique NodeId
	pub(crate) fn new() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(0);
		Self(COUNTER.fetch_add(1, Ordering::Relaxed))
	}
}

/// Identifier of one subscriber callback registered on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Type of reactive node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
	/// A writable signal (source of reactivity)
	Signal,
	/// A derived value recomputed from other nodes
	Derived,
	/// A side effect re-run when its inputs change
	Effect,
}

/// Behavior the runtime needs from a node during a flush.
pub(crate) trait ReactiveNode {
	/// Brings the node up to date and reports whether its value changed.
	///
	/// Sources compare their current value against the value they held
	/// before the first write of this tick; derived nodes recompute.
	fn refresh(&self, rt: &Runtime) -> bool;
}

pub(crate) type Callback = Rc<dyn Fn()>;

/// Dependency graph node
struct DependencyNode {
	node_type: NodeType,
	handle: Weak<dyn ReactiveNode>,
	/// IDs of nodes this node reads
	dependencies: Vec<NodeId>,
	/// IDs of derived nodes and effects that read this node
	dependents: Vec<NodeId>,
	subscribers: BTreeMap<SubscriptionId, Callback>,
	/// Longest path from a source; sources are 0.
	height: usize,
}

/// Schedules the flush tick of a runtime.
///
/// The runtime hands over one task per tick. Implementations must run it
/// later (after the current synchronous block), never inline.
pub trait Scheduler {
	/// Queues `task` to run on the next tick.
	fn schedule(&self, task: Box<dyn FnOnce()>) -> ReactiveResult<()>;
}

impl<F> Scheduler for F
where
	F: Fn(Box<dyn FnOnce()>),
{
	fn schedule(&self, task: Box<dyn FnOnce()>) -> ReactiveResult<()> {
		self(task);
		Ok(())
	}
}

/// A [`Scheduler`] that runs each tick as a task on a `futures` local spawner.
///
/// With `futures::executor::LocalPool` this behaves like a microtask queue:
/// the flush runs the next time the pool is driven.
pub struct SpawnerScheduler<S> {
	spawner: S,
}

impl<S: LocalSpawn> SpawnerScheduler<S> {
	/// Wraps a local spawner.
	pub fn new(spawner: S) -> Self {
		Self { spawner }
	}
}

impl<S: LocalSpawn> Scheduler for SpawnerScheduler<S> {
	fn schedule(&self, task: Box<dyn FnOnce()>) -> ReactiveResult<()> {
		self.spawner
			.spawn_local(async move { task() })
			.map_err(|err| ReactiveError::Schedule(err.to_string()))
	}
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
	/// Number of delivery rounds (more than one when subscribers write).
	pub rounds: usize,
	/// Nodes whose value changed.
	pub changed: usize,
	/// Subscriber callbacks invoked.
	pub notified: usize,
	/// Subscriber callbacks or computations that panicked.
	pub faults: usize,
}

pub(crate) struct RuntimeInner {
	graph: RefCell<BTreeMap<NodeId, DependencyNode>>,
	/// Sources written since the last flush, in write order.
	pending: RefCell<Vec<NodeId>>,
	tick_scheduled: Cell<bool>,
	flushing: Cell<bool>,
	batch_depth: Cell<usize>,
	scheduler: RefCell<Option<Rc<dyn Scheduler>>>,
	faults: Cell<usize>,
	next_subscription: Cell<u64>,
}

/// Reactive runtime
///
/// Cheap to clone; all clones share one dependency graph. A runtime is
/// single-threaded (`!Send`), matching the cooperative model of the renderer
/// built on top of it.
#[derive(Clone)]
pub struct Runtime {
	inner: Rc<RuntimeInner>,
}

impl Runtime {
	/// Create a runtime without a scheduler.
	///
	/// Writes are then delivered only when [`Runtime::flush`] is called,
	/// which suits tests and hosts that drive their own frame loop.
	pub fn new() -> Self {
		Self {
			inner: Rc::new(RuntimeInner {
				graph: RefCell::new(BTreeMap::new()),
				pending: RefCell::new(Vec::new()),
				tick_scheduled: Cell::new(false),
				flushing: Cell::new(false),
				batch_depth: Cell::new(0),
				scheduler: RefCell::new(None),
				faults: Cell::new(0),
				next_subscription: Cell::new(0),
			}),
		}
	}

	/// Create a runtime that schedules its flush tick with `scheduler`.
	pub fn with_scheduler<S>(scheduler: S) -> Self
	where
		S: Scheduler + 'static,
	{
		let rt = Self::new();
		rt.set_scheduler(scheduler);
		rt
	}

	/// Create a runtime whose flush tick is a task on a local spawner.
	///
	/// # Example
	///
	/// ```ignore
	/// let mut pool = futures::executor::LocalPool::new();
	/// let rt = Runtime::with_spawner(pool.spawner());
	/// ```
	pub fn with_spawner<S>(spawner: S) -> Self
	where
		S: LocalSpawn + 'static,
	{
		Self::with_scheduler(SpawnerScheduler::new(spawner))
	}

	/// Replace the scheduler used for future ticks.
	pub fn set_scheduler<S>(&self, scheduler: S)
	where
		S: Scheduler + 'static,
	{
		*self.inner.scheduler.borrow_mut() = Some(Rc::new(scheduler));
	}

	/// Run `f` with notification delivery suppressed.
	///
	/// When the outermost batch returns, pending writes are flushed
	/// synchronously: every affected subscriber runs at most once and sees
	/// the final values written inside the batch.
	pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
		struct BatchGuard<'a>(&'a Cell<usize>);

		impl Drop for BatchGuard<'_> {
			fn drop(&mut self) {
				self.0.set(self.0.get() - 1);
			}
		}

		self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
		let result = {
			let _guard = BatchGuard(&self.inner.batch_depth);
			f()
		};

		if self.inner.batch_depth.get() == 0 && self.has_pending() {
			self.flush();
		}
		result
	}

	/// Whether a batch is currently open.
	pub fn is_batching(&self) -> bool {
		self.inner.batch_depth.get() > 0
	}

	/// Deliver every pending write now.
	///
	/// Failures are logged; use [`Runtime::try_flush`] to inspect them.
	/// Calling this from inside a subscriber is a no-op: the running flush
	/// delivers the new writes in its next round.
	pub fn flush(&self) -> FlushSummary {
		match self.try_flush() {
			Ok(summary) => summary,
			Err(ReactiveError::Reentrant) => {
				trace!("flush already running; writes join the current flush");
				FlushSummary::default()
			}
			Err(err) => {
				error!(%err, "flush aborted");
				FlushSummary::default()
			}
		}
	}

	/// Deliver every pending write now, reporting failures.
	pub fn try_flush(&self) -> ReactiveResult<FlushSummary> {
		struct FlushGuard<'a>(&'a Cell<bool>);

		impl Drop for FlushGuard<'_> {
			fn drop(&mut self) {
				self.0.set(false);
			}
		}

		if self.inner.flushing.replace(true) {
			return Err(ReactiveError::Reentrant);
		}
		let _guard = FlushGuard(&self.inner.flushing);
		self.inner.tick_scheduled.set(false);

		let mut summary = FlushSummary::default();
		loop {
			let sources = core::mem::take(&mut *self.inner.pending.borrow_mut());
			if sources.is_empty() {
				break;
			}
			if summary.rounds == MAX_FLUSH_ROUNDS {
				warn!(
					dropped = sources.len(),
					"flush did not settle; dropping pending writes"
				);
				return Err(ReactiveError::RoundLimit(MAX_FLUSH_ROUNDS));
			}
			summary.rounds += 1;

			let changed = self.propagate(&sources, &mut summary);
			summary.changed += changed.len();

			for (node, subscription, callback) in self.collect_callbacks(&changed) {
				// An earlier callback in this round may have released it.
				if !self.is_subscribed(node, subscription) {
					continue;
				}
				summary.notified += 1;
				if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
					summary.faults += 1;
					self.inner.faults.set(self.inner.faults.get() + 1);
					error!(?node, ?subscription, "subscriber panicked; continuing flush");
				}
			}
		}

		if summary.rounds > 0 {
			debug!(
				rounds = summary.rounds,
				changed = summary.changed,
				notified = summary.notified,
				faults = summary.faults,
				"flush complete"
			);
		}
		Ok(summary)
	}

	/// Whether writes are waiting for a flush.
	pub fn has_pending(&self) -> bool {
		!self.inner.pending.borrow().is_empty()
	}

	/// Check if a node exists in the dependency graph
	pub fn has_node(&self, node_id: NodeId) -> bool {
		self.inner.graph.borrow().contains_key(&node_id)
	}

	/// Number of live nodes in the graph.
	pub fn node_count(&self) -> usize {
		self.inner.graph.borrow().len()
	}

	/// Get the number of subscriber callbacks registered on a node
	pub fn subscriber_count(&self, node_id: NodeId) -> usize {
		self.inner
			.graph
			.borrow()
			.get(&node_id)
			.map(|node| node.subscribers.len())
			.unwrap_or(0)
	}

	/// Get the number of derived nodes and effects reading a node
	pub fn dependent_count(&self, node_id: NodeId) -> usize {
		self.inner
			.graph
			.borrow()
			.get(&node_id)
			.map(|node| node.dependents.len())
			.unwrap_or(0)
	}

	/// Kind of a live node.
	pub fn node_type(&self, node_id: NodeId) -> Option<NodeType> {
		self.inner
			.graph
			.borrow()
			.get(&node_id)
			.map(|node| node.node_type)
	}

	/// Total number of subscriber panics caught since creation.
	pub fn fault_count(&self) -> usize {
		self.inner.faults.get()
	}

	/// Whether two handles refer to the same runtime.
	pub fn ptr_eq(&self, other: &Runtime) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
		Rc::downgrade(&self.inner)
	}

	pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
		Self { inner }
	}

	pub(crate) fn register_node(
		&self,
		node_id: NodeId,
		node_type: NodeType,
		handle: Weak<dyn ReactiveNode>,
	) {
		self.inner.graph.borrow_mut().insert(
			node_id,
			DependencyNode {
				node_type,
				handle,
				dependencies: Vec::new(),
				dependents: Vec::new(),
				subscribers: BTreeMap::new(),
				height: 0,
			},
		);
	}

	/// Remove a node and every edge touching it.
	///
	/// Called exactly once per node, when its last handle is dropped or it
	/// is disposed explicitly. Later calls find nothing and return.
	pub(crate) fn remove_node(&self, node_id: NodeId) {
		let Ok(mut graph) = self.inner.graph.try_borrow_mut() else {
			warn!(?node_id, "graph busy while releasing node; node leaked");
			return;
		};
		let Some(removed) = graph.remove(&node_id) else {
			return;
		};
		for dep in &removed.dependencies {
			if let Some(node) = graph.get_mut(dep) {
				node.dependents.retain(|id| *id != node_id);
			}
		}
		for dependent in &removed.dependents {
			if let Some(node) = graph.get_mut(dependent) {
				node.dependencies.retain(|id| *id != node_id);
			}
		}
		drop(graph);

		if let Ok(mut pending) = self.inner.pending.try_borrow_mut() {
			pending.retain(|id| *id != node_id);
		}
		// Subscriber closures may own other signals; drop them unborrowed.
		drop(removed);
	}

	/// Replace the dependency edges of a derived node or effect.
	pub(crate) fn set_dependencies(&self, node_id: NodeId, dependencies: Vec<NodeId>) {
		let mut graph = self.inner.graph.borrow_mut();
		let previous = graph
			.get_mut(&node_id)
			.map(|node| core::mem::take(&mut node.dependencies))
			.unwrap_or_default();
		for dep in &previous {
			if let Some(node) = graph.get_mut(dep) {
				node.dependents.retain(|id| *id != node_id);
			}
		}

		let mut height = 1;
		let mut unique = Vec::with_capacity(dependencies.len());
		for dep in dependencies {
			if dep == node_id || unique.contains(&dep) {
				continue;
			}
			let Some(node) = graph.get_mut(&dep) else {
				continue;
			};
			node.dependents.push(node_id);
			height = height.max(node.height + 1);
			unique.push(dep);
		}

		let Some(node) = graph.get_mut(&node_id) else {
			return;
		};
		node.dependencies = unique;
		let raised = height > node.height;
		node.height = height;
		if !raised {
			return;
		}

		// Dependents must stay strictly above their inputs even when this
		// node's value did not change and they are not recomputed.
		let mut worklist = vec![(node_id, height)];
		while let Some((id, floor)) = worklist.pop() {
			let dependents = graph
				.get(&id)
				.map(|node| node.dependents.clone())
				.unwrap_or_default();
			for dependent in dependents {
				let Some(node) = graph.get_mut(&dependent) else {
					continue;
				};
				if node.height <= floor {
					node.height = floor + 1;
					worklist.push((dependent, floor + 1));
				}
			}
		}
	}

	/// Record that a source changed and make sure a tick is coming.
	pub(crate) fn mark_dirty(&self, node_id: NodeId) {
		{
			let mut pending = self.inner.pending.borrow_mut();
			if !pending.contains(&node_id) {
				pending.push(node_id);
			}
		}
		if self.inner.batch_depth.get() > 0 || self.inner.flushing.get() {
			return;
		}
		self.schedule_tick();
	}

	pub(crate) fn subscribe_node(&self, node_id: NodeId, callback: Callback) -> Subscription {
		let id = SubscriptionId(self.inner.next_subscription.get());
		self.inner.next_subscription.set(id.0 + 1);
		if let Some(node) = self.inner.graph.borrow_mut().get_mut(&node_id) {
			node.subscribers.insert(id, callback);
		}
		Subscription::new(self.downgrade(), node_id, id)
	}

	pub(crate) fn remove_subscriber(&self, node_id: NodeId, subscription: SubscriptionId) -> bool {
		let removed = self
			.inner
			.graph
			.try_borrow_mut()
			.ok()
			.and_then(|mut graph| {
				graph
					.get_mut(&node_id)
					.and_then(|node| node.subscribers.remove(&subscription))
			});
		removed.is_some()
	}

	fn schedule_tick(&self) {
		if self.inner.tick_scheduled.replace(true) {
			return;
		}
		let scheduler = self.inner.scheduler.borrow().clone();
		let Some(scheduler) = scheduler else {
			trace!("no scheduler installed; waiting for a manual flush");
			return;
		};

		let weak = self.downgrade();
		let task: Box<dyn FnOnce()> = Box::new(move || {
			if let Some(inner) = weak.upgrade() {
				Runtime::from_inner(inner).flush();
			}
		});
		if let Err(err) = scheduler.schedule(task) {
			self.inner.tick_scheduled.set(false);
			error!(%err, "could not schedule flush; call Runtime::flush manually");
		}
	}

	fn propagate(&self, sources: &[NodeId], summary: &mut FlushSummary) -> Vec<NodeId> {
		let mut changed = Vec::new();
		let mut seen = BTreeSet::new();
		let mut queue: BTreeSet<(usize, NodeId)> = BTreeSet::new();

		for &source in sources {
			if self.refresh_node(source, summary) {
				if seen.insert(source) {
					changed.push(source);
				}
				self.enqueue_dependents(source, &mut queue);
			}
		}
		while let Some((height, node_id)) = queue.pop_first() {
			// Retracking may have raised the node since it was queued.
			match self.height_of(node_id) {
				Some(current) if current > height => {
					queue.insert((current, node_id));
					continue;
				}
				Some(_) => {}
				None => continue,
			}
			if self.refresh_node(node_id, summary) {
				if seen.insert(node_id) {
					changed.push(node_id);
				}
				self.enqueue_dependents(node_id, &mut queue);
			}
		}
		changed
	}

	fn height_of(&self, node_id: NodeId) -> Option<usize> {
		self.inner
			.graph
			.borrow()
			.get(&node_id)
			.map(|node| node.height)
	}

	fn refresh_node(&self, node_id: NodeId, summary: &mut FlushSummary) -> bool {
		let handle = self
			.inner
			.graph
			.borrow()
			.get(&node_id)
			.and_then(|node| node.handle.upgrade());
		let Some(handle) = handle else {
			return false;
		};
		match catch_unwind(AssertUnwindSafe(|| handle.refresh(self))) {
			Ok(changed) => changed,
			Err(_) => {
				summary.faults += 1;
				self.inner.faults.set(self.inner.faults.get() + 1);
				error!(?node_id, "computation panicked; keeping previous value");
				false
			}
		}
	}

	fn enqueue_dependents(&self, node_id: NodeId, queue: &mut BTreeSet<(usize, NodeId)>) {
		let graph = self.inner.graph.borrow();
		let Some(node) = graph.get(&node_id) else {
			return;
		};
		for dependent in &node.dependents {
			if let Some(dep_node) = graph.get(dependent) {
				queue.insert((dep_node.height, *dependent));
			}
		}
	}

	fn collect_callbacks(&self, changed: &[NodeId]) -> Vec<(NodeId, SubscriptionId, Callback)> {
		let graph = self.inner.graph.borrow();
		let mut callbacks = Vec::new();
		for node_id in changed {
			if let Some(node) = graph.get(node_id) {
				callbacks.extend(
					node.subscribers
						.iter()
						.map(|(id, callback)| (*node_id, *id, callback.clone())),
				);
			}
		}
		callbacks
	}

	fn is_subscribed(&self, node_id: NodeId, subscription: SubscriptionId) -> bool {
		self.inner
			.graph
			.borrow()
			.get(&node_id)
			.is_some_and(|node| node.subscribers.contains_key(&subscription))
	}
}

impl Default for Runtime {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("nodes", &self.inner.graph.borrow().len())
			.field("pending", &self.inner.pending.borrow().len())
			.field("flushing", &self.inner.flushing.get())
			.field("batch_depth", &self.inner.batch_depth.get())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Signal;
	use rstest::rstest;

	#[rstest]
	fn test_node_id_uniqueness() {
		let id1 = NodeId::new();
		let id2 = NodeId::new();
		let id3 = NodeId::new();

		assert_ne!(id1, id2);
		assert_ne!(id2, id3);
		assert_ne!(id1, id3);
	}

	#[rstest]
	fn test_write_without_scheduler_waits_for_flush() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 0);

		signal.set(1);
		assert!(rt.has_pending());

		rt.flush();
		assert!(!rt.has_pending());
	}

	#[rstest]
	fn test_closure_scheduler_receives_one_task_per_tick() {
		let tasks: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
		let queue = tasks.clone();
		let rt = Runtime::with_scheduler(move |task: Box<dyn FnOnce()>| {
			queue.borrow_mut().push(task);
		});
		let a = Signal::new(&rt, 0);
		let b = Signal::new(&rt, 0);

		a.set(1);
		b.set(2);
		a.set(3);
		assert_eq!(tasks.borrow().len(), 1);

		let task = tasks.borrow_mut().pop().unwrap();
		task();
		assert!(!rt.has_pending());

		a.set(4);
		assert_eq!(tasks.borrow().len(), 1);
	}

	#[rstest]
	fn test_set_dependencies_computes_height() {
		let rt = Runtime::new();
		let source = Signal::new(&rt, 1);
		let first = crate::Derived::new(&rt, {
			let source = source.clone();
			move |cx| cx.get(&source) + 1
		});
		let second = crate::Derived::new(&rt, {
			let first = first.clone();
			move |cx| cx.get(&first) * 2
		});

		let graph = rt.inner.graph.borrow();
		assert_eq!(graph.get(&source.id()).unwrap().height, 0);
		assert_eq!(graph.get(&first.id()).unwrap().height, 1);
		assert_eq!(graph.get(&second.id()).unwrap().height, 2);
	}

	#[rstest]
	fn test_remove_node_clears_edges() {
		let rt = Runtime::new();
		let source = Signal::new(&rt, 1);
		let derived = crate::Derived::new(&rt, {
			let source = source.clone();
			move |cx| cx.get(&source)
		});
		assert_eq!(rt.dependent_count(source.id()), 1);

		rt.remove_node(derived.id());
		assert_eq!(rt.dependent_count(source.id()), 0);
		assert!(!rt.has_node(derived.id()));

		// Second removal finds nothing.
		rt.remove_node(derived.id());
	}
}
