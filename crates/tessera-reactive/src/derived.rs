//! Derived values and the dependency tracker.
//!
//! A [`Derived`] owns a computation that reads other nodes through a
//! [`Tracker`]. Every read through the tracker becomes a dependency edge;
//! edges are replaced wholesale on each recompute, so a computation that
//! stops reading a signal stops depending on it.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::{Rc, Weak};

use crate::read::{ReadSignal, Readable};
use crate::runtime::{Callback, NodeId, NodeType, ReactiveNode, Runtime};
use crate::signal::EqualsFn;
use crate::subscription::Subscription;

type ComputeFn<T> = Box<dyn FnMut(&mut Tracker) -> T>;

/// Records which nodes a computation reads.
///
/// A tracker is handed to derived computations and effects. Reading a
/// signal through it subscribes the computation to that signal.
#[derive(Debug)]
pub struct Tracker {
	observer: NodeId,
	dependencies: Vec<NodeId>,
}

impl Tracker {
	pub(crate) fn new(observer: NodeId) -> Self {
		Self {
			observer,
			dependencies: Vec::new(),
		}
	}

	/// Read a value and depend on it.
	pub fn get<S>(&mut self, source: &S) -> S::Value
	where
		S: Readable,
		S::Value: Clone,
	{
		self.track(source.node_id());
		source.get_untracked()
	}

	/// Borrow a value and depend on it.
	pub fn with<S, U>(&mut self, source: &S, f: impl FnOnce(&S::Value) -> U) -> U
	where
		S: Readable,
	{
		self.track(source.node_id());
		source.with_untracked(f)
	}

	/// Depend on a node without reading it.
	pub fn track(&mut self, node: NodeId) {
		if node != self.observer && !self.dependencies.contains(&node) {
			self.dependencies.push(node);
		}
	}

	/// The node being computed.
	pub fn observer(&self) -> NodeId {
		self.observer
	}

	/// Nodes read so far, in first-read order.
	pub fn dependencies(&self) -> &[NodeId] {
		&self.dependencies
	}

	fn into_dependencies(self) -> Vec<NodeId> {
		self.dependencies
	}
}

/// A read-only value computed from other reactive nodes.
///
/// The first computation runs eagerly at creation. After that the value is
/// recomputed during a flush whenever a dependency changed, and subscribers
/// are notified only if the new value differs under the equality policy.
///
/// ## Example
///
/// ```ignore
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 2);
/// let doubled = Derived::new(&rt, {
/// 	let count = count.clone();
/// 	move |cx| cx.get(&count) * 2
/// });
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Derived<T: 'static> {
	inner: Rc<DerivedInner<T>>,
}

struct DerivedInner<T: 'static> {
	id: NodeId,
	rt: Runtime,
	value: RefCell<T>,
	compute: RefCell<ComputeFn<T>>,
	equals: EqualsFn<T>,
	disposed: Cell<bool>,
}

impl<T: PartialEq + 'static> Derived<T> {
	/// Create a derived value compared with `PartialEq`.
	pub fn new<F>(rt: &Runtime, compute: F) -> Self
	where
		F: FnMut(&mut Tracker) -> T + 'static,
	{
		Self::with_equals(rt, compute, |a, b| a == b)
	}

	/// Create a derived value from an explicit list of sources.
	///
	/// `compute` runs without a tracker; the dependencies are exactly
	/// `sources`, whatever the closure reads.
	pub fn from_signals<F>(rt: &Runtime, sources: &[NodeId], mut compute: F) -> Self
	where
		F: FnMut() -> T + 'static,
	{
		let sources = sources.to_vec();
		Self::new(rt, move |cx| {
			for source in &sources {
				cx.track(*source);
			}
			compute()
		})
	}
}

impl<T: 'static> Derived<T> {
	/// Create a derived value with a custom equality policy.
	pub fn with_equals<F, E>(rt: &Runtime, compute: F, equals: E) -> Self
	where
		F: FnMut(&mut Tracker) -> T + 'static,
		E: Fn(&T, &T) -> bool + 'static,
	{
		Self::create(rt, NodeType::Derived, Box::new(compute), Box::new(equals))
	}

	pub(crate) fn create(
		rt: &Runtime,
		node_type: NodeType,
		mut compute: ComputeFn<T>,
		equals: EqualsFn<T>,
	) -> Self {
		let id = NodeId::new();
		let mut tracker = Tracker::new(id);
		let value = compute(&mut tracker);

		let inner = Rc::new(DerivedInner {
			id,
			rt: rt.clone(),
			value: RefCell::new(value),
			compute: RefCell::new(compute),
			equals,
			disposed: Cell::new(false),
		});
		let handle: Weak<dyn ReactiveNode> = Rc::downgrade(&inner) as Weak<dyn ReactiveNode>;
		rt.register_node(id, node_type, handle);
		rt.set_dependencies(id, tracker.into_dependencies());
		Self { inner }
	}

	/// Get the current value.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.inner.value.borrow().clone()
	}

	/// Borrow the current value.
	pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
		f(&self.inner.value.borrow())
	}

	/// Register a callback run with the new value whenever it changes.
	pub fn subscribe<F>(&self, f: F) -> Subscription
	where
		F: Fn(&T) + 'static,
		T: Clone,
	{
		let weak = Rc::downgrade(&self.inner);
		let callback: Callback = Rc::new(move || {
			if let Some(inner) = weak.upgrade() {
				let value = inner.value.borrow().clone();
				f(&value);
			}
		});
		self.inner.rt.subscribe_node(self.inner.id, callback)
	}

	/// Derive a further value from this one.
	pub fn map<U, F>(&self, f: F) -> Derived<U>
	where
		U: PartialEq + 'static,
		F: Fn(&T) -> U + 'static,
	{
		let source = self.clone();
		Derived::new(&self.inner.rt, move |cx| cx.with(&source, &f))
	}

	/// A type-erased read-only view of this value.
	pub fn read_only(&self) -> ReadSignal<T>
	where
		T: Clone,
	{
		ReadSignal::from(self.clone())
	}

	/// Release the upstream edges now instead of on drop.
	///
	/// The value stays readable but is frozen. Safe to call repeatedly.
	pub fn dispose(&self) {
		if self.inner.disposed.replace(true) {
			return;
		}
		self.inner.rt.remove_node(self.inner.id);
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.get()
	}

	pub fn id(&self) -> NodeId {
		self.inner.id
	}

	pub fn runtime(&self) -> &Runtime {
		&self.inner.rt
	}
}

impl<T: 'static> Readable for Derived<T> {
	type Value = T;

	fn node_id(&self) -> NodeId {
		self.inner.id
	}

	fn with_untracked<U>(&self, f: impl FnOnce(&T) -> U) -> U {
		self.with(f)
	}
}

impl<T: 'static> ReactiveNode for DerivedInner<T> {
	fn refresh(&self, rt: &Runtime) -> bool {
		if self.disposed.get() {
			return false;
		}
		let mut tracker = Tracker::new(self.id);
		let next = {
			let mut compute = self.compute.borrow_mut();
			(*compute)(&mut tracker)
		};
		rt.set_dependencies(self.id, tracker.into_dependencies());

		let unchanged = (self.equals)(&self.value.borrow(), &next);
		if !unchanged {
			*self.value.borrow_mut() = next;
		}
		!unchanged
	}
}

impl<T: 'static> Drop for DerivedInner<T> {
	fn drop(&mut self) {
		if !self.disposed.replace(true) {
			self.rt.remove_node(self.id);
		}
	}
}

impl<T: 'static> Clone for Derived<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: fmt::Debug + 'static> fmt::Debug for Derived<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Derived")
			.field("id", &self.inner.id)
			.field("value", &*self.inner.value.borrow())
			.field("disposed", &self.inner.disposed.get())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Signal;
	use rstest::rstest;

	#[rstest]
	fn test_derived_computes_eagerly() {
		let rt = Runtime::new();
		let count = Signal::new(&rt, 3);
		let doubled = count.map(|n| n * 2);

		assert_eq!(doubled.get(), 6);
		assert_eq!(rt.dependent_count(count.id()), 1);
	}

	#[rstest]
	fn test_derived_recomputes_on_flush() {
		let rt = Runtime::new();
		let count = Signal::new(&rt, 3);
		let doubled = count.map(|n| n * 2);

		count.set(4);
		assert_eq!(doubled.get(), 6);
		rt.flush();
		assert_eq!(doubled.get(), 8);
	}

	#[rstest]
	fn test_dependencies_are_retracked() {
		let rt = Runtime::new();
		let use_left = Signal::new(&rt, true);
		let left = Signal::new(&rt, 1);
		let right = Signal::new(&rt, 2);
		let picked = Derived::new(&rt, {
			let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
			move |cx| {
				if cx.get(&use_left) {
					cx.get(&left)
				} else {
					cx.get(&right)
				}
			}
		});
		assert_eq!(rt.dependent_count(left.id()), 1);
		assert_eq!(rt.dependent_count(right.id()), 0);

		use_left.set(false);
		rt.flush();
		assert_eq!(picked.get(), 2);
		assert_eq!(rt.dependent_count(left.id()), 0);
		assert_eq!(rt.dependent_count(right.id()), 1);
	}

	#[rstest]
	fn test_from_signals_uses_explicit_sources() {
		let rt = Runtime::new();
		let a = Signal::new(&rt, 1);
		let b = Signal::new(&rt, 2);
		let sum = Derived::from_signals(&rt, &[a.id(), b.id()], {
			let (a, b) = (a.clone(), b.clone());
			move || a.get() + b.get()
		});

		b.set(5);
		rt.flush();
		assert_eq!(sum.get(), 6);
	}

	#[rstest]
	fn test_dispose_releases_edges_once() {
		let rt = Runtime::new();
		let count = Signal::new(&rt, 1);
		let doubled = count.map(|n| n * 2);

		doubled.dispose();
		doubled.dispose();
		assert!(doubled.is_disposed());
		assert_eq!(rt.dependent_count(count.id()), 0);

		count.set(2);
		rt.flush();
		assert_eq!(doubled.get(), 2);
	}

	#[rstest]
	fn test_tracker_ignores_self_and_duplicates() {
		let observer = NodeId::new();
		let other = NodeId::new();
		let mut tracker = Tracker::new(observer);

		tracker.track(observer);
		tracker.track(other);
		tracker.track(other);
		assert_eq!(tracker.dependencies(), &[other]);
	}
}
