//! Type-erased read access to reactive values.

use core::fmt;
use std::rc::Rc;

use crate::derived::Derived;
use crate::runtime::{NodeId, Runtime};
use crate::signal::Signal;
use crate::subscription::Subscription;

/// Anything a [`Tracker`](crate::Tracker) can read.
pub trait Readable {
	type Value;

	/// Graph node read by this handle.
	fn node_id(&self) -> NodeId;

	/// Borrow the current value without recording a dependency.
	fn with_untracked<U>(&self, f: impl FnOnce(&Self::Value) -> U) -> U;

	/// Copy the current value without recording a dependency.
	fn get_untracked(&self) -> Self::Value
	where
		Self::Value: Clone,
	{
		self.with_untracked(Clone::clone)
	}
}

/// A read-only handle over a [`Signal`], a [`Derived`], or a projection of
/// either.
///
/// This is what view descriptors store, so one descriptor type covers
/// writable and computed sources alike. [`ReadSignal::map`] projects without
/// creating a graph node: the projection runs on every read and shares the
/// source's node, which suits cheap conversions such as formatting a number
/// for a text node.
pub struct ReadSignal<T> {
	id: NodeId,
	runtime: Runtime,
	read: Rc<dyn Fn() -> T>,
}

impl<T: 'static> ReadSignal<T> {
	/// Current value.
	pub fn get(&self) -> T {
		(self.read)()
	}

	/// Project the value through `f`.
	pub fn map<U, F>(&self, f: F) -> ReadSignal<U>
	where
		F: Fn(T) -> U + 'static,
	{
		let read = self.read.clone();
		ReadSignal {
			id: self.id,
			runtime: self.runtime.clone(),
			read: Rc::new(move || f(read())),
		}
	}

	/// Register a callback run with the latest value on every delivered change.
	pub fn subscribe<F>(&self, f: F) -> Subscription
	where
		F: Fn(&T) + 'static,
	{
		let read = self.read.clone();
		self.runtime
			.subscribe_node(self.id, Rc::new(move || f(&read())))
	}

	pub fn id(&self) -> NodeId {
		self.id
	}

	pub fn runtime(&self) -> &Runtime {
		&self.runtime
	}

	/// Whether two handles read the same node.
	///
	/// Projections of one source compare equal.
	pub fn same_source(&self, other: &ReadSignal<T>) -> bool {
		self.id == other.id
	}
}

impl<T: Clone + 'static> From<Signal<T>> for ReadSignal<T> {
	fn from(signal: Signal<T>) -> Self {
		Self {
			id: signal.id(),
			runtime: signal.runtime().clone(),
			read: Rc::new(move || signal.get()),
		}
	}
}

impl<T: Clone + 'static> From<Derived<T>> for ReadSignal<T> {
	fn from(derived: Derived<T>) -> Self {
		Self {
			id: derived.id(),
			runtime: derived.runtime().clone(),
			read: Rc::new(move || derived.get()),
		}
	}
}

impl<T: 'static> Readable for ReadSignal<T> {
	type Value = T;

	fn node_id(&self) -> NodeId {
		self.id
	}

	fn with_untracked<U>(&self, f: impl FnOnce(&T) -> U) -> U {
		f(&(self.read)())
	}
}

impl<T> Clone for ReadSignal<T> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			runtime: self.runtime.clone(),
			read: self.read.clone(),
		}
	}
}

impl<T> fmt::Debug for ReadSignal<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReadSignal").field("id", &self.id).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use core::cell::RefCell;
	use rstest::rstest;

	#[rstest]
	fn test_read_signal_follows_source() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 1);
		let read = signal.read_only();

		signal.set(2);
		assert_eq!(read.get(), 2);
		assert_eq!(read.id(), signal.id());
	}

	#[rstest]
	fn test_map_projects_without_new_node() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 5);
		let before = rt.node_count();
		let label = signal.read_only().map(|n| format!("{n} items"));

		assert_eq!(rt.node_count(), before);
		assert_eq!(label.get(), "5 items");
		assert!(label.id() == signal.id());
	}

	#[rstest]
	fn test_subscribe_receives_projection() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 1);
		let seen = Rc::new(RefCell::new(Vec::new()));
		let sink = seen.clone();
		let _sub = signal
			.read_only()
			.map(|n| n.to_string())
			.subscribe(move |s| sink.borrow_mut().push(s.clone()));

		signal.set(10);
		rt.flush();
		assert_eq!(*seen.borrow(), vec!["10".to_string()]);
	}

	#[rstest]
	fn test_tracker_reads_through_read_signal() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 2);
		let read = signal.read_only();
		let squared = Derived::new(&rt, move |cx| {
			let n = cx.get(&read);
			n * n
		});

		signal.set(3);
		rt.flush();
		assert_eq!(squared.get(), 9);
	}
}
