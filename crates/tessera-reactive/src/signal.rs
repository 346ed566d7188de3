//! Writable signals.

use core::cell::RefCell;
use core::fmt;
use std::rc::{Rc, Weak};

use crate::derived::Derived;
use crate::read::{ReadSignal, Readable};
use crate::runtime::{Callback, NodeId, NodeType, ReactiveNode, Runtime};
use crate::subscription::Subscription;

pub(crate) type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// A writable reactive cell.
///
/// `Signal<T>` is a cheap handle; clones share the same value. Writes that
/// the equality policy considers equal to the current value are ignored.
/// Accepted writes are delivered to subscribers on the runtime's next flush.
///
/// ## Example
///
/// ```ignore
/// let rt = Runtime::new();
/// let name = Signal::new(&rt, String::from("ada"));
/// name.set("grace".to_string());
/// assert_eq!(name.get(), "grace");
/// ```
pub struct Signal<T: 'static> {
	inner: Rc<SignalInner<T>>,
}

pub(crate) struct SignalInner<T: 'static> {
	id: NodeId,
	rt: Runtime,
	value: RefCell<T>,
	/// Value before the first accepted write of the current tick.
	snapshot: RefCell<Option<T>>,
	equals: EqualsFn<T>,
}

impl<T: PartialEq + 'static> Signal<T> {
	/// Create a signal compared with `PartialEq`.
	pub fn new(rt: &Runtime, value: T) -> Self {
		Self::with_equals(rt, value, |a, b| a == b)
	}
}

impl<T: 'static> Signal<T> {
	/// Create a signal with a custom equality policy.
	///
	/// `equals(old, new)` returning `true` makes a write a no-op.
	pub fn with_equals<F>(rt: &Runtime, value: T, equals: F) -> Self
	where
		F: Fn(&T, &T) -> bool + 'static,
	{
		let id = NodeId::new();
		let inner = Rc::new(SignalInner {
			id,
			rt: rt.clone(),
			value: RefCell::new(value),
			snapshot: RefCell::new(None),
			equals: Box::new(equals),
		});
		let handle: Weak<dyn ReactiveNode> = Rc::downgrade(&inner) as Weak<dyn ReactiveNode>;
		rt.register_node(id, NodeType::Signal, handle);
		Self { inner }
	}

	/// Create a signal where every write counts as a change.
	pub fn always_notify(rt: &Runtime, value: T) -> Self {
		Self::with_equals(rt, value, |_, _| false)
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

	/// Assign a new value.
	///
	/// Returns `false` when the write was a no-op under the equality policy.
	pub fn set(&self, value: T) -> bool {
		if (self.inner.equals)(&self.inner.value.borrow(), &value) {
			return false;
		}
		let previous = self.inner.value.replace(value);
		{
			let mut snapshot = self.inner.snapshot.borrow_mut();
			if snapshot.is_none() {
				*snapshot = Some(previous);
			}
		}
		self.inner.rt.mark_dirty(self.inner.id);
		true
	}

	/// Update the value through a mutable reference.
	///
	/// The closure works on a copy, so the write goes through the same
	/// equality check as [`Signal::set`].
	pub fn update<F>(&self, f: F) -> bool
	where
		F: FnOnce(&mut T),
		T: Clone,
	{
		let mut next = self.get();
		f(&mut next);
		self.set(next)
	}

	/// Register a callback run with the latest value on every delivered change.
	///
	/// The callback receives a copy, so it may write back to this signal.
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

	/// Derive a value from this signal.
	pub fn map<U, F>(&self, f: F) -> Derived<U>
	where
		U: PartialEq + 'static,
		F: Fn(&T) -> U + 'static,
	{
		let source = self.clone();
		Derived::new(&self.inner.rt, move |cx| cx.with(&source, &f))
	}

	/// A type-erased read-only view of this signal.
	pub fn read_only(&self) -> ReadSignal<T>
	where
		T: Clone,
	{
		ReadSignal::from(self.clone())
	}

	pub fn id(&self) -> NodeId {
		self.inner.id
	}

	pub fn runtime(&self) -> &Runtime {
		&self.inner.rt
	}
}

impl<T: 'static> Readable for Signal<T> {
	type Value = T;

	fn node_id(&self) -> NodeId {
		self.inner.id
	}

	fn with_untracked<U>(&self, f: impl FnOnce(&T) -> U) -> U {
		self.with(f)
	}
}

impl<T: 'static> ReactiveNode for SignalInner<T> {
	fn refresh(&self, _rt: &Runtime) -> bool {
		let snapshot = self.snapshot.borrow_mut().take();
		match snapshot {
			Some(previous) => !(self.equals)(&previous, &self.value.borrow()),
			None => true,
		}
	}
}

impl<T: 'static> Drop for SignalInner<T> {
	fn drop(&mut self) {
		self.rt.remove_node(self.id);
	}
}

impl<T: 'static> Clone for Signal<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("id", &self.inner.id)
			.field("value", &*self.inner.value.borrow())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use core::cell::Cell;
	use rstest::rstest;

	#[rstest]
	fn test_signal_creation() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 42);
		assert_eq!(signal.get(), 42);
		assert!(rt.has_node(signal.id()));
	}

	#[rstest]
	fn test_signal_set_equal_is_noop() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 7);

		assert!(!signal.set(7));
		assert!(!rt.has_pending());
	}

	#[rstest]
	fn test_signal_update() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, vec![1, 2]);

		signal.update(|v| v.push(3));
		assert_eq!(signal.get(), vec![1, 2, 3]);
	}

	#[rstest]
	fn test_custom_equality() {
		let rt = Runtime::new();
		let signal = Signal::with_equals(&rt, 10_i32, |a, b| a / 10 == b / 10);

		assert!(!signal.set(15));
		assert!(signal.set(25));
		assert_eq!(signal.get(), 25);
	}

	#[rstest]
	fn test_always_notify_delivers_equal_writes() {
		let rt = Runtime::new();
		let signal = Signal::always_notify(&rt, ());
		let runs = Rc::new(Cell::new(0));
		let counter = runs.clone();
		let _sub = signal.subscribe(move |_| counter.set(counter.get() + 1));

		signal.set(());
		rt.flush();
		signal.set(());
		rt.flush();
		assert_eq!(runs.get(), 2);
	}

	#[rstest]
	fn test_drop_last_handle_removes_node() {
		let rt = Runtime::new();
		let signal = Signal::new(&rt, 0);
		let id = signal.id();
		let clone = signal.clone();

		drop(signal);
		assert!(rt.has_node(id));
		drop(clone);
		assert!(!rt.has_node(id));
	}
}
