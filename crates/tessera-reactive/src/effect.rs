//! Effect system for side effects
//!
//! Effects run a closure immediately and again whenever a value it read
//! through its [`Tracker`] changes. They are derived nodes without a value,
//! re-run during the derived phase of a flush.

use crate::derived::{Derived, Tracker};
use crate::runtime::{NodeId, NodeType, Runtime};

/// A side effect tied to the values it reads.
///
/// The effect stays registered until it is disposed or dropped.
///
/// ## Example
///
/// ```ignore
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
/// let _effect = Effect::new(&rt, {
/// 	let count = count.clone();
/// 	move |cx| println!("count: {}", cx.get(&count))
/// });
/// ```
pub struct Effect {
	node: Derived<()>,
}

impl Effect {
	/// Run `f` now and after every change of what it reads.
	pub fn new<F>(rt: &Runtime, mut f: F) -> Self
	where
		F: FnMut(&mut Tracker) + 'static,
	{
		// Never "changed": effects have no subscribers of their own.
		let node = Derived::create(
			rt,
			NodeType::Effect,
			Box::new(move |cx: &mut Tracker| f(cx)),
			Box::new(|_: &(), _: &()| true),
		);
		Self { node }
	}

	pub fn id(&self) -> NodeId {
		self.node.id()
	}

	/// Stop re-running. Safe to call repeatedly.
	pub fn dispose(&self) {
		self.node.dispose();
	}

	pub fn is_disposed(&self) -> bool {
		self.node.is_disposed()
	}
}

impl Drop for Effect {
	fn drop(&mut self) {
		self.dispose();
	}
}
