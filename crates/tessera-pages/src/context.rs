//! Context map passed down the tree.
//!
//! Components receive the context of their position and may provide new
//! values; what they provide is visible to their descendants only. The
//! renderer stores the context each node was built with, so later patches
//! of a reactive hole or async region see the same values as the first
//! render did.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Typed values keyed by their type.
///
/// Cloning is cheap: the map is shared until someone provides a value, at
/// which point only that clone copies it.
#[derive(Clone, Default)]
pub struct Context {
	values: Rc<BTreeMap<TypeId, Rc<dyn Any>>>,
}

impl Context {
	/// An empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Provide `value` to descendants, replacing any value of the same type.
	///
	/// # Example
	///
	/// ```ignore
	/// ctx.provide(Theme::Dark);
	/// assert_eq!(ctx.get::<Theme>(), Some(&Theme::Dark));
	/// ```
	pub fn provide<T: 'static>(&mut self, value: T) {
		Rc::make_mut(&mut self.values).insert(TypeId::of::<T>(), Rc::new(value));
	}

	/// Nearest provided value of type `T`.
	pub fn get<T: 'static>(&self) -> Option<&T> {
		self.values
			.get(&TypeId::of::<T>())
			.and_then(|value| value.downcast_ref::<T>())
	}

	/// Copy of the nearest provided value of type `T`.
	pub fn use_context<T: Clone + 'static>(&self) -> Option<T> {
		self.get::<T>().cloned()
	}

	pub fn contains<T: 'static>(&self) -> bool {
		self.values.contains_key(&TypeId::of::<T>())
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

impl fmt::Debug for Context {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("values", &self.values.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[derive(Debug, Clone, PartialEq)]
	struct Theme(&'static str);

	#[rstest]
	fn test_use_context_with_value() {
		let mut ctx = Context::new();
		ctx.provide(42_i32);

		assert_eq!(ctx.use_context::<i32>(), Some(42));
	}

	#[rstest]
	fn test_use_context_without_value() {
		let ctx = Context::new();

		assert!(ctx.use_context::<String>().is_none());
		assert!(ctx.is_empty());
	}

	#[rstest]
	fn test_provide_does_not_leak_to_parent() {
		let mut parent = Context::new();
		parent.provide(Theme("light"));
		let mut child = parent.clone();
		child.provide(Theme("dark"));
		child.provide(7_u8);

		assert_eq!(parent.get::<Theme>(), Some(&Theme("light")));
		assert!(!parent.contains::<u8>());
		assert_eq!(child.get::<Theme>(), Some(&Theme("dark")));
		assert_eq!(child.len(), 2);
	}
}
