//! Subscription and disposer handles.

use core::cell::Cell;
use core::fmt;
use std::rc::Weak;

use crate::runtime::{NodeId, Runtime, RuntimeInner, SubscriptionId};

/// A live subscriber callback registered on one reactive node.
///
/// Dropping the handle unsubscribes. Calling [`Subscription::unsubscribe`]
/// any number of times is safe; only the first call has an effect.
pub struct Subscription {
	runtime: Weak<RuntimeInner>,
	node: NodeId,
	id: SubscriptionId,
	active: Cell<bool>,
}

impl Subscription {
	pub(crate) fn new(runtime: Weak<RuntimeInner>, node: NodeId, id: SubscriptionId) -> Self {
		Self {
			runtime,
			node,
			id,
			active: Cell::new(true),
		}
	}

	/// Stop receiving notifications.
	///
	/// A callback released before a pending flush is not invoked by it.
	pub fn unsubscribe(&self) {
		if !self.active.replace(false) {
			return;
		}
		if let Some(inner) = self.runtime.upgrade() {
			Runtime::from_inner(inner).remove_subscriber(self.node, self.id);
		}
	}

	/// Whether the callback is still registered.
	pub fn is_active(&self) -> bool {
		self.active.get()
	}

	/// The node this subscription observes.
	pub fn node_id(&self) -> NodeId {
		self.node
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("node", &self.node)
			.field("id", &self.id)
			.field("active", &self.active.get())
			.finish()
	}
}

/// A one-shot cleanup action.
///
/// Disposers are what the renderer stores for everything it must release
/// when a subtree goes away: signal subscriptions, event listeners, node
/// refs, and abort handles of async tasks. The action runs on the first
/// [`Disposer::dispose`] call or on drop, whichever comes first.
pub struct Disposer {
	cleanup: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
	/// Wrap a cleanup action.
	pub fn new<F>(cleanup: F) -> Self
	where
		F: FnOnce() + 'static,
	{
		Self {
			cleanup: Some(Box::new(cleanup)),
		}
	}

	/// A disposer with nothing to release.
	pub fn noop() -> Self {
		Self { cleanup: None }
	}

	/// Run the cleanup action if it has not run yet.
	pub fn dispose(&mut self) {
		if let Some(cleanup) = self.cleanup.take() {
			cleanup();
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.cleanup.is_none()
	}
}

impl Drop for Disposer {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl From<Subscription> for Disposer {
	fn from(subscription: Subscription) -> Self {
		Disposer::new(move || subscription.unsubscribe())
	}
}

impl fmt::Debug for Disposer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Disposer")
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
