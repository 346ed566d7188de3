//! The render strategy contract.
//!
//! A [`RenderStrategy`] supplies the primitive operations the renderer needs
//! to create and mutate one backend's target objects. Strategies hold no
//! per-mount state; everything the renderer must remember about a mounted
//! node lives in the renderer's own records.

use std::fmt;

use tessera_reactive::{Disposer, ReadSignal};
use tracing::warn;

use crate::error::{RenderError, RenderResult};
use crate::view::{AttrValue, EventHandler, NodeRef};

/// What kind of target object a node is, as seen by hydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	Element(String),
	Text(String),
	Comment(String),
}

/// Primitive operations of one backend.
///
/// Strategies are cheap handles: the renderer clones them into signal
/// callbacks that update properties after the first render.
pub trait RenderStrategy: Clone + 'static {
	/// Handle to one target object. Clones refer to the same object.
	type Node: Clone + fmt::Debug + 'static;

	fn create_element(&self, tag: &str) -> RenderResult<Self::Node>;

	fn create_text_node(&self, text: &str) -> RenderResult<Self::Node>;

	fn create_comment(&self, text: &str) -> RenderResult<Self::Node>;

	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

	fn first_child(&self, node: &Self::Node) -> Option<Self::Node>;

	/// Insert `node` into `parent` before `reference`, or last when
	/// `reference` is `None`. An attached `node` is moved.
	fn insert_before(
		&self,
		parent: &Self::Node,
		node: &Self::Node,
		reference: Option<&Self::Node>,
	) -> RenderResult<()>;

	fn append_child(&self, parent: &Self::Node, node: &Self::Node) -> RenderResult<()> {
		self.insert_before(parent, node, None)
	}

	/// Detach `node` from its parent. Detached nodes are left alone.
	fn remove_child(&self, node: &Self::Node) -> RenderResult<()>;

	/// Put `new` where `old` is and detach `old`.
	fn replace_node(&self, old: &Self::Node, new: &Self::Node) -> RenderResult<()> {
		let parent = self
			.parent(old)
			.ok_or_else(|| RenderError::strategy("replace_node", "old node is detached"))?;
		self.insert_before(&parent, new, Some(old))?;
		self.remove_child(old)
	}

	/// Set a property, or remove it when `value` is `None`.
	fn set_property(&self, node: &Self::Node, key: &str, value: Option<&AttrValue>) -> RenderResult<()>;

	/// Replace the content of a text node.
	fn set_text(&self, node: &Self::Node, text: &str) -> RenderResult<()>;

	fn inspect(&self, node: &Self::Node) -> NodeKind;

	/// Whether two handles refer to the same target object.
	fn same_node(&self, a: &Self::Node, b: &Self::Node) -> bool;

	/// Wire an event handler; the disposer removes it.
	fn add_event_listener(
		&self,
		node: &Self::Node,
		event: &str,
		handler: EventHandler,
	) -> RenderResult<Disposer>;

	/// Set a property from a signal and keep it in sync.
	///
	/// The disposer ends the subscription.
	fn set_signal_property(
		&self,
		node: &Self::Node,
		key: &str,
		value: &ReadSignal<AttrValue>,
	) -> RenderResult<Disposer> {
		self.set_property(node, key, Some(&value.get()))?;

		let strategy = self.clone();
		let target = node.clone();
		let key = key.to_string();
		let subscription = value.subscribe(move |next| {
			if let Err(err) = strategy.set_property(&target, &key, Some(next)) {
				warn!(%err, key = %key, "failed to update signal-driven property");
			}
		});
		Ok(Disposer::from(subscription))
	}

	/// Populate `node_ref` with `node`; the disposer clears it.
	fn set_ref(&self, node: &Self::Node, node_ref: &NodeRef) -> RenderResult<Disposer> {
		node_ref.set(node.clone());
		let node_ref = node_ref.clone();
		Ok(Disposer::new(move || node_ref.clear()))
	}

	/// Backend shortcut for replacing a leaf.
	///
	/// Called when a leaf element is about to be replaced by another leaf
	/// that carries no bindings. Returning `true` means `old` was updated in
	/// place to be indistinguishable from `new`; the renderer then keeps
	/// `old` and drops `new`.
	fn try_reuse_node(&self, _old: &Self::Node, _new: &Self::Node) -> RenderResult<bool> {
		Ok(false)
	}
}
