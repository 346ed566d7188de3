//! In-memory document backend.
//!
//! A small DOM-like tree ([`Document`], [`DomNode`]) and a [`DomStrategy`]
//! that renders into it. The strategy counts every primitive operation it
//! performs in [`DomStats`], which is how tests check that hydration of
//! matching markup creates nothing and that keyed moves reuse nodes.

mod parser;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tessera_reactive::Disposer;
use thiserror::Error;

use crate::error::{MarkupResult, RenderError, RenderResult};
use crate::ssr::html_escape;
use crate::strategy::{NodeKind, RenderStrategy};
use crate::view::{AttrValue, Event, EventHandler, is_void_element};

/// Errors from tree mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
	#[error("reference node is not a child of the parent")]
	NotAChild,
	#[error("{0} nodes cannot have children")]
	NotAContainer(&'static str),
	#[error("node cannot be inserted into its own subtree")]
	Cycle,
	#[error("{0} nodes have no text content")]
	NotText(&'static str),
	#[error("only elements have attributes")]
	NotAnElement,
}

/// Content of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
	Element {
		tag: String,
		attributes: BTreeMap<String, String>,
	},
	Text(String),
	Comment(String),
}

impl NodeContent {
	fn kind_name(&self) -> &'static str {
		match self {
			NodeContent::Element { .. } => "element",
			NodeContent::Text(_) => "text",
			NodeContent::Comment(_) => "comment",
		}
	}
}

struct Listener {
	id: u64,
	event: String,
	handler: EventHandler,
}

struct NodeData {
	id: u64,
	content: RefCell<NodeContent>,
	parent: RefCell<Weak<NodeData>>,
	children: RefCell<Vec<DomNode>>,
	listeners: RefCell<Vec<Listener>>,
}

fn next_id() -> u64 {
	static COUNTER: AtomicU64 = AtomicU64::new(1);
	COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a node. Clones refer to the same node.
#[derive(Clone)]
pub struct DomNode(Rc<NodeData>);

impl DomNode {
	fn with_content(content: NodeContent) -> Self {
		Self(Rc::new(NodeData {
			id: next_id(),
			content: RefCell::new(content),
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(Vec::new()),
			listeners: RefCell::new(Vec::new()),
		}))
	}

	/// A detached element. Tags are stored lowercase.
	pub fn new_element(tag: &str) -> Self {
		Self::with_content(NodeContent::Element {
			tag: tag.to_ascii_lowercase(),
			attributes: BTreeMap::new(),
		})
	}

	pub fn new_text(text: &str) -> Self {
		Self::with_content(NodeContent::Text(text.to_string()))
	}

	pub fn new_comment(text: &str) -> Self {
		Self::with_content(NodeContent::Comment(text.to_string()))
	}

	/// Process-unique identity of this node.
	pub fn id(&self) -> u64 {
		self.0.id
	}

	pub fn ptr_eq(&self, other: &DomNode) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	pub fn content(&self) -> NodeContent {
		self.0.content.borrow().clone()
	}

	pub fn tag_name(&self) -> Option<String> {
		match &*self.0.content.borrow() {
			NodeContent::Element { tag, .. } => Some(tag.clone()),
			_ => None,
		}
	}

	pub fn is_element(&self) -> bool {
		matches!(&*self.0.content.borrow(), NodeContent::Element { .. })
	}

	/// Text of a text or comment node; concatenated descendant text of an
	/// element.
	pub fn text_content(&self) -> String {
		match &*self.0.content.borrow() {
			NodeContent::Text(text) | NodeContent::Comment(text) => text.clone(),
			NodeContent::Element { .. } => self
				.children()
				.iter()
				.filter(|child| !matches!(child.content(), NodeContent::Comment(_)))
				.map(DomNode::text_content)
				.collect(),
		}
	}

	pub fn attribute(&self, name: &str) -> Option<String> {
		match &*self.0.content.borrow() {
			NodeContent::Element { attributes, .. } => attributes.get(name).cloned(),
			_ => None,
		}
	}

	pub fn attributes(&self) -> BTreeMap<String, String> {
		match &*self.0.content.borrow() {
			NodeContent::Element { attributes, .. } => attributes.clone(),
			_ => BTreeMap::new(),
		}
	}

	pub fn parent(&self) -> Option<DomNode> {
		self.0.parent.borrow().upgrade().map(DomNode)
	}

	pub fn children(&self) -> Vec<DomNode> {
		self.0.children.borrow().clone()
	}

	pub fn child_count(&self) -> usize {
		self.0.children.borrow().len()
	}

	pub fn first_child(&self) -> Option<DomNode> {
		self.0.children.borrow().first().cloned()
	}

	pub fn next_sibling(&self) -> Option<DomNode> {
		let parent = self.parent()?;
		let siblings = parent.0.children.borrow();
		let index = siblings.iter().position(|s| s.ptr_eq(self))?;
		siblings.get(index + 1).cloned()
	}

	/// Insert `child` before `reference`, moving it if already attached.
	pub fn insert_before(&self, child: &DomNode, reference: Option<&DomNode>) -> Result<(), DomError> {
		if !self.is_element() {
			return Err(DomError::NotAContainer(self.0.content.borrow().kind_name()));
		}
		if self.is_inclusive_descendant_of(child) {
			return Err(DomError::Cycle);
		}
		if let Some(reference) = reference {
			if reference.ptr_eq(child) {
				return Ok(());
			}
			if !reference.parent().is_some_and(|p| p.ptr_eq(self)) {
				return Err(DomError::NotAChild);
			}
		}

		child.remove();
		let mut children = self.0.children.borrow_mut();
		let index = match reference {
			Some(reference) => children
				.iter()
				.position(|c| c.ptr_eq(reference))
				.ok_or(DomError::NotAChild)?,
			None => children.len(),
		};
		children.insert(index, child.clone());
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		Ok(())
	}

	pub fn append_child(&self, child: &DomNode) -> Result<(), DomError> {
		self.insert_before(child, None)
	}

	/// Detach from the parent. Returns whether the node was attached.
	pub fn remove(&self) -> bool {
		let Some(parent) = self.parent() else {
			return false;
		};
		parent.0.children.borrow_mut().retain(|c| !c.ptr_eq(self));
		*self.0.parent.borrow_mut() = Weak::new();
		true
	}

	pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
		match &mut *self.0.content.borrow_mut() {
			NodeContent::Element { attributes, .. } => {
				attributes.insert(name.to_string(), value.to_string());
				Ok(())
			}
			_ => Err(DomError::NotAnElement),
		}
	}

	pub fn remove_attribute(&self, name: &str) -> Result<(), DomError> {
		match &mut *self.0.content.borrow_mut() {
			NodeContent::Element { attributes, .. } => {
				attributes.remove(name);
				Ok(())
			}
			_ => Err(DomError::NotAnElement),
		}
	}

	/// Rename an element in place, keeping its attributes and children.
	pub fn set_tag(&self, tag: &str) -> Result<(), DomError> {
		match &mut *self.0.content.borrow_mut() {
			NodeContent::Element { tag: current, .. } => {
				*current = tag.to_ascii_lowercase();
				Ok(())
			}
			_ => Err(DomError::NotAnElement),
		}
	}

	pub fn set_text(&self, text: &str) -> Result<(), DomError> {
		match &mut *self.0.content.borrow_mut() {
			NodeContent::Text(content) | NodeContent::Comment(content) => {
				*content = text.to_string();
				Ok(())
			}
			NodeContent::Element { .. } => Err(DomError::NotText("element")),
		}
	}

	/// Register a handler; returns an id for [`DomNode::remove_listener`].
	pub fn add_listener(&self, event: &str, handler: EventHandler) -> u64 {
		let id = next_id();
		self.0.listeners.borrow_mut().push(Listener {
			id,
			event: event.to_string(),
			handler,
		});
		id
	}

	pub fn remove_listener(&self, id: u64) -> bool {
		let mut listeners = self.0.listeners.borrow_mut();
		let before = listeners.len();
		listeners.retain(|l| l.id != id);
		listeners.len() != before
	}

	pub fn listener_count(&self) -> usize {
		self.0.listeners.borrow().len()
	}

	/// Deliver `event` to this node and then to its ancestors.
	///
	/// Returns the number of handlers invoked.
	pub fn dispatch(&self, event: &Event) -> usize {
		let mut handlers = Vec::new();
		let mut current = Some(self.clone());
		while let Some(node) = current {
			handlers.extend(
				node.0
					.listeners
					.borrow()
					.iter()
					.filter(|l| l.event == event.name)
					.map(|l| l.handler.clone()),
			);
			current = node.parent();
		}
		for handler in &handlers {
			handler(event);
		}
		handlers.len()
	}

	/// First descendant element with `tag`, in document order.
	pub fn find_element(&self, tag: &str) -> Option<DomNode> {
		for child in self.children() {
			if child.tag_name().is_some_and(|t| t.eq_ignore_ascii_case(tag)) {
				return Some(child);
			}
			if let Some(found) = child.find_element(tag) {
				return Some(found);
			}
		}
		None
	}

	/// Serialize this node and its subtree.
	pub fn to_html(&self) -> String {
		let mut output = String::new();
		self.write_html(&mut output);
		output
	}

	/// Serialize the children of this node.
	pub fn inner_html(&self) -> String {
		let mut output = String::new();
		for child in self.children() {
			child.write_html(&mut output);
		}
		output
	}

	fn write_html(&self, output: &mut String) {
		match &*self.0.content.borrow() {
			NodeContent::Element { tag, attributes } => {
				output.push('<');
				output.push_str(tag);
				for (name, value) in attributes {
					output.push(' ');
					output.push_str(name);
					if !value.is_empty() {
						output.push_str("=\"");
						output.push_str(&html_escape(value));
						output.push('"');
					}
				}
				output.push('>');
				if !is_void_element(tag) {
					for child in self.0.children.borrow().iter() {
						child.write_html(output);
					}
					output.push_str("</");
					output.push_str(tag);
					output.push('>');
				}
			}
			NodeContent::Text(text) => output.push_str(&html_escape(text)),
			NodeContent::Comment(text) => {
				output.push_str("<!--");
				output.push_str(text);
				output.push_str("-->");
			}
		}
	}

	fn is_inclusive_descendant_of(&self, other: &DomNode) -> bool {
		let mut current = Some(self.clone());
		while let Some(node) = current {
			if node.ptr_eq(other) {
				return true;
			}
			current = node.parent();
		}
		false
	}

	/// Attach a freshly built child without checks.
	fn push_child(&self, child: DomNode) {
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		self.0.children.borrow_mut().push(child);
	}
}

impl fmt::Debug for DomNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &*self.0.content.borrow() {
			NodeContent::Element { tag, .. } => write!(f, "<{tag}>#{}", self.0.id),
			NodeContent::Text(text) => write!(f, "{text:?}#{}", self.0.id),
			NodeContent::Comment(text) => write!(f, "<!--{text}-->#{}", self.0.id),
		}
	}
}

/// Operation counters of a [`DomStrategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomStats {
	pub created: usize,
	pub inserted: usize,
	pub removed: usize,
	pub replaced: usize,
	pub property_writes: usize,
	pub text_writes: usize,
	pub listeners_added: usize,
	pub listeners_removed: usize,
}

impl DomStats {
	/// Operations that change the shape of the tree.
	pub fn structural(&self) -> usize {
		self.created + self.inserted + self.removed + self.replaced
	}
}

/// A document: a `body` element plus the counters of its strategy.
#[derive(Clone)]
pub struct Document {
	body: DomNode,
	stats: Rc<Cell<DomStats>>,
}

impl Document {
	pub fn new() -> Self {
		Self {
			body: DomNode::new_element("body"),
			stats: Rc::new(Cell::new(DomStats::default())),
		}
	}

	/// Parse markup into the body of a new document.
	///
	/// Parsing does not count as strategy operations.
	///
	/// # Example
	///
	/// ```ignore
	/// let doc = Document::parse("<div class=\"x\">5</div>")?;
	/// assert_eq!(doc.body().inner_html(), "<div class=\"x\">5</div>");
	/// ```
	pub fn parse(markup: &str) -> MarkupResult<Self> {
		let document = Self::new();
		for node in parser::parse_markup(markup)? {
			document.body.push_child(build(node));
		}
		Ok(document)
	}

	pub fn body(&self) -> &DomNode {
		&self.body
	}

	/// A strategy rendering into this document.
	pub fn strategy(&self) -> DomStrategy {
		DomStrategy {
			stats: self.stats.clone(),
		}
	}

	pub fn stats(&self) -> DomStats {
		self.stats.get()
	}

	pub fn reset_stats(&self) {
		self.stats.set(DomStats::default());
	}
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document")
			.field("body", &self.body.inner_html())
			.field("stats", &self.stats.get())
			.finish()
	}
}

fn build(node: parser::Markup) -> DomNode {
	match node {
		parser::Markup::Element {
			tag,
			attributes,
			children,
		} => {
			let element = DomNode::with_content(NodeContent::Element {
				tag,
				attributes: attributes.into_iter().collect(),
			});
			for child in children {
				element.push_child(build(child));
			}
			element
		}
		parser::Markup::Text(text) => DomNode::new_text(&text),
		parser::Markup::Comment(text) => DomNode::new_comment(&text),
	}
}

/// [`RenderStrategy`] over [`DomNode`]s.
#[derive(Clone)]
pub struct DomStrategy {
	stats: Rc<Cell<DomStats>>,
}

impl DomStrategy {
	pub fn stats(&self) -> DomStats {
		self.stats.get()
	}

	fn count(&self, f: impl FnOnce(&mut DomStats)) {
		let mut stats = self.stats.get();
		f(&mut stats);
		self.stats.set(stats);
	}
}

fn dom_err(operation: &'static str) -> impl FnOnce(DomError) -> RenderError {
	move |err| RenderError::strategy(operation, err.to_string())
}

impl RenderStrategy for DomStrategy {
	type Node = DomNode;

	fn create_element(&self, tag: &str) -> RenderResult<DomNode> {
		self.count(|s| s.created += 1);
		Ok(DomNode::new_element(tag))
	}

	fn create_text_node(&self, text: &str) -> RenderResult<DomNode> {
		self.count(|s| s.created += 1);
		Ok(DomNode::new_text(text))
	}

	fn create_comment(&self, text: &str) -> RenderResult<DomNode> {
		self.count(|s| s.created += 1);
		Ok(DomNode::new_comment(text))
	}

	fn parent(&self, node: &DomNode) -> Option<DomNode> {
		node.parent()
	}

	fn next_sibling(&self, node: &DomNode) -> Option<DomNode> {
		node.next_sibling()
	}

	fn first_child(&self, node: &DomNode) -> Option<DomNode> {
		node.first_child()
	}

	fn insert_before(
		&self,
		parent: &DomNode,
		node: &DomNode,
		reference: Option<&DomNode>,
	) -> RenderResult<()> {
		parent
			.insert_before(node, reference)
			.map_err(dom_err("insert_before"))?;
		self.count(|s| s.inserted += 1);
		Ok(())
	}

	fn remove_child(&self, node: &DomNode) -> RenderResult<()> {
		if node.remove() {
			self.count(|s| s.removed += 1);
		}
		Ok(())
	}

	fn replace_node(&self, old: &DomNode, new: &DomNode) -> RenderResult<()> {
		let parent = old
			.parent()
			.ok_or_else(|| RenderError::strategy("replace_node", "old node is detached"))?;
		parent
			.insert_before(new, Some(old))
			.map_err(dom_err("replace_node"))?;
		old.remove();
		self.count(|s| s.replaced += 1);
		Ok(())
	}

	fn set_property(&self, node: &DomNode, key: &str, value: Option<&AttrValue>) -> RenderResult<()> {
		match value.and_then(AttrValue::to_markup) {
			Some(text) => node.set_attribute(key, &text),
			None => node.remove_attribute(key),
		}
		.map_err(dom_err("set_property"))?;
		self.count(|s| s.property_writes += 1);
		Ok(())
	}

	fn set_text(&self, node: &DomNode, text: &str) -> RenderResult<()> {
		node.set_text(text).map_err(dom_err("set_text"))?;
		self.count(|s| s.text_writes += 1);
		Ok(())
	}

	fn inspect(&self, node: &DomNode) -> NodeKind {
		match node.content() {
			NodeContent::Element { tag, .. } => NodeKind::Element(tag),
			NodeContent::Text(text) => NodeKind::Text(text),
			NodeContent::Comment(text) => NodeKind::Comment(text),
		}
	}

	fn same_node(&self, a: &DomNode, b: &DomNode) -> bool {
		a.ptr_eq(b)
	}

	fn add_event_listener(
		&self,
		node: &DomNode,
		event: &str,
		handler: EventHandler,
	) -> RenderResult<Disposer> {
		let id = node.add_listener(event, handler);
		self.count(|s| s.listeners_added += 1);

		let target = node.clone();
		let stats = self.clone();
		Ok(Disposer::new(move || {
			if target.remove_listener(id) {
				stats.count(|s| s.listeners_removed += 1);
			}
		}))
	}

	/// Childless elements are morphed in place, tag included.
	fn try_reuse_node(&self, old: &DomNode, new: &DomNode) -> RenderResult<bool> {
		let (Some(old_tag), Some(new_tag)) = (old.tag_name(), new.tag_name()) else {
			return Ok(false);
		};
		if old.child_count() > 0 || new.child_count() > 0 {
			return Ok(false);
		}
		if old_tag != new_tag {
			old.set_tag(&new_tag).map_err(dom_err("try_reuse_node"))?;
		}
		let current = old.attributes();
		let wanted = new.attributes();
		for name in current.keys().filter(|name| !wanted.contains_key(*name)) {
			old.remove_attribute(name).map_err(dom_err("try_reuse_node"))?;
			self.count(|s| s.property_writes += 1);
		}
		for (name, value) in wanted
			.iter()
			.filter(|(name, value)| current.get(*name) != Some(*value))
		{
			old.set_attribute(name, value)
				.map_err(dom_err("try_reuse_node"))?;
			self.count(|s| s.property_writes += 1);
		}
		Ok(true)
	}
}
