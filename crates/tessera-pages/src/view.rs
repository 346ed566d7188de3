//! Tree descriptors.
//!
//! A [`View`] describes desired output. It is plain data: building one has
//! no side effects, and the renderer never compares two views structurally.
//! During child reconciliation views are matched only by [`Key`].

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;
use futures::{FutureExt, Stream, StreamExt};
use tessera_reactive::ReadSignal;

use crate::context::Context;
use crate::error::RenderResult;

/// Identity of a child across reconciliations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
	Str(Cow<'static, str>),
	Int(i64),
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Str(s) => f.write_str(s),
			Key::Int(n) => write!(f, "{n}"),
		}
	}
}

impl From<&'static str> for Key {
	fn from(value: &'static str) -> Self {
		Key::Str(Cow::Borrowed(value))
	}
}

impl From<String> for Key {
	fn from(value: String) -> Self {
		Key::Str(Cow::Owned(value))
	}
}

impl From<i64> for Key {
	fn from(value: i64) -> Self {
		Key::Int(value)
	}
}

impl From<i32> for Key {
	fn from(value: i32) -> Self {
		Key::Int(i64::from(value))
	}
}

impl From<u32> for Key {
	fn from(value: u32) -> Self {
		Key::Int(i64::from(value))
	}
}

/// Value of an element property.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
	Str(Cow<'static, str>),
	/// `true` sets a presence-only attribute, `false` removes it.
	Bool(bool),
	Int(i64),
	Float(f64),
}

impl AttrValue {
	/// Text form used in markup, or `None` when the attribute is absent.
	pub fn to_markup(&self) -> Option<String> {
		match self {
			AttrValue::Str(s) => Some(s.to_string()),
			AttrValue::Bool(true) => Some(String::new()),
			AttrValue::Bool(false) => None,
			AttrValue::Int(n) => Some(n.to_string()),
			AttrValue::Float(x) => Some(x.to_string()),
		}
	}
}

impl From<&'static str> for AttrValue {
	fn from(value: &'static str) -> Self {
		AttrValue::Str(Cow::Borrowed(value))
	}
}

impl From<String> for AttrValue {
	fn from(value: String) -> Self {
		AttrValue::Str(Cow::Owned(value))
	}
}

impl From<bool> for AttrValue {
	fn from(value: bool) -> Self {
		AttrValue::Bool(value)
	}
}

impl From<i64> for AttrValue {
	fn from(value: i64) -> Self {
		AttrValue::Int(value)
	}
}

impl From<i32> for AttrValue {
	fn from(value: i32) -> Self {
		AttrValue::Int(i64::from(value))
	}
}

impl From<f64> for AttrValue {
	fn from(value: f64) -> Self {
		AttrValue::Float(value)
	}
}

/// An attribute that is either fixed or driven by a signal.
#[derive(Debug, Clone)]
pub enum Attr {
	Static(AttrValue),
	Dynamic(ReadSignal<AttrValue>),
}

/// An event delivered to a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
	/// Event name, e.g. `"click"`.
	pub name: String,
	/// Payload such as the new value of an input.
	pub value: Option<String>,
}

impl Event {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: None,
		}
	}

	pub fn with_value(mut self, value: impl Into<String>) -> Self {
		self.value = Some(value.into());
		self
	}
}

/// Event handler type for views.
pub type EventHandler = Rc<dyn Fn(&Event)>;

/// A slot the renderer fills with the target object of an element.
///
/// The slot is populated when the element is mounted and cleared when it is
/// unmounted.
#[derive(Clone, Default)]
pub struct NodeRef {
	slot: Rc<RefCell<Option<Box<dyn Any>>>>,
}

impl NodeRef {
	pub fn new() -> Self {
		Self::default()
	}

	/// The referenced node, if mounted and of type `N`.
	pub fn get<N: Clone + 'static>(&self) -> Option<N> {
		self.slot
			.borrow()
			.as_ref()
			.and_then(|node| node.downcast_ref::<N>())
			.cloned()
	}

	pub fn is_set(&self) -> bool {
		self.slot.borrow().is_some()
	}

	pub fn set<N: 'static>(&self, node: N) {
		*self.slot.borrow_mut() = Some(Box::new(node));
	}

	pub fn clear(&self) {
		self.slot.borrow_mut().take();
	}
}

impl fmt::Debug for NodeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NodeRef")
			.field("set", &self.is_set())
			.finish()
	}
}

/// Represents an element in the view tree.
#[derive(Clone)]
pub struct ElementView {
	tag: Cow<'static, str>,
	attrs: Vec<(Cow<'static, str>, Attr)>,
	events: Vec<(Cow<'static, str>, EventHandler)>,
	node_ref: Option<NodeRef>,
	children: Vec<View>,
	key: Option<Key>,
}

impl fmt::Debug for ElementView {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ElementView")
			.field("tag", &self.tag)
			.field("attrs", &self.attrs)
			.field("children", &self.children)
			.field("key", &self.key)
			.field("event_handlers_count", &self.events.len())
			.finish()
	}
}

impl ElementView {
	/// Creates a new element view.
	pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
		Self {
			tag: tag.into(),
			attrs: Vec::new(),
			events: Vec::new(),
			node_ref: None,
			children: Vec::new(),
			key: None,
		}
	}

	/// Adds a static attribute.
	pub fn attr(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<AttrValue>) -> Self {
		self.set_attr(name.into(), Attr::Static(value.into()));
		self
	}

	/// Adds an attribute that follows a signal.
	pub fn dyn_attr(
		mut self,
		name: impl Into<Cow<'static, str>>,
		value: ReadSignal<AttrValue>,
	) -> Self {
		self.set_attr(name.into(), Attr::Dynamic(value));
		self
	}

	/// Adds an event handler.
	pub fn on<F>(mut self, event: impl Into<Cow<'static, str>>, handler: F) -> Self
	where
		F: Fn(&Event) + 'static,
	{
		self.events.push((event.into(), Rc::new(handler)));
		self
	}

	/// Binds a node ref.
	pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
		self.node_ref = Some(node_ref.clone());
		self
	}

	/// Sets the reconciliation key.
	pub fn key(mut self, key: impl Into<Key>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// Adds a child view.
	pub fn child(mut self, child: impl IntoView) -> Self {
		self.children.push(child.into_view());
		self
	}

	/// Adds multiple child views.
	pub fn children(mut self, children: impl IntoIterator<Item = impl IntoView>) -> Self {
		self.children
			.extend(children.into_iter().map(|c| c.into_view()));
		self
	}

	/// Returns the tag name.
	pub fn tag_name(&self) -> &str {
		&self.tag
	}

	/// Returns the attributes.
	pub fn attrs(&self) -> &[(Cow<'static, str>, Attr)] {
		&self.attrs
	}

	/// Returns the event handlers.
	pub fn event_handlers(&self) -> &[(Cow<'static, str>, EventHandler)] {
		&self.events
	}

	pub fn get_node_ref(&self) -> Option<&NodeRef> {
		self.node_ref.as_ref()
	}

	/// Returns the child views.
	pub fn child_views(&self) -> &[View] {
		&self.children
	}

	pub fn get_key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	/// Returns whether this is a void element.
	pub fn is_void(&self) -> bool {
		is_void_element(&self.tag)
	}

	pub(crate) fn into_children(self) -> Vec<View> {
		self.children
	}

	fn set_attr(&mut self, name: Cow<'static, str>, attr: Attr) {
		match self.attrs.iter_mut().find(|(existing, _)| *existing == name) {
			Some(slot) => slot.1 = attr,
			None => self.attrs.push((name, attr)),
		}
	}
}

/// Elements that never have children or a closing tag.
pub fn is_void_element(tag: &str) -> bool {
	matches!(
		tag,
		"area"
			| "base" | "br"
			| "col" | "embed"
			| "hr" | "img"
			| "input" | "link"
			| "meta" | "source"
			| "track" | "wbr"
	)
}

/// What a component returns.
pub enum ComponentOutput {
	/// Synchronous content.
	View(View),
	/// Content available later; an empty placeholder is shown until then.
	Future(LocalBoxFuture<'static, View>),
	/// Content that changes over time; each item replaces the previous one.
	Stream(LocalBoxStream<'static, View>),
}

impl ComponentOutput {
	pub fn future<F>(future: F) -> Self
	where
		F: Future<Output = View> + 'static,
	{
		ComponentOutput::Future(future.boxed_local())
	}

	pub fn stream<S>(stream: S) -> Self
	where
		S: Stream<Item = View> + 'static,
	{
		ComponentOutput::Stream(stream.boxed_local())
	}
}

impl<T: IntoView> From<T> for ComponentOutput {
	fn from(value: T) -> Self {
		ComponentOutput::View(value.into_view())
	}
}

impl fmt::Debug for ComponentOutput {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ComponentOutput::View(view) => f.debug_tuple("View").field(view).finish(),
			ComponentOutput::Future(_) => f.write_str("Future"),
			ComponentOutput::Stream(_) => f.write_str("Stream"),
		}
	}
}

type ComponentFn = Rc<dyn Fn(&mut Context) -> RenderResult<ComponentOutput>>;

/// A component invocation: a function plus the props it is called with.
#[derive(Clone)]
pub struct ComponentView {
	name: Cow<'static, str>,
	render: ComponentFn,
	key: Option<Key>,
}

impl ComponentView {
	/// Bind `props` to a component function.
	///
	/// # Example
	///
	/// ```ignore
	/// fn greeting(name: &String, _cx: &mut Context) -> RenderResult<ComponentOutput> {
	/// 	Ok(View::text(format!("Hello, {name}")).into())
	/// }
	///
	/// let view = ComponentView::new("Greeting", "Ada".to_string(), greeting);
	/// ```
	pub fn new<P, F>(name: impl Into<Cow<'static, str>>, props: P, render: F) -> Self
	where
		P: 'static,
		F: Fn(&P, &mut Context) -> RenderResult<ComponentOutput> + 'static,
	{
		Self {
			name: name.into(),
			render: Rc::new(move |cx: &mut Context| render(&props, cx)),
			key: None,
		}
	}

	/// Sets the reconciliation key.
	pub fn key(mut self, key: impl Into<Key>) -> Self {
		self.key = Some(key.into());
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn get_key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	/// Invoke the component with the context of its position.
	pub fn invoke(&self, cx: &mut Context) -> RenderResult<ComponentOutput> {
		(self.render)(cx)
	}
}

impl fmt::Debug for ComponentView {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentView")
			.field("name", &self.name)
			.field("key", &self.key)
			.finish()
	}
}

/// A unified representation of renderable content.
#[derive(Debug, Clone)]
pub enum View {
	/// A target element.
	Element(ElementView),
	/// A text node.
	Text(Cow<'static, str>),
	/// A text node whose content follows a signal.
	DynText(ReadSignal<String>),
	/// A group of views without a target object of its own.
	Fragment(Vec<View>),
	/// A reactive hole: a subtree whose shape is produced by a signal.
	Reactive(ReadSignal<View>),
	/// A component invocation.
	Component(ComponentView),
	/// Any other view carrying a reconciliation key, for the kinds that
	/// have no key of their own (fragments, holes, text).
	Keyed(Key, Box<View>),
	/// An empty view (renders nothing).
	Empty,
}

impl View {
	/// Creates an element view.
	pub fn element(tag: impl Into<Cow<'static, str>>) -> ElementView {
		ElementView::new(tag)
	}

	/// Creates a text view.
	pub fn text(content: impl Into<Cow<'static, str>>) -> Self {
		Self::Text(content.into())
	}

	/// Creates a text view bound to a signal.
	pub fn dyn_text(content: ReadSignal<String>) -> Self {
		Self::DynText(content)
	}

	/// Creates a fragment view.
	pub fn fragment(children: impl IntoIterator<Item = impl IntoView>) -> Self {
		Self::Fragment(children.into_iter().map(|c| c.into_view()).collect())
	}

	/// Creates a reactive hole.
	pub fn reactive(content: ReadSignal<View>) -> Self {
		Self::Reactive(content)
	}

	/// Creates a component view.
	pub fn component(component: ComponentView) -> Self {
		Self::Component(component)
	}

	/// Creates an empty view.
	pub fn empty() -> Self {
		Self::Empty
	}

	/// Attach a reconciliation key to any view.
	///
	/// Elements and components keep the key in their own builder; every
	/// other kind is wrapped, replacing any key the view already had.
	pub fn keyed(self, key: impl Into<Key>) -> Self {
		match self {
			View::Element(el) => View::Element(el.key(key)),
			View::Component(c) => View::Component(c.key(key)),
			View::Keyed(_, inner) => View::Keyed(key.into(), inner),
			view => View::Keyed(key.into(), Box::new(view)),
		}
	}

	/// Reconciliation key, for the kinds that carry one.
	pub fn key(&self) -> Option<&Key> {
		match self {
			View::Element(el) => el.get_key(),
			View::Component(c) => c.get_key(),
			View::Keyed(key, _) => Some(key),
			_ => None,
		}
	}

	/// Short name of the descriptor kind, for diagnostics.
	pub fn kind_name(&self) -> &'static str {
		match self {
			View::Element(_) => "element",
			View::Text(_) | View::DynText(_) => "text",
			View::Fragment(_) => "fragment",
			View::Reactive(_) => "reactive hole",
			View::Component(_) => "component",
			View::Keyed(_, inner) => inner.kind_name(),
			View::Empty => "empty",
		}
	}
}

impl From<ElementView> for View {
	fn from(element: ElementView) -> Self {
		View::Element(element)
	}
}

impl From<ComponentView> for View {
	fn from(component: ComponentView) -> Self {
		View::Component(component)
	}
}

/// Trait for types that can be converted into a View.
pub trait IntoView {
	/// Converts self into a View.
	fn into_view(self) -> View;
}

impl IntoView for View {
	fn into_view(self) -> View {
		self
	}
}

impl IntoView for ElementView {
	fn into_view(self) -> View {
		View::Element(self)
	}
}

impl IntoView for ComponentView {
	fn into_view(self) -> View {
		View::Component(self)
	}
}

impl IntoView for String {
	fn into_view(self) -> View {
		View::Text(Cow::Owned(self))
	}
}

impl IntoView for &'static str {
	fn into_view(self) -> View {
		View::Text(Cow::Borrowed(self))
	}
}

impl IntoView for ReadSignal<String> {
	fn into_view(self) -> View {
		View::DynText(self)
	}
}

impl IntoView for ReadSignal<View> {
	fn into_view(self) -> View {
		View::Reactive(self)
	}
}

impl<T: IntoView> IntoView for Option<T> {
	fn into_view(self) -> View {
		match self {
			Some(v) => v.into_view(),
			None => View::Empty,
		}
	}
}

impl<T: IntoView> IntoView for Vec<T> {
	fn into_view(self) -> View {
		View::Fragment(self.into_iter().map(|v| v.into_view()).collect())
	}
}

impl IntoView for () {
	fn into_view(self) -> View {
		View::Empty
	}
}

impl<A: IntoView, B: IntoView> IntoView for (A, B) {
	fn into_view(self) -> View {
		View::Fragment(vec![self.0.into_view(), self.1.into_view()])
	}
}

impl<A: IntoView, B: IntoView, C: IntoView> IntoView for (A, B, C) {
	fn into_view(self) -> View {
		View::Fragment(vec![
			self.0.into_view(),
			self.1.into_view(),
			self.2.into_view(),
		])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use tessera_reactive::{Runtime, Signal};

	#[rstest]
	fn test_element_builder() {
		let view = View::element("a")
			.attr("href", "/home")
			.attr("hidden", false)
			.key("nav")
			.child("Home");

		assert_eq!(view.tag_name(), "a");
		assert_eq!(view.attrs().len(), 2);
		assert_eq!(view.get_key(), Some(&Key::from("nav")));
		assert_eq!(view.child_views().len(), 1);
	}

	#[rstest]
	fn test_repeated_attr_replaces_value() {
		let view = View::element("div").attr("class", "a").attr("class", "b");

		assert_eq!(view.attrs().len(), 1);
		assert!(matches!(
			&view.attrs()[0].1,
			Attr::Static(AttrValue::Str(s)) if s == "b"
		));
	}

	#[rstest]
	#[case(AttrValue::from("x"), Some("x"))]
	#[case(AttrValue::Bool(true), Some(""))]
	#[case(AttrValue::Bool(false), None)]
	#[case(AttrValue::Int(-3), Some("-3"))]
	fn test_attr_markup(#[case] value: AttrValue, #[case] expected: Option<&str>) {
		assert_eq!(value.to_markup().as_deref(), expected);
	}

	#[rstest]
	fn test_into_view_conversions() {
		assert!(matches!(().into_view(), View::Empty));
		assert!(matches!(None::<View>.into_view(), View::Empty));
		assert!(matches!(("a", "b").into_view(), View::Fragment(v) if v.len() == 2));
		assert!(matches!(vec!["x"; 3].into_view(), View::Fragment(v) if v.len() == 3));
	}

	#[rstest]
	fn test_signal_views() {
		let rt = Runtime::new();
		let label = Signal::new(&rt, "hi".to_string());

		assert!(matches!(label.read_only().into_view(), View::DynText(_)));
		let hole = label.read_only().map(View::text);
		assert!(matches!(hole.into_view(), View::Reactive(_)));
	}

	#[rstest]
	fn test_component_keys() {
		let component = ComponentView::new("Item", 3_u32, |n, _| Ok(View::text(n.to_string()).into()))
			.key(3_u32);

		let view = component.into_view();
		assert_eq!(view.key(), Some(&Key::Int(3)));
		assert_eq!(view.kind_name(), "component");
	}

	#[rstest]
	fn test_keyed_wraps_keyless_kinds() {
		let rt = Runtime::new();
		let label = Signal::new(&rt, "hi".to_string());
		let hole = View::reactive(label.read_only().map(View::text)).keyed("hole");
		assert_eq!(hole.key(), Some(&Key::from("hole")));
		assert_eq!(hole.kind_name(), "reactive hole");

		let group = View::fragment(["a", "b"]).keyed(1_u32).keyed(2_u32);
		assert_eq!(group.key(), Some(&Key::Int(2)));
		assert!(matches!(&group, View::Keyed(_, inner) if matches!(**inner, View::Fragment(_))));

		let element = View::from(View::element("li")).keyed("row");
		assert!(matches!(&element, View::Element(el) if el.get_key() == Some(&Key::from("row"))));
	}

	#[rstest]
	fn test_node_ref_typed_access() {
		let node_ref = NodeRef::new();
		assert!(!node_ref.is_set());

		node_ref.set(7_u64);
		assert_eq!(node_ref.get::<u64>(), Some(7));
		assert_eq!(node_ref.get::<String>(), None);

		node_ref.clear();
		assert!(!node_ref.is_set());
	}
}
