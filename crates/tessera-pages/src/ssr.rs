//! Server-side rendering to markup.
//!
//! The markup carries exactly the structure hydration expects:
//!
//! - every reactive hole and every async region is followed by an anchor
//!   comment (`<!--/-->` by default);
//! - adjacent text nodes are separated by a separator comment
//!   (`<!--~-->`), since a markup parser would otherwise merge them.
//!
//! Hydrating this output against the same view therefore needs no
//! structural operations at all.

use tessera_reactive::Readable;
use tracing::debug;

use crate::context::Context;
use crate::error::RenderResult;
use crate::options::RenderOptions;
use crate::view::{Attr, ComponentOutput, View};

/// Escape text for use in markup text or a quoted attribute value.
pub fn html_escape(s: &str) -> String {
	let mut escaped = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			_ => escaped.push(c),
		}
	}
	escaped
}

/// The SSR renderer.
#[derive(Debug, Clone, Default)]
pub struct SsrRenderer {
	options: RenderOptions,
}

impl SsrRenderer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses the anchor and separator texts of `options`.
	pub fn with_options(options: RenderOptions) -> Self {
		Self { options }
	}

	/// Render `view` with an empty context.
	pub fn render(&self, view: &View) -> RenderResult<String> {
		self.render_with_context(view, &Context::new())
	}

	/// Render `view` with components seeing `context`.
	pub fn render_with_context(&self, view: &View, context: &Context) -> RenderResult<String> {
		let mut writer = Writer {
			options: &self.options,
			output: String::new(),
			after_text: false,
		};
		writer.write_view(view, context)?;
		debug!(bytes = writer.output.len(), "rendered view to markup");
		Ok(writer.output)
	}
}

/// Render `view` with default options.
pub fn render_to_string(view: &View) -> RenderResult<String> {
	SsrRenderer::new().render(view)
}

struct Writer<'a> {
	options: &'a RenderOptions,
	output: String,
	/// The last thing written was a text node.
	after_text: bool,
}

impl Writer<'_> {
	fn write_view(&mut self, view: &View, context: &Context) -> RenderResult<()> {
		match view {
			View::Element(el) => {
				self.output.push('<');
				self.output.push_str(el.tag_name());
				for (name, attr) in el.attrs() {
					let value = match attr {
						Attr::Static(value) => value.to_markup(),
						Attr::Dynamic(signal) => signal.with_untracked(|v| v.to_markup()),
					};
					let Some(value) = value else {
						continue;
					};
					self.output.push(' ');
					self.output.push_str(name);
					if !value.is_empty() {
						self.output.push_str("=\"");
						self.output.push_str(&html_escape(&value));
						self.output.push('"');
					}
				}
				self.output.push('>');
				self.after_text = false;

				if !el.is_void() {
					for child in el.child_views() {
						self.write_view(child, context)?;
					}
					self.output.push_str("</");
					self.output.push_str(el.tag_name());
					self.output.push('>');
					self.after_text = false;
				}
			}
			View::Text(text) => self.write_text(text),
			View::DynText(signal) => {
				let text = signal.get();
				self.write_text(&text);
			}
			View::Fragment(children) => {
				for child in children {
					self.write_view(child, context)?;
				}
			}
			View::Reactive(signal) => {
				let content = signal.get();
				self.write_view(&content, context)?;
				self.write_anchor();
			}
			View::Component(component) => {
				let mut context = context.clone();
				match component.invoke(&mut context)? {
					ComponentOutput::View(content) => self.write_view(&content, &context)?,
					ComponentOutput::Future(_) | ComponentOutput::Stream(_) => self.write_anchor(),
				}
			}
			View::Keyed(_, inner) => self.write_view(inner, context)?,
			View::Empty => {}
		}
		Ok(())
	}

	fn write_text(&mut self, text: &str) {
		if text.is_empty() {
			return;
		}
		if self.after_text {
			self.write_comment(&self.options.text_separator.clone());
		}
		self.output.push_str(&html_escape(text));
		self.after_text = true;
	}

	fn write_anchor(&mut self) {
		self.write_comment(&self.options.hole_anchor.clone());
	}

	fn write_comment(&mut self, text: &str) {
		self.output.push_str("<!--");
		self.output.push_str(text);
		self.output.push_str("-->");
		self.after_text = false;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::view::{AttrValue, ComponentView};
	use rstest::rstest;
	use tessera_reactive::{Runtime, Signal};

	#[rstest]
	fn test_render_simple_element() {
		let view: View = View::element("div")
			.attr("class", "container")
			.child("Hello, World!")
			.into();

		assert_eq!(
			render_to_string(&view).unwrap(),
			"<div class=\"container\">Hello, World!</div>"
		);
	}

	#[rstest]
	fn test_render_escapes_text_and_attrs() {
		let view: View = View::element("p")
			.attr("title", "\"quoted\" & <tagged>")
			.child("<script>")
			.into();

		assert_eq!(
			render_to_string(&view).unwrap(),
			"<p title=\"&quot;quoted&quot; &amp; &lt;tagged&gt;\">&lt;script&gt;</p>"
		);
	}

	#[rstest]
	fn test_render_boolean_and_void() {
		let view: View = View::element("input")
			.attr("disabled", true)
			.attr("hidden", false)
			.attr("size", 3)
			.into();

		assert_eq!(render_to_string(&view).unwrap(), "<input disabled size=\"3\">");
	}

	#[rstest]
	fn test_adjacent_text_gets_separator() {
		let view = View::fragment(vec![View::text("a"), View::text(""), View::text("b")]);

		assert_eq!(render_to_string(&view).unwrap(), "a<!--~-->b");
	}

	#[rstest]
	fn test_reactive_hole_and_dynamic_values() {
		let rt = Runtime::new();
		let count = Signal::new(&rt, 5);
		let view: View = View::element("div")
			.dyn_attr("data-count", count.read_only().map(|n| AttrValue::Int(i64::from(n))))
			.child(View::dyn_text(count.read_only().map(|n| n.to_string())))
			.child(View::reactive(
				count
					.read_only()
					.map(|n| View::Element(View::element("b").child(n.to_string()))),
			))
			.into();

		assert_eq!(
			render_to_string(&view).unwrap(),
			"<div data-count=\"5\">5<b>5</b><!--/--></div>"
		);
	}

	#[rstest]
	fn test_components_see_provided_context() {
		let inner = ComponentView::new("Inner", (), |_, cx| {
			let theme = cx.use_context::<&'static str>().unwrap_or("none");
			Ok(View::text(theme).into())
		});
		let outer = ComponentView::new("Outer", inner, |inner, cx| {
			cx.provide("dark");
			Ok(View::Component(inner.clone()).into())
		});

		assert_eq!(render_to_string(&View::Component(outer)).unwrap(), "dark");
	}

	#[rstest]
	fn test_async_component_renders_anchor() {
		let view = View::Component(ComponentView::new("Later", (), |_, _| {
			Ok(ComponentOutput::future(async { View::text("done") }))
		}));

		assert_eq!(render_to_string(&view).unwrap(), "<!--/-->");
	}

	#[rstest]
	fn test_custom_anchor_text() {
		let rt = Runtime::new();
		let hole = Signal::new(&rt, 0).read_only().map(|_| View::Empty);
		let renderer = SsrRenderer::with_options(RenderOptions::new().hole_anchor("h"));

		assert_eq!(renderer.render(&View::reactive(hole)).unwrap(), "<!--h-->");
	}
}
