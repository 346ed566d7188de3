//! # Tessera Pages
//!
//! Fine-grained rendering over pluggable backends: view descriptors, the
//! renderer and reconciler, the hydration matcher, and a string renderer for
//! server-side output.
//!
//! ## Features
//!
//! - **No tree diffing**: after the first render only the parts fed by a
//!   changed signal are patched.
//! - **Keyed reconciliation**: children with a key keep their target objects
//!   across reorders; key identity wins over position.
//! - **Pluggable backends**: everything target-specific sits behind
//!   [`RenderStrategy`].
//! - **Hydration**: attaches bindings to existing output (for example SSR
//!   markup) without rebuilding it, recovering from mismatches locally.
//! - **Async components**: futures and streams returned by components are
//!   dynamic content sources, like signals.
//!
//! ## Architecture
//!
//! - [`view`]: tree descriptors and the builder API
//! - [`strategy`]: the backend contract
//! - [`renderer`]: materialize, patch, reconcile, unmount
//! - [`hydration`]: the hydration walk
//! - [`ssr`]: rendering to markup with hydration anchors
//! - [`dom`]: an in-memory document backend
//! - [`context`]: values provided down the tree
//! - [`options`]: renderer and hydration options
//!
//! ## Example
//!
//! ```ignore
//! use tessera_pages::prelude::*;
//!
//! let rt = Runtime::new();
//! let count = Signal::new(&rt, 0);
//!
//! let document = Document::new();
//! let renderer = Renderer::new(document.strategy(), RenderOptions::new());
//! let _handle = renderer.render(
//! 	View::element("button")
//! 		.on("click", {
//! 			let count = count.clone();
//! 			move |_| { count.update(|n| *n += 1); }
//! 		})
//! 		.child(View::dyn_text(count.read_only().map(|n| n.to_string()))),
//! 	document.body(),
//! )?;
//!
//! count.set(1);
//! rt.flush();
//! assert_eq!(document.body().inner_html(), "<button>1</button>");
//! ```

pub mod context;
pub mod dom;
pub mod error;
pub mod hydration;
pub mod options;
pub mod prelude;
pub mod renderer;
pub mod ssr;
pub mod strategy;
pub mod view;

pub use context::Context;
pub use dom::{Document, DomNode, DomStats, DomStrategy};
pub use error::{ConfigError, HydrationError, MarkupError, RenderError, RenderResult};
pub use hydration::HydrationRoot;
pub use options::{HydrationOptions, RenderOptions};
pub use renderer::{Diagnostic, DiagnosticKind, MountId, RenderHandle, RenderStats, Renderer};
pub use ssr::{SsrRenderer, html_escape, render_to_string};
pub use strategy::{NodeKind, RenderStrategy};
pub use view::{
	Attr, AttrValue, ComponentOutput, ComponentView, ElementView, Event, EventHandler, IntoView,
	Key, NodeRef, View,
};
