//! Rendering: view descriptors, the renderer and reconciler, hydration and
//! SSR.
//!
//! ## Architecture
//!
//! - **Renderer**: materializes views through a `RenderStrategy` and patches
//!   them when signals change
//! - **Reconciler**: keyed and positional matching of child lists
//! - **Hydration**: attaches bindings to existing output instead of
//!   rebuilding it
//! - **SSR**: markup with hydration anchors
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera::pages::prelude::*;
//!
//! let document = Document::new();
//! let renderer = Renderer::new(document.strategy(), RenderOptions::new());
//! let handle = renderer.render(View::element("p").child("hi"), document.body())?;
//! assert_eq!(document.body().inner_html(), "<p>hi</p>");
//! handle.unmount();
//! ```

// Re-export all tessera-pages functionality
pub use tessera_pages::*;
