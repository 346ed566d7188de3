//! # Tessera
//!
//! A fine-grained reactive rendering engine.
//!
//! Tessera keeps a rendered tree in sync with application state without
//! re-rendering or diffing whole trees: only the parts fed by a changed
//! signal are patched.
//!
//! ## Core Principles
//!
//! - **Fine-grained updates**: text, attributes and reactive holes subscribe
//!   to exactly the signals they read
//! - **Backend independence**: the renderer talks to its target only through
//!   the `RenderStrategy` trait
//! - **Resumable server output**: SSR markup carries the anchors hydration
//!   needs, so the client attaches to it without rebuilding it
//!
//! ## Feature Flags
//!
//! - `reactive` - The signal graph ([`reactive`])
//! - `pages` - Renderer, reconciler, hydration and SSR ([`pages`])
//! - `full` (default) - Everything
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use tessera::pages::prelude::*;
//!
//! let rt = Runtime::new();
//! let name = Signal::new(&rt, "world".to_string());
//!
//! let view: View = View::element("h1")
//! 	.child("Hello, ")
//! 	.child(View::dyn_text(name.read_only()))
//! 	.into();
//!
//! // On the server
//! let markup = render_to_string(&view)?;
//!
//! // On the client, against the parsed markup
//! let document = Document::parse(&markup)?;
//! let renderer = Renderer::new(document.strategy(), RenderOptions::new());
//! let _root = renderer.hydrate(view, document.body())?;
//!
//! name.set("tessera".to_string());
//! rt.flush();
//! ```

#[cfg(feature = "pages")]
pub mod pages;
#[cfg(feature = "reactive")]
pub mod reactive;

#[cfg(feature = "reactive")]
pub use reactive::{Derived, Effect, ReadSignal, Runtime, Signal};

#[cfg(feature = "pages")]
pub use pages::{Document, RenderOptions, Renderer, View, render_to_string};
