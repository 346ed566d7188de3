//! Common imports.
//!
//! ```ignore
//! use tessera_pages::prelude::*;
//! ```

pub use crate::context::Context;
pub use crate::dom::Document;
pub use crate::error::{RenderError, RenderResult};
pub use crate::options::{HydrationOptions, RenderOptions};
pub use crate::renderer::{RenderHandle, Renderer};
pub use crate::ssr::render_to_string;
pub use crate::strategy::RenderStrategy;
pub use crate::view::{ComponentOutput, ComponentView, ElementView, IntoView, NodeRef, View};
pub use tessera_reactive::{Derived, Effect, ReadSignal, Runtime, Signal};
