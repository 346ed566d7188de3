//! Renderer and hydration options.
//!
//! Options are plain builder structs. They can also be loaded from a TOML
//! settings table:
//!
//! ```toml
//! hole_anchor = "/"
//! diagnostics_capacity = 128
//!
//! [hydration]
//! remove_extraneous = false
//! ```

use std::fmt;
use std::rc::Rc;

use futures::task::LocalSpawn;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default text of the comment that follows every reactive hole.
pub const DEFAULT_HOLE_ANCHOR: &str = "/";

/// Default text of the comment separating adjacent text nodes in markup.
pub const DEFAULT_TEXT_SEPARATOR: &str = "~";

/// Options for hydration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HydrationOptions {
	/// Remove existing nodes the descriptor has no counterpart for.
	pub remove_extraneous: bool,
	/// Rewrite text nodes whose content differs from the descriptor.
	pub correct_text: bool,
}

impl Default for HydrationOptions {
	fn default() -> Self {
		Self {
			remove_extraneous: true,
			correct_text: true,
		}
	}
}

impl HydrationOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Keeps extraneous nodes in place (still reported).
	pub fn keep_extraneous(mut self) -> Self {
		self.remove_extraneous = false;
		self
	}

	/// Leaves mismatched text untouched (still reported).
	pub fn keep_text(mut self) -> Self {
		self.correct_text = false;
		self
	}
}

/// Options for a [`Renderer`](crate::renderer::Renderer).
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOptions {
	/// Text of the comment anchoring reactive holes and async content.
	pub hole_anchor: String,
	/// Text of the comment separating adjacent text nodes in markup.
	pub text_separator: String,
	/// Maximum number of diagnostics retained; older ones are dropped.
	pub diagnostics_capacity: usize,
	/// Hydration behavior.
	pub hydration: HydrationOptions,
	/// Spawner for futures and streams returned by components.
	#[serde(skip)]
	pub spawner: Option<Rc<dyn LocalSpawn>>,
}

impl Default for RenderOptions {
	fn default() -> Self {
		Self {
			hole_anchor: DEFAULT_HOLE_ANCHOR.to_string(),
			text_separator: DEFAULT_TEXT_SEPARATOR.to_string(),
			diagnostics_capacity: 256,
			hydration: HydrationOptions::default(),
			spawner: None,
		}
	}
}

impl RenderOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Load options from a TOML table, filling unset fields with defaults.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let options: Self = toml::from_str(source)?;
		options.validate()?;
		Ok(options)
	}

	/// Sets the hole anchor text.
	pub fn hole_anchor(mut self, text: impl Into<String>) -> Self {
		self.hole_anchor = text.into();
		self
	}

	/// Sets the text separator.
	pub fn text_separator(mut self, text: impl Into<String>) -> Self {
		self.text_separator = text.into();
		self
	}

	/// Sets how many diagnostics are retained.
	pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
		self.diagnostics_capacity = capacity;
		self
	}

	/// Sets the hydration options.
	pub fn hydration(mut self, hydration: HydrationOptions) -> Self {
		self.hydration = hydration;
		self
	}

	/// Sets the spawner for async component output.
	///
	/// # Example
	///
	/// ```ignore
	/// let pool = futures::executor::LocalPool::new();
	/// let options = RenderOptions::new().spawner(pool.spawner());
	/// ```
	pub fn spawner<S>(mut self, spawner: S) -> Self
	where
		S: LocalSpawn + 'static,
	{
		self.spawner = Some(Rc::new(spawner));
		self
	}

	/// Checks that anchors and separators are distinguishable.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.hole_anchor == self.text_separator {
			return Err(ConfigError::Invalid {
				field: "text_separator",
				message: "must differ from hole_anchor".to_string(),
			});
		}
		for (field, text) in [
			("hole_anchor", &self.hole_anchor),
			("text_separator", &self.text_separator),
		] {
			if text.contains("--") || text.ends_with('-') {
				return Err(ConfigError::Invalid {
					field,
					message: "cannot be embedded in a comment".to_string(),
				});
			}
		}
		Ok(())
	}
}

impl fmt::Debug for RenderOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderOptions")
			.field("hole_anchor", &self.hole_anchor)
			.field("text_separator", &self.text_separator)
			.field("diagnostics_capacity", &self.diagnostics_capacity)
			.field("hydration", &self.hydration)
			.field("spawner", &self.spawner.is_some())
			.finish()
	}
}
