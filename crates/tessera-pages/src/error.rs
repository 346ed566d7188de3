//! Error types for rendering, hydration, markup parsing and options loading.

use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while materializing or patching a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
	/// The render strategy rejected a primitive operation.
	#[error("render strategy failed during {operation}: {message}")]
	Strategy {
		operation: &'static str,
		message: String,
	},

	/// A component function returned an error.
	#[error("component `{component}` failed: {message}")]
	Component { component: String, message: String },

	/// Async content was rendered without a spawner in the options.
	#[error("component `{0}` returned async content but no spawner is configured")]
	NoSpawner(String),

	/// A mounted node has no target parent to insert into.
	#[error("mount {0} has no host node")]
	Detached(u64),

	/// Hydration failed and the fallback render failed too.
	#[error("hydration fallback failed: {0}")]
	Fallback(String),
}

impl RenderError {
	/// Shorthand for strategy failures.
	pub fn strategy(operation: &'static str, message: impl Into<String>) -> Self {
		Self::Strategy {
			operation,
			message: message.into(),
		}
	}

	/// Shorthand for component failures.
	pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Component {
			component: component.into(),
			message: message.into(),
		}
	}
}

/// Errors that abort the hydration walk of one root.
///
/// Structural mismatches are not errors: they are recovered in place and
/// reported as diagnostics. These are the faults that trigger the full
/// fallback render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydrationError {
	#[error(transparent)]
	Render(#[from] RenderError),

	/// The existing tree changed shape under the walk.
	#[error("hydration cursor lost its position: {0}")]
	CursorLost(String),

	/// Code run by the walk, usually a component, panicked.
	#[error("hydration walk panicked: {0}")]
	Panicked(String),
}

/// Result type for markup parsing.
pub type MarkupResult<T> = Result<T, MarkupError>;

/// Errors from [`Document::parse`](crate::dom::Document::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
	#[error("invalid markup at byte {offset}: {message}")]
	Syntax { offset: usize, message: String },

	#[error("closing tag `</{found}>` does not match `<{expected}>`")]
	UnbalancedTag { expected: String, found: String },

	#[error("unexpected trailing input at byte {0}")]
	TrailingInput(usize),
}

/// Errors from loading options.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid options: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("invalid value for `{field}`: {message}")]
	Invalid {
		field: &'static str,
		message: String,
	},
}
