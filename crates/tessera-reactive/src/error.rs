//! Errors raised by the signal graph.

use thiserror::Error;

/// Result type for reactive runtime operations.
pub type ReactiveResult<T> = Result<T, ReactiveError>;

/// Errors reported by the reactive runtime.
///
/// None of these are fatal to the graph: a failed flush leaves every node
/// and subscription in place so later writes are delivered normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
	/// A flush was requested while another flush was already running on
	/// the same runtime. The running flush picks up the pending writes.
	#[error("flush requested while a flush is already running")]
	Reentrant,

	/// Writes kept re-triggering each other past the round limit.
	#[error("flush did not settle after {0} rounds; pending writes were dropped")]
	RoundLimit(usize),

	/// The configured scheduler could not accept the flush task.
	#[error("failed to schedule flush: {0}")]
	Schedule(String),
}
