//! The signal graph: signals, derived values, effects and the runtime that
//! delivers their changes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera::reactive::{Derived, Runtime, Signal};
//!
//! let rt = Runtime::new();
//! let count = Signal::new(&rt, 1);
//! let doubled = Derived::new(&rt, {
//! 	let count = count.clone();
//! 	move |tracker| tracker.get(&count) * 2
//! });
//!
//! count.set(2);
//! rt.flush();
//! assert_eq!(doubled.get(), 4);
//! ```

// Re-export all tessera-reactive functionality
pub use tessera_reactive::*;
