//! # Tessera Reactive
//!
//! Fine-grained signal graph: writable signals, derived values, effects,
//! and the runtime that tracks dependencies between them and delivers
//! change notifications in coalesced flushes.
//!
//! ## Features
//!
//! - **Explicit tracking**: derived computations read through a [`Tracker`]
//!   instead of a hidden "current observer".
//! - **Glitch-free propagation**: derived nodes recompute in height order,
//!   so no subscriber sees a half-updated graph.
//! - **Coalesced delivery**: writes are delivered on the next tick of the
//!   runtime's [`Scheduler`], or at the end of [`Runtime::batch`].
//! - **Fault isolation**: a panicking subscriber is logged and counted; the
//!   rest of the flush still runs.
//!
//! ## Example
//!
//! ```ignore
//! use tessera_reactive::{Derived, Runtime, Signal};
//!
//! let rt = Runtime::new();
//! let price = Signal::new(&rt, 10);
//! let quantity = Signal::new(&rt, 2);
//! let total = Derived::new(&rt, {
//! 	let (price, quantity) = (price.clone(), quantity.clone());
//! 	move |cx| cx.get(&price) * cx.get(&quantity)
//! });
//!
//! let _sub = total.subscribe(|t| println!("total = {t}"));
//! rt.batch(|| {
//! 	price.set(12);
//! 	quantity.set(3);
//! }); // prints "total = 36" once
//! ```

pub mod derived;
pub mod effect;
pub mod error;
pub mod read;
pub mod runtime;
pub mod signal;
pub mod subscription;

pub use derived::{Derived, Tracker};
pub use effect::Effect;
pub use error::{ReactiveError, ReactiveResult};
pub use read::{ReadSignal, Readable};
pub use runtime::{
	FlushSummary, MAX_FLUSH_ROUNDS, NodeId, NodeType, Runtime, Scheduler, SpawnerScheduler,
	SubscriptionId,
};
pub use signal::Signal;
pub use subscription::{Disposer, Subscription};
