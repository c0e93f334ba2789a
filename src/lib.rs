//! A retryable one-time execution gate.
//!
//! [`MustOnce`] runs an initialization action until it succeeds exactly once.
//! Unlike [`std::sync::Once`], a failed attempt (an action returning `Err`) does
//! not close the gate: the next caller gets to try again. Once an action returns
//! `Ok(())`, the gate is closed for good and every later call returns immediately.
//!
//! - **Lock-free fast path**: a closed gate is detected with one atomic load.
//! - **Efficient blocking**: callers behind an in-flight attempt park on a futex
//!   via `parking_lot_core` instead of spinning.
//! - **Panics close the gate**: an action that panics forfeits the right to
//!   retry; the panic still reaches the caller whose attempt it was.
//! - **Async support**: [`MustOnce::call_async`] runs async actions on Tokio.
//!
//! The crate also ships a small [`Context`] type for carrying a request id and
//! diagnostic log tags across the callers that share a gate.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use must_once::MustOnce;
//!
//! let gate = MustOnce::new();
//! let runs = AtomicUsize::new(0);
//!
//! gate.call(|| {
//!    runs.fetch_add(1, Ordering::SeqCst);
//!    Err("not yet")
//! });
//! assert!(!gate.is_done());
//!
//! gate.call(|| {
//!    runs.fetch_add(1, Ordering::SeqCst);
//!    Ok::<_, &str>(())
//! });
//! assert!(gate.is_done());
//!
//! // Closed: the action is never invoked again.
//! gate.call(|| -> Result<(), &str> { unreachable!() });
//! assert_eq!(runs.load(Ordering::SeqCst), 2);
//! ```

/// Request-scoped id and log tags.
mod context;

/// Retryable once gate.
mod must_once;

/// Internal gate state management.
mod state;

pub use context::{Context, ContextError};
pub use must_once::MustOnce;
