//! Retryable one-time execution gate.
//!
//! [`MustOnce`] behaves like [`std::sync::Once`] except that a failed attempt does
//! not count: the gate only closes once an action returns `Ok(())`. Until then
//! every caller that reaches the gate runs its own action, one at a time.

#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::future::Future;
use core::fmt;

use super::state::{AttemptGuard, GateState};

/// A gate that runs an action until it succeeds exactly once.
///
/// Only one action runs at a time on a given gate. If it returns `Ok(())` the
/// gate closes and no action is ever invoked again; if it returns `Err(_)` the
/// gate reopens and the next caller (possibly one that was blocked on the
/// running attempt) tries its own action.
///
/// If the action panics, the gate is treated as closed: the panic propagates to
/// the caller whose attempt it was, and every later call returns without
/// invoking anything.
///
/// A gate guards one logical action. Use a separate instance per action; the
/// gate does not remember which closure closed it.
///
/// # Deadlocks
///
/// The action must not call [`call`](Self::call) on the same gate. Because the
/// outer attempt is still in flight, the inner call blocks forever.
/// [`try_call`](Self::try_call) does not block and returns `false` instead.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use must_once::MustOnce;
///
/// static CONNECT: MustOnce = MustOnce::new();
/// static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);
///
/// fn connect() -> Result<(), &'static str> {
///    if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
///       Err("refused")
///    } else {
///       Ok(())
///    }
/// }
///
/// CONNECT.call(connect); // fails, gate stays open
/// CONNECT.call(connect); // succeeds, gate closes
/// CONNECT.call(connect); // skipped
/// assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
/// ```
pub struct MustOnce {
   state: GateState,
}

impl MustOnce {
   /// Creates a gate that has never been attempted.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         state: GateState::pending(),
      }
   }

   /// Creates a gate that is already closed.
   #[inline]
   #[must_use]
   pub const fn done() -> Self {
      Self {
         state: GateState::done(),
      }
   }

   /// Checks whether an attempt has closed the gate.
   ///
   /// When this returns `true`, every effect of the closing attempt is visible
   /// to the caller. This method never blocks.
   #[inline]
   pub fn is_done(&self) -> bool {
      self.state.is_done()
   }

   /// Runs `f` unless a previous attempt already closed the gate.
   ///
   /// - If the gate is closed, returns immediately without touching the lock.
   /// - Otherwise waits for any in-flight attempt, re-checks, and then calls `f`:
   ///     - `Ok(())` closes the gate.
   ///     - `Err(_)` reopens it; the error is dropped. Record it inside `f` if
   ///       the caller needs it.
   ///     - A panic closes the gate and resumes unwinding into this call.
   #[inline]
   pub fn call<F, E>(&self, f: F)
   where
      F: FnOnce() -> Result<(), E>,
   {
      if self.is_done() {
         return;
      }
      self.call_slow(f);
   }

   /// Like [`call`](Self::call), but never blocks.
   ///
   /// Returns `false` without invoking `f` if another attempt is in flight,
   /// including when called from inside this gate's own action. Returns `true`
   /// if the gate was already closed or `f` ran.
   pub fn try_call<F, E>(&self, f: F) -> bool
   where
      F: FnOnce() -> Result<(), E>,
   {
      if self.is_done() {
         return true;
      }
      match self.state.try_lock() {
         Ok(Some(guard)) => {
            Self::attempt(guard, f);
            true
         }
         Ok(None) => true,
         Err(()) => false,
      }
   }

   /// Async counterpart of [`call`](Self::call).
   ///
   /// Waiting tasks yield to the runtime before blocking. Dropping the returned
   /// future while its attempt is in flight counts as an abrupt termination and
   /// closes the gate.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn call_async<F, Fut, E>(&self, f: F)
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<(), E>>,
   {
      if self.is_done() {
         return;
      }
      let Some(guard) = self.state.lock_async().await else {
         return; // Closed by another task while we waited
      };
      tracing::trace!("must-once attempt started");
      let outcome = f().await;
      Self::resolve(guard, outcome);
   }

   // --- Internal Attempt Helpers ---

   /// Cold path for `call`.
   #[cold]
   fn call_slow<F, E>(&self, f: F)
   where
      F: FnOnce() -> Result<(), E>,
   {
      let Some(guard) = self.state.lock() else {
         return; // Closed by another thread while we waited for the lock
      };
      Self::attempt(guard, f);
   }

   /// Runs `f` while holding `guard`. If `f` unwinds, the guard's drop closes the gate.
   fn attempt<F, E>(guard: AttemptGuard<'_>, f: F)
   where
      F: FnOnce() -> Result<(), E>,
   {
      tracing::trace!("must-once attempt started");
      let outcome = f();
      Self::resolve(guard, outcome);
   }

   fn resolve<E>(guard: AttemptGuard<'_>, outcome: Result<(), E>) {
      match outcome {
         Ok(()) => {
            guard.commit();
            tracing::trace!("must-once attempt succeeded, gate closed");
         }
         Err(_) => {
            guard.reopen();
            tracing::debug!("must-once attempt failed, gate reopened for retry");
         }
      }
   }
}

impl Default for MustOnce {
   /// Creates a gate that has never been attempted.
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl fmt::Debug for MustOnce {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("MustOnce")
         .field("done", &self.is_done())
         .finish()
   }
}
