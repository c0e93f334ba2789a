//! Internal gate state for [`MustOnce`](crate::MustOnce).
//!
//! The whole gate is a single `AtomicU8` with the following layout:
//! - Bit 0: DONE - An attempt succeeded (or terminated abruptly); terminal
//! - Bit 1: RUNNING - An attempt is in flight; this is the exclusive lock
//! - Bit 2: WAITING - At least one caller is parked behind the running attempt
//! - Bits 3-7: EPOCH - Bumped on every release so parked callers see a change
//!
//! `DONE` is only ever observed through Acquire loads and only ever published
//! through Release stores, so a caller that sees it also sees every effect of
//! the attempt that set it.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Packed atomic state of a retryable gate.
#[repr(transparent)]
pub(crate) struct GateState(AtomicU8);

impl GateState {
   /// Bit flag: the gate is permanently closed.
   const DONE: u8 = 1;
   /// Bit flag: an attempt holds the gate.
   const RUNNING: u8 = 2;
   /// Bit flag: at least one caller is parked.
   const WAITING: u8 = 4;
   /// Lowest epoch bit.
   const EPOCH_1: u8 = 8;
   /// Mask for epoch bits.
   const EPOCH_MASK: u8 = !(Self::DONE | Self::RUNNING | Self::WAITING);

   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// A gate that has never been attempted.
   #[inline]
   pub(crate) const fn pending() -> Self {
      Self(AtomicU8::new(0))
   }

   /// A gate that is already closed.
   #[inline]
   pub(crate) const fn done() -> Self {
      Self(AtomicU8::new(Self::DONE))
   }

   /// Park/unpark key. Must be identical for `park` and `unpark_all`.
   #[inline(always)]
   fn key(&self) -> usize {
      self.0.as_ptr() as usize
   }

   #[inline]
   fn notify_all(&self) {
      // SAFETY: We only ever park and unpark on `self.key()`, and the
      // validation closure passed to `park` does not call into parking_lot.
      unsafe {
         parking_lot_core::unpark_all(self.key(), DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the calling thread until the state moves away from `expected_state`.
   #[inline]
   fn wait(&self, expected_state: u8) {
      // SAFETY: See `notify_all`.
      unsafe {
         // `park` re-validates before sleeping, so a release that lands between
         // setting WAITING and parking is never lost.
         let _ = parking_lot_core::park(
            self.key(),
            || self.0.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Drops the RUNNING bit, bumps the epoch and wakes parked callers.
   #[inline]
   fn release(&self, close: bool) {
      // Only the lock holder changes anything but WAITING, so the epoch bits
      // read here are still current at the swap.
      let current_state = self.0.load(Ordering::Relaxed);
      let mut new_state = Self::next_epoch(current_state);
      if close {
         new_state |= Self::DONE;
      }

      // Release: everything the attempt did happens-before any Acquire load
      // that observes `new_state`.
      let prev_state = self.0.swap(new_state, Ordering::Release);
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
   }

   /// Closes the gate.
   #[inline]
   pub(crate) fn set_done(&self) {
      self.release(true);
   }

   /// Reopens the gate for the next attempt.
   #[inline]
   pub(crate) fn set_pending(&self) {
      self.release(false);
   }

   /// Checks whether the gate is closed.
   #[inline]
   pub(crate) fn is_done(&self) -> bool {
      self.0.load(Ordering::Acquire) & Self::DONE != 0
   }

   /// One locking attempt.
   ///
   /// - `Ok(None)`: the gate is closed.
   /// - `Ok(Some(guard))`: the caller now owns the attempt.
   /// - `Err(state)`: another attempt is in flight; `state` has WAITING set
   ///   unless `nowait` was requested.
   #[inline]
   fn lock_step(&self, nowait: bool) -> Result<Option<AttemptGuard<'_>>, u8> {
      loop {
         // Acquire so that returning `Ok(None)` synchronizes with the closing release.
         let current_state = self.0.load(Ordering::Acquire);
         // Fast path: closed by a successful (or abruptly terminated) attempt.
         if current_state & Self::DONE != 0 {
            return Ok(None);
         }

         // Nobody is running an attempt: try to become the runner.
         if current_state & Self::RUNNING == 0 {
            match self.0.compare_exchange_weak(
               current_state,
               current_state | Self::RUNNING,
               Ordering::Acquire, // Pairs with the Release of the previous (failed) attempt
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Some(AttemptGuard::new(self))),
               Err(_) => {
                  // Lost the race or a spurious failure; re-read the state.
                  core::hint::spin_loop();
                  continue;
               }
            }
         }

         // An attempt is in flight. Waiters announce themselves so the runner
         // knows to unpark on release.
         if !nowait && current_state & Self::WAITING == 0 {
            let new_state = current_state | Self::WAITING;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed, // The flag itself carries no data
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  // The state moved under us, possibly to DONE or pending.
                  core::hint::spin_loop();
                  continue;
               }
            }
         }
         // Busy, and either WAITING is already set or the caller must not wait.
         return Err(current_state);
      }
   }

   /// Acquires the gate, parking while another attempt is in flight.
   ///
   /// Returns `None` once the gate is closed.
   #[inline]
   pub(crate) fn lock(&self) -> Option<AttemptGuard<'_>> {
      let mut observed = match self.lock_step(false) {
         Ok(guard) => return guard,
         Err(state) => state,
      };
      loop {
         self.wait(observed);
         match self.lock_step(false) {
            Ok(guard) => return guard,
            Err(state) => observed = state,
         }
      }
   }

   /// Acquires the gate from async code.
   ///
   /// Yields to the runtime first. With `async-tokio-mt`, on a multi-threaded
   /// runtime, it eventually falls back to parking the worker inside
   /// `block_in_place`; everywhere else it keeps yielding.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn lock_async(&self) -> Option<AttemptGuard<'_>> {
      loop {
         // Spin/yield loop
         for _ in 0..16 {
            match self.lock_step(false) {
               Ok(guard) => return guard,
               Err(state) => {
                  // Give the attempt holder a chance to run, it may be on this very thread.
                  for _ in 0..32 {
                     tokio::task::yield_now().await;
                     // Any change (release, epoch bump) is worth another lock_step.
                     if self.0.load(Ordering::Relaxed) != state {
                        break;
                     }
                  }
               }
            }
         }

         // Fall back to a real park, but only where tokio allows blocking a worker.
         // On a current-thread runtime `block_in_place` panics, so keep yielding.
         #[cfg(feature = "async-tokio-mt")]
         {
            if Self::can_block_in_place() {
               return match self.lock_step(false) {
                  Ok(guard) => guard,
                  Err(state) => tokio::task::block_in_place(|| {
                     self.wait(state);
                     self.lock()
                  }),
               };
            }
         }
      }
   }

   /// Checks whether the current task runs on a multi-threaded tokio runtime.
   #[cfg(feature = "async-tokio-mt")]
   fn can_block_in_place() -> bool {
      use tokio::runtime::{Handle, RuntimeFlavor};

      matches!(
         Handle::try_current().map(|handle| handle.runtime_flavor()),
         Ok(RuntimeFlavor::MultiThread)
      )
   }

   /// Acquires the gate only if no other attempt is in flight.
   ///
   /// `Ok(None)` means the gate is closed, `Err(())` that it is busy.
   #[inline]
   pub(crate) fn try_lock(&self) -> Result<Option<AttemptGuard<'_>>, ()> {
      self.lock_step(true).map_err(|_| ())
   }
}

/// Ownership of one in-flight attempt.
///
/// Must be resolved with [`commit`](Self::commit) or [`reopen`](Self::reopen).
/// A guard that is simply dropped, because the action panicked or an async
/// attempt was abandoned, closes the gate for good.
pub(crate) struct AttemptGuard<'a> {
   state: &'a GateState,
}

impl<'a> AttemptGuard<'a> {
   /// Assumes RUNNING is already set on `state`.
   #[inline(always)]
   const fn new(state: &'a GateState) -> Self {
      Self { state }
   }

   /// The action succeeded: close the gate and wake everyone.
   #[inline]
   pub(crate) fn commit(self) {
      self.state.set_done();
      mem::forget(self);
   }

   /// The action failed: hand the gate to the next caller.
   #[inline]
   pub(crate) fn reopen(self) {
      self.state.set_pending();
      mem::forget(self);
   }
}

impl Drop for AttemptGuard<'_> {
   fn drop(&mut self) {
      tracing::warn!("must-once attempt terminated abruptly, gate closed permanently");
      self.state.set_done();
   }
}
