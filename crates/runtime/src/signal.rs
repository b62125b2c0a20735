//! Evaluator signals
//!
//! A bitmask word read at every evaluator tick. Writers (host callbacks,
//! allocators under pressure) set bits through a cloneable handle; only
//! the owning evaluator reads and services them, at the top of a token
//! iteration — never in signal context. Signals are masked while being
//! serviced to prevent re-entry loops.

use crate::config::BootPhase;
use crate::machine::Machine;
use bitflags::bitflags;
use quill_core::{ErrorKind, Thrown};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EvalSignals: u32 {
        /// A recycle (collection) pass is requested.
        const RECYCLE = 1 << 0;
        /// Escape requested (halt once boot is past mezzanine).
        const ESCAPE = 1 << 1;
        /// An event port needs servicing.
        const EVENT_PORT = 1 << 2;
    }
}

/// Cloneable handle to the task's signal word. Safe to poke from other
/// threads; the evaluator alone consumes it.
#[derive(Clone)]
pub struct SignalHandle(Arc<AtomicU32>);

impl SignalHandle {
    pub fn new() -> Self {
        SignalHandle(Arc::new(AtomicU32::new(0)))
    }

    pub fn set(&self, signals: EvalSignals) {
        self.0.fetch_or(signals.bits(), Ordering::SeqCst);
    }

    pub fn clear(&self, signals: EvalSignals) {
        self.0.fetch_and(!signals.bits(), Ordering::SeqCst);
    }

    pub fn pending(&self) -> EvalSignals {
        EvalSignals::from_bits_truncate(self.0.load(Ordering::SeqCst))
    }
}

impl Default for SignalHandle {
    fn default() -> Self {
        SignalHandle::new()
    }
}

impl Machine {
    pub(crate) fn signals_pending(&self) -> bool {
        !self.signals.pending().is_empty()
    }

    /// Mask out signal bits (0 = service nothing).
    pub fn set_sigmask(&mut self, mask: EvalSignals) {
        self.sigmask = mask;
    }

    /// Total ticks consumed so far.
    pub fn eval_cycles(&self) -> i64 {
        self.eval_cycles
    }

    /// Service pending work at a tick boundary: refill the dose counter,
    /// enforce the cumulative ceiling, then handle masked-in signal bits.
    pub(crate) fn pump_signals(&mut self) -> Result<(), Thrown> {
        if self.eval_count <= 0 {
            self.eval_cycles += self.config.eval_dose - self.eval_count;
            self.eval_count = self.config.eval_dose;
            if self.config.eval_limit != 0 && self.eval_cycles > self.config.eval_limit {
                return Err(self.raise(ErrorKind::Security, vec![]));
            }
        }

        let sigs = self.signals.pending() & self.sigmask;
        if sigs.is_empty() {
            return Ok(());
        }

        // Mask while servicing; careful of signal loops.
        let mask = self.sigmask;
        self.sigmask = EvalSignals::empty();

        if sigs.contains(EvalSignals::RECYCLE) {
            self.signals.clear(EvalSignals::RECYCLE);
            if let Some(hook) = self.recycle_hook {
                hook();
            }
        }

        // Escape only counts once boot can field it.
        if sigs.contains(EvalSignals::ESCAPE) && self.boot_phase >= BootPhase::Mezzanine {
            self.signals.clear(EvalSignals::ESCAPE);
            self.sigmask = mask;
            return Err(self.raise(ErrorKind::Halt, vec![]));
        }

        self.sigmask = mask;
        Ok(())
    }
}

/// Host wiring: map SIGINT onto the escape signal bit. Only flag setting
/// happens in signal context.
#[cfg(all(unix, feature = "host-signals"))]
pub mod host {
    use super::{EvalSignals, SignalHandle};

    /// Install a SIGINT handler that raises the escape bit on `handle`.
    ///
    /// # Safety
    /// Calls `signal_hook::low_level::register`, which replaces any prior
    /// SIGINT disposition for the whole process.
    pub unsafe fn install_sigint(
        handle: SignalHandle,
    ) -> std::io::Result<signal_hook::SigId> {
        signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
            handle.set(EvalSignals::ESCAPE);
        })
    }
}
