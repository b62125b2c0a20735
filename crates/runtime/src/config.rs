//! Evaluator configuration
//!
//! All knobs are plain integers or booleans and can be set through the
//! builder or loaded from TOML. Nothing here persists — the core keeps no
//! on-disk state.

use serde::Deserialize;

/// How far boot has progressed. Escape signals are ignored until the
/// mezzanine layer is up, because no handler exists to field them before
/// that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootPhase {
    Start,
    Mezzanine,
    Done,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Maximum cumulative evaluation ticks before the security check
    /// fires. 0 disables the ceiling.
    pub eval_limit: i64,
    /// Tick budget between signal checks.
    pub eval_dose: i64,
    /// Trace depth (0 = off, >0 = maximum reported depth).
    pub trace_level: i32,
    /// Trace flag bits (see `TraceFlags`).
    pub trace_flags: u32,
    /// Data-stack cell ceiling; exceeding it raises *stack-overflow*.
    pub stack_limit: usize,
    /// Evaluator recursion ceiling — the recoverable stand-in for the
    /// CPU-stack headroom check. Exceeding it raises *stack-overflow*.
    pub recursion_limit: usize,
    /// Initial boot phase; gates escape-signal handling.
    pub boot_phase: BootPhase,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            eval_limit: 0,
            eval_dose: 10_000,
            trace_level: 0,
            trace_flags: 0,
            stack_limit: 1_000_000,
            recursion_limit: 2_048,
            boot_phase: BootPhase::Done,
        }
    }
}

impl EvalConfig {
    pub fn new() -> Self {
        EvalConfig::default()
    }

    pub fn with_eval_limit(mut self, limit: i64) -> Self {
        self.eval_limit = limit;
        self
    }

    pub fn with_eval_dose(mut self, dose: i64) -> Self {
        self.eval_dose = dose.max(1);
        self
    }

    pub fn with_trace(mut self, level: i32, flags: u32) -> Self {
        self.trace_level = level;
        self.trace_flags = flags;
        self
    }

    pub fn with_stack_limit(mut self, limit: usize) -> Self {
        self.stack_limit = limit;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_boot_phase(mut self, phase: BootPhase) -> Self {
        self.boot_phase = phase;
        self
    }

    /// Load a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
