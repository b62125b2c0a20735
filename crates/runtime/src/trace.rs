//! Evaluator tracing
//!
//! The trace points of the token loop — line, function entry, return,
//! error — emitted as `tracing` events under the `quill::eval` target.
//! Depth windowing follows the running call chain: `trace_level` caps the
//! reported depth, and `depth` anchors the window at the chain depth where
//! tracing was switched on.

use crate::machine::Machine;
use bitflags::bitflags;
use quill_core::{SeriesRef, Thrown, Value};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TraceFlags: u32 {
        /// Trace function entries (with arguments) instead of every line.
        const FUNCTION = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TraceState {
    pub level: i32,
    pub flags: TraceFlags,
    /// Call-chain depth when tracing was enabled; reports are relative.
    pub depth: i32,
}

impl TraceState {
    pub fn off() -> Self {
        TraceState {
            level: 0,
            flags: TraceFlags::empty(),
            depth: 0,
        }
    }

    pub fn from_config(config: &crate::config::EvalConfig) -> Self {
        TraceState {
            level: config.trace_level,
            flags: TraceFlags::from_bits_truncate(config.trace_flags),
            depth: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.level > 0
    }
}

impl Machine {
    /// Switch tracing on or off, anchoring the depth window at the current
    /// call depth.
    pub fn set_trace(&mut self, level: i32, flags: TraceFlags) {
        self.trace.level = level;
        self.trace.flags = flags;
        self.trace.depth = self.call_depth() as i32;
    }
}

/// Depth of the current report inside the window, or `None` when outside.
fn report_depth(m: &Machine) -> Option<usize> {
    let depth = m.call_depth() as i32 - m.trace.depth;
    if depth < 0 || depth >= m.trace.level {
        return None;
    }
    Some((depth as usize).min(10))
}

pub(crate) fn trace_line(m: &Machine, block: &SeriesRef, index: usize, value: &Value) {
    if m.trace.flags.contains(TraceFlags::FUNCTION) {
        return;
    }
    if value.kind().is_function() {
        return;
    }
    let Some(depth) = report_depth(m) else { return };
    tracing::trace!(
        target: "quill::eval",
        "{:pad$}{}: {}",
        "",
        index + 1,
        value,
        pad = depth * 4
    );
}

pub(crate) fn trace_func(m: &Machine, call: usize) {
    let Some(depth) = report_depth(m) else { return };
    let label = m.label_value(call);
    let func = m.frame_func(call);
    if m.trace.flags.contains(TraceFlags::FUNCTION) {
        let args: Vec<String> = (0..m.frame_num_args(call))
            .map(|i| m.frame_arg(call, i).to_string())
            .collect();
        tracing::trace!(
            target: "quill::eval",
            "{:pad$}--> {} {} [{}]",
            "",
            label,
            func.class.kind().name(),
            args.join(" "),
            pad = depth * 4
        );
    } else {
        tracing::trace!(
            target: "quill::eval",
            "{:pad$}--> {} {}",
            "",
            label,
            func.class.kind().name(),
            pad = depth * 4
        );
    }
}

pub(crate) fn trace_return(m: &Machine, call: usize, value: &Value) {
    let Some(depth) = report_depth(m) else { return };
    tracing::trace!(
        target: "quill::eval",
        "{:pad$}<-- {} == {}",
        "",
        m.label_value(call),
        value,
        pad = depth * 4
    );
}

pub(crate) fn trace_error(m: &Machine, thrown: &Thrown) {
    let Some(depth) = report_depth(m) else { return };
    tracing::trace!(
        target: "quill::eval",
        "{:pad$}**: {}",
        "",
        thrown,
        pad = depth * 4
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_off_by_default() {
        let m = Machine::new();
        assert!(!m.trace.enabled());
    }

    #[test]
    fn test_set_trace_anchors_depth() {
        let mut m = Machine::new();
        m.set_trace(3, TraceFlags::FUNCTION);
        assert!(m.trace.enabled());
        assert_eq!(m.trace.depth, 0);
        assert!(m.trace.flags.contains(TraceFlags::FUNCTION));
        m.set_trace(0, TraceFlags::empty());
        assert!(!m.trace.enabled());
    }
}
