//! The per-task machine record
//!
//! Everything an evaluator task owns lives in one `Machine` threaded as
//! `&mut` through every operation: the data stack, the chunk stack, the
//! call-frame stack, signal counters, trace state, the lib context, and
//! the dispatch tables. There is exactly one evaluator per task and no
//! process-wide mutable state apart from the symbol table.

use crate::config::{BootPhase, EvalConfig};
use crate::frame::CallFrame;
use crate::path::PathFn;
use crate::signal::{EvalSignals, SignalHandle};
use crate::trace::TraceState;
use quill_core::{
    Binding, ChunkStack, Context, CtxRef, DataStack, ErrorData, ErrorKind, FuncClass, Kind,
    MemoryStats, Thrown, Value, WordRef,
};
use std::rc::Rc;

/// A registered native or action implementation. Function values carry an
/// index into the machine's table rather than a code pointer.
pub type NativeFn = fn(&mut Machine, usize) -> Result<Value, Thrown>;

/// A function-class dispatcher: consumes a fully populated call frame and
/// produces the call's value. Dispatchers must leave the data stack
/// balanced (or fail) and may not touch the caller's frame link.
pub type DispatchFn = fn(&mut Machine, usize) -> Result<Value, Thrown>;

pub struct Machine {
    pub ds: DataStack,
    pub chunks: ChunkStack,
    pub(crate) frames: Vec<CallFrame>,
    /// Frame currently "in effect" — pending frames above it are still
    /// fulfilling arguments.
    pub(crate) running: Option<usize>,
    /// The lib context: where unbound words resolve.
    pub lib: CtxRef,
    pub config: EvalConfig,
    pub boot_phase: BootPhase,
    pub trace: TraceState,
    pub(crate) signals: SignalHandle,
    pub(crate) sigmask: EvalSignals,
    pub(crate) eval_count: i64,
    pub(crate) eval_cycles: i64,
    pub(crate) eval_depth: usize,
    pub(crate) path_dispatch: [Option<PathFn>; Kind::COUNT],
    pub(crate) func_dispatch: [Option<DispatchFn>; FuncClass::COUNT],
    pub(crate) natives: Vec<NativeFn>,
    pub(crate) recycle_hook: Option<fn()>,
}

impl Machine {
    pub fn new() -> Self {
        Machine::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        let mut m = Machine {
            ds: DataStack::new(config.stack_limit),
            chunks: ChunkStack::new(),
            frames: Vec::new(),
            running: None,
            lib: Context::new().shared(),
            boot_phase: config.boot_phase,
            trace: TraceState::from_config(&config),
            signals: SignalHandle::new(),
            sigmask: EvalSignals::all(),
            eval_count: config.eval_dose,
            eval_cycles: 0,
            eval_depth: 0,
            path_dispatch: [None; Kind::COUNT],
            func_dispatch: [None; FuncClass::COUNT],
            natives: Vec::new(),
            recycle_hook: None,
            config,
        };
        crate::path::install_dispatchers(&mut m);
        crate::frame::install_dispatchers(&mut m);
        crate::natives::install(&mut m);
        m
    }

    // ---- registration (boot-time plug-in surface) ----

    /// Register an implementation for native/action values; returns the
    /// index their function cells carry.
    pub fn register_native(&mut self, f: NativeFn) -> u32 {
        self.natives.push(f);
        (self.natives.len() - 1) as u32
    }

    /// Register the path dispatcher for a value kind.
    pub fn register_path_dispatcher(&mut self, kind: Kind, f: PathFn) {
        self.path_dispatch[kind as usize] = Some(f);
    }

    /// Register the call dispatcher for a function class.
    pub fn register_dispatcher(&mut self, class: FuncClass, f: DispatchFn) {
        self.func_dispatch[class as usize] = Some(f);
    }

    /// Hook invoked when the recycle signal is serviced (the collector's
    /// entry point).
    pub fn set_recycle_hook(&mut self, hook: fn()) {
        self.recycle_hook = Some(hook);
    }

    /// A cloneable handle for raising signal bits from outside the task.
    pub fn signal_handle(&self) -> SignalHandle {
        self.signals.clone()
    }

    // ---- variables ----

    /// Read a word's variable. UNSET comes back as a value — callers that
    /// must not see UNSET (plain WORD evaluation) check and raise.
    pub fn get_var(&self, word: &WordRef) -> Result<Value, Thrown> {
        match &word.binding {
            Binding::Unbound => Ok(self
                .lib
                .borrow()
                .get_by_sym(word.sym)
                .unwrap_or(Value::Unset)),
            Binding::Bound { ctx, index } => Ok(ctx.borrow().get(*index)),
            Binding::Relative { params, index } => {
                let frame = self.find_running(params).ok_or_else(|| {
                    self.raise(ErrorKind::NoValue, vec![Value::Word(word.clone())])
                })?;
                Ok(self.frame_arg(frame, *index))
            }
        }
    }

    /// Store a word's variable.
    pub fn set_var(&mut self, word: &WordRef, value: Value) -> Result<(), Thrown> {
        match &word.binding {
            Binding::Unbound => {
                self.lib.borrow_mut().set_by_sym(word.sym, value);
                Ok(())
            }
            Binding::Bound { ctx, index } => {
                ctx.borrow_mut().set(*index, value);
                Ok(())
            }
            Binding::Relative { params, index } => {
                let frame = self.find_running(params).ok_or_else(|| {
                    self.raise(ErrorKind::NoValue, vec![Value::Word(word.clone())])
                })?;
                self.set_frame_arg(frame, *index, value);
                Ok(())
            }
        }
    }

    /// Most recent running frame of the function owning `params`.
    fn find_running(&self, params: &Rc<[quill_core::Param]>) -> Option<usize> {
        let mut cur = self.running;
        while let Some(i) = cur {
            if Rc::ptr_eq(&self.frames[i].func.params, params) {
                return Some(i);
            }
            cur = self.frames[i].prior_running;
        }
        None
    }

    /// Set a lib word directly (boot and embedding convenience).
    pub fn set_lib(&mut self, name: &str, value: Value) {
        self.lib
            .borrow_mut()
            .set_by_sym(quill_core::intern(name), value);
    }

    pub fn get_lib(&self, name: &str) -> Option<Value> {
        self.lib.borrow().get_by_sym(quill_core::intern(name))
    }

    // ---- introspection ----

    /// Depth of the running call chain.
    pub fn call_depth(&self) -> usize {
        let mut n = 0;
        let mut cur = self.running;
        while let Some(i) = cur {
            n += 1;
            cur = self.frames[i].prior_running;
        }
        n
    }

    /// Walk to the n'th caller on the running chain (0 = current).
    pub fn stack_frame(&self, n: usize) -> Option<usize> {
        let mut left = n;
        let mut cur = self.running;
        while let Some(i) = cur {
            if left == 0 {
                return Some(i);
            }
            left -= 1;
            cur = self.frames[i].prior_running;
        }
        None
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats::snapshot(&self.ds, &self.chunks)
    }

    // ---- errors & traps ----

    /// Build a thrown error, capturing where evaluation stands.
    pub(crate) fn raise(&self, kind: ErrorKind, args: Vec<Value>) -> Thrown {
        let mut data = ErrorData::new(kind, args);
        if let Some(i) = self.running {
            let frame = &self.frames[i];
            data = data.with_near(frame.site.at(frame.site_index));
        }
        Thrown::error(data)
    }

    /// Run `body` under a trap. On a thrown value the data stack, chunk
    /// stack, frame stack, and running marker are restored to their state
    /// at entry and the thrown value is handed back.
    pub fn rescue<F>(&mut self, body: F) -> Result<Value, Value>
    where
        F: FnOnce(&mut Machine) -> Result<Value, Thrown>,
    {
        let dsp = self.ds.dsp();
        let chunk_top = self.chunks.top_count();
        let frame_top = self.frames.len();
        let running = self.running;
        let depth = self.eval_depth;
        match body(self) {
            Ok(value) => Ok(value),
            Err(thrown) => {
                if self.trace.enabled() {
                    crate::trace::trace_error(self, &thrown);
                }
                self.ds.drop_to(dsp);
                self.chunks.drop_to(chunk_top);
                self.frames.truncate(frame_top);
                self.running = running;
                self.eval_depth = depth;
                Err(thrown.into_value())
            }
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lib_words_resolve() {
        let mut m = Machine::new();
        m.set_lib("answer", Value::int(42));
        let w = WordRef::named("Answer");
        assert_eq!(m.get_var(&w).unwrap(), Value::int(42));
        assert!(m.get_var(&WordRef::named("no-such")).unwrap().is_unset());
    }

    #[test]
    fn test_set_var_appends_to_lib() {
        let mut m = Machine::new();
        let w = WordRef::named("fresh");
        m.set_var(&w, Value::int(1)).unwrap();
        assert_eq!(m.get_lib("fresh"), Some(Value::int(1)));
    }

    #[test]
    fn test_rescue_restores_machine_state() {
        let mut m = Machine::new();
        let before = m.stats();
        let thrown = m
            .rescue(|m| {
                m.ds.push(Value::int(1))?;
                m.chunks.push_chunk(4);
                Err(m.raise(ErrorKind::Misc, vec![]))
            })
            .unwrap_err();
        match thrown {
            Value::Error(e) => assert_eq!(e.kind, ErrorKind::Misc),
            other => panic!("expected error value, got {:?}", other),
        }
        assert_eq!(m.stats(), before);
    }

    #[test]
    fn test_call_depth_empty() {
        let m = Machine::new();
        assert_eq!(m.call_depth(), 0);
        assert!(m.stack_frame(0).is_none());
    }
}
