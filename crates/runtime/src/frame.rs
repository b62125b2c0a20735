//! Call frames
//!
//! A frame is created once the callee is identified, populated by the
//! evaluator during argument fulfillment, handed to `dispatch_call` when
//! full, and destroyed after the callee returns. Frames form the LIFO call
//! stack; the `running` marker distinguishes the frame in effect from
//! frames still gathering arguments above it (those must not be visible to
//! stack-relative variable lookup).
//!
//! Argument cells come from the chunk allocator — address-stable for the
//! duration of the call — except for durable callees (closures), whose
//! cells are heap-owned so they can outlive the frame inside a context.

use crate::machine::Machine;
use bitflags::bitflags;
use quill_core::{
    Chunk, Context, ErrorKind, FuncClass, FuncData, Kind, SeriesRef, Sym, Thrown, Value,
};
use std::rc::Rc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        /// Argument cells are heap-owned (durable callee) rather than
        /// chunk-allocated.
        const HAS_VARLIST = 1 << 0;
    }
}

pub(crate) enum ArgStore {
    Chunk(Chunk),
    Heap(Vec<Value>),
}

pub struct CallFrame {
    pub(crate) func: Rc<FuncData>,
    /// The word the function was invoked through, if any.
    pub(crate) label: Option<Sym>,
    /// Source block and position at the call site.
    pub(crate) site: SeriesRef,
    pub(crate) site_index: usize,
    pub(crate) args: ArgStore,
    pub(crate) dsp_orig: usize,
    pub(crate) flags: FrameFlags,
    /// Running frame at the moment this one was put into effect.
    pub(crate) prior_running: Option<usize>,
}

impl Machine {
    /// Allocate a frame for a call. Argument cells are None-filled so the
    /// frame is safe at any allocation point and refinement scanning can
    /// tell filled slots from absent ones.
    pub(crate) fn make_call(
        &mut self,
        site: &SeriesRef,
        index: usize,
        label: Option<Sym>,
        func: &Rc<FuncData>,
    ) -> usize {
        let n = func.params.len();
        let (args, flags) = if func.class == FuncClass::Closure {
            (ArgStore::Heap(vec![Value::None; n]), FrameFlags::HAS_VARLIST)
        } else {
            let chunk = self.chunks.push_chunk(n);
            for i in 0..n {
                *self.chunks.cell_mut(chunk, i) = Value::None;
            }
            (ArgStore::Chunk(chunk), FrameFlags::empty())
        };
        self.frames.push(CallFrame {
            func: Rc::clone(func),
            label,
            site: site.clone(),
            site_index: index,
            args,
            dsp_orig: self.ds.dsp(),
            flags,
            prior_running: None,
        });
        self.frames.len() - 1
    }

    /// Destroy the top frame, releasing chunk storage in LIFO order.
    /// Heap-owned argument cells are dropped with the frame (or live on in
    /// a context that took them over).
    pub(crate) fn free_call(&mut self, call: usize) {
        debug_assert_eq!(call, self.frames.len() - 1, "free_call out of order");
        let frame = self.frames.pop().expect("free_call on empty call stack");
        if frame.flags.contains(FrameFlags::HAS_VARLIST) {
            // Heap cells drop with the frame, or live on in the context
            // that took them over.
            return;
        }
        if let ArgStore::Chunk(chunk) = frame.args {
            self.chunks.drop_chunk(chunk);
        }
    }

    pub fn frame_num_args(&self, call: usize) -> usize {
        self.frames[call].func.params.len()
    }

    pub fn frame_func(&self, call: usize) -> Rc<FuncData> {
        Rc::clone(&self.frames[call].func)
    }

    pub fn frame_label(&self, call: usize) -> Option<Sym> {
        self.frames[call].label
    }

    /// The label as a value for error reports: the word, or NONE when the
    /// function was invoked anonymously.
    pub(crate) fn label_value(&self, call: usize) -> Value {
        match self.frames[call].label {
            Some(sym) => Value::Word(quill_core::WordRef::unbound(sym)),
            None => Value::None,
        }
    }

    /// Read an argument cell (0-based).
    pub fn frame_arg(&self, call: usize, i: usize) -> Value {
        match &self.frames[call].args {
            ArgStore::Chunk(chunk) => self.chunks.cell(*chunk, i).clone(),
            ArgStore::Heap(cells) => cells[i].clone(),
        }
    }

    pub(crate) fn frame_arg_kind(&self, call: usize, i: usize) -> Kind {
        match &self.frames[call].args {
            ArgStore::Chunk(chunk) => self.chunks.cell(*chunk, i).kind(),
            ArgStore::Heap(cells) => cells[i].kind(),
        }
    }

    pub(crate) fn set_frame_arg(&mut self, call: usize, i: usize, value: Value) {
        match &mut self.frames[call].args {
            ArgStore::Chunk(chunk) => {
                let chunk = *chunk;
                *self.chunks.cell_mut(chunk, i) = value;
            }
            ArgStore::Heap(cells) => cells[i] = value,
        }
    }

    /// Refinement convention: an argument slot is "used" when it is
    /// conditionally true.
    pub fn frame_ref(&self, call: usize, i: usize) -> bool {
        self.frame_arg(call, i).is_truthy()
    }

    /// Put a fully populated frame into effect and run its dispatcher.
    ///
    /// Restores the prior running frame and frees the call afterwards.
    /// A dispatcher that unbalances the data stack is an internal
    /// invariant failure, reported as *misc*.
    pub(crate) fn dispatch_call(&mut self, call: usize) -> Result<Value, Thrown> {
        let dsp_precall = self.frames[call].dsp_orig;
        debug_assert_eq!(dsp_precall, self.ds.dsp(), "unbalanced argument fulfillment");
        let prior = self.running;
        self.frames[call].prior_running = prior;
        self.running = Some(call);

        if self.trace.enabled() {
            crate::trace::trace_func(self, call);
        }

        let class = self.frames[call].func.class;
        let result = match self.func_dispatch[class as usize] {
            Some(dispatcher) => dispatcher(self, call),
            None => Err(self.raise(
                ErrorKind::Misc,
                vec![Value::word(class.kind().name())],
            )),
        };

        self.running = prior;

        let result = match result {
            Ok(value) => {
                if self.ds.dsp() != dsp_precall {
                    self.ds.drop_to(dsp_precall);
                    Err(self.raise(
                        ErrorKind::Misc,
                        vec![Value::string("unbalanced data stack after call")],
                    ))
                } else {
                    if self.trace.enabled() {
                        crate::trace::trace_return(self, call, &value);
                    }
                    Ok(value)
                }
            }
            Err(thrown) => Err(thrown),
        };

        self.free_call(call);
        result
    }
}

// ---- function-class dispatchers ----

/// Natives and actions: route through the registered implementation table.
fn run_registered(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let index = match m.frames[call].func.native {
        Some(i) => i as usize,
        None => {
            return Err(m.raise(
                ErrorKind::Misc,
                vec![Value::string("function value carries no implementation")],
            ))
        }
    };
    let f = match m.natives.get(index) {
        Some(f) => *f,
        None => {
            return Err(m.raise(
                ErrorKind::Misc,
                vec![Value::string("unregistered native index")],
            ))
        }
    };
    f(m, call)
}

/// User functions: evaluate the body; its words were bound to the
/// parameter list at creation, so lookup finds this frame's cells.
fn run_function(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let body = match &m.frames[call].func.body {
        Some(body) => body.clone(),
        None => {
            return Err(m.raise(
                ErrorKind::Misc,
                vec![Value::string("function value carries no body")],
            ))
        }
    };
    m.do_block(&body)
}

/// Closures: materialize a per-call context from the argument cells and
/// evaluate a copy of the body bound to it. The context owns the cells
/// from here on (the has-varlist case), so the values survive the call.
fn run_closure(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let func = m.frame_func(call);
    let body = match &func.body {
        Some(body) => body.clone(),
        None => {
            return Err(m.raise(
                ErrorKind::Misc,
                vec![Value::string("closure value carries no body")],
            ))
        }
    };
    let mut ctx = Context::with_capacity(func.params.len());
    for (i, param) in func.params.iter().enumerate() {
        ctx.append(param.name, m.frame_arg(call, i));
    }
    let ctx = ctx.shared();
    let body = body.deep_copy();
    crate::bind::bind_context(&body, &ctx);
    m.do_block(&body)
}

pub(crate) fn install_dispatchers(m: &mut Machine) {
    m.register_dispatcher(FuncClass::Native, run_registered);
    m.register_dispatcher(FuncClass::Action, run_registered);
    m.register_dispatcher(FuncClass::Function, run_function);
    m.register_dispatcher(FuncClass::Closure, run_closure);
    // Command and routine dispatchers are host plug-ins; calling one
    // before registration reports *misc*.
}
