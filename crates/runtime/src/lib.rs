//! quill runtime: the evaluator
//!
//! Reduces blocks of tagged values left to right: word lookup, function
//! dispatch (prefix and infix), path walking, quoted arguments, and the
//! call-frame and data-stack machinery underneath. One `Machine` per task,
//! threaded explicitly; non-local exits travel as thrown values and are
//! caught by `Machine::rescue`.
//!
//! - `machine`: the per-task state record, variables, traps
//! - `frame`: call frames and function-class dispatch
//! - `eval`: the `do_core` state machine and its wrappers
//! - `path`: path evaluation and the per-kind dispatcher table
//! - `reduce`: REDUCE and COMPOSE families
//! - `apply`: positional argument application
//! - `signal`: the evaluator signal word and pump
//! - `trace`: evaluator trace points (tracing events)
//! - `config`: the knob surface
//! - `natives`: the bootstrap native set
//! - `bind`: word binding for function and closure bodies

pub mod apply;
mod bind;
pub mod config;
pub mod eval;
pub mod frame;
pub mod machine;
pub mod natives;
pub mod path;
pub mod reduce;
pub mod signal;
pub mod trace;

// Re-export key types
pub use config::{BootPhase, EvalConfig};
pub use eval::Fetched;
pub use frame::{CallFrame, FrameFlags};
pub use machine::{DispatchFn, Machine, NativeFn};
pub use path::{PathEval, PathFn, PathOutcome};
pub use signal::{EvalSignals, SignalHandle};
pub use trace::{TraceFlags, TraceState};

// The core value model, re-exported for embedders.
pub use quill_core::{
    intern, spelling, Binding, Chunk, ChunkStack, Context, CtxRef, DataStack, ErrorData,
    ErrorKind, FuncClass, FuncData, FuncFlags, Kind, MemoryStats, Param, ParamClass, SeriesRef,
    Sym, Thrown, TypeSet, Value, WordRef,
};
