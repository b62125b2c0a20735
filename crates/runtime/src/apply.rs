//! Apply helpers: positional argument application
//!
//! Thin front-ends over the same frame-and-dispatch machinery as the
//! evaluator, for callers that already hold the arguments — a block of
//! them, or a host-side slice. Refinements bind positionally here: a
//! conditionally true value in a refinement slot passes TRUE, anything
//! else passes NONE and voids the refinement's followers.

use crate::eval::Fetched;
use crate::machine::Machine;
use quill_core::{ErrorKind, FuncData, ParamClass, SeriesRef, Thrown, Value};
use std::rc::Rc;

impl Machine {
    /// Use a block from `index` as the arguments of a call. With `reduce`,
    /// each argument is produced by an evaluation step; otherwise taken
    /// literally. The block is padded with absent arguments when short;
    /// excess values raise *too-long* — but only after a reducing pass has
    /// finished, so side effects still run.
    pub fn apply_block(
        &mut self,
        func: &Rc<FuncData>,
        block: &SeriesRef,
        index: usize,
        reduce: bool,
    ) -> Result<Value, Thrown> {
        let mut index = index.min(block.len());
        let call = self.make_call(block, index, None, func);
        let params = Rc::clone(&func.params);

        let mut i = 0usize;
        let mut ignoring = false;
        let mut too_many = false;
        let mut out = Value::Unset;

        while index < block.len() {
            if !too_many && i >= params.len() {
                too_many = true;
                if !reduce {
                    break;
                }
                // Keep reducing: the error about length waits until the
                // remaining expressions have had their effects.
            }

            let arg: Value;
            if reduce {
                match self.do_next(&mut out, block, index) {
                    Ok(Fetched::At(nx)) => index = nx,
                    Ok(Fetched::End) => break,
                    Err(thrown) => {
                        self.free_call(call);
                        return Err(thrown);
                    }
                }
                if too_many {
                    continue;
                }
                arg = out.clone();
            } else {
                debug_assert!(!too_many);
                arg = block.get(index).expect("index in bounds");
                index += 1;
            }

            let param = &params[i];
            if param.class == ParamClass::Refinement {
                if arg.is_truthy() {
                    self.set_frame_arg(call, i, Value::Logic(true));
                    ignoring = false;
                } else {
                    self.set_frame_arg(call, i, Value::None);
                    ignoring = true;
                }
            } else if ignoring {
                self.set_frame_arg(call, i, Value::None);
            } else {
                let kind = arg.kind();
                if !param.types.contains(kind) {
                    let err = self.arg_type_error(call, param, kind);
                    self.free_call(call);
                    return Err(err);
                }
                self.set_frame_arg(call, i, arg);
            }
            i += 1;
        }

        if too_many {
            let err = self.raise(ErrorKind::TooLong, vec![]);
            self.free_call(call);
            return Err(err);
        }

        self.dispatch_call(call)
    }

    /// Apply a function to host-provided arguments, assigned into the
    /// argument slots in order. Missing trailing arguments stay absent.
    pub fn apply_func(&mut self, func: &Value, args: &[Value]) -> Result<Value, Thrown> {
        let Value::Func(func) = func else {
            return Err(self.raise(ErrorKind::InvalidArg, vec![func.clone()]));
        };

        // Fabricate a call site for backtraces: the running frame's, else
        // the function's own body, else an empty block.
        let (site, site_index) = if let Some(r) = self.running {
            (self.frames[r].site.clone(), self.frames[r].site_index)
        } else if let Some(body) = &func.body {
            (body.clone(), 0)
        } else {
            (SeriesRef::new(vec![]), 0)
        };

        let call = self.make_call(&site, site_index, None, func);
        let params = Rc::clone(&func.params);
        let mut ignoring = false;

        for (i, param) in params.iter().enumerate() {
            let Some(value) = args.get(i) else { break };
            if param.class == ParamClass::Refinement {
                if value.is_truthy() {
                    self.set_frame_arg(call, i, Value::Logic(true));
                    ignoring = false;
                } else {
                    self.set_frame_arg(call, i, Value::None);
                    ignoring = true;
                }
            } else if ignoring {
                self.set_frame_arg(call, i, Value::None);
            } else {
                let kind = value.kind();
                if !param.types.contains(kind) {
                    let err = self.arg_type_error(call, param, kind);
                    self.free_call(call);
                    return Err(err);
                }
                self.set_frame_arg(call, i, value.clone());
            }
        }

        self.dispatch_call(call)
    }
}
