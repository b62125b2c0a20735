//! The evaluator state machine
//!
//! `do_core` consumes tokens from one block left to right, writes one
//! reduced value into `out`, and reports where it stopped. Argument
//! fulfillment interleaves with the token walk: fulfilling a call's
//! arguments recursively re-enters `do_core` on the same block, which is
//! why this is a single state machine over one stream and not a
//! recursive-descent pass over a separate tree.
//!
//! Two orthogonal booleans encode precedence:
//!
//! - `next` — stop after producing one value (a DO/NEXT step);
//! - `lookahead` — after producing a value, peek one token for an infix
//!   function and consume it if present. Lookahead is disabled while an
//!   infix function gathers its own arguments, so in `1 + 2 * 3` the `+`
//!   does not reach past the `2`.
//!
//! Thrown values unwind through `Result`; each nesting level frees the
//! frame it was building, and a surrounding trap bulk-restores the stacks.

use crate::machine::Machine;
use quill_core::{
    Binding, ErrorKind, FuncData, FuncFlags, Kind, Param, ParamClass, SeriesRef, Sym, Thrown,
    Value, WordRef,
};
use std::rc::Rc;

/// Where a `do_core` step stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// Index of the next unconsumed token (== block length at the end).
    At(usize),
    /// The block was exhausted without producing a value; `out` is UNSET.
    End,
}

/// Cursor over the refinement tail of a path-invoked call.
#[derive(Debug)]
pub(crate) struct RefineCursor {
    pub path: SeriesRef,
    pub pos: usize,
}

impl RefineCursor {
    fn exhausted(&self) -> bool {
        self.pos >= self.path.len()
    }
}

impl Machine {
    /// Run a block to completion; the result is the last expression's
    /// value, or UNSET for an empty block.
    pub fn do_block(&mut self, block: &SeriesRef) -> Result<Value, Thrown> {
        let mut out = Value::Unset;
        self.do_core(&mut out, block, block.index, false, true)?;
        Ok(out)
    }

    /// Evaluate a single expression; returns the next index.
    pub fn do_next(
        &mut self,
        out: &mut Value,
        block: &SeriesRef,
        index: usize,
    ) -> Result<Fetched, Thrown> {
        self.do_core(out, block, index, true, true)
    }

    /// The evaluator core. See the module doc for the `next`/`lookahead`
    /// discipline; the contract on return is: `out` is a fully formed
    /// value (never a placeholder), and the data stack is balanced.
    pub fn do_core(
        &mut self,
        out: &mut Value,
        block: &SeriesRef,
        index: usize,
        next: bool,
        lookahead: bool,
    ) -> Result<Fetched, Thrown> {
        // Recursion headroom is checked up front: only recursion deepens
        // the host stack, never the token loop itself.
        if self.eval_depth >= self.config.recursion_limit {
            return Err(self.raise(ErrorKind::StackOverflow, vec![]));
        }
        self.eval_depth += 1;
        let result = self.do_core_inner(out, block, index, next, lookahead);
        self.eval_depth -= 1;
        result
    }

    fn do_core_inner(
        &mut self,
        out: &mut Value,
        block: &SeriesRef,
        mut index: usize,
        next: bool,
        lookahead: bool,
    ) -> Result<Fetched, Thrown> {
        let dsp_orig = self.ds.dsp();

        loop {
            // Tick: service pending signals on dose boundaries.
            self.eval_count -= 1;
            if self.eval_count <= 0 || self.signals_pending() {
                self.pump_signals()?;
            }

            let value = match block.get(index) {
                Some(value) => value,
                None => {
                    *out = Value::Unset;
                    return Ok(Fetched::End);
                }
            };
            debug_assert!(!value.is_end());

            if self.trace.enabled() {
                crate::trace::trace_line(self, block, index, &value);
            }

            match value {
                Value::Word(word) => {
                    let fetched = self.get_var(&word)?;
                    self.word_result(out, block, &mut index, &word, fetched)?;
                }

                Value::SetWord(word) => {
                    let stopped = self.do_core(out, block, index + 1, true, true)?;
                    if out.is_unset() {
                        return Err(
                            self.raise(ErrorKind::NeedValue, vec![Value::SetWord(word)])
                        );
                    }
                    match stopped {
                        Fetched::At(nx) => index = nx,
                        Fetched::End => unreachable!("unset result already rejected"),
                    }
                    self.set_var(&word, out.clone())?;
                }

                Value::Func(func) => {
                    // A literal infix function opens an expression with no
                    // left-hand value to take.
                    if func.is_infix() {
                        return Err(self.raise(ErrorKind::NoOpArg, vec![Value::Func(func)]));
                    }
                    index += 1;
                    self.fulfill_call(out, block, &mut index, func, None, None)?;
                }

                Value::Path(path) => {
                    let hit = self.do_path(out, &path, None)?;
                    index += 1;
                    if let Some(hit) = hit {
                        // The prior value is gone by now, so an infix
                        // function cannot be reached through a path.
                        if hit.func.is_infix() {
                            return Err(self
                                .raise(ErrorKind::BadEvalType, vec![Value::Func(hit.func)]));
                        }
                        self.fulfill_call(
                            out,
                            block,
                            &mut index,
                            hit.func,
                            hit.label,
                            hit.refinements,
                        )?;
                    }
                }

                Value::GetPath(path) => {
                    let hit = self.do_path(out, &path, None)?;
                    // A get-path naming a function with leftover
                    // refinements is refused outright. Arguably it should
                    // synthesize a refined function instead; unchanged for
                    // now.
                    if let Some(hit) = hit {
                        if hit.refinements.is_some() {
                            return Err(self.raise(ErrorKind::TooLong, vec![]));
                        }
                    }
                    index += 1;
                }

                Value::SetPath(path) => {
                    let stopped = self.do_core(out, block, index + 1, true, true)?;
                    if out.is_unset() {
                        return Err(
                            self.raise(ErrorKind::NeedValue, vec![Value::SetPath(path)])
                        );
                    }
                    match stopped {
                        Fetched::At(nx) => index = nx,
                        Fetched::End => unreachable!("unset result already rejected"),
                    }
                    let setval = out.clone();
                    let mut save = Value::Unset;
                    self.do_path(&mut save, &path, Some(&setval))?;
                }

                Value::Paren(paren) => {
                    *out = self.do_block(&paren)?;
                    index += 1;
                }

                Value::LitWord(word) => {
                    *out = Value::Word(word);
                    index += 1;
                }

                Value::GetWord(word) => {
                    // A get-word may read UNSET without complaint.
                    *out = self.get_var(&word)?;
                    index += 1;
                }

                Value::LitPath(path) => {
                    // Re-tagging under PATH gets fresh storage rather than
                    // aliasing the lit-path's series.
                    *out = Value::Path(path.shallow_copy());
                    index += 1;
                }

                Value::Frame(ctx) => {
                    return Err(self.raise(ErrorKind::BadEvalType, vec![Value::Frame(ctx)]));
                }

                other => {
                    // Most things evaluate to themselves.
                    *out = other;
                    index += 1;
                }
            }

            // Post-value: infix lookahead, then step or continue.
            loop {
                if index >= block.len() {
                    return Ok(Fetched::At(index));
                }
                debug_assert_eq!(self.ds.dsp(), dsp_orig, "unbalanced evaluation step");
                if !lookahead {
                    break;
                }
                let peek = match block.get(index) {
                    Some(peek) => peek,
                    None => break,
                };
                match peek {
                    Value::Func(func) if func.is_infix() => {
                        if self.trace.enabled() {
                            crate::trace::trace_line(self, block, index, &Value::Func(
                                Rc::clone(&func),
                            ));
                        }
                        index += 1;
                        self.fulfill_call(out, block, &mut index, func, None, None)?;
                    }
                    Value::Word(word) => {
                        let fetched = self.get_var(&word)?;
                        match fetched {
                            Value::Func(func) if func.is_infix() => {
                                if self.trace.enabled() {
                                    crate::trace::trace_line(self, block, index, &Value::Func(
                                        Rc::clone(&func),
                                    ));
                                }
                                index += 1;
                                self.fulfill_call(
                                    out,
                                    block,
                                    &mut index,
                                    func,
                                    Some(word.sym),
                                    None,
                                )?;
                            }
                            fetched if !next => {
                                // Not infix, but the lookup is paid for —
                                // reuse it for the next step.
                                self.word_result(out, block, &mut index, &word, fetched)?;
                            }
                            _ => break,
                        }
                    }
                    _ => break,
                }
            }

            if next {
                return Ok(Fetched::At(index));
            }
        }
    }

    /// A word resolved to `fetched`: either copy it through or, for a
    /// function, open a call labeled with the word.
    fn word_result(
        &mut self,
        out: &mut Value,
        block: &SeriesRef,
        index: &mut usize,
        word: &WordRef,
        fetched: Value,
    ) -> Result<(), Thrown> {
        if fetched.is_unset() {
            return Err(self.raise(ErrorKind::NoValue, vec![Value::Word(word.clone())]));
        }
        if let Value::Func(func) = fetched {
            // An infix function's first argument is only available during
            // lookahead; a fresh expression has none to give.
            if func.is_infix() {
                return Err(self.raise(ErrorKind::NoOpArg, vec![Value::Word(word.clone())]));
            }
            *index += 1;
            return self.fulfill_call(out, block, index, func, Some(word.sym), None);
        }
        *out = fetched;
        *index += 1;
        Ok(())
    }

    /// The function-call subroutine: allocate the frame, fulfill arguments
    /// in spec order, dispatch, and re-enter for REDO results.
    pub(crate) fn fulfill_call(
        &mut self,
        out: &mut Value,
        block: &SeriesRef,
        index: &mut usize,
        func: Rc<FuncData>,
        label: Option<Sym>,
        refinements: Option<RefineCursor>,
    ) -> Result<(), Thrown> {
        let mut func = func;
        let mut label = label;
        let mut refinements = refinements;
        loop {
            let infix = func.is_infix();
            let call = self.make_call(block, *index, label, &func);
            if let Err(thrown) = self.fill_args(out, block, index, call, infix, &mut refinements)
            {
                self.free_call(call);
                return Err(thrown);
            }
            let result = self.dispatch_call(call)?;

            // A returned function flagged REDO becomes the new callee,
            // re-entering fulfillment at the current position.
            if let Value::Func(redo) = &result {
                if redo.flags.contains(FuncFlags::REDO) {
                    if redo.is_infix() {
                        return Err(
                            self.raise(ErrorKind::BadEvalType, vec![result.clone()])
                        );
                    }
                    func = Rc::clone(redo);
                    label = None;
                    refinements = None;
                    *out = result;
                    continue;
                }
            }

            *out = result;
            return Ok(());
        }
    }

    /// Walk the parameter spec in declaration order, fulfilling argument
    /// cells in lockstep. Refinement processing may jump around the spec
    /// when the call site names refinements out of order.
    fn fill_args(
        &mut self,
        out: &mut Value,
        block: &SeriesRef,
        index: &mut usize,
        call: usize,
        infix: bool,
        refinements: &mut Option<RefineCursor>,
    ) -> Result<(), Thrown> {
        let params: Rc<[Param]> = self.frames[call].func.params.clone();
        if params.is_empty() {
            return Ok(());
        }

        let mut i = 0usize;
        if infix {
            // The prior evaluation already produced the first argument; it
            // is sitting in `out`.
            let arg = std::mem::replace(out, Value::Unset);
            let kind = arg.kind();
            if !params[0].types.contains(kind) {
                return Err(self.arg_type_error(call, &params[0], kind));
            }
            self.set_frame_arg(call, 0, arg);
            i = 1;
        }

        loop {
            if i >= params.len() {
                // Path refinements left over bind out of order.
                match refinements.as_mut() {
                    Some(cursor) if !cursor.exhausted() => {
                        i = self.seek_refinement(call, &params, cursor)?;
                        continue;
                    }
                    _ => break,
                }
            }
            let param = params[i].clone();
            match param.class {
                ParamClass::Normal => {
                    let mut arg = Value::Unset;
                    match self.do_core(&mut arg, block, *index, true, !infix)? {
                        Fetched::At(nx) => *index = nx,
                        Fetched::End => {
                            return Err(self.raise(
                                ErrorKind::NoArg,
                                vec![self.label_value(call), param_word(&param)],
                            ));
                        }
                    }
                    self.set_frame_arg(call, i, arg);
                }

                ParamClass::Quoted => match block.get(*index) {
                    Some(token) => {
                        *index += 1;
                        self.set_frame_arg(call, i, token);
                    }
                    // Past the end, the quoted argument is UNSET; the type
                    // set decides whether that is acceptable.
                    None => self.set_frame_arg(call, i, Value::Unset),
                },

                ParamClass::Soft => match block.get(*index) {
                    Some(token) => {
                        if matches!(token.kind(), Kind::Paren | Kind::GetWord | Kind::GetPath) {
                            let mut arg = Value::Unset;
                            match self.do_core(&mut arg, block, *index, true, !infix)? {
                                Fetched::At(nx) => *index = nx,
                                Fetched::End => debug_assert!(arg.is_unset()),
                            }
                            self.set_frame_arg(call, i, arg);
                        } else {
                            *index += 1;
                            self.set_frame_arg(call, i, token);
                        }
                    }
                    None => self.set_frame_arg(call, i, Value::Unset),
                },

                ParamClass::Refinement => {
                    let Some(cursor) = refinements.as_mut() else {
                        // No refinements requested: the rest of the spec
                        // stays absent and the frame is ready.
                        return Ok(());
                    };
                    if cursor.exhausted() {
                        return Ok(());
                    }
                    let token = cursor.path.get(cursor.pos).expect("cursor in bounds");
                    let Value::Word(word) = &token else {
                        return Err(self.raise(ErrorKind::BadRefine, vec![token.clone()]));
                    };
                    if word.sym == param.name {
                        self.set_frame_arg(call, i, Value::Logic(true));
                        cursor.pos += 1;
                        // No type check on the refinement slot itself; its
                        // followers go through the loop normally.
                        i += 1;
                        continue;
                    }
                    i = self.seek_refinement(call, &params, cursor)?;
                    continue;
                }

                ParamClass::Reserved => {
                    return Err(
                        self.raise(ErrorKind::InvalidArg, vec![param_word(&param)])
                    );
                }
            }

            let kind = self.frame_arg_kind(call, i);
            if !param.types.contains(kind) {
                return Err(self.arg_type_error(call, &param, kind));
            }
            i += 1;
        }
        Ok(())
    }

    /// Find the call site's next refinement in the spec, mark it used, and
    /// return the position of its first follower.
    fn seek_refinement(
        &mut self,
        call: usize,
        params: &Rc<[Param]>,
        cursor: &mut RefineCursor,
    ) -> Result<usize, Thrown> {
        let token = cursor.path.get(cursor.pos).expect("cursor in bounds");
        let Value::Word(word) = &token else {
            return Err(self.raise(ErrorKind::BadRefine, vec![token.clone()]));
        };
        for (j, param) in params.iter().enumerate() {
            if param.class == ParamClass::Refinement && param.name == word.sym {
                self.set_frame_arg(call, j, Value::Logic(true));
                cursor.pos += 1;
                return Ok(j + 1);
            }
        }
        Err(self.raise(
            ErrorKind::NoRefine,
            vec![self.label_value(call), token.clone()],
        ))
    }

    pub(crate) fn arg_type_error(&self, call: usize, param: &Param, got: Kind) -> Thrown {
        self.raise(
            ErrorKind::ArgType,
            vec![
                self.label_value(call),
                param_word(param),
                Value::word(got.name()),
            ],
        )
    }
}

fn param_word(param: &Param) -> Value {
    Value::Word(WordRef {
        sym: param.name,
        binding: Binding::Unbound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ErrorKind;

    fn eval(m: &mut Machine, cells: Vec<Value>) -> Result<Value, Value> {
        let block = SeriesRef::new(cells);
        m.rescue(|m| m.do_block(&block))
    }

    fn kind_of(err: &Value) -> Option<ErrorKind> {
        match err {
            Value::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn test_scalars_self_evaluate() {
        let mut m = Machine::new();
        assert_eq!(eval(&mut m, vec![Value::int(7)]).unwrap(), Value::int(7));
        assert_eq!(
            eval(&mut m, vec![Value::string("hi")]).unwrap(),
            Value::string("hi")
        );
        let blk = Value::block(vec![Value::int(1)]);
        assert_eq!(eval(&mut m, vec![blk.clone()]).unwrap(), blk);
    }

    #[test]
    fn test_empty_block_yields_unset() {
        let mut m = Machine::new();
        assert!(eval(&mut m, vec![]).unwrap().is_unset());
    }

    #[test]
    fn test_lit_word_becomes_word() {
        let mut m = Machine::new();
        assert_eq!(
            eval(&mut m, vec![Value::lit_word("zap")]).unwrap(),
            Value::word("zap")
        );
    }

    #[test]
    fn test_get_word_reads_unset_without_error() {
        let mut m = Machine::new();
        assert!(eval(&mut m, vec![Value::get_word("nothing-here")])
            .unwrap()
            .is_unset());
    }

    #[test]
    fn test_word_without_value_raises() {
        let mut m = Machine::new();
        let err = eval(&mut m, vec![Value::word("nothing-here")]).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NoValue));
    }

    #[test]
    fn test_infix_binds_left() {
        let mut m = Machine::new();
        // 1 + 2 * 3 reduces strictly left to right: (1 + 2) * 3.
        let out = eval(
            &mut m,
            vec![
                Value::int(1),
                Value::word("+"),
                Value::int(2),
                Value::word("*"),
                Value::int(3),
            ],
        )
        .unwrap();
        assert_eq!(out, Value::int(9));
    }

    #[test]
    fn test_infix_without_left_argument_raises() {
        let mut m = Machine::new();
        let err = eval(&mut m, vec![Value::word("+"), Value::int(1), Value::int(2)])
            .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NoOpArg));
    }

    #[test]
    fn test_missing_argument_raises_no_arg() {
        let mut m = Machine::new();
        let err = eval(&mut m, vec![Value::word("add"), Value::int(1)]).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NoArg));
    }

    #[test]
    fn test_argument_type_check() {
        let mut m = Machine::new();
        let err = eval(
            &mut m,
            vec![Value::word("add"), Value::int(1), Value::string("x")],
        )
        .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::ArgType));
    }

    #[test]
    fn test_set_word_stores_and_yields() {
        let mut m = Machine::new();
        let out = eval(&mut m, vec![Value::set_word("n"), Value::int(5)]).unwrap();
        assert_eq!(out, Value::int(5));
        assert_eq!(m.get_lib("n"), Some(Value::int(5)));
    }

    #[test]
    fn test_set_word_needs_value() {
        let mut m = Machine::new();
        let err = eval(&mut m, vec![Value::set_word("n")]).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NeedValue));
        let err = eval(
            &mut m,
            vec![Value::set_word("n"), Value::paren(vec![])],
        )
        .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NeedValue));
    }

    #[test]
    fn test_paren_evaluates_inline() {
        let mut m = Machine::new();
        let out = eval(
            &mut m,
            vec![Value::paren(vec![
                Value::int(2),
                Value::word("+"),
                Value::int(3),
            ])],
        )
        .unwrap();
        assert_eq!(out, Value::int(5));
    }

    #[test]
    fn test_do_next_steps_one_expression() {
        let mut m = Machine::new();
        let block = SeriesRef::new(vec![
            Value::int(1),
            Value::word("+"),
            Value::int(2),
            Value::int(9),
        ]);
        let mut out = Value::Unset;
        let stopped = m.do_next(&mut out, &block, 0).unwrap();
        assert_eq!(out, Value::int(3));
        assert_eq!(stopped, Fetched::At(3));
        let stopped = m.do_next(&mut out, &block, 3).unwrap();
        assert_eq!(out, Value::int(9));
        assert_eq!(stopped, Fetched::At(4));
        let stopped = m.do_next(&mut out, &block, 4).unwrap();
        assert_eq!(stopped, Fetched::End);
        assert!(out.is_unset());
    }

    #[test]
    fn test_redo_result_reenters_fulfillment() {
        use quill_core::{FuncClass, FuncData};

        let mut m = Machine::new();
        fn sum(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
            match (m.frame_arg(call, 0), m.frame_arg(call, 1)) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
                _ => unreachable!(),
            }
        }
        let sum_idx = m.register_native(sum);
        let redo_func = Value::Func(Rc::new(FuncData {
            class: FuncClass::Native,
            flags: FuncFlags::REDO,
            params: vec![Param::normal("a"), Param::normal("b")].into(),
            body: None,
            native: Some(sum_idx),
        }));
        m.set_lib("redo-sum", redo_func.clone());
        fn bounce(m: &mut Machine, _call: usize) -> Result<Value, Thrown> {
            Ok(m.get_lib("redo-sum").expect("installed above"))
        }
        let bounce_idx = m.register_native(bounce);
        m.set_lib(
            "bounce",
            Value::Func(Rc::new(FuncData {
                class: FuncClass::Native,
                flags: FuncFlags::empty(),
                params: Vec::<Param>::new().into(),
                body: None,
                native: Some(bounce_idx),
            })),
        );

        let out = eval(
            &mut m,
            vec![Value::word("bounce"), Value::int(4), Value::int(5)],
        )
        .unwrap();
        assert_eq!(out, Value::int(9));
    }

    #[test]
    fn test_frame_value_refuses_evaluation() {
        let mut m = Machine::new();
        let frame = Value::Frame(quill_core::Context::new().shared());
        let err = eval(&mut m, vec![frame]).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::BadEvalType));
    }

    #[test]
    fn test_recursion_ceiling_is_recoverable() {
        let mut m = Machine::with_config(
            crate::config::EvalConfig::new().with_recursion_limit(8),
        );
        // Nested parens recurse once per depth.
        let mut cells = vec![Value::int(1)];
        for _ in 0..32 {
            cells = vec![Value::paren(cells)];
        }
        let err = eval(&mut m, cells).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::StackOverflow));
        assert_eq!(m.ds.dsp(), 0);
    }
}
