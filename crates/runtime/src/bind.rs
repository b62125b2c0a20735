//! Word binding
//!
//! Function creation binds body words to the parameter list (relative
//! binding, resolved against the most recent running frame of that
//! function); closure dispatch binds a fresh body copy to a per-call
//! context. Both walks recurse through nested blocks, which is safe
//! because callers bind deep copies — never storage shared with live
//! values.

use quill_core::{Binding, CtxRef, Param, SeriesRef, Value, WordRef};
use std::rc::Rc;

fn rebound(word: &WordRef, binding: Binding) -> WordRef {
    WordRef {
        sym: word.sym,
        binding,
    }
}

fn walk<F>(series: &SeriesRef, lookup: &F)
where
    F: Fn(&WordRef) -> Option<Binding>,
{
    for i in 0..series.len() {
        let cell = match series.get(i) {
            Some(cell) => cell,
            None => break,
        };
        let replacement = match &cell {
            Value::Word(w) => lookup(w).map(|b| Value::Word(rebound(w, b))),
            Value::SetWord(w) => lookup(w).map(|b| Value::SetWord(rebound(w, b))),
            Value::GetWord(w) => lookup(w).map(|b| Value::GetWord(rebound(w, b))),
            Value::LitWord(w) => lookup(w).map(|b| Value::LitWord(rebound(w, b))),
            _ => {
                if let Some(nested) = cell.as_series() {
                    walk(nested, lookup);
                }
                None
            }
        };
        if let Some(value) = replacement {
            series.set(i, value);
        }
    }
}

/// Bind words matching a parameter name to the parameter list.
pub(crate) fn bind_relative(series: &SeriesRef, params: &Rc<[Param]>) {
    walk(series, &|word: &WordRef| {
        params
            .iter()
            .position(|p| p.name == word.sym)
            .map(|index| Binding::Relative {
                params: Rc::clone(params),
                index,
            })
    });
}

/// Bind words present in a context to its slots.
pub(crate) fn bind_context(series: &SeriesRef, ctx: &CtxRef) {
    walk(series, &|word: &WordRef| {
        ctx.borrow().find(word.sym).map(|index| Binding::Bound {
            ctx: Rc::clone(ctx),
            index,
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Context;

    #[test]
    fn test_bind_relative_reaches_nested_blocks() {
        let params: Rc<[Param]> = vec![Param::normal("a")].into();
        let body = SeriesRef::new(vec![
            Value::word("a"),
            Value::block(vec![Value::word("a"), Value::word("b")]),
        ]);
        bind_relative(&body, &params);
        match body.get(0) {
            Some(Value::Word(w)) => {
                assert!(matches!(w.binding, Binding::Relative { index: 0, .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
        match body.get(1) {
            Some(Value::Block(inner)) => {
                match inner.get(0) {
                    Some(Value::Word(w)) => {
                        assert!(matches!(w.binding, Binding::Relative { .. }))
                    }
                    other => panic!("unexpected {:?}", other),
                }
                // Words that are not parameters stay unbound.
                match inner.get(1) {
                    Some(Value::Word(w)) => assert!(matches!(w.binding, Binding::Unbound)),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bind_context_targets_slots() {
        let mut ctx = Context::new();
        ctx.append(quill_core::intern("x"), Value::int(9));
        let ctx = ctx.shared();
        let body = SeriesRef::new(vec![Value::word("x"), Value::word("y")]);
        bind_context(&body, &ctx);
        match body.get(0) {
            Some(Value::Word(w)) => match w.binding {
                Binding::Bound { index, .. } => assert_eq!(index, 0),
                _ => panic!("expected context binding"),
            },
            other => panic!("unexpected {:?}", other),
        }
        match body.get(1) {
            Some(Value::Word(w)) => assert!(matches!(w.binding, Binding::Unbound)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
