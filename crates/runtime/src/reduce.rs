//! Block reduction and composition
//!
//! These helpers gather per-expression results on the data stack and pop
//! the whole run at once — into a new block, or inserted into an existing
//! one at its index (the /INTO protocol) so the target is resized exactly
//! once. A thrown value restores the stack to its entry depth before
//! propagating.

use crate::eval::Fetched;
use crate::machine::Machine;
use quill_core::{SeriesRef, Sym, Thrown, Value};

fn word_sym(value: &Value) -> Option<Sym> {
    match value {
        Value::Word(w)
        | Value::SetWord(w)
        | Value::GetWord(w)
        | Value::LitWord(w)
        | Value::Refinement(w) => Some(w.sym),
        _ => None,
    }
}

fn in_word_list(words: Option<&SeriesRef>, sym: Sym) -> bool {
    let Some(list) = words else { return false };
    (list.index..list.len())
        .filter_map(|i| list.get(i))
        .any(|cell| word_sym(&cell) == Some(sym))
}

impl Machine {
    fn gather(&mut self, dsp_orig: usize, into: Option<&mut SeriesRef>) -> Value {
        match into {
            Some(target) => {
                self.ds.pop_into(target, dsp_orig);
                Value::Block(target.clone())
            }
            None => Value::Block(self.ds.pop_to_block(dsp_orig)),
        }
    }

    fn push_gathered(&mut self, dsp_orig: usize, value: Value) -> Result<(), Thrown> {
        if let Err(thrown) = self.ds.push(value) {
            self.ds.drop_to(dsp_orig);
            return Err(thrown);
        }
        Ok(())
    }

    /// Evaluate each expression of `block`, collecting the results into a
    /// new block (or into `into` at its index).
    pub fn reduce(
        &mut self,
        block: &SeriesRef,
        into: Option<&mut SeriesRef>,
    ) -> Result<Value, Thrown> {
        let dsp_orig = self.ds.dsp();
        let mut index = block.index;
        while index < block.len() {
            let mut reduced = Value::Unset;
            match self.do_next(&mut reduced, block, index) {
                Ok(Fetched::At(nx)) => index = nx,
                Ok(Fetched::End) => break,
                Err(thrown) => {
                    self.ds.drop_to(dsp_orig);
                    return Err(thrown);
                }
            }
            self.push_gathered(dsp_orig, reduced)?;
        }
        Ok(self.gather(dsp_orig, into))
    }

    /// Reduce only words and paths whose head word is not in `words`;
    /// listed ones (and everything that is not a word or path) pass
    /// through untouched. Nothing here can throw through a word or path
    /// read of a plain value, but path evaluation may.
    pub fn reduce_only(
        &mut self,
        block: &SeriesRef,
        words: Option<&SeriesRef>,
        into: Option<&mut SeriesRef>,
    ) -> Result<Value, Thrown> {
        let dsp_orig = self.ds.dsp();
        for i in block.index..block.len() {
            let cell = match block.get(i) {
                Some(cell) => cell,
                None => break,
            };
            match &cell {
                Value::Word(word) => {
                    if in_word_list(words, word.sym) {
                        self.push_gathered(dsp_orig, cell)?;
                    } else {
                        let fetched = match self.get_var(word) {
                            Ok(v) => v,
                            Err(thrown) => {
                                self.ds.drop_to(dsp_orig);
                                return Err(thrown);
                            }
                        };
                        self.push_gathered(dsp_orig, fetched)?;
                    }
                }
                Value::Path(path) => {
                    let head_listed = path
                        .get(path.index)
                        .as_ref()
                        .and_then(word_sym)
                        .is_some_and(|sym| in_word_list(words, sym));
                    if head_listed {
                        self.push_gathered(dsp_orig, cell)?;
                    } else {
                        let mut picked = Value::Unset;
                        // A function terminal is not invoked here; the
                        // looked-up value passes through as-is.
                        if let Err(thrown) = self.do_path(&mut picked, path, None) {
                            self.ds.drop_to(dsp_orig);
                            return Err(thrown);
                        }
                        self.push_gathered(dsp_orig, picked)?;
                    }
                }
                _ => self.push_gathered(dsp_orig, cell)?,
            }
        }
        Ok(self.gather(dsp_orig, into))
    }

    /// Like `reduce`, but set-words pass through literally.
    pub fn reduce_no_set(
        &mut self,
        block: &SeriesRef,
        into: Option<&mut SeriesRef>,
    ) -> Result<Value, Thrown> {
        let dsp_orig = self.ds.dsp();
        let mut index = block.index;
        while index < block.len() {
            let cell = block.get(index).expect("index in bounds");
            if let Value::SetWord(_) = cell {
                self.push_gathered(dsp_orig, cell)?;
                index += 1;
                continue;
            }
            let mut reduced = Value::Unset;
            match self.do_next(&mut reduced, block, index) {
                Ok(Fetched::At(nx)) => index = nx,
                Ok(Fetched::End) => break,
                Err(thrown) => {
                    self.ds.drop_to(dsp_orig);
                    return Err(thrown);
                }
            }
            self.push_gathered(dsp_orig, reduced)?;
        }
        Ok(self.gather(dsp_orig, into))
    }

    /// Copy `block` element-wise, evaluating parens as they are met.
    ///
    /// A paren's block result is spliced in unless `only`; UNSET results
    /// vanish, and so do NONE results unless `only`. With `deep`, nested
    /// blocks are recursed into and other block-shaped values get fresh
    /// storage.
    pub fn compose(
        &mut self,
        block: &SeriesRef,
        deep: bool,
        only: bool,
        into: Option<&mut SeriesRef>,
    ) -> Result<Value, Thrown> {
        let dsp_orig = self.ds.dsp();
        for i in block.index..block.len() {
            let cell = match block.get(i) {
                Some(cell) => cell,
                None => break,
            };
            match &cell {
                Value::Paren(paren) => {
                    let evaluated = match self.do_block(paren) {
                        Ok(v) => v,
                        Err(thrown) => {
                            self.ds.drop_to(dsp_orig);
                            return Err(thrown);
                        }
                    };
                    match evaluated {
                        Value::Block(b) if !only => {
                            for j in b.index..b.len() {
                                if let Some(elem) = b.get(j) {
                                    self.push_gathered(dsp_orig, elem)?;
                                }
                            }
                        }
                        Value::Unset => {}
                        Value::None if !only => {}
                        other => self.push_gathered(dsp_orig, other)?,
                    }
                }
                Value::Block(nested) if deep => {
                    let composed = match self.compose(nested, true, only, None) {
                        Ok(v) => v,
                        Err(thrown) => {
                            self.ds.drop_to(dsp_orig);
                            return Err(thrown);
                        }
                    };
                    self.push_gathered(dsp_orig, composed)?;
                }
                other if deep && other.kind().is_any_block() => {
                    // Path-shaped values under /deep get their own storage.
                    self.push_gathered(dsp_orig, shallow_value(other))?;
                }
                _ => self.push_gathered(dsp_orig, cell)?,
            }
        }
        Ok(self.gather(dsp_orig, into))
    }
}

fn shallow_value(value: &Value) -> Value {
    match value {
        Value::Path(s) => Value::Path(s.shallow_copy()),
        Value::SetPath(s) => Value::SetPath(s.shallow_copy()),
        Value::GetPath(s) => Value::GetPath(s.shallow_copy()),
        Value::LitPath(s) => Value::LitPath(s.shallow_copy()),
        Value::Paren(s) => Value::Paren(s.shallow_copy()),
        Value::Block(s) => Value::Block(s.shallow_copy()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ErrorKind;

    #[test]
    fn test_reduce_collects_each_expression() {
        let mut m = Machine::new();
        let block = SeriesRef::new(vec![
            Value::int(1),
            Value::word("+"),
            Value::int(2),
            Value::int(3),
            Value::word("*"),
            Value::int(4),
        ]);
        let out = m.reduce(&block, None).unwrap();
        assert_eq!(out, Value::block(vec![Value::int(3), Value::int(12)]));
    }

    #[test]
    fn test_reduce_into_inserts_at_index() {
        let mut m = Machine::new();
        let block = SeriesRef::new(vec![Value::int(1), Value::word("+"), Value::int(1)]);
        let mut target = SeriesRef::new(vec![Value::word("head"), Value::word("tail")]);
        target.index = 1;
        m.reduce(&block, Some(&mut target)).unwrap();
        assert_eq!(target.index, 2);
        assert_eq!(
            Value::Block(target.at(0)),
            Value::block(vec![Value::word("head"), Value::int(2), Value::word("tail")])
        );
    }

    #[test]
    fn test_reduce_restores_stack_on_thrown() {
        let mut m = Machine::new();
        let dsp = m.ds.dsp();
        let block = SeriesRef::new(vec![Value::int(1), Value::word("boom-unset")]);
        let err = m.reduce(&block, None).unwrap_err();
        assert_eq!(err.error_kind(), Some(ErrorKind::NoValue));
        assert_eq!(m.ds.dsp(), dsp);
    }

    #[test]
    fn test_reduce_only_skips_listed_words() {
        let mut m = Machine::new();
        m.set_lib("x", Value::int(10));
        let block = SeriesRef::new(vec![Value::word("x"), Value::word("keep")]);
        let words = SeriesRef::new(vec![Value::word("keep")]);
        let out = m.reduce_only(&block, Some(&words), None).unwrap();
        assert_eq!(
            out,
            Value::block(vec![Value::int(10), Value::word("keep")])
        );
    }

    #[test]
    fn test_reduce_no_set_passes_set_words() {
        let mut m = Machine::new();
        let block = SeriesRef::new(vec![
            Value::set_word("a"),
            Value::int(1),
            Value::word("+"),
            Value::int(1),
        ]);
        let out = m.reduce_no_set(&block, None).unwrap();
        assert_eq!(
            out,
            Value::block(vec![Value::set_word("a"), Value::int(2)])
        );
        // The set-word passed through unexecuted.
        assert_eq!(m.get_lib("a"), None);
    }

    #[test]
    fn test_compose_splices_and_drops() {
        let mut m = Machine::new();
        let block = SeriesRef::new(vec![
            Value::word("a"),
            Value::paren(vec![Value::int(1), Value::word("+"), Value::int(2)]),
            Value::paren(vec![Value::word("none")]),
            Value::paren(vec![Value::block(vec![Value::word("d"), Value::word("e")])]),
        ]);
        let out = m.compose(&block, false, false, None).unwrap();
        assert_eq!(
            out,
            Value::block(vec![
                Value::word("a"),
                Value::int(3),
                Value::word("d"),
                Value::word("e"),
            ])
        );
    }

    #[test]
    fn test_compose_only_keeps_blocks_whole() {
        let mut m = Machine::new();
        let block = SeriesRef::new(vec![Value::paren(vec![Value::block(vec![
            Value::word("d"),
        ])])]);
        let out = m.compose(&block, false, true, None).unwrap();
        assert_eq!(
            out,
            Value::block(vec![Value::block(vec![Value::word("d")])])
        );
    }

    #[test]
    fn test_compose_deep_recurses_and_detaches() {
        let mut m = Machine::new();
        let nested = SeriesRef::new(vec![Value::paren(vec![Value::int(1)])]);
        let block = SeriesRef::new(vec![Value::Block(nested.clone())]);
        let out = m.compose(&block, true, false, None).unwrap();
        assert_eq!(
            out,
            Value::block(vec![Value::block(vec![Value::int(1)])])
        );
        // The source block is untouched.
        assert_eq!(nested.get(0).unwrap().kind(), quill_core::Kind::Paren);
    }
}
