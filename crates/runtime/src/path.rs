//! Path evaluation
//!
//! A path walks from a head value through selectors, dispatching each
//! (value, selector) step to the path function registered for the value's
//! kind. Dispatchers are plug-ins: a per-kind callback in an explicit
//! table, handed a `PathEval` record, answering with a `PathOutcome`.
//!
//! If the walk lands on a function with tail elements left over, those
//! elements become the refinement list of the ensuing call.

use crate::eval::RefineCursor;
use crate::machine::Machine;
use quill_core::{ErrorKind, FuncData, Kind, SeriesRef, Sym, Thrown, Value};
use std::rc::Rc;

/// Per-kind path dispatcher.
pub type PathFn = fn(&mut Machine, &mut PathEval) -> PathOutcome;

/// Dispatcher verdict for one (value, selector) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutcome {
    /// `value` was updated in place.
    Ok,
    /// The assignment was performed (set-paths, at end-of-path only).
    Set,
    /// The step's result is NONE.
    None,
    /// Read the step's result from the spare `store` cell.
    Use,
    /// The selector cannot be applied to this value.
    BadSelect,
    /// A set-path cannot store here.
    BadSet,
    /// A position selector fell outside the series.
    BadRange,
    /// The stored value's type is not accepted by this field.
    BadSetType,
}

/// The record a dispatcher works on.
pub struct PathEval {
    /// Current value; updated in place as the walk proceeds.
    pub value: Value,
    /// The whole path.
    pub path: SeriesRef,
    /// Position of the element that produced `value`.
    pub pos: usize,
    /// Resolved selector for this step (get-words and parens already
    /// evaluated).
    pub select: Value,
    /// Spare cell for constructed results (`PathOutcome::Use`).
    pub store: Value,
    /// For set-paths, the value to store; cleared once stored.
    pub setval: Option<Value>,
    /// Whether this step's selector is the last path element.
    pub at_tail: bool,
}

/// A path that landed on a function: the callee plus what the call needs
/// from the path.
#[derive(Debug)]
pub(crate) struct PathFuncHit {
    pub func: Rc<FuncData>,
    pub label: Option<Sym>,
    pub refinements: Option<RefineCursor>,
}

impl Machine {
    /// Evaluate a path. For set-paths pass the value to store. For plain
    /// paths the terminal lands in `out`; a terminal function is returned
    /// for the caller to invoke, with any unused tail as its refinements.
    pub(crate) fn do_path(
        &mut self,
        out: &mut Value,
        path: &SeriesRef,
        setval: Option<&Value>,
    ) -> Result<Option<PathFuncHit>, Thrown> {
        let base = path.index;
        let head = path
            .get(base)
            .ok_or_else(|| self.raise(ErrorKind::InvalidPath, vec![Value::Path(path.clone())]))?;

        let value = match &head {
            Value::Word(word) => {
                let v = self.get_var(word)?;
                if v.is_unset() {
                    return Err(self.raise(ErrorKind::NoValue, vec![head.clone()]));
                }
                v
            }
            other => other.clone(),
        };

        let mut pvs = PathEval {
            value,
            path: path.clone(),
            pos: base,
            select: Value::None,
            store: Value::Unset,
            setval: setval.cloned(),
            at_tail: base + 1 >= path.len(),
        };

        if base + 1 >= path.len() {
            // A single-element path hands back its head value rather than
            // dispatching. Arguably an error; unchanged for now.
        } else if self.path_dispatch[pvs.value.kind() as usize].is_some() {
            self.next_path(&mut pvs)?;
            if pvs.pos + 1 < path.len() && !pvs.value.kind().is_function() {
                // Only function refinements may be left unconsumed.
                let stuck = pvs.path.get(pvs.pos + 1).unwrap_or(Value::None);
                return Err(self.raise(
                    ErrorKind::InvalidPath,
                    vec![Value::Path(path.clone()), stuck],
                ));
            }
        } else if !pvs.value.kind().is_function() {
            return Err(self.raise(
                ErrorKind::BadPathType,
                vec![Value::Path(path.clone()), Value::word(pvs.value.kind().name())],
            ));
        }

        if setval.is_some() {
            // Set-paths produce nothing.
            return Ok(None);
        }

        *out = pvs.value.clone();

        if let Value::Func(func) = &pvs.value {
            // The element that yielded the function labels the call; it
            // must be a word, or the function value itself.
            let label_elem = pvs.path.get(pvs.pos).expect("stop position in bounds");
            let label = match &label_elem {
                Value::Word(word) => Some(word.sym),
                Value::Func(_) => None,
                _ => {
                    return Err(self.raise(ErrorKind::BadRefine, vec![label_elem.clone()]));
                }
            };
            let refinements = if pvs.pos + 1 < path.len() {
                Some(RefineCursor {
                    path: path.clone(),
                    pos: pvs.pos + 1,
                })
            } else {
                None
            };
            return Ok(Some(PathFuncHit {
                func: Rc::clone(func),
                label,
                refinements,
            }));
        }

        Ok(None)
    }

    /// Apply selectors until the tail is empty or the current value has no
    /// dispatcher (a function terminal, or an error).
    fn next_path(&mut self, pvs: &mut PathEval) -> Result<(), Thrown> {
        loop {
            let Some(dispatch) = self.path_dispatch[pvs.value.kind() as usize] else {
                return Ok(());
            };
            pvs.pos += 1;
            let Some(sel_token) = pvs.path.get(pvs.pos) else {
                return Ok(());
            };

            // object/:field reads the variable; object/(expr) evaluates.
            pvs.select = match sel_token {
                Value::GetWord(word) => {
                    let v = self.get_var(&word)?;
                    if v.is_unset() {
                        return Err(
                            self.raise(ErrorKind::NoValue, vec![Value::GetWord(word)])
                        );
                    }
                    v
                }
                Value::Paren(paren) => self.do_block(&paren)?,
                other => other,
            };
            pvs.at_tail = pvs.pos + 1 >= pvs.path.len();

            match dispatch(self, pvs) {
                PathOutcome::Ok => {}
                PathOutcome::Set => {
                    if pvs.at_tail {
                        pvs.setval = None;
                    }
                }
                PathOutcome::None => pvs.value = Value::None,
                PathOutcome::Use => pvs.value = pvs.store.clone(),
                PathOutcome::BadSelect => {
                    return Err(self.raise(
                        ErrorKind::InvalidPath,
                        vec![Value::Path(pvs.path.clone()), pvs.select.clone()],
                    ));
                }
                PathOutcome::BadSet => {
                    return Err(self.raise(
                        ErrorKind::BadPathSet,
                        vec![Value::Path(pvs.path.clone()), pvs.select.clone()],
                    ));
                }
                PathOutcome::BadRange => {
                    return Err(self.raise(ErrorKind::OutOfRange, vec![pvs.select.clone()]));
                }
                PathOutcome::BadSetType => {
                    let stored = pvs.setval.clone().unwrap_or(Value::None);
                    return Err(self.raise(
                        ErrorKind::BadFieldSet,
                        vec![pvs.select.clone(), Value::word(stored.kind().name())],
                    ));
                }
            }

            if pvs.at_tail {
                return Ok(());
            }
        }
    }

    /// Lightweight single-selector variant for pick-style callers. The
    /// selector is taken as already resolved; sets apply immediately.
    pub fn pick_path(
        &mut self,
        value: &mut Value,
        selector: &Value,
        setval: Option<Value>,
    ) -> Result<(), Thrown> {
        let Some(dispatch) = self.path_dispatch[value.kind() as usize] else {
            return Err(self.raise(
                ErrorKind::BadPathType,
                vec![value.clone(), Value::word(value.kind().name())],
            ));
        };
        let mut pvs = PathEval {
            value: value.clone(),
            path: SeriesRef::new(vec![]),
            pos: 0,
            select: selector.clone(),
            store: Value::Unset,
            setval,
            at_tail: true,
        };
        match dispatch(self, &mut pvs) {
            PathOutcome::Ok | PathOutcome::Set => {}
            PathOutcome::None => pvs.value = Value::None,
            PathOutcome::Use => pvs.value = pvs.store.clone(),
            PathOutcome::BadSelect => {
                return Err(self.raise(
                    ErrorKind::InvalidPath,
                    vec![pvs.value.clone(), selector.clone()],
                ));
            }
            PathOutcome::BadSet | PathOutcome::BadSetType => {
                return Err(self.raise(
                    ErrorKind::BadPathSet,
                    vec![pvs.value.clone(), selector.clone()],
                ));
            }
            PathOutcome::BadRange => {
                return Err(self.raise(ErrorKind::OutOfRange, vec![selector.clone()]));
            }
        }
        *value = pvs.value;
        Ok(())
    }
}

// ---- boot dispatchers ----

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

/// Blocks and parens: integer selectors pick by position (1-based from
/// the value's index); word selectors select the value following the
/// matching word.
fn block_path(_m: &mut Machine, pvs: &mut PathEval) -> PathOutcome {
    let series = match &pvs.value {
        Value::Block(s) | Value::Paren(s) => s.clone(),
        _ => return PathOutcome::BadSelect,
    };
    match &pvs.select {
        Value::Integer(n) => {
            let n = *n;
            let in_range = n >= 1 && series.index + (n as usize) <= series.len();
            if pvs.at_tail {
                if let Some(setval) = pvs.setval.clone() {
                    if !in_range {
                        return PathOutcome::BadRange;
                    }
                    series.set(series.index + (n as usize) - 1, setval);
                    return PathOutcome::Set;
                }
            }
            if !in_range {
                return PathOutcome::None;
            }
            pvs.store = series
                .get(series.index + (n as usize) - 1)
                .expect("checked in range");
            PathOutcome::Use
        }
        selector => {
            let Some(sym) = word_sym(selector) else {
                return PathOutcome::BadSelect;
            };
            let mut i = series.index;
            while i < series.len() {
                let matched = series
                    .get(i)
                    .as_ref()
                    .and_then(word_sym)
                    .is_some_and(|s| s == sym);
                if matched {
                    if pvs.at_tail {
                        if let Some(setval) = pvs.setval.clone() {
                            if i + 1 >= series.len() {
                                return PathOutcome::BadSet;
                            }
                            series.set(i + 1, setval);
                            return PathOutcome::Set;
                        }
                    }
                    return match series.get(i + 1) {
                        Some(found) => {
                            pvs.store = found;
                            PathOutcome::Use
                        }
                        None => PathOutcome::None,
                    };
                }
                i += 1;
            }
            if pvs.setval.is_some() && pvs.at_tail {
                PathOutcome::BadSet
            } else {
                PathOutcome::None
            }
        }
    }
}

/// Objects and frames: word selectors address fields; assignment happens
/// only at end-of-path.
fn object_path(_m: &mut Machine, pvs: &mut PathEval) -> PathOutcome {
    let ctx = match &pvs.value {
        Value::Object(c) | Value::Frame(c) => Rc::clone(c),
        _ => return PathOutcome::BadSelect,
    };
    let Some(sym) = word_sym(&pvs.select) else {
        return PathOutcome::BadSelect;
    };
    let Some(slot) = ctx.borrow().find(sym) else {
        return PathOutcome::BadSelect;
    };
    if pvs.at_tail {
        if let Some(setval) = pvs.setval.clone() {
            ctx.borrow_mut().set(slot, setval);
            return PathOutcome::Set;
        }
    }
    pvs.value = ctx.borrow().get(slot);
    PathOutcome::Ok
}

pub(crate) fn install_dispatchers(m: &mut Machine) {
    m.register_path_dispatcher(Kind::Block, block_path);
    m.register_path_dispatcher(Kind::Paren, block_path);
    m.register_path_dispatcher(Kind::Object, object_path);
    m.register_path_dispatcher(Kind::Frame, object_path);
}
