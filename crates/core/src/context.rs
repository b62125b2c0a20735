//! Contexts: ordered symbol-to-cell mappings
//!
//! A context backs the lib namespace, objects reached through paths, and
//! the variable lists of closures and reified frames. The word list is
//! append-only, so a slot index handed out in a binding stays valid for
//! the life of the context.

use crate::symbol::Sym;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared, interiorly mutable context handle.
pub type CtxRef = Rc<RefCell<Context>>;

pub struct Context {
    words: Vec<Sym>,
    values: Vec<Value>,
}

impl Context {
    pub fn new() -> Self {
        Context {
            words: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        Context {
            words: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
        }
    }

    pub fn shared(self) -> CtxRef {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Slot index of a word, if present.
    pub fn find(&self, sym: Sym) -> Option<usize> {
        self.words.iter().position(|&w| w == sym)
    }

    pub fn word_at(&self, index: usize) -> Sym {
        self.words[index]
    }

    pub fn get(&self, index: usize) -> Value {
        self.values[index].clone()
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// Append a new word slot. The word list never shrinks.
    pub fn append(&mut self, sym: Sym, value: Value) -> usize {
        self.words.push(sym);
        self.values.push(value);
        self.words.len() - 1
    }

    pub fn get_by_sym(&self, sym: Sym) -> Option<Value> {
        self.find(sym).map(|i| self.get(i))
    }

    /// Set by word, appending a slot when the word is new.
    pub fn set_by_sym(&mut self, sym: Sym, value: Value) -> usize {
        match self.find(sym) {
            Some(i) => {
                self.set(i, value);
                i
            }
            None => self.append(sym, value),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Context({} words)", self.len())
    }
}
