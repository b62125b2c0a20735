//! Blocks: address-stable, length-indexed cell sequences
//!
//! A `SeriesRef` is a handle to shared cell storage plus a position, so a
//! block value carries where it points as well as what it points at. The
//! evaluator borrows storage read-only while reducing; mutation happens
//! between evaluation steps (inserts for the /INTO protocol, in-place
//! series natives). Storage is stable under its handle — cells are
//! addressed by index, and indices survive both growth and sharing.
//!
//! The END sentinel of the storage layout is implicit here: reading past
//! the last cell yields nothing, which the evaluator maps to END.

use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared series storage plus an index into it.
#[derive(Clone)]
pub struct SeriesRef {
    data: Rc<RefCell<Vec<Value>>>,
    pub index: usize,
}

impl SeriesRef {
    pub fn new(cells: Vec<Value>) -> Self {
        SeriesRef {
            data: Rc::new(RefCell::new(cells)),
            index: 0,
        }
    }

    /// The same storage viewed from a different position.
    pub fn at(&self, index: usize) -> Self {
        SeriesRef {
            data: Rc::clone(&self.data),
            index,
        }
    }

    /// Full storage length (not relative to the index).
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cells remaining from the handle's position to the end.
    pub fn tail_len(&self) -> usize {
        self.len().saturating_sub(self.index)
    }

    /// Read the cell at an absolute position. `None` past the end — the
    /// evaluator's END.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.data.borrow().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) {
        self.data.borrow_mut()[index] = value;
    }

    pub fn push(&self, value: Value) {
        self.data.borrow_mut().push(value);
    }

    /// Insert cells at a position, shifting the tail. Returns the position
    /// just past the insertion (the /INTO protocol's updated index).
    pub fn insert_at(&self, index: usize, cells: &[Value]) -> usize {
        let mut data = self.data.borrow_mut();
        let at = index.min(data.len());
        data.splice(at..at, cells.iter().cloned());
        at + cells.len()
    }

    /// Reverse the cells from the handle's position to the end, in place.
    pub fn reverse_tail(&self) {
        let mut data = self.data.borrow_mut();
        let at = self.index.min(data.len());
        data[at..].reverse();
    }

    /// Clone the cells from an absolute position to the end.
    pub fn cells_from(&self, index: usize) -> Vec<Value> {
        let data = self.data.borrow();
        data.get(index..).map(|s| s.to_vec()).unwrap_or_default()
    }

    /// New storage with the same cells (one level deep), same position.
    pub fn shallow_copy(&self) -> SeriesRef {
        SeriesRef {
            data: Rc::new(RefCell::new(self.data.borrow().clone())),
            index: self.index,
        }
    }

    /// New storage with block-shaped cells copied recursively.
    pub fn deep_copy(&self) -> SeriesRef {
        let cells = self.data.borrow().iter().map(Value::deep_copy).collect();
        SeriesRef {
            data: Rc::new(RefCell::new(cells)),
            index: self.index,
        }
    }

    /// Same underlying storage, regardless of position.
    pub fn ptr_eq(&self, other: &SeriesRef) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

// Series equality compares the cells from each handle's position, the way
// block values compare.
impl PartialEq for SeriesRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) && self.index == other.index {
            return true;
        }
        if self.tail_len() != other.tail_len() {
            return false;
        }
        let a = self.data.borrow();
        let b = other.data.borrow();
        a[self.index.min(a.len())..] == b[other.index.min(b.len())..]
    }
}

impl std::fmt::Debug for SeriesRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SeriesRef(index {}, {} cells)", self.index, self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_past_end_is_none() {
        let s = SeriesRef::new(vec![Value::int(1)]);
        assert_eq!(s.get(0), Some(Value::int(1)));
        assert_eq!(s.get(1), None);
    }

    #[test]
    fn test_insert_at_returns_new_index() {
        let s = SeriesRef::new(vec![Value::int(1), Value::int(4)]);
        let after = s.insert_at(1, &[Value::int(2), Value::int(3)]);
        assert_eq!(after, 3);
        let expect = SeriesRef::new(vec![
            Value::int(1),
            Value::int(2),
            Value::int(3),
            Value::int(4),
        ]);
        assert_eq!(s, expect);
    }

    #[test]
    fn test_shallow_copy_shares_nested_storage() {
        let inner = SeriesRef::new(vec![Value::int(1)]);
        let outer = SeriesRef::new(vec![Value::Block(inner.clone())]);
        let copy = outer.shallow_copy();
        assert!(!copy.ptr_eq(&outer));
        match copy.get(0) {
            Some(Value::Block(b)) => assert!(b.ptr_eq(&inner)),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_copy_detaches_nested_storage() {
        let inner = SeriesRef::new(vec![Value::int(1)]);
        let outer = SeriesRef::new(vec![Value::Block(inner.clone())]);
        let copy = outer.deep_copy();
        match copy.get(0) {
            Some(Value::Block(b)) => assert!(!b.ptr_eq(&inner)),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_equality_respects_index() {
        let s = SeriesRef::new(vec![Value::int(1), Value::int(2)]);
        let tail = s.at(1);
        let expect = SeriesRef::new(vec![Value::int(2)]);
        assert_eq!(tail, expect);
        assert_ne!(s, expect);
    }
}
