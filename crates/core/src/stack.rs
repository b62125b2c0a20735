//! The data stack
//!
//! Scratch space for gathering reductions: REDUCE and COMPOSE push one
//! result at a time, then pop the whole run into a new block (or insert it
//! into an existing one) so the target series is sized exactly once.
//! A cell here is also a root — anything pushed stays live until dropped.
//!
//! The buffer is contiguous and reallocates on growth, so positions are
//! the stable handle, never addresses: any push may move every cell.
//! Position 0 is a reserved base cell, which keeps DSP unsigned with 0
//! meaning empty. Invariants held after every operation:
//!
//! - the cell one past the top is the END sentinel;
//! - every reachable cell is either a fully formed value or the
//!   trash-safe placeholder;
//! - a balanced caller leaves DSP exactly where it found it.

use crate::error::{ErrorData, ErrorKind, Thrown};
use crate::series::SeriesRef;
use crate::value::Value;

const INITIAL_SIZE: usize = 128;
const EXPAND_BASIS: usize = 128;

/// The trash-safe placeholder for reserved-but-unwritten cells.
const TRASH: Value = Value::Unset;

pub struct DataStack {
    cells: Vec<Value>,
    dsp: usize,
    limit: usize,
}

impl DataStack {
    /// A fresh stack with a cell ceiling. The ceiling is a hard limit;
    /// reaching it raises *stack-overflow*.
    pub fn new(limit: usize) -> Self {
        let size = INITIAL_SIZE.min(limit.max(4));
        let mut cells = vec![TRASH; size];
        cells[1] = Value::End;
        DataStack {
            cells,
            dsp: 0,
            limit,
        }
    }

    /// Current stack pointer; 0 means empty.
    pub fn dsp(&self) -> usize {
        self.dsp
    }

    pub fn depth(&self) -> usize {
        self.dsp
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn ensure_room(&mut self) -> Result<(), Thrown> {
        if self.dsp + 2 < self.cells.len() {
            return Ok(());
        }
        // Growing past the ceiling is the overflow condition.
        if self.dsp + 2 >= self.limit {
            return Err(Thrown::error(ErrorData::new(ErrorKind::StackOverflow, vec![])));
        }
        let grown = (self.cells.len() + EXPAND_BASIS.max(self.cells.len())).min(self.limit);
        self.cells.resize(grown, TRASH);
        Ok(())
    }

    pub fn push(&mut self, value: Value) -> Result<(), Thrown> {
        debug_assert!(!value.is_end(), "END may never be pushed to the data stack");
        self.ensure_room()?;
        self.dsp += 1;
        self.cells[self.dsp] = value;
        self.cells[self.dsp + 1] = Value::End;
        Ok(())
    }

    /// Reserve a cell filled with the trash-safe placeholder; returns its
    /// position. The caller may overwrite it through `at_mut`.
    pub fn push_trash_safe(&mut self) -> Result<usize, Thrown> {
        self.push(TRASH)?;
        Ok(self.dsp)
    }

    /// Most recently pushed cell.
    pub fn top(&self) -> &Value {
        &self.cells[self.dsp]
    }

    /// Cell at a position. Positions stay valid across pushes.
    pub fn at(&self, dsp: usize) -> &Value {
        &self.cells[dsp]
    }

    pub fn at_mut(&mut self, dsp: usize) -> &mut Value {
        &mut self.cells[dsp]
    }

    pub fn drop_top(&mut self) {
        debug_assert!(self.dsp > 0, "drop on empty data stack");
        self.cells[self.dsp] = Value::End;
        self.dsp -= 1;
    }

    /// Bulk restore to a saved stack pointer (trap unwinding).
    pub fn drop_to(&mut self, dsp: usize) {
        debug_assert!(dsp <= self.dsp);
        while self.dsp > dsp {
            self.drop_top();
        }
    }

    /// Pop every cell above `dsp_start` into a new block.
    pub fn pop_to_block(&mut self, dsp_start: usize) -> SeriesRef {
        let cells = self.take_above(dsp_start);
        SeriesRef::new(cells)
    }

    /// Pop every cell above `dsp_start` into an existing block at its
    /// current index, advancing the index past the insertion.
    pub fn pop_into(&mut self, target: &mut SeriesRef, dsp_start: usize) {
        let cells = self.take_above(dsp_start);
        target.index = target.insert_at(target.index, &cells);
    }

    fn take_above(&mut self, dsp_start: usize) -> Vec<Value> {
        debug_assert!(dsp_start <= self.dsp);
        let cells = (dsp_start + 1..=self.dsp)
            .map(|i| std::mem::replace(&mut self.cells[i], TRASH))
            .collect();
        self.dsp = dsp_start;
        self.cells[self.dsp + 1] = Value::End;
        cells
    }

    #[cfg(test)]
    fn end_marker_in_place(&self) -> bool {
        self.cells[self.dsp + 1].is_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_push_drop_balance() {
        let mut ds = DataStack::new(1000);
        assert_eq!(ds.dsp(), 0);
        ds.push(Value::int(1)).unwrap();
        ds.push(Value::int(2)).unwrap();
        assert_eq!(ds.dsp(), 2);
        assert_eq!(*ds.top(), Value::int(2));
        assert!(ds.end_marker_in_place());
        ds.drop_top();
        assert_eq!(*ds.top(), Value::int(1));
        ds.drop_to(0);
        assert_eq!(ds.dsp(), 0);
        assert!(ds.end_marker_in_place());
    }

    #[test]
    fn test_growth_keeps_positions_stable() {
        let mut ds = DataStack::new(100_000);
        for i in 0..1000 {
            ds.push(Value::int(i)).unwrap();
        }
        assert_eq!(*ds.at(1), Value::int(0));
        assert_eq!(*ds.at(1000), Value::int(999));
        assert!(ds.end_marker_in_place());
    }

    #[test]
    fn test_overflow_at_limit() {
        let mut ds = DataStack::new(16);
        let mut hit = None;
        for i in 0..100 {
            if let Err(t) = ds.push(Value::int(i)) {
                hit = t.error_kind();
                break;
            }
        }
        assert_eq!(hit, Some(ErrorKind::StackOverflow));
        assert!(ds.dsp() < 16);
    }

    #[test]
    fn test_pop_to_block() {
        let mut ds = DataStack::new(1000);
        let base = ds.dsp();
        ds.push(Value::int(1)).unwrap();
        ds.push(Value::word("x")).unwrap();
        let block = ds.pop_to_block(base);
        assert_eq!(ds.dsp(), base);
        assert_eq!(
            Value::Block(block),
            Value::block(vec![Value::int(1), Value::word("x")])
        );
    }

    #[test]
    fn test_pop_into_advances_target_index() {
        let mut ds = DataStack::new(1000);
        let mut target = SeriesRef::new(vec![Value::int(1), Value::int(4)]);
        target.index = 1;
        let base = ds.dsp();
        ds.push(Value::int(2)).unwrap();
        ds.push(Value::int(3)).unwrap();
        ds.pop_into(&mut target, base);
        assert_eq!(target.index, 3);
        let expect = SeriesRef::new(vec![
            Value::int(1),
            Value::int(2),
            Value::int(3),
            Value::int(4),
        ]);
        assert_eq!(target.at(0), expect);
    }

    #[test]
    fn test_push_trash_safe_reserves_cell() {
        let mut ds = DataStack::new(1000);
        let slot = ds.push_trash_safe().unwrap();
        assert_eq!(slot, ds.dsp());
        assert!(ds.at(slot).is_unset());
        *ds.at_mut(slot) = Value::int(7);
        assert_eq!(*ds.top(), Value::int(7));
    }
}
