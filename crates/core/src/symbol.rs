//! Word symbol interning
//!
//! All word spellings live in one process-wide, append-only table. Symbols
//! never leave the table, so a `Sym` key stays valid for the life of the
//! process and equality is a key comparison, never a string comparison.
//!
//! Words compare case-insensitively, so spellings are canonized (ASCII
//! case-folded) before interning. Each evaluator task remains single-tasked;
//! only this table is shared between tasks, which is why it sits behind a
//! concurrent interner rather than task state.

use lasso::{Spur, ThreadedRodeo};
use std::sync::OnceLock;

/// Key into the process-wide word table.
pub type Sym = Spur;

static WORD_TABLE: OnceLock<ThreadedRodeo> = OnceLock::new();

fn word_table() -> &'static ThreadedRodeo {
    WORD_TABLE.get_or_init(ThreadedRodeo::default)
}

/// Intern a word spelling, canonizing case.
pub fn intern(name: &str) -> Sym {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        word_table().get_or_intern(name.to_ascii_lowercase())
    } else {
        word_table().get_or_intern(name)
    }
}

/// Resolve a symbol back to its canon spelling.
pub fn spelling(sym: Sym) -> &'static str {
    word_table().resolve(&sym)
}

/// Number of distinct words interned so far (monotonically increasing).
pub fn word_count() -> usize {
    word_table().len()
}
