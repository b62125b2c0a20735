//! The chunk stack: LIFO argument-cell arrays for in-flight calls
//!
//! Call frames need cell arrays that do not move while the evaluator runs
//! — the opposite trade from the data stack. Chunks are carved from
//! fixed-capacity chunkers in strict LIFO order, so pushing a frame's
//! arguments is a bump and dropping them is a truncate, amortized over
//! many small frames.
//!
//! A chunk is addressed through an opaque handle; its cells are reachable
//! only via the allocator, and stay at stable positions from push to the
//! matching drop. Dropping out of order is a programmer error and is
//! debug-asserted. Policy mirrors the frame nesting it serves:
//!
//! - carve in the top chunker when it has room;
//! - otherwise reuse the spare chunker if large enough, else allocate one
//!   sized to at least twice the request;
//! - on dropping a chunk at offset 0, keep its just-emptied chunker as the
//!   single spare and free anything beyond it.

use crate::value::Value;

/// Default cell payload of one chunker.
pub const CHUNKER_PAYLOAD: usize = 2048;

const TRASH: Value = Value::Unset;

/// Opaque handle to a pushed chunk. Identity is the chunk's position in
/// the LIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk(usize);

struct Chunker {
    cells: Vec<Value>,
    cap: usize,
}

impl Chunker {
    fn new(cap: usize) -> Self {
        Chunker {
            cells: Vec::with_capacity(cap),
            cap,
        }
    }

    fn room(&self) -> usize {
        self.cap - self.cells.len()
    }
}

struct ChunkInfo {
    chunker: usize,
    start: usize,
    len: usize,
}

pub struct ChunkStack {
    chunkers: Vec<Chunker>,
    chunks: Vec<ChunkInfo>,
    top_chunker: usize,
}

impl ChunkStack {
    pub fn new() -> Self {
        // One chunker is always resident so push never starts from nothing.
        ChunkStack {
            chunkers: vec![Chunker::new(CHUNKER_PAYLOAD)],
            chunks: Vec::new(),
            top_chunker: 0,
        }
    }

    /// Push an `n`-cell chunk and return its handle. Cells start as the
    /// trash-safe placeholder; the caller populates them.
    pub fn push_chunk(&mut self, n: usize) -> Chunk {
        let t = self.top_chunker;
        let start = if self.chunkers[t].room() >= n {
            self.chunkers[t].cells.len()
        } else {
            // Top chunker is full for this request. Reuse the spare if it
            // is big enough, else replace it with one sized to the demand.
            let reuse = self
                .chunkers
                .get(t + 1)
                .is_some_and(|spare| spare.cap >= n);
            if !reuse {
                self.chunkers.truncate(t + 1);
                self.chunkers
                    .push(Chunker::new(CHUNKER_PAYLOAD.max(n * 2)));
            }
            self.top_chunker = t + 1;
            0
        };
        let chunker = self.top_chunker;
        self.chunkers[chunker]
            .cells
            .resize(start + n, TRASH);
        self.chunks.push(ChunkInfo {
            chunker,
            start,
            len: n,
        });
        Chunk(self.chunks.len() - 1)
    }

    /// Drop the top chunk. The handle is cross-checked against the top of
    /// the LIFO order.
    pub fn drop_chunk(&mut self, chunk: Chunk) {
        debug_assert_eq!(
            chunk.0,
            self.chunks.len().wrapping_sub(1),
            "chunk dropped out of LIFO order"
        );
        self.drop_top_chunk();
    }

    /// Bulk restore to a saved `top_count` (trap unwinding).
    pub fn drop_to(&mut self, count: usize) {
        debug_assert!(count <= self.chunks.len());
        while self.chunks.len() > count {
            self.drop_top_chunk();
        }
    }

    fn drop_top_chunk(&mut self) {
        let info = self
            .chunks
            .pop()
            .expect("drop on empty chunk stack");
        self.chunkers[info.chunker].cells.truncate(info.start);
        if info.start == 0 {
            // This chunk sat at the head of its chunker: the chunker is now
            // empty and becomes the one spare; free anything beyond it.
            self.chunkers.truncate(info.chunker + 1);
        }
        self.top_chunker = self.chunks.last().map_or(0, |c| c.chunker);
    }

    /// Identity of the top chunk position; equal counts mean an identical
    /// chunk stack (the balance invariant).
    pub fn top_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_len(&self, chunk: Chunk) -> usize {
        self.chunks[chunk.0].len
    }

    pub fn cell(&self, chunk: Chunk, i: usize) -> &Value {
        let info = &self.chunks[chunk.0];
        debug_assert!(i < info.len);
        &self.chunkers[info.chunker].cells[info.start + i]
    }

    pub fn cell_mut(&mut self, chunk: Chunk, i: usize) -> &mut Value {
        let info = &self.chunks[chunk.0];
        debug_assert!(i < info.len);
        &mut self.chunkers[info.chunker].cells[info.start + i]
    }

    pub fn cells(&self, chunk: Chunk) -> &[Value] {
        let info = &self.chunks[chunk.0];
        &self.chunkers[info.chunker].cells[info.start..info.start + info.len]
    }

    pub fn chunker_count(&self) -> usize {
        self.chunkers.len()
    }

    /// Cells currently carved out across all chunkers.
    pub fn cells_in_use(&self) -> usize {
        self.chunkers.iter().map(|c| c.cells.len()).sum()
    }
}

impl Default for ChunkStack {
    fn default() -> Self {
        ChunkStack::new()
    }
}
