// SPDX-License-Identifier: MPL-2.0

use core::ops::Range;

use readalias_kmod::{PAGE_SIZE, Paddr, mm::page_offset};

/// A piece of a physical range that lies within one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Chunk {
    /// The first physical address of the piece.
    pub pa: Paddr,
    /// The position of the piece within the whole range.
    pub range: Range<usize>,
}

/// Splits `[pa, pa + count)` into page-bounded chunks.
///
/// The first chunk runs up to the end of the first page. Every later chunk
/// starts on a page boundary and covers up to a full page.
pub(crate) struct PageChunks {
    pa: Paddr,
    done: usize,
    count: usize,
}

impl PageChunks {
    pub(crate) fn new(pa: Paddr, count: usize) -> Self {
        Self { pa, done: 0, count }
    }
}

impl Iterator for PageChunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let remaining = self.count - self.done;
        if remaining == 0 {
            return None;
        }

        let len = remaining.min(PAGE_SIZE - page_offset(self.pa));
        let chunk = Chunk {
            pa: self.pa,
            range: self.done..self.done + len,
        };

        self.pa = self.pa.wrapping_add(len as u64);
        self.done += len;
        Some(chunk)
    }
}
