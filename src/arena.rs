//! Fixed-size byte budget backing every record and list node the buffer
//! allocates in memory mode.
//!
//! The budget is enforced against a real anonymous memory mapping reserved
//! once at construction time, so an oversized configuration fails fast at
//! startup instead of quietly degrading later. The mapping itself is never
//! read from or written to: record bytes live in ordinary Rust containers
//! (see `src/list.rs`); the arena's only job is to be a capacity oracle.

use memmap2::{MmapMut, MmapOptions};

use crate::error::BufferError;

pub struct Arena {
    _region: MmapMut,
    total: usize,
    used: usize,
}

impl Arena {
    /// Reserves `size` bytes, rounded up to a page-size multiple, from the
    /// OS. Fails if the mapping cannot be created (out of address space or
    /// the kernel refuses the reservation) -- this is the "fatal at
    /// startup" path callers are expected to surface as an init error.
    pub fn new(size: usize) -> Result<Self, BufferError> {
        let page = page_size::get();
        let rounded = size.div_ceil(page).max(1) * page;
        let region = MmapOptions::new()
            .len(rounded)
            .map_anon()
            .map_err(|e| BufferError::DbDown(format!("arena reservation failed: {e}")))?;
        Ok(Arena {
            _region: region,
            total: rounded,
            used: 0,
        })
    }

    pub fn total_size(&self) -> usize {
        self.total
    }

    pub fn free_size(&self) -> usize {
        self.total - self.used
    }

    pub fn used_size(&self) -> usize {
        self.used
    }

    /// Charges `size` bytes against the budget. Returns `NoMemory` without
    /// side effects if the budget would be exceeded.
    pub fn try_reserve(&mut self, size: usize) -> Result<(), BufferError> {
        if size > self.free_size() {
            return Err(BufferError::NoMemory);
        }
        self.used += size;
        Ok(())
    }

    /// Returns `size` bytes to the budget. `size` must not exceed the
    /// amount currently in use; callers only ever release what they
    /// reserved.
    pub fn release(&mut self, size: usize) {
        debug_assert!(size <= self.used, "releasing more than was reserved");
        self.used = self.used.saturating_sub(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_page_size() {
        let arena = Arena::new(1).unwrap();
        assert_eq!(arena.total_size(), page_size::get());
        assert_eq!(arena.free_size(), arena.total_size());
    }

    #[test]
    fn reserve_and_release_roundtrip() {
        let mut arena = Arena::new(4096).unwrap();
        let total = arena.total_size();
        arena.try_reserve(100).unwrap();
        assert_eq!(arena.used_size(), 100);
        assert_eq!(arena.free_size(), total - 100);
        arena.release(100);
        assert_eq!(arena.used_size(), 0);
        assert_eq!(arena.free_size(), total);
    }

    #[test]
    fn reserve_beyond_budget_fails() {
        let mut arena = Arena::new(page_size::get()).unwrap();
        let total = arena.total_size();
        assert!(arena.try_reserve(total + 1).is_err());
        assert_eq!(arena.used_size(), 0);
    }
}
