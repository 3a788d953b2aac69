//! # Physical Memory Layout

/// Size of one physical page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// log2([`PAGE_SIZE`]).
pub const PAGE_SHIFT: u32 = 12;

/// Where the kernel image is loaded; RAM below this address is not managed.
pub const KERNBASE: usize = 0x8000_0000;

/// First address past the end of usable RAM.
pub const PHYSTOP: usize = KERNBASE + 128 * 1024 * 1024;

/// Maximum number of cores; one free list (and lock) per core.
pub const NCPU: usize = 8;

/// Upper bound of pages moved from other cores during a single steal.
pub const STEAL_BATCH: usize = 64;

/// Byte written over a page when it is freed (dangling reference detector).
pub const FREE_JUNK: u8 = 0x01;

/// Byte written over a page when it is handed out (uninitialized use detector).
pub const ALLOC_JUNK: u8 = 0x05;

/// Round `addr` up to the next page boundary.
#[inline]
#[must_use]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Round `addr` down to its page boundary.
#[inline]
#[must_use]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(KERNBASE.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP > KERNBASE);
    assert!(NCPU > 0);
    assert!(STEAL_BATCH > 0);
    assert!(FREE_JUNK != ALLOC_JUNK);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(page_round_up(0), 0);
        assert_eq!(page_round_up(1), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round_down(PAGE_SIZE + 17), PAGE_SIZE);
    }
}
