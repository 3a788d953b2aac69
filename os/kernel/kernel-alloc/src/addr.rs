use core::fmt;
use kernel_info::memory::{PAGE_SIZE, page_round_down, page_round_up};

/// A physical memory address.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysAddr(usize);

impl PhysAddr {
    #[inline]
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.is_multiple_of(PAGE_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn page_round_up(self) -> Self {
        Self(page_round_up(self.0))
    }

    #[inline]
    #[must_use]
    pub const fn page_round_down(self) -> Self {
        Self(page_round_down(self.0))
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_stays_within_the_page() {
        let pa = PhysAddr::new(3 * PAGE_SIZE + 17);
        assert_eq!(pa.page_round_down(), PhysAddr::new(3 * PAGE_SIZE));
        assert_eq!(pa.page_round_up(), PhysAddr::new(4 * PAGE_SIZE));
        assert!(pa.page_round_down().is_page_aligned());

        let aligned = PhysAddr::new(5 * PAGE_SIZE);
        assert_eq!(aligned.page_round_down(), aligned);
        assert_eq!(aligned.page_round_up(), aligned);
    }
}
