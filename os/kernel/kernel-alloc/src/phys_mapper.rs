//! # Physical memory access
//!
//! The page allocator has to write into the pages it manages (junk fills),
//! but code can only dereference virtual addresses. A [`PhysMapper`] turns a
//! physical address into a pointer in the current address space.
//!
//! ## Mapping strategies
//! - **Identity**: the kernel runs with RAM mapped at `va == pa`
//!   ([`DirectMapper::IDENTITY`]).
//! - **Direct map**: all of RAM is visible at a fixed offset such as a
//!   higher-half direct map ([`DirectMapper::with_offset`]).

use crate::PhysAddr;

/// Converts physical addresses into pointers the kernel can dereference.
pub trait PhysMapper {
    /// Pointer through which the byte at `pa` can be read and written.
    fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8;
}

/// [`PhysMapper`] for memory that is mapped linearly: `va = pa + offset`.
///
/// # Validity
/// The mapping must be present and writable for every physical address the
/// owner of this mapper dereferences.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DirectMapper {
    offset: usize,
}

impl DirectMapper {
    /// Physical addresses are valid virtual addresses.
    pub const IDENTITY: Self = Self { offset: 0 };

    /// RAM is visible at `offset + pa`.
    #[must_use]
    pub const fn with_offset(offset: usize) -> Self {
        Self { offset }
    }
}

impl PhysMapper for DirectMapper {
    fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(pa.as_usize().wrapping_add(self.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_added_to_the_physical_address() {
        let pa = PhysAddr::new(0x2000);
        assert_eq!(DirectMapper::IDENTITY.phys_to_ptr(pa).addr(), 0x2000);
        assert_eq!(DirectMapper::with_offset(0x1000).phys_to_ptr(pa).addr(), 0x3000);
        assert_eq!(DirectMapper::with_offset(0), DirectMapper::IDENTITY);
    }
}
