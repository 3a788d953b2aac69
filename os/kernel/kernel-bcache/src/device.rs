//! # Collaborators
//!
//! The cache does not talk to hardware or timers itself. The embedding kernel
//! hands it a [`BlockDevice`] (usually the virtio disk driver) and a
//! [`Clock`] (usually the timer-interrupt tick counter).

use crate::BufData;

/// Synchronous block storage.
///
/// Both calls return only once the transfer has completed. A device that
/// cannot complete a transfer is expected to halt the kernel itself; the
/// cache treats every transfer as successful.
pub trait BlockDevice {
    /// Fills `data` with block `blockno` of device `dev`.
    fn read_block(&self, dev: u32, blockno: u32, data: &mut BufData);

    /// Stores `data` as block `blockno` of device `dev`.
    fn write_block(&self, dev: u32, blockno: u32, data: &BufData);
}

/// Logical time used to rank eviction candidates.
pub trait Clock {
    /// Current tick count; never decreases.
    fn ticks(&self) -> u64;
}
