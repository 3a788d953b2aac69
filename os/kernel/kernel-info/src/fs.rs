//! # Block Layer Geometry

/// Size of one disk block (and of one cache buffer) in bytes.
pub const BSIZE: usize = 1024;

/// Max number of blocks any file-system operation writes.
pub const MAXOPBLOCKS: usize = 10;

/// Number of buffers in the disk block cache.
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// Number of hash buckets the cache spreads its buffers over.
///
/// Prime, so that consecutive block numbers land in different buckets.
pub const NBUCKET: usize = 13;

const _: () = {
    assert!(BSIZE.is_power_of_two());
    assert!(NBUF >= MAXOPBLOCKS);
    assert!(NBUCKET > 0);
};
