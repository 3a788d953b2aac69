//! # Disk Block Buffer Cache
//!
//! Keeps recently used disk blocks in memory and serializes access to each
//! block: at most one buffer ever represents a given `(dev, blockno)`, and
//! only one task at a time may look at or change its content.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 read(dev, blockno)
//!                        │ hash
//! ┌──────────────────────▼───────────────────────────────┐
//! │ bucket 0   bucket 1   ...   bucket NBUCKET-1         │  one SpinLock each
//! │   │          │                  │                    │
//! │  slot ─▶ slot   slot             slot ─▶ slot         │  chains of slot indices
//! ├──────────────────────────────────────────────────────┤
//! │ evict: SpinLock<()>  (one miss handler at a time)    │
//! ├──────────────────────────────────────────────────────┤
//! │ slot: dev, blockno, refcnt, last_use │ SleepLock<BufData>
//! └──────────────────────────────────────┬───────────────┘
//!                                        │ BlockDevice
//!                                        ▼
//!                                      disk
//! ```
//!
//! * **Hits** lock only the block's bucket, take a reference and then wait
//!   for the buffer's content lock.
//! * **Misses** take the global eviction lock, look at the bucket once more
//!   (another core may have loaded the block meanwhile) and otherwise recycle
//!   the unreferenced buffer with the oldest release time, cache-wide.
//! * **Release** drops the content lock, then the reference. The last
//!   reference stamps the buffer with the current [`Clock`] tick.
//!
//! Buffers are never written back on eviction. Whoever modifies a buffer
//! writes it with [`Buf::write`] before releasing it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kernel_bcache::{Bcache, BcacheConfig};
//!
//! let bcache = Bcache::new(BcacheConfig::default(), virtio_disk, cpus, ticks)?;
//!
//! let mut buf = bcache.read(ROOTDEV, 33);
//! buf.data_mut()[0] = 0xFF;
//! buf.write();
//! buf.release();
//! ```
//!
//! ## Requirements
//!
//! The crate is `no_std` but uses `alloc`: the buffers and the bucket heads
//! are heap allocations sized in [`Bcache::new`]. The embedding kernel must
//! register a `#[global_allocator]` before calling it.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod bcache;
mod buf;
mod device;

pub use bcache::{Bcache, BcacheConfig, BcacheError};
pub use buf::{Buf, BufData};
pub use device::{BlockDevice, Clock};
