//! # Kernel Configuration
//!
//! Compile-time constants shared by the memory-management core of the
//! kernel: the physical page allocator and the disk block buffer cache.
//! Every subsystem that sizes a table, a free list or a lock array reads its
//! numbers from here, so the values cannot drift between crates.
//!
//! ## Overview
//!
//! ### Physical Memory ([`memory`])
//! * **Page geometry**: [`PAGE_SIZE`](memory::PAGE_SIZE) and rounding helpers
//! * **Managed range**: RAM from the end of the kernel image up to
//!   [`PHYSTOP`](memory::PHYSTOP)
//! * **Per-core lists**: [`NCPU`](memory::NCPU) free lists and the
//!   [`STEAL_BATCH`](memory::STEAL_BATCH) cap for cross-core stealing
//! * **Debug markers**: fill bytes written on free and on allocation
//!
//! ### Block Layer ([`fs`])
//! * **Block size**: [`BSIZE`](fs::BSIZE)
//! * **Cache geometry**: [`NBUF`](fs::NBUF) buffers hashed into
//!   [`NBUCKET`](fs::NBUCKET) buckets
//!
//! ```text
//! Physical Memory Layout:
//! KERNBASE    ┌─────────────────────────────────┐ 0x8000_0000
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//! end         ├─────────────────────────────────┤ (linker symbol)
//!             │    Available RAM                │
//!             │  (Managed by page allocator)    │
//! PHYSTOP     └─────────────────────────────────┘ KERNBASE + 128 MiB
//! ```
//!
//! All values are `const` and validated by compile-time assertions; runtime
//! geometry (e.g. a smaller cache in tests) is injected at construction time
//! by the consuming crates.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod fs;
pub mod memory;
