use kernel_alloc::{DirectMapper, PageAllocError, PageAllocator, PhysAddr, PhysMapper};
use kernel_info::memory::{ALLOC_JUNK, FREE_JUNK, PAGE_SIZE, STEAL_BATCH};
use kernel_sync::hosted::HostCpu;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE]);

/// Page-aligned host memory standing in for physical RAM.
struct TestRam {
    frames: Vec<Frame>,
}

impl TestRam {
    fn new(pages: usize) -> Self {
        let frames = (0..pages).map(|_| Frame([0; PAGE_SIZE])).collect();
        Self { frames }
    }

    fn start(&mut self) -> PhysAddr {
        PhysAddr::new(self.frames.as_mut_ptr().expose_provenance())
    }

    fn end(&mut self) -> PhysAddr {
        PhysAddr::new(self.start().as_usize() + self.frames.len() * PAGE_SIZE)
    }
}

type Kmem = PageAllocator<HostCpu, DirectMapper>;

/// Builds an allocator over `ram` from the calling thread, bound to core 0.
fn kinit(ram: &mut TestRam, ncpu: usize) -> Kmem {
    HostCpu::bind(0);
    unsafe { PageAllocator::new(HostCpu, DirectMapper::IDENTITY, ncpu, ram.start(), ram.end()) }
        .expect("valid test range")
}

fn page_bytes(kmem: &Kmem, pa: PhysAddr) -> &[u8] {
    unsafe { std::slice::from_raw_parts(kmem.mapper().phys_to_ptr(pa), PAGE_SIZE) }
}

fn all_free_pages(kmem: &Kmem) -> Vec<PhysAddr> {
    (0..kmem.cores()).flat_map(|core| kmem.snapshot(core)).collect()
}

#[test]
fn init_puts_every_page_on_the_calling_core() {
    let mut ram = TestRam::new(8);
    let kmem = kinit(&mut ram, 3);

    assert_eq!(kmem.page_count(), 8);
    assert_eq!(kmem.free_pages_on(0), 8);
    assert_eq!(kmem.free_pages_on(1), 0);
    assert_eq!(kmem.free_pages_on(2), 0);
    assert_eq!(kmem.free_pages(), 8);

    for pa in kmem.snapshot(0) {
        assert!(page_bytes(&kmem, pa).iter().all(|&b| b == FREE_JUNK));
    }
}

#[test]
fn unaligned_start_is_rounded_up() {
    let mut ram = TestRam::new(4);
    let start = PhysAddr::new(ram.start().as_usize() + 1);
    let end = ram.end();

    HostCpu::bind(0);
    let kmem = unsafe { PageAllocator::new(HostCpu, DirectMapper::IDENTITY, 1, start, end) }
        .expect("three whole pages remain");

    assert_eq!(kmem.page_count(), 3);
    assert!(!kmem.contains(ram.start()));
    assert!(kmem.contains(start.page_round_up()));
}

#[test]
fn rejects_bad_configuration() {
    let mut ram = TestRam::new(1);
    let (start, end) = (ram.start(), ram.end());
    HostCpu::bind(0);

    let err = unsafe { PageAllocator::new(HostCpu, DirectMapper::IDENTITY, 0, start, end) }
        .err()
        .expect("zero cores");
    assert_eq!(err, PageAllocError::NoCores);

    let err = unsafe { PageAllocator::new(HostCpu, DirectMapper::IDENTITY, 99, start, end) }
        .err()
        .expect("too many cores");
    assert!(matches!(err, PageAllocError::TooManyCores { ncpu: 99, .. }));

    let short = PhysAddr::new(start.as_usize() + PAGE_SIZE - 1);
    let err = unsafe { PageAllocator::new(HostCpu, DirectMapper::IDENTITY, 1, start, short) }
        .err()
        .expect("no whole page");
    assert_eq!(err, PageAllocError::EmptyRange { start, end: short });
}

#[test]
fn alloc_and_free_fill_junk() {
    let mut ram = TestRam::new(2);
    let kmem = kinit(&mut ram, 1);

    let pa = kmem.alloc().expect("free page");
    assert!(kmem.contains(pa));
    assert!(pa.is_page_aligned());
    assert!(page_bytes(&kmem, pa).iter().all(|&b| b == ALLOC_JUNK));

    unsafe { kmem.mapper().phys_to_ptr(pa).write_bytes(0xAB, PAGE_SIZE) };
    kmem.free(pa);
    assert!(page_bytes(&kmem, pa).iter().all(|&b| b == FREE_JUNK));
    assert_eq!(kmem.free_pages(), 2);
}

#[test]
fn free_goes_to_the_freeing_core() {
    let mut ram = TestRam::new(4);
    let kmem = kinit(&mut ram, 2);
    let pa = kmem.alloc().expect("free page");

    thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(1);
            kmem.free(pa);
        });
    });

    assert_eq!(kmem.snapshot(1), vec![pa]);
    assert_eq!(kmem.free_pages_on(0), 3);
}

#[test]
fn exhaustion_returns_none_until_a_page_comes_back() {
    let mut ram = TestRam::new(3);
    let kmem = kinit(&mut ram, 1);

    let pages: Vec<_> = (0..3).map(|_| kmem.alloc().expect("free page")).collect();
    let distinct: HashSet<_> = pages.iter().copied().collect();
    assert_eq!(distinct.len(), 3);

    assert_eq!(kmem.alloc(), None);
    assert_eq!(kmem.free_pages(), 0);

    kmem.free(pages[1]);
    assert_eq!(kmem.alloc(), Some(pages[1]));
    assert_eq!(kmem.alloc(), None);
}

#[test]
fn empty_core_steals_from_others() {
    let mut ram = TestRam::new(10);
    let kmem = kinit(&mut ram, 2);

    let pa = thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(1);
            kmem.alloc()
        })
        .join()
        .expect("stealing thread")
    })
    .expect("a page can be stolen");

    // everything fit under the batch limit: core 0 gave all it had
    assert_eq!(kmem.free_pages(), 9);
    assert_eq!(kmem.free_pages_on(0), 0);
    assert_eq!(kmem.free_pages_on(1), 9);

    let free = all_free_pages(&kmem);
    let distinct: HashSet<_> = free.iter().copied().collect();
    assert_eq!(distinct.len(), free.len());
    assert!(!distinct.contains(&pa));
}

#[test]
fn steal_is_capped_per_attempt() {
    let total = STEAL_BATCH + 36;
    let mut ram = TestRam::new(total);
    let kmem = kinit(&mut ram, 2);

    thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(1);
            assert!(kmem.alloc().is_some());
        });
    });

    assert_eq!(kmem.free_pages_on(1), STEAL_BATCH - 1);
    assert_eq!(kmem.free_pages_on(0), total - STEAL_BATCH);
    assert_eq!(kmem.free_pages(), total - 1);
}

#[test]
fn steal_visits_several_cores() {
    let mut ram = TestRam::new(6);
    let kmem = kinit(&mut ram, 3);

    // move two pages to core 1 so the thief has to look at both others
    let moved = [kmem.alloc().expect("page"), kmem.alloc().expect("page")];
    thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(1);
            moved.iter().for_each(|&pa| kmem.free(pa));
        });
    });
    assert_eq!(kmem.free_pages_on(0), 4);
    assert_eq!(kmem.free_pages_on(1), 2);

    let taken = thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(2);
            kmem.alloc()
        })
        .join()
        .expect("stealing thread")
    });

    assert!(taken.is_some());
    assert_eq!(kmem.free_pages_on(0), 0);
    assert_eq!(kmem.free_pages_on(1), 0);
    assert_eq!(kmem.free_pages_on(2), 5);
}

#[test]
fn steal_with_nothing_anywhere_is_out_of_memory() {
    let mut ram = TestRam::new(1);
    let kmem = kinit(&mut ram, 2);
    let held = kmem.alloc().expect("the only page");

    let stolen = thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(1);
            kmem.alloc()
        })
        .join()
        .expect("stealing thread")
    });

    assert_eq!(stolen, None);
    kmem.free(held);
    assert_eq!(kmem.free_pages(), 1);
}

#[test]
#[should_panic(expected = "kfree")]
fn freeing_an_unaligned_address_panics() {
    let mut ram = TestRam::new(2);
    let kmem = kinit(&mut ram, 1);
    let pa = kmem.alloc().expect("free page");
    kmem.free(PhysAddr::new(pa.as_usize() + 8));
}

#[test]
#[should_panic(expected = "kfree")]
fn freeing_outside_the_range_panics() {
    let mut ram = TestRam::new(2);
    let end = ram.end();
    let kmem = kinit(&mut ram, 1);
    kmem.free(end);
}

#[test]
#[should_panic(expected = "freed twice")]
fn freeing_a_free_page_panics() {
    let mut ram = TestRam::new(2);
    let kmem = kinit(&mut ram, 1);
    let pa = kmem.alloc().expect("free page");
    kmem.free(pa);
    kmem.free(pa);
}

#[test]
fn rejected_double_free_leaves_the_lists_intact() {
    let mut ram = TestRam::new(4);
    let kmem = kinit(&mut ram, 1);

    let pa = kmem.alloc().expect("free page");
    kmem.free(pa);
    let second = panic::catch_unwind(AssertUnwindSafe(|| kmem.free(pa)));
    assert!(second.is_err());
    assert_eq!(kmem.free_pages(), kmem.page_count());

    let a = kmem.alloc().expect("free page");
    let b = kmem.alloc().expect("free page");
    assert_ne!(a, b);
    assert_eq!(kmem.free_pages(), 2);
}

#[test]
fn stolen_pages_still_count_as_free() {
    let mut ram = TestRam::new(2);
    let kmem = kinit(&mut ram, 2);
    let pages = kmem.snapshot(0);

    // core 1 steals both pages and keeps one on its own list
    let taken = thread::scope(|s| {
        s.spawn(|| {
            HostCpu::bind(1);
            kmem.alloc()
        })
        .join()
        .expect("stealing thread")
    })
    .expect("a page can be stolen");

    let left = *pages.iter().find(|&&pa| pa != taken).expect("other page");
    assert_eq!(kmem.snapshot(1), vec![left]);
    let again = panic::catch_unwind(AssertUnwindSafe(|| kmem.free(left)));
    assert!(again.is_err());

    kmem.free(taken);
    assert_eq!(kmem.free_pages(), 2);
}

#[test]
fn concurrent_alloc_free_never_hands_out_a_page_twice() {
    const CORES: usize = 4;
    const ROUNDS: usize = 200;
    const HELD: usize = 6;

    let mut ram = TestRam::new(CORES * HELD + 4);
    let kmem = Arc::new(kinit(&mut ram, CORES));
    let barrier = Arc::new(Barrier::new(CORES));

    let handles: Vec<_> = (0..CORES)
        .map(|core| {
            let kmem = Arc::clone(&kmem);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                HostCpu::bind(core);
                let tag = u8::try_from(0x10 + core).expect("small tag");
                barrier.wait();

                for _ in 0..ROUNDS {
                    let mut held = Vec::with_capacity(HELD);
                    for _ in 0..HELD {
                        if let Some(pa) = kmem.alloc() {
                            let ptr = kmem.mapper().phys_to_ptr(pa);
                            unsafe { ptr.write_bytes(tag, PAGE_SIZE) };
                            held.push(pa);
                        }
                    }
                    thread::yield_now();
                    for pa in held {
                        // nobody else may have touched a page we own
                        assert!(page_bytes(&kmem, pa).iter().all(|&b| b == tag));
                        kmem.free(pa);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread");
    }

    assert_eq!(kmem.free_pages(), kmem.page_count());
    let free = all_free_pages(&kmem);
    let distinct: HashSet<_> = free.iter().copied().collect();
    assert_eq!(distinct.len(), kmem.page_count());
}
