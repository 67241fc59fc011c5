//! Drives the global allocator through the kernel facing functions.
//!
//! The allocator is a process wide singleton, so everything happens inside
//! a single test.

use windy_pmem::{
    pmem::{self, Error, PAGE_SIZE},
    PhysAddr,
};

#[test]
fn global_allocator_lifecycle() {
    assert_eq!(pmem::alloc_page(), Err(Error::Uninitialized));
    assert_eq!(pmem::free_pages(PhysAddr::new(0x8020_0000)), Err(Error::Uninitialized));

    // the first free address is not page aligned
    pmem::init(PhysAddr::new(0x8020_0123)).unwrap();
    assert_eq!(pmem::init(PhysAddr::new(0x8030_0000)), Err(Error::AlreadyInitialized));

    let base = 0x8020_1000;
    let page = pmem::alloc_page().unwrap();
    assert_eq!(page, PhysAddr::new(base));

    // the first four pages are split by the single page, so the block starts at page 4
    let block = pmem::alloc_pages(3).unwrap();
    assert_eq!(block, PhysAddr::new(base + 4 * PAGE_SIZE));
    assert_eq!(pmem::alloc_stats().allocated, 5 * PAGE_SIZE);

    assert_eq!(pmem::alloc_pages(4097), Err(Error::NoMemoryAvailable));

    pmem::free_pages(page).unwrap();
    pmem::free_pages(block).unwrap();

    let stats = pmem::alloc_stats();
    assert_eq!(stats.allocated, 0);
    assert_eq!(stats.free, stats.total);

    // after everything was merged again, the whole pool is available
    assert_eq!(pmem::alloc_pages(4096), Ok(PhysAddr::new(base)));
}
