//! Interaction with physical memory.
//!
//! The kernel hands out physical pages through a single, global
//! [`BuddyPool`] that is protected by a spinlock. The kernel has to tell the
//! allocator where the free physical memory starts using [`init`], the pool
//! itself is set up lazily when the first pages are requested.

pub mod buddy;
pub use buddy::{BuddyPool, NodeState};

use crate::{
    addr::PhysAddr,
    unit::{self, KIB},
};
use core::fmt;
use displaydoc_lite::displaydoc;
use spin::{Mutex, Once};

/// The size of a single page in memory.
///
/// This is also the size of a leaf inside the buddy allocator.
pub const PAGE_SIZE: usize = 4 * KIB;

/// The order of the kernel's physical memory pool,
/// which manages `2^POOL_ORDER` pages (16 MiB).
pub const POOL_ORDER: u32 = 12;

/// The buddy pool that holds the physical memory of the kernel.
pub type KernelPool = BuddyPool<{ buddy::nodes_for_order(POOL_ORDER) }>;

/// Result for every memory allocation operation.
pub type Result<T, E = Error> = core::result::Result<T, E>;

displaydoc! {
    /// Any error that can happen while allocating or deallocating memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// tried to allocate, but there was no free block left that is large enough.
        NoMemoryAvailable,
        /// tried to use the allocator before the start of free memory was known.
        Uninitialized,
        /// the allocator was already initialized.
        AlreadyInitialized,
        /// the memory pool does not fit into the address space.
        InvalidRegion,
        /// the address {_0} is not inside the memory pool.
        AddressOutOfRange(PhysAddr),
        /// the address {_0} is not aligned to the page size.
        Misaligned(PhysAddr),
        /// tried to release {_0}, but its node is split.
        SplitNodeRelease(PhysAddr),
        /// the allocator found an inconsistency and refuses to be used.
        Poisoned,
        /// node {_0} of the buddy tree disagrees with its children.
        Corrupted(usize),
    }
}

/// Statistics for a memory allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// The name of the allocator that collected these stats.
    pub name: &'static str,
    /// The number of bytes that are currently handed out.
    pub allocated: usize,
    /// The number of bytes that are left for allocation.
    pub free: usize,
    /// The total number of bytes that this allocator has available for allocation.
    pub total: usize,
}

impl AllocStats {
    /// Create a new [`AllocStats`] instance for the given allocator name.
    pub const fn with_name(name: &'static str) -> Self {
        Self {
            name,
            free: 0,
            allocated: 0,
            total: 0,
        }
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nAllocated: {}", unit::bytes(self.allocated))?;
        writeln!(f, "Free: {}", unit::bytes(self.free))?;
        writeln!(f, "Total: {}", unit::bytes(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)?;
        Ok(())
    }
}

static PHYS_MEM_ALLOCATOR: GlobalAllocator = GlobalAllocator::new();

/// The central allocator that is responsible for allocating physical memory.
///
/// Every access to the pool goes through one lock.
pub struct GlobalAllocator {
    pool: Mutex<KernelPool>,
    memory_start: Once<PhysAddr>,
}

impl GlobalAllocator {
    /// Create a new allocator that doesn't know its memory yet.
    pub const fn new() -> Self {
        Self {
            pool: Mutex::new(KernelPool::new()),
            memory_start: Once::new(),
        }
    }

    /// Remember `memory_start` as the first physical address that is free to use.
    ///
    /// The pool is placed there when the first pages are allocated.
    pub fn init(&self, memory_start: PhysAddr) -> Result<()> {
        let mut fresh = false;
        self.memory_start.call_once(|| {
            fresh = true;
            memory_start
        });

        if fresh {
            log::debug!("Free physical memory starts at {}", memory_start);
            Ok(())
        } else {
            Err(Error::AlreadyInitialized)
        }
    }

    /// Allocate a single page of physical memory.
    pub fn alloc(&self) -> Result<PhysAddr> {
        self.alloc_pages(1)
    }

    /// Allocate `count` contiguous pages of physical memory.
    ///
    /// The number of pages is rounded up to the next power of two.
    pub fn alloc_pages(&self, count: usize) -> Result<PhysAddr> {
        let mut pool = self.pool.lock();

        if !pool.is_initialized() {
            let start = self.memory_start.get().copied().ok_or(Error::Uninitialized)?;
            pool.initialize(start)?;
        }

        pool.allocate(count)
    }

    /// Return the pages starting at `addr` to the allocator.
    pub fn free_pages(&self, addr: PhysAddr) -> Result<()> {
        self.pool.lock().free(addr)
    }

    /// Return the statistics for this allocator.
    pub fn stats(&self) -> AllocStats {
        self.pool.lock().stats()
    }
}

impl Default for GlobalAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Return a reference to the global allocator for physical memory.
pub fn allocator() -> &'static GlobalAllocator {
    &PHYS_MEM_ALLOCATOR
}

/// Tell the global allocator where free physical memory starts.
pub fn init(memory_start: PhysAddr) -> Result<()> {
    allocator().init(memory_start)
}

/// Initialize the global allocator with the memory after the kernel image.
#[cfg(target_os = "none")]
pub fn init_after_kernel() -> Result<()> {
    init(crate::arch::kernel_end().to_phys())
}

/// Allocate a single page of physical memory.
pub fn alloc_page() -> Result<PhysAddr> {
    allocator().alloc()
}

/// Allocate multiple contiguous pages of physical memory.
pub fn alloc_pages(count: usize) -> Result<PhysAddr> {
    allocator().alloc_pages(count)
}

/// Release the pages that were allocated at `addr`.
pub fn free_pages(addr: PhysAddr) -> Result<()> {
    allocator().free_pages(addr)
}

/// Return the statistics for the physical memory allocator.
pub fn alloc_stats() -> AllocStats {
    allocator().stats()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let text = format!("{}", Error::Misaligned(PhysAddr::new(0x8000_0010)));
        assert!(text.contains("0x80000010"));
        assert!(text.contains("not aligned"));

        let text = format!("{}", Error::Corrupted(7));
        assert!(text.contains("node 7"));
    }

    #[test]
    fn lazy_initialization() {
        let alloc = GlobalAllocator::new();
        assert_eq!(alloc.alloc(), Err(Error::Uninitialized));

        alloc.init(PhysAddr::new(0x8040_0000)).unwrap();
        assert_eq!(
            alloc.init(PhysAddr::new(0x8080_0000)),
            Err(Error::AlreadyInitialized)
        );
        assert_eq!(alloc.stats().total, 0);

        assert_eq!(alloc.alloc(), Ok(PhysAddr::new(0x8040_0000)));
        assert_eq!(alloc.stats().total, 16 * unit::MIB);
        assert_eq!(alloc.stats().allocated, PAGE_SIZE);
    }

    #[test]
    fn stats_display() {
        let mut stats = AllocStats::with_name("Pool");
        stats.total = 16 * unit::MIB;
        stats.free = 16 * unit::MIB - 8 * KIB;
        stats.allocated = 8 * KIB;

        let text = format!("{}", stats);
        assert!(text.starts_with("Pool\n~~~~\n"));
        assert!(text.contains("Allocated: 8.00 KiB\n"));
        assert!(text.contains("Total: 16.00 MiB\n"));
    }
}
