//! Implementation of a Buddy Allocator that is responsible for allocating
//! the physical pages that will then be used by either the slab allocator
//! to allocate objects, or directly by the kernel.
//!
//! The state of the allocator lives inside an implicit, complete binary tree
//! that is stored in a fixed size array. Every node of the tree covers a
//! power-of-two number of pages, and records whether it is free, handed out
//! as a whole, or split into its two buddies. A split node additionally
//! remembers the largest free block inside its subtree, which allows the
//! allocation search to skip every subtree that is too full.

mod geometry;
mod node;

pub use geometry::nodes_for_order;
pub use node::NodeState;

use super::{AllocStats, Error, Result, PAGE_SIZE};
use crate::{
    addr::{align_up, PhysAddr},
    unit,
};
use core::cmp;

/// A buddy allocator that manages a pool of `2^ORDER` contiguous pages.
///
/// `NODES` is the length of the node array and must be `2^(ORDER + 1)`,
/// use [`nodes_for_order`] to calculate it.
pub struct BuddyPool<const NODES: usize> {
    nodes: [NodeState; NODES],
    base: PhysAddr,
    initialized: bool,
    poisoned: bool,
    stats: AllocStats,
}

impl<const NODES: usize> BuddyPool<NODES> {
    /// The order of this pool.
    pub const ORDER: u32 = {
        assert!(
            NODES.is_power_of_two() && NODES >= 2,
            "the node count of a buddy pool must be a power of two"
        );
        assert!(
            NODES.trailing_zeros() <= 32,
            "buddy pools are limited to 2^31 pages"
        );
        NODES.trailing_zeros() - 1
    };

    /// The number of pages managed by this pool.
    pub const PAGES: usize = 1 << Self::ORDER;

    /// Create a new, uninitialized buddy allocator.
    ///
    /// The pool can't be used before [`initialize`](Self::initialize) was called.
    pub const fn new() -> Self {
        Self {
            nodes: [NodeState::Free; NODES],
            base: PhysAddr::new(0),
            initialized: false,
            poisoned: false,
            stats: AllocStats::with_name("Buddy Allocator"),
        }
    }

    /// Marks every page of this pool as free and places the pool at the first
    /// page boundary at, or after, `memory_start`.
    ///
    /// `memory_start` is the first physical address that is not used by the kernel.
    pub fn initialize(&mut self, memory_start: PhysAddr) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized);
        }

        let size = Self::PAGES * PAGE_SIZE;
        let base = align_up(memory_start.as_usize(), PAGE_SIZE).ok_or(Error::InvalidRegion)?;
        let end = base.checked_add(size).ok_or(Error::InvalidRegion)?;

        self.nodes.iter_mut().for_each(|node| *node = NodeState::Free);
        self.base = PhysAddr::new(base);
        self.initialized = true;

        self.stats.total = size;
        self.stats.free = size;
        self.stats.allocated = 0;

        log::debug!(
            "Buddy Allocator manages {} at {:#X}..{:#X}",
            unit::bytes(size),
            base,
            end
        );
        Ok(())
    }

    /// Allocates a block of contiguous pages that can hold at least `count` pages.
    ///
    /// The number of pages is rounded up to the next power of two,
    /// a `count` of zero is treated like a single page.
    pub fn allocate(&mut self, count: usize) -> Result<PhysAddr> {
        self.check_usable()?;

        let need = geometry::pages_for_request(count).ok_or(Error::NoMemoryAvailable)?;
        let index = match self.alloc_node(1, need) {
            Some(index) => index,
            None => {
                log::trace!("No free block of {} pages left", need);
                return Err(Error::NoMemoryAvailable);
            }
        };

        let addr = self.address_of(index);
        self.alloc_stats(need * PAGE_SIZE);

        log::trace!("Allocated {} pages at {} for {} requested", need, addr, count);
        Ok(addr)
    }

    /// Searches the subtree at `index` for a free block of exactly `need` pages
    /// and marks it as allocated.
    ///
    /// Returns the index of the allocated node. The left child is always tried
    /// before the right one.
    fn alloc_node(&mut self, index: usize, need: usize) -> Option<usize> {
        let state = self.nodes[index];
        let capacity = state.capacity(self.block_size_of(index));

        // prune subtrees that don't contain a large enough block
        if capacity < need {
            return None;
        }

        // exact fit: hand out the whole node
        if capacity == need && !state.is_split() {
            self.nodes[index] = NodeState::Allocated;
            return Some(index);
        }

        if geometry::is_leaf(Self::ORDER, index) {
            return None;
        }

        // the node is either larger than required, or it was split before
        // and the block has to be found further down.
        let left = index * 2;
        let granted = match self.alloc_node(left, need) {
            Some(granted) => granted,
            None => self.alloc_node(left + 1, need)?,
        };

        self.update(index);
        Some(granted)
    }

    /// Releases the block that starts at `addr`.
    ///
    /// Releasing an address that isn't allocated leaves the pool untouched.
    /// If the tree turns out to be inconsistent, the pool is poisoned and
    /// refuses every further request.
    pub fn free(&mut self, addr: PhysAddr) -> Result<()> {
        self.check_usable()?;

        let offset = self.page_offset(addr)?;
        let index = self.resolve(geometry::index_of(Self::ORDER, offset));

        let state = self.nodes[index];
        match state {
            NodeState::Allocated => {
                let size = self.block_size_of(index) * PAGE_SIZE;
                self.release(index);
                self.dealloc_stats(size);

                log::trace!("Released {} pages at {}", size / PAGE_SIZE, addr);
                Ok(())
            }
            NodeState::Free => {
                log::warn!("Ignoring release of {}, it is not allocated", addr);
                Ok(())
            }
            NodeState::Split { .. } => {
                log::error!(
                    "Tried to release {}, but node {} is split. The buddy tree is corrupted.",
                    addr,
                    index
                );
                self.poisoned = true;
                Err(Error::SplitNodeRelease(addr))
            }
        }
    }

    /// Marks the node at `index` as free and merges all buddies on the way
    /// up to the root.
    fn release(&mut self, index: usize) {
        self.nodes[index] = NodeState::Free;

        let mut parent = index / 2;
        while parent >= 1 {
            self.update(parent);
            parent /= 2;
        }
    }

    /// Recomputes the state of the node at `index` from its two children.
    ///
    /// Two free buddies are merged back into a free parent, otherwise the parent
    /// is split and records the largest block of its children.
    fn update(&mut self, index: usize) {
        let (left, right) = (index * 2, index * 2 + 1);

        self.nodes[index] = match (self.nodes[left], self.nodes[right]) {
            (NodeState::Free, NodeState::Free) => NodeState::Free,
            _ => {
                let largest = cmp::max(self.capacity(left), self.capacity(right));
                NodeState::Split {
                    largest: largest as u32,
                }
            }
        };
    }

    /// Walks down the chain of left children starting at the coarsest node
    /// for an address, until it reaches the node that is not split.
    ///
    /// Every node on this chain starts at the same page, so the block that was
    /// handed out for that page is the first node that isn't split.
    fn resolve(&self, mut index: usize) -> usize {
        while self.nodes[index].is_split() && !geometry::is_leaf(Self::ORDER, index) {
            index *= 2;
        }
        index
    }

    /// Returns the index of the node that the block starting at `addr` belongs to.
    ///
    /// For a block handed out by [`allocate`](Self::allocate) this is exactly
    /// the node that was allocated.
    pub fn index_of(&self, addr: PhysAddr) -> Result<usize> {
        let offset = self.page_offset(addr)?;
        let index = self.resolve(geometry::index_of(Self::ORDER, offset));

        if self.nodes[index].is_split() {
            return Err(Error::Corrupted(index));
        }
        Ok(index)
    }

    /// Returns the physical address of the first page covered by `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not inside `1..NODES`.
    pub fn address_of(&self, index: usize) -> PhysAddr {
        assert!(index >= 1 && index < NODES, "node index out of range");
        let offset = geometry::offset_of(Self::ORDER, index);
        self.base.offset(offset * PAGE_SIZE)
    }

    /// Returns the number of pages that are covered by the node at `index`.
    ///
    /// `index` must not be zero.
    pub fn block_size_of(&self, index: usize) -> usize {
        geometry::block_size(Self::ORDER, index)
    }

    /// Returns the current state of the node at `index`.
    pub fn state(&self, index: usize) -> Option<NodeState> {
        match index {
            0 => None,
            _ => self.nodes.get(index).copied(),
        }
    }

    /// Returns the number of contiguous pages that the largest free block holds.
    pub fn largest_free_block(&self) -> usize {
        if self.initialized && !self.poisoned {
            self.capacity(1)
        } else {
            0
        }
    }

    /// Returns the address of the first page inside this pool.
    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// Checks if [`initialize`](Self::initialize) was already called.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Checks if this pool detected an inconsistent tree and refuses to be used.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns a copy of the stats at the moment for this allocator.
    pub fn stats(&self) -> AllocStats {
        self.stats.clone()
    }

    /// Checks that every node of the tree agrees with its children.
    ///
    /// Returns the index of the first node that doesn't.
    pub fn verify(&self) -> Result<()> {
        for index in 1..NODES {
            let leaf = geometry::is_leaf(Self::ORDER, index);
            let children = if leaf {
                None
            } else {
                Some((self.nodes[index * 2], self.nodes[index * 2 + 1]))
            };

            let consistent = match (self.nodes[index], children) {
                (NodeState::Split { .. }, None) => false,
                (NodeState::Split { .. }, Some((NodeState::Free, NodeState::Free))) => false,
                (NodeState::Split { largest }, Some(_)) => {
                    let expected = cmp::max(self.capacity(index * 2), self.capacity(index * 2 + 1));
                    largest as usize == expected
                }
                (_, None) => true,
                // the subtree of an unsplit node is never touched
                (_, Some(children)) => children == (NodeState::Free, NodeState::Free),
            };

            if !consistent {
                return Err(Error::Corrupted(index));
            }
        }

        Ok(())
    }

    fn capacity(&self, index: usize) -> usize {
        self.nodes[index].capacity(self.block_size_of(index))
    }

    /// Converts `addr` into a page offset inside this pool.
    fn page_offset(&self, addr: PhysAddr) -> Result<usize> {
        if !addr.is_aligned(PAGE_SIZE) {
            return Err(Error::Misaligned(addr));
        }

        addr.as_usize()
            .checked_sub(self.base.as_usize())
            .map(|bytes| bytes / PAGE_SIZE)
            .filter(|&offset| offset < Self::PAGES)
            .ok_or(Error::AddressOutOfRange(addr))
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::Poisoned)
        } else if !self.initialized {
            Err(Error::Uninitialized)
        } else {
            Ok(())
        }
    }

    fn alloc_stats(&mut self, size: usize) {
        self.stats.free = self.stats.free.saturating_sub(size);
        self.stats.allocated = self.stats.allocated.saturating_add(size);
    }

    fn dealloc_stats(&mut self, size: usize) {
        self.stats.free = self.stats.free.saturating_add(size);
        self.stats.allocated = self.stats.allocated.saturating_sub(size);
    }
}

impl<const NODES: usize> Default for BuddyPool<NODES> {
    fn default() -> Self {
        Self::new()
    }
}
