//! Memory layout of the QEMU `virt` machine.

/// Physical address where DRAM starts.
pub const PHYS_MEMORY_START: usize = 0x8000_0000;

/// Virtual address the kernel is linked at.
pub const KERNEL_VIRT_START: usize = 0xFFFF_FFE0_0000_0000;

/// The fixed distance between a kernel virtual address and
/// the physical address it maps to.
pub const PHYS_VIRT_OFFSET: usize = KERNEL_VIRT_START - PHYS_MEMORY_START;
