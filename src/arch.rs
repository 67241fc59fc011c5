//! Platform specific constants and linker symbols.

#[cfg(feature = "virt")]
mod virt;
#[cfg(feature = "virt")]
pub use virt::*;

#[cfg(not(feature = "virt"))]
compile_error!("a platform feature must be enabled, currently only `virt` is supported");

#[cfg(target_os = "none")]
extern "C" {
    static mut _end: u8;
}

/// Returns the virtual address of the first byte after the kernel image,
/// as specified by the linker.
#[cfg(target_os = "none")]
pub fn kernel_end() -> crate::addr::VirtAddr {
    // SAFETY
    // Only the address of the symbol is taken, it is never read.
    unsafe { crate::addr::VirtAddr::from(core::ptr::addr_of_mut!(_end)) }
}
