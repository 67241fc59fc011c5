//! Physical and virtual address types.

use crate::arch::PHYS_VIRT_OFFSET;
use core::fmt;

macro_rules! addr_type {
    ($(#[$attr:meta])* $pub:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $pub struct $name(usize);

        impl $name {
            /// Create a new address from the raw number.
            pub const fn new(addr: usize) -> Self {
                Self(addr)
            }

            /// Return the raw number of this address.
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Calculates the wrapping offset from this address.
            pub const fn offset(self, off: usize) -> Self {
                Self(self.0.wrapping_add(off))
            }

            /// Checks if this address is a multiple of `align`.
            pub const fn is_aligned(self, align: usize) -> bool {
                self.0 % align == 0
            }
        }

        impl From<usize> for $name {
            fn from(addr: usize) -> Self {
                Self(addr)
            }
        }

        impl<T> From<*const T> for $name {
            fn from(x: *const T) -> Self {
                Self::from(x as usize)
            }
        }

        impl<T> From<*mut T> for $name {
            fn from(x: *mut T) -> Self {
                Self::from(x as usize)
            }
        }

        impl From<$name> for usize {
            fn from(x: $name) -> usize {
                x.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#X}", self.0)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

addr_type! {
    /// A Virtual address inside the kernel's address space.
    pub struct VirtAddr;
}

addr_type! {
    /// A Physical address
    pub struct PhysAddr;
}

impl VirtAddr {
    /// Translate this kernel address into the physical address it is mapped to.
    pub const fn to_phys(self) -> PhysAddr {
        PhysAddr(self.0.wrapping_sub(PHYS_VIRT_OFFSET))
    }
}

impl PhysAddr {
    /// Translate this physical address into the kernel address it is mapped at.
    pub const fn to_virt(self) -> VirtAddr {
        VirtAddr(self.0.wrapping_add(PHYS_VIRT_OFFSET))
    }
}

/// Aligns the given `addr` upwards to `align`.
///
/// Returns `None` if the aligned address would overflow.
/// `align` must be a power of two.
pub const fn align_up(addr: usize, align: usize) -> Option<usize> {
    match addr.checked_add(align - 1) {
        Some(addr) => Some(addr & !(align - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_offset_translation() {
        let virt = VirtAddr::new(crate::arch::KERNEL_VIRT_START + 0x2000);
        let phys = virt.to_phys();

        assert_eq!(phys.as_usize(), crate::arch::PHYS_MEMORY_START + 0x2000);
        assert_eq!(phys.to_virt(), virt);
    }

    #[test]
    fn align_up_rounds_to_next_boundary() {
        assert_eq!(align_up(0x1000, 0x1000), Some(0x1000));
        assert_eq!(align_up(0x1001, 0x1000), Some(0x2000));
        assert_eq!(align_up(0, 0x1000), Some(0));
        assert_eq!(align_up(usize::MAX, 0x1000), None);
    }

    #[test]
    fn display_is_hex() {
        let addr = PhysAddr::new(0x8020_0000);
        assert_eq!(format!("{}", addr), "0x80200000");
    }
}
