//! Physical memory allocator of the Windy kernel.
//!
//! Physical pages are handed out in power-of-two sized, contiguous blocks by a
//! buddy allocator whose bookkeeping lives in a fixed size array, so no memory
//! is required to manage memory. See the [`pmem`] module for the interface
//! used by the rest of the kernel.
#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![cfg_attr(not(test), no_std)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("Windy can only run on 64 bit systems");

pub mod addr;
pub mod arch;
pub mod pmem;
pub mod unit;

pub use addr::{PhysAddr, VirtAddr};
