//! Utilities for working with raw byte units.

use core::fmt;

/// `1 KiB`
pub const KIB: usize = 1 << 10;
/// `1 MiB`
pub const MIB: usize = 1 << 20;
/// `1 GiB`
pub const GIB: usize = 1 << 30;

/// Wrapper around raw byte that pretty-prints
/// them using the [`Display`](core::fmt::Display)
/// implementation.
#[derive(Debug, Clone, Copy)]
pub struct ByteUnit(pub usize);

/// Create a [`ByteUnit`] for the given number of bytes.
pub fn bytes(count: usize) -> ByteUnit {
    ByteUnit(count)
}

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0 as f32;

        match self.0 {
            n if n < KIB => write!(f, "{} B", n),
            n if n < MIB => write!(f, "{:.2} KiB", count / KIB as f32),
            n if n < GIB => write!(f, "{:.2} MiB", count / MIB as f32),
            _ => write!(f, "{:.2} GiB", count / GIB as f32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_largest_unit() {
        assert_eq!(format!("{}", bytes(512)), "512 B");
        assert_eq!(format!("{}", bytes(4 * KIB)), "4.00 KiB");
        assert_eq!(format!("{}", bytes(16 * MIB)), "16.00 MiB");
        assert_eq!(format!("{}", bytes(3 * GIB / 2)), "1.50 GiB");
    }
}
