//! Index arithmetic for the implicit binary tree.
//!
//! The tree of a pool with order `n` manages `2^n` pages. Index `1` is the root
//! and covers every page, the children of index `i` are `2i` and `2i + 1`, and the
//! leaves (`2^n .. 2^(n+1)`) cover exactly one page each. All sizes and offsets
//! in this module are measured in pages.

/// Returns the depth of `index` inside the tree, where the root is level `0`.
pub const fn level_of(index: usize) -> u32 {
    usize::BITS - 1 - index.leading_zeros()
}

/// Returns the number of pages covered by the node at `index`
/// inside a tree of the given `order`.
pub const fn block_size(order: u32, index: usize) -> usize {
    (1 << order) >> level_of(index)
}

/// Returns `true` if `index` is a leaf of a tree with the given `order`.
pub const fn is_leaf(order: u32, index: usize) -> bool {
    level_of(index) == order
}

/// Returns the page offset of the first page covered by `index`.
pub const fn offset_of(order: u32, index: usize) -> usize {
    let level = level_of(index);
    (index - (1 << level)) * block_size(order, index)
}

/// Returns the coarsest node whose range starts at page `offset`.
///
/// This is the node at the level of the largest power of two
/// (capped at the pool size) that `offset` is a multiple of.
/// `offset` must be smaller than `2^order`.
pub const fn index_of(order: u32, offset: usize) -> usize {
    let pages = 1 << order;
    let block = if offset == 0 {
        pages
    } else {
        let align = 1 << offset.trailing_zeros();
        if align < pages {
            align
        } else {
            pages
        }
    };

    pages / block + offset / block
}

/// Rounds a page count up to the size of the block that will be handed out.
///
/// Returns `None` if the rounded size is not representable.
pub const fn pages_for_request(count: usize) -> Option<usize> {
    let count = if count == 0 { 1 } else { count };
    count.checked_next_power_of_two()
}

/// Returns the number of nodes (including the unused index `0`)
/// a tree of the given `order` needs.
pub const fn nodes_for_order(order: u32) -> usize {
    1 << (order + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: u32 = 4;

    #[test]
    fn levels() {
        assert_eq!(level_of(1), 0);
        assert_eq!(level_of(2), 1);
        assert_eq!(level_of(3), 1);
        assert_eq!(level_of(7), 2);
        assert_eq!(level_of(16), 4);
        assert_eq!(level_of(31), 4);
    }

    #[test]
    fn block_size_halves_per_level() {
        for index in 1..nodes_for_order(ORDER) {
            let expected = 16 / (1 << level_of(index));
            assert_eq!(block_size(ORDER, index), expected, "index {}", index);
        }

        assert!(is_leaf(ORDER, 16));
        assert!(is_leaf(ORDER, 31));
        assert!(!is_leaf(ORDER, 15));
    }

    #[test]
    fn offsets_of_nodes() {
        assert_eq!(offset_of(ORDER, 1), 0);
        assert_eq!(offset_of(ORDER, 3), 8);
        assert_eq!(offset_of(ORDER, 6), 8);
        assert_eq!(offset_of(ORDER, 7), 12);
        assert_eq!(offset_of(ORDER, 14), 12);
        assert_eq!(offset_of(ORDER, 31), 15);
    }

    #[test]
    fn index_picks_coarsest_aligned_node() {
        assert_eq!(index_of(ORDER, 0), 1);
        assert_eq!(index_of(ORDER, 8), 3);
        assert_eq!(index_of(ORDER, 12), 7);
        assert_eq!(index_of(ORDER, 4), 5);
        assert_eq!(index_of(ORDER, 15), 31);
        assert_eq!(index_of(ORDER, 6), 11);
    }

    #[test]
    fn coarsest_nodes_round_trip() {
        // an index is the coarsest node for its offset iff it is the
        // root or a right child
        for index in 1..nodes_for_order(ORDER) {
            if index == 1 || index % 2 == 1 {
                assert_eq!(index_of(ORDER, offset_of(ORDER, index)), index);
            }
        }
    }

    #[test]
    fn request_rounding() {
        assert_eq!(pages_for_request(0), Some(1));
        assert_eq!(pages_for_request(1), Some(1));
        assert_eq!(pages_for_request(3), Some(4));
        assert_eq!(pages_for_request(4), Some(4));
        assert_eq!(pages_for_request(5), Some(8));
        assert_eq!(pages_for_request(usize::MAX), None);
    }
}
