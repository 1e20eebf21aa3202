// Search and bit-manipulation helpers shared by the container
// implementations.

/// Bitwise binary search over the range 0..n, based on the function
/// `lower_bound_pad` from this article:
///   https://orlp.net/blog/bitwise-binary-search/
///
/// Returns the index of the partition point according to the given predicate
/// (the index of the first element of the second partition). The range is
/// assumed to be partitioned: every index for which the predicate returns
/// true precedes every index for which it returns false.
pub(crate) fn partition_point(n: usize, pred: impl Fn(usize) -> bool) -> usize {
    let mut b = 0;
    let mut bit = bit_floor(n);
    while bit != 0 {
        let i = (b | bit) - 1;
        if i < n && pred(i) {
            b |= bit
        }
        bit >>= 1;
    }
    b
}

/// Largest power of two less than or equal to n, or 0 for n == 0.
pub(crate) fn bit_floor(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        let msb = usize::BITS - 1 - n.leading_zeros();
        1 << msb
    }
}

/// Galloping search: index of the first element >= target in a sorted slice.
/// Probes exponentially from the front, then binary searches the final
/// window, so the cost is logarithmic in the distance advanced rather than
/// in the slice length. Used when walking a short sorted sequence against a
/// much longer one.
pub(crate) fn gallop(haystack: &[u16], target: u16) -> usize {
    if haystack.first().map_or(true, |&v| v >= target) {
        return 0;
    }
    // haystack[bound >> 1] < target holds on every iteration
    let mut bound = 1;
    while bound < haystack.len() && haystack[bound] < target {
        bound <<= 1;
    }
    let lo = bound >> 1;
    let hi = haystack.len().min(bound + 1);
    lo + haystack[lo..hi].partition_point(|&v| v < target)
}

/// Bit position of the k-th set bit (0-indexed) within a word. The caller
/// must ensure the word has more than k bits set.
pub(crate) fn select_in_word(mut word: u64, k: u32) -> u32 {
    debug_assert!(word.count_ones() > k);
    for _ in 0..k {
        word &= word - 1; // clear the lowest set bit
    }
    word.trailing_zeros()
}
