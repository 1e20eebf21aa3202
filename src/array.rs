// Sorted-array container: one chunk's low values as a strictly ascending
// Vec<u16>. The representation of choice for sparse chunks; pairwise ops are
// linear merges, switching to galloping probes when one side is much shorter
// than the other.

use std::cmp::Ordering;

use crate::bitset::BitsetContainer;
use crate::run::{Run, RunContainer};
use crate::utils::gallop;

/// Size ratio beyond which an intersection gallops through the longer side
/// instead of scanning it.
const GALLOP_RATIO: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayContainer {
    values: Vec<u16>,
}

impl ArrayContainer {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Build from an ascending, deduplicated value sequence.
    pub(crate) fn from_sorted(values: Vec<u16>) -> Self {
        debug_assert!(values.windows(2).all(|w| w[0] < w[1]));
        Self { values }
    }

    pub(crate) fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn cardinality(&self) -> u32 {
        self.values.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: u16) -> bool {
        self.values.binary_search(&value).is_ok()
    }

    /// Insert a value, reporting whether the container changed.
    pub fn add(&mut self, value: u16) -> bool {
        match self.values.binary_search(&value) {
            Ok(_) => false,
            Err(i) => {
                self.values.insert(i, value);
                true
            }
        }
    }

    /// Remove a value, reporting whether the container changed.
    pub fn remove(&mut self, value: u16) -> bool {
        match self.values.binary_search(&value) {
            Ok(i) => {
                self.values.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Insert every value in start..=end.
    pub fn add_range(&mut self, start: u16, end: u16) {
        debug_assert!(start <= end);
        let lo = self.values.partition_point(|&v| v < start);
        let hi = self.values.partition_point(|&v| v <= end);
        self.values.splice(lo..hi, start..=end);
    }

    /// Remove every value in start..=end.
    pub fn remove_range(&mut self, start: u16, end: u16) {
        debug_assert!(start <= end);
        let lo = self.values.partition_point(|&v| v < start);
        let hi = self.values.partition_point(|&v| v <= end);
        self.values.drain(lo..hi);
    }

    pub fn min(&self) -> Option<u16> {
        self.values.first().copied()
    }

    pub fn max(&self) -> Option<u16> {
        self.values.last().copied()
    }

    /// Count of stored values <= value.
    pub fn rank(&self, value: u16) -> u32 {
        self.values.partition_point(|&v| v <= value) as u32
    }

    /// The n-th smallest stored value (0-indexed).
    pub fn select(&self, n: u32) -> Option<u16> {
        self.values.get(n as usize).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.values.iter().copied()
    }

    pub fn and(&self, other: &ArrayContainer) -> ArrayContainer {
        let (small, large) = order_by_len(self, other);
        if small.values.len() * GALLOP_RATIO < large.values.len() {
            return small.gallop_and(large);
        }
        let mut out = Vec::with_capacity(small.values.len());
        merge_walk(&self.values, &other.values, |value, in_self, in_other| {
            if in_self && in_other {
                out.push(value);
            }
        });
        ArrayContainer::from_sorted(out)
    }

    /// Intersection via galloping probes of the longer side; self must be the
    /// shorter operand.
    fn gallop_and(&self, larger: &ArrayContainer) -> ArrayContainer {
        let mut out = Vec::with_capacity(self.values.len());
        let mut haystack = &larger.values[..];
        for &value in &self.values {
            let i = gallop(haystack, value);
            haystack = &haystack[i..];
            match haystack.first() {
                Some(&found) if found == value => {
                    out.push(value);
                    haystack = &haystack[1..];
                }
                Some(_) => {}
                None => break,
            }
        }
        ArrayContainer::from_sorted(out)
    }

    pub fn and_cardinality(&self, other: &ArrayContainer) -> u32 {
        let (small, large) = order_by_len(self, other);
        if small.values.len() * GALLOP_RATIO < large.values.len() {
            let mut count = 0;
            let mut haystack = &large.values[..];
            for &value in &small.values {
                let i = gallop(haystack, value);
                haystack = &haystack[i..];
                match haystack.first() {
                    Some(&found) if found == value => {
                        count += 1;
                        haystack = &haystack[1..];
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            return count;
        }
        let mut count = 0;
        merge_walk(&self.values, &other.values, |_, in_self, in_other| {
            count += (in_self && in_other) as u32;
        });
        count
    }

    pub fn or(&self, other: &ArrayContainer) -> ArrayContainer {
        let mut out = Vec::with_capacity(self.values.len() + other.values.len());
        merge_walk(&self.values, &other.values, |value, _, _| out.push(value));
        ArrayContainer::from_sorted(out)
    }

    pub fn xor(&self, other: &ArrayContainer) -> ArrayContainer {
        let mut out = Vec::with_capacity(self.values.len() + other.values.len());
        merge_walk(&self.values, &other.values, |value, in_self, in_other| {
            if in_self != in_other {
                out.push(value);
            }
        });
        ArrayContainer::from_sorted(out)
    }

    pub fn and_not(&self, other: &ArrayContainer) -> ArrayContainer {
        let mut out = Vec::with_capacity(self.values.len());
        merge_walk(&self.values, &other.values, |value, in_self, in_other| {
            if in_self && !in_other {
                out.push(value);
            }
        });
        ArrayContainer::from_sorted(out)
    }

    pub fn intersects(&self, other: &ArrayContainer) -> bool {
        let (small, large) = order_by_len(self, other);
        if small.values.len() * GALLOP_RATIO < large.values.len() {
            let mut haystack = &large.values[..];
            for &value in &small.values {
                let i = gallop(haystack, value);
                haystack = &haystack[i..];
                match haystack.first() {
                    Some(&found) if found == value => return true,
                    Some(_) => {}
                    None => return false,
                }
            }
            return false;
        }
        let (a, b) = (&self.values, &other.values);
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => return true,
            }
        }
        false
    }

    pub fn subset_of(&self, other: &ArrayContainer) -> bool {
        if self.values.len() > other.values.len() {
            return false;
        }
        let mut haystack = &other.values[..];
        for &value in &self.values {
            let i = gallop(haystack, value);
            haystack = &haystack[i..];
            match haystack.first() {
                Some(&found) if found == value => haystack = &haystack[1..],
                _ => return false,
            }
        }
        true
    }

    /// Number of maximal runs of consecutive values.
    pub fn num_runs(&self) -> u32 {
        let mut runs = u32::from(!self.values.is_empty());
        for w in self.values.windows(2) {
            runs += u32::from(w[1] - w[0] > 1);
        }
        runs
    }

    pub fn to_bitset(&self) -> BitsetContainer {
        let mut bits = BitsetContainer::new();
        for &v in &self.values {
            bits.add(v);
        }
        bits
    }

    pub fn to_run_container(&self) -> RunContainer {
        let mut runs: Vec<Run> = Vec::with_capacity(self.num_runs() as usize);
        for &v in &self.values {
            match runs.last_mut() {
                Some(run) if run.start as u32 + run.len as u32 + 1 == v as u32 => run.len += 1,
                _ => runs.push(Run::new(v, 0)),
            }
        }
        RunContainer::from_runs(runs)
    }
}

fn order_by_len<'a>(
    a: &'a ArrayContainer,
    b: &'a ArrayContainer,
) -> (&'a ArrayContainer, &'a ArrayContainer) {
    if a.values.len() <= b.values.len() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Linear merge of two ascending slices, invoking the callback once per
/// distinct value with membership flags for each side.
fn merge_walk(a: &[u16], b: &[u16], mut visit: impl FnMut(u16, bool, bool)) {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                visit(a[i], true, false);
                i += 1;
            }
            Ordering::Greater => {
                visit(b[j], false, true);
                j += 1;
            }
            Ordering::Equal => {
                visit(a[i], true, true);
                i += 1;
                j += 1;
            }
        }
    }
    for &v in &a[i..] {
        visit(v, true, false);
    }
    for &v in &b[j..] {
        visit(v, false, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exhaustigen::Gen;
    use std::collections::BTreeSet;

    fn from_values(values: &[u16]) -> ArrayContainer {
        let mut a = ArrayContainer::new();
        for &v in values {
            a.add(v);
        }
        a
    }

    #[test]
    fn test_add_remove() {
        let mut a = ArrayContainer::new();
        assert!(a.add(10));
        assert!(a.add(2));
        assert!(!a.add(10));
        assert_eq!(a.values(), &[2, 10]);
        assert!(a.remove(2));
        assert!(!a.remove(2));
        assert_eq!(a.values(), &[10]);
    }

    #[test]
    fn test_rank_select() {
        let a = from_values(&[1, 2, 5, 10, 32]);
        assert_eq!(a.rank(0), 0);
        assert_eq!(a.rank(1), 1);
        assert_eq!(a.rank(2), 2);
        assert_eq!(a.rank(4), 2);
        assert_eq!(a.rank(32), 5);
        assert_eq!(a.rank(u16::MAX), 5);

        assert_eq!(a.select(0), Some(1));
        assert_eq!(a.select(4), Some(32));
        assert_eq!(a.select(5), None);
    }

    #[test]
    fn test_ranges() {
        let mut a = from_values(&[1, 5, 9]);
        a.add_range(3, 7);
        assert_eq!(a.values(), &[1, 3, 4, 5, 6, 7, 9]);
        a.remove_range(4, 6);
        assert_eq!(a.values(), &[1, 3, 7, 9]);
        a.remove_range(0, u16::MAX);
        assert!(a.is_empty());
    }

    #[test]
    fn test_num_runs() {
        assert_eq!(from_values(&[]).num_runs(), 0);
        assert_eq!(from_values(&[7]).num_runs(), 1);
        assert_eq!(from_values(&[1, 2, 3, 7, 8, 20]).num_runs(), 3);
        assert_eq!(from_values(&[0, 1]).num_runs(), 1);
    }

    #[test]
    fn test_gallop_paths() {
        // small side short enough to trigger the galloping variants
        let large = ArrayContainer::from_sorted((0..4096).map(|i| i * 3).collect());
        let small = from_values(&[0, 3, 100, 101, 3000, 12285]);
        let expected: Vec<u16> = small.iter().filter(|v| v % 3 == 0).collect();
        assert_eq!(small.and(&large).values(), &expected[..]);
        assert_eq!(large.and(&small).values(), &expected[..]);
        assert_eq!(small.and_cardinality(&large), expected.len() as u32);
        assert!(small.intersects(&large));
        assert!(!from_values(&[1, 4, 3001]).intersects(&large));
    }

    // Exhaustively test the pairwise ops over all subsets of a small
    // universe against a BTreeSet model.
    #[test]
    fn test_ops_vs_naive() {
        let universe: Vec<u16> = vec![0, 1, 2, 3, 9, 10, 11, 64];
        let mut gen = Gen::new();
        while !gen.done() {
            let lhs: Vec<u16> = gen.gen_subset(&universe).copied().collect();
            let rhs: Vec<u16> = gen.gen_subset(&universe).copied().collect();
            let (a, b) = (from_values(&lhs), from_values(&rhs));
            let (sa, sb): (BTreeSet<u16>, BTreeSet<u16>) =
                (lhs.iter().copied().collect(), rhs.iter().copied().collect());

            let and: Vec<u16> = sa.intersection(&sb).copied().collect();
            let or: Vec<u16> = sa.union(&sb).copied().collect();
            let xor: Vec<u16> = sa.symmetric_difference(&sb).copied().collect();
            let diff: Vec<u16> = sa.difference(&sb).copied().collect();

            assert_eq!(a.and(&b).values(), &and[..]);
            assert_eq!(a.or(&b).values(), &or[..]);
            assert_eq!(a.xor(&b).values(), &xor[..]);
            assert_eq!(a.and_not(&b).values(), &diff[..]);
            assert_eq!(a.and_cardinality(&b), and.len() as u32);
            assert_eq!(a.intersects(&b), !and.is_empty());
            assert_eq!(a.subset_of(&b), sa.is_subset(&sb));
        }
    }

    #[test]
    fn test_conversions() {
        let a = from_values(&[0, 1, 2, 3, 1000, u16::MAX]);
        let bits = a.to_bitset();
        assert_eq!(bits.cardinality(), a.cardinality());
        let values: Vec<u16> = bits.iter().collect();
        assert_eq!(a.values(), &values[..]);

        let runs = a.to_run_container();
        assert_eq!(runs.num_runs(), 3);
        let values: Vec<u16> = runs.iter().collect();
        assert_eq!(a.values(), &values[..]);
    }
}
