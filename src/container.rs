// Container: the set of 16-bit low values for one chunk, stored as whichever
// of the three representations suits its density. The pairwise operators
// dispatch on the concrete pair of variants so each of the nine combinations
// gets the cheapest algorithm; results are converted back to the smallest
// sensible representation.

use crate::array::ArrayContainer;
use crate::bitset::{BitsetContainer, BitsetIter};
use crate::run::{RunContainer, RunIter};

/// Largest cardinality stored as a sorted array: past this point the fixed
/// 8192-byte bitset is smaller than 2 bytes per value.
pub(crate) const ARRAY_MAX_SIZE: usize = 4096;

/// Serialized size of a bitset payload in bytes.
pub(crate) const BITSET_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub enum Container {
    Array(ArrayContainer),
    Bitset(BitsetContainer),
    Run(RunContainer),
}

impl Default for Container {
    fn default() -> Self {
        Container::Array(ArrayContainer::new())
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// A container holding exactly the values start..=end, in the smallest
    /// representation.
    pub fn from_range(start: u16, end: u16) -> Container {
        debug_assert!(start <= end);
        if end - start < 2 {
            let mut array = ArrayContainer::new();
            array.add_range(start, end);
            Container::Array(array)
        } else {
            let mut runs = RunContainer::new();
            runs.add_range(start, end);
            Container::Run(runs)
        }
    }

    pub fn cardinality(&self) -> u32 {
        match self {
            Container::Array(a) => a.cardinality(),
            Container::Bitset(b) => b.cardinality(),
            Container::Run(r) => r.cardinality(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    pub fn contains(&self, value: u16) -> bool {
        match self {
            Container::Array(a) => a.contains(value),
            Container::Bitset(b) => b.contains(value),
            Container::Run(r) => r.contains(value),
        }
    }

    /// Insert a value, converting a full array to a bitset. Reports whether
    /// the container changed.
    pub fn add(&mut self, value: u16) -> bool {
        match self {
            Container::Array(a) => {
                if a.cardinality() as usize == ARRAY_MAX_SIZE && !a.contains(value) {
                    let mut bits = a.to_bitset();
                    let changed = bits.add(value);
                    *self = Container::Bitset(bits);
                    changed
                } else {
                    a.add(value)
                }
            }
            Container::Bitset(b) => b.add(value),
            Container::Run(r) => r.add(value),
        }
    }

    /// Remove a value, converting a bitset that drops to the array threshold.
    /// Reports whether the container changed.
    pub fn remove(&mut self, value: u16) -> bool {
        match self {
            Container::Array(a) => a.remove(value),
            Container::Bitset(b) => {
                let changed = b.remove(value);
                if changed && b.cardinality() as usize <= ARRAY_MAX_SIZE {
                    *self = Container::Array(b.to_array());
                }
                changed
            }
            Container::Run(r) => r.remove(value),
        }
    }

    /// Insert every value in start..=end.
    pub fn add_range(&mut self, start: u16, end: u16) {
        match self {
            Container::Array(a) => {
                let span = end as u32 - start as u32 + 1;
                if a.cardinality() + span > ARRAY_MAX_SIZE as u32 {
                    let mut bits = a.to_bitset();
                    bits.add_range(start, end);
                    *self = shrink_bitset(bits);
                } else {
                    a.add_range(start, end);
                }
            }
            Container::Bitset(b) => b.add_range(start, end),
            Container::Run(r) => r.add_range(start, end),
        }
    }

    /// Remove every value in start..=end.
    pub fn remove_range(&mut self, start: u16, end: u16) {
        match self {
            Container::Array(a) => a.remove_range(start, end),
            Container::Bitset(b) => {
                b.remove_range(start, end);
                if b.cardinality() as usize <= ARRAY_MAX_SIZE {
                    *self = Container::Array(b.to_array());
                }
            }
            Container::Run(r) => r.remove_range(start, end),
        }
    }

    pub fn min(&self) -> Option<u16> {
        match self {
            Container::Array(a) => a.min(),
            Container::Bitset(b) => b.min(),
            Container::Run(r) => r.min(),
        }
    }

    pub fn max(&self) -> Option<u16> {
        match self {
            Container::Array(a) => a.max(),
            Container::Bitset(b) => b.max(),
            Container::Run(r) => r.max(),
        }
    }

    /// Count of stored values <= value.
    pub fn rank(&self, value: u16) -> u32 {
        match self {
            Container::Array(a) => a.rank(value),
            Container::Bitset(b) => b.rank(value),
            Container::Run(r) => r.rank(value),
        }
    }

    /// Count of stored values in start..=end.
    pub fn rank_range(&self, start: u16, end: u16) -> u32 {
        debug_assert!(start <= end);
        let below = if start == 0 { 0 } else { self.rank(start - 1) };
        self.rank(end) - below
    }

    /// The n-th smallest stored value (0-indexed).
    pub fn select(&self, n: u32) -> Option<u16> {
        match self {
            Container::Array(a) => a.select(n),
            Container::Bitset(b) => b.select(n),
            Container::Run(r) => r.select(n),
        }
    }

    pub fn iter(&self) -> ContainerIter<'_> {
        match self {
            Container::Array(a) => ContainerIter::Array(a.values().iter()),
            Container::Bitset(b) => ContainerIter::Bitset(b.iter()),
            Container::Run(r) => ContainerIter::Run(r.iter()),
        }
    }

    pub fn and(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => Array(a.and(b)),
            (Array(a), Bitset(b)) | (Bitset(b), Array(a)) => {
                Array(ArrayContainer::from_sorted(
                    a.iter().filter(|&v| b.contains(v)).collect(),
                ))
            }
            (Array(a), Run(r)) | (Run(r), Array(a)) => Array(ArrayContainer::from_sorted(
                a.iter().filter(|&v| r.contains(v)).collect(),
            )),
            (Bitset(a), Bitset(b)) => shrink_bitset(a.and(b)),
            (Bitset(b), Run(r)) | (Run(r), Bitset(b)) => shrink_bitset(r.to_bitset().and(b)),
            (Run(a), Run(b)) => shrink_runs(a.and(b)),
        }
    }

    pub fn or(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => grow_array(a.or(b)),
            (Array(a), Bitset(b)) | (Bitset(b), Array(a)) => {
                let mut out = b.clone();
                for v in a.iter() {
                    out.add(v);
                }
                Bitset(out)
            }
            (Array(a), Run(r)) | (Run(r), Array(a)) => {
                let mut out = r.clone();
                for v in a.iter() {
                    out.add(v);
                }
                shrink_runs(out)
            }
            (Bitset(a), Bitset(b)) => Bitset(a.or(b)),
            (Bitset(b), Run(r)) | (Run(r), Bitset(b)) => {
                let mut out = b.clone();
                for run in r.runs() {
                    out.add_range(run.start, run.end());
                }
                Bitset(out)
            }
            (Run(a), Run(b)) => shrink_runs(a.or(b)),
        }
    }

    pub fn xor(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => grow_array(a.xor(b)),
            (Array(a), Bitset(b)) | (Bitset(b), Array(a)) => {
                let mut out = b.clone();
                for v in a.iter() {
                    if !out.remove(v) {
                        out.add(v);
                    }
                }
                shrink_bitset(out)
            }
            (Array(a), Run(r)) | (Run(r), Array(a)) => shrink_runs(r.xor(&a.to_run_container())),
            (Bitset(a), Bitset(b)) => shrink_bitset(a.xor(b)),
            (Bitset(b), Run(r)) | (Run(r), Bitset(b)) => {
                let mut out = b.clone();
                for run in r.runs() {
                    out.flip_range(run.start, run.end());
                }
                shrink_bitset(out)
            }
            (Run(a), Run(b)) => shrink_runs(a.xor(b)),
        }
    }

    pub fn and_not(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => Array(a.and_not(b)),
            (Array(a), Bitset(b)) => Array(ArrayContainer::from_sorted(
                a.iter().filter(|&v| !b.contains(v)).collect(),
            )),
            (Array(a), Run(r)) => Array(ArrayContainer::from_sorted(
                a.iter().filter(|&v| !r.contains(v)).collect(),
            )),
            (Bitset(a), Array(b)) => {
                let mut out = a.clone();
                for v in b.iter() {
                    out.remove(v);
                }
                shrink_bitset(out)
            }
            (Bitset(a), Bitset(b)) => shrink_bitset(a.and_not(b)),
            (Bitset(a), Run(r)) => {
                let mut out = a.clone();
                for run in r.runs() {
                    out.remove_range(run.start, run.end());
                }
                shrink_bitset(out)
            }
            (Run(a), Array(b)) => {
                let mut out = a.clone();
                for v in b.iter() {
                    out.remove(v);
                }
                shrink_runs(out)
            }
            (Run(a), Bitset(b)) => shrink_bitset(a.to_bitset().and_not(b)),
            (Run(a), Run(b)) => shrink_runs(a.and_not(b)),
        }
    }

    /// Cardinality of the intersection without materializing it.
    pub fn and_cardinality(&self, other: &Container) -> u32 {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => a.and_cardinality(b),
            (Array(a), Bitset(b)) | (Bitset(b), Array(a)) => {
                a.iter().filter(|&v| b.contains(v)).count() as u32
            }
            (Array(a), Run(r)) | (Run(r), Array(a)) => {
                a.iter().filter(|&v| r.contains(v)).count() as u32
            }
            (Bitset(a), Bitset(b)) => a.and_cardinality(b),
            (Bitset(b), Run(r)) | (Run(r), Bitset(b)) => r
                .runs()
                .iter()
                .map(|run| b.rank_range(run.start, run.end()))
                .sum(),
            (Run(a), Run(b)) => a.and_cardinality(b),
        }
    }

    pub fn intersects(&self, other: &Container) -> bool {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => a.intersects(b),
            (Array(a), Bitset(b)) | (Bitset(b), Array(a)) => a.iter().any(|v| b.contains(v)),
            (Array(a), Run(r)) | (Run(r), Array(a)) => a.iter().any(|v| r.contains(v)),
            (Bitset(a), Bitset(b)) => a.intersects(b),
            (Bitset(b), Run(r)) | (Run(r), Bitset(b)) => r
                .runs()
                .iter()
                .any(|run| b.intersects_range(run.start, run.end())),
            (Run(a), Run(b)) => a.intersects(b),
        }
    }

    /// Whether every value of self is present in other.
    pub fn subset_of(&self, other: &Container) -> bool {
        use Container::*;
        if self.cardinality() > other.cardinality() {
            return false;
        }
        match (self, other) {
            (Array(a), Array(b)) => a.subset_of(b),
            (Bitset(a), Bitset(b)) => a.subset_of(b),
            (Run(a), Run(b)) => a.subset_of(b),
            (Run(a), Array(b)) => a.runs().iter().all(|run| {
                let below = if run.start == 0 { 0 } else { b.rank(run.start - 1) };
                b.rank(run.end()) - below == run.count()
            }),
            (Run(a), Bitset(b)) => a
                .runs()
                .iter()
                .all(|run| b.rank_range(run.start, run.end()) == run.count()),
            _ => self.iter().all(|v| other.contains(v)),
        }
    }

    /// Convert to the smallest of the three representations for the current
    /// contents. No-op on empty containers; the directory never stores them.
    pub fn optimize(&mut self) {
        let cardinality = self.cardinality();
        if cardinality == 0 {
            return;
        }
        let num_runs = match self {
            Container::Array(a) => a.num_runs(),
            Container::Bitset(b) => b.num_runs(),
            Container::Run(r) => r.num_runs(),
        };
        let run_bytes = 2 + 4 * num_runs as usize;
        let flat_bytes = if cardinality as usize <= ARRAY_MAX_SIZE {
            2 * cardinality as usize
        } else {
            BITSET_BYTES
        };
        if run_bytes < flat_bytes {
            let runs = match &*self {
                Container::Array(a) => a.to_run_container(),
                Container::Bitset(b) => b.to_run_container(),
                Container::Run(_) => return,
            };
            log::trace!(
                "re-encoding container: {} values in {} runs",
                cardinality,
                num_runs
            );
            *self = Container::Run(runs);
        } else if let Container::Run(r) = &*self {
            let flat = if cardinality as usize <= ARRAY_MAX_SIZE {
                Container::Array(r.to_array())
            } else {
                Container::Bitset(r.to_bitset())
            };
            *self = flat;
        }
    }
}

/// Pick array or bitset for a bitset-typed result by the threshold policy.
fn shrink_bitset(bits: BitsetContainer) -> Container {
    if bits.cardinality() as usize <= ARRAY_MAX_SIZE {
        Container::Array(bits.to_array())
    } else {
        Container::Bitset(bits)
    }
}

/// Convert an array-typed result that outgrew the threshold.
fn grow_array(array: ArrayContainer) -> Container {
    if array.cardinality() as usize > ARRAY_MAX_SIZE {
        Container::Bitset(array.to_bitset())
    } else {
        Container::Array(array)
    }
}

/// Pick the smallest representation for a run-typed result.
fn shrink_runs(runs: RunContainer) -> Container {
    let cardinality = runs.cardinality();
    let run_bytes = 2 + 4 * runs.num_runs() as usize;
    if cardinality as usize <= ARRAY_MAX_SIZE {
        if run_bytes < 2 * cardinality as usize {
            Container::Run(runs)
        } else {
            Container::Array(runs.to_array())
        }
    } else if run_bytes < BITSET_BYTES {
        Container::Run(runs)
    } else {
        Container::Bitset(runs.to_bitset())
    }
}

pub enum ContainerIter<'a> {
    Array(std::slice::Iter<'a, u16>),
    Bitset(BitsetIter<'a>),
    Run(RunIter<'a>),
}

impl Iterator for ContainerIter<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        match self {
            ContainerIter::Array(it) => it.next().copied(),
            ContainerIter::Bitset(it) => it.next(),
            ContainerIter::Run(it) => it.next(),
        }
    }
}

/// Structural equality on the stored value set, regardless of which
/// representation holds it.
impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => a == b,
            (Bitset(a), Bitset(b)) => a == b,
            (Run(a), Run(b)) => a == b,
            _ => self.cardinality() == other.cardinality() && self.iter().eq(other.iter()),
        }
    }
}

impl Eq for Container {}
