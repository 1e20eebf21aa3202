// Cross-bitmap algebra: a merge-join over two ascending chunk streams that
// delegates matched keys to the pairwise container operators. The chunk
// streams abstract over ownership, so owned bitmaps and read-only views over
// serialized buffers share one implementation; a view chunk is only
// materialized when an operator actually touches it.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bitmap::Bitmap;
use crate::container::Container;
use crate::view::ContainerView;

/// A chunk's container, either borrowed from an owned bitmap or still in its
/// serialized form inside a view.
pub(crate) enum ChunkRef<'a> {
    Owned(&'a Container),
    View(ContainerView<'a>),
}

impl<'a> ChunkRef<'a> {
    fn cow(&self) -> Cow<'a, Container> {
        match self {
            ChunkRef::Owned(c) => Cow::Borrowed(c),
            ChunkRef::View(v) => Cow::Owned(v.to_container()),
        }
    }

    fn to_container(&self) -> Container {
        self.cow().into_owned()
    }

    fn cardinality(&self) -> u32 {
        match self {
            ChunkRef::Owned(c) => c.cardinality(),
            ChunkRef::View(v) => v.cardinality(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    And,
    Or,
    Xor,
    AndNot,
}

impl BinaryOp {
    fn apply(self, left: &Container, right: &Container) -> Container {
        match self {
            BinaryOp::And => left.and(right),
            BinaryOp::Or => left.or(right),
            BinaryOp::Xor => left.xor(right),
            BinaryOp::AndNot => left.and_not(right),
        }
    }
}

/// One step of a key-ordered merge over two chunk streams.
enum Merged<'a> {
    Left(u16, ChunkRef<'a>),
    Right(u16, ChunkRef<'a>),
    Both(u16, ChunkRef<'a>, ChunkRef<'a>),
}

fn merge_keys<'a>(
    left: impl Iterator<Item = (u16, ChunkRef<'a>)>,
    right: impl Iterator<Item = (u16, ChunkRef<'a>)>,
) -> impl Iterator<Item = Merged<'a>> {
    let mut left = left.peekable();
    let mut right = right.peekable();
    std::iter::from_fn(move || match (left.peek(), right.peek()) {
        (Some(&(lk, _)), Some(&(rk, _))) => match lk.cmp(&rk) {
            Ordering::Less => left.next().map(|(k, c)| Merged::Left(k, c)),
            Ordering::Greater => right.next().map(|(k, c)| Merged::Right(k, c)),
            Ordering::Equal => {
                let (k, l) = left.next()?;
                let (_, r) = right.next()?;
                Some(Merged::Both(k, l, r))
            }
        },
        (Some(_), None) => left.next().map(|(k, c)| Merged::Left(k, c)),
        (None, Some(_)) => right.next().map(|(k, c)| Merged::Right(k, c)),
        (None, None) => None,
    })
}

pub(crate) fn binary_op<'a>(
    left: impl Iterator<Item = (u16, ChunkRef<'a>)>,
    right: impl Iterator<Item = (u16, ChunkRef<'a>)>,
    op: BinaryOp,
) -> Bitmap {
    let mut keys = Vec::new();
    let mut containers = Vec::new();
    let mut push = |key: u16, container: Container| {
        if !container.is_empty() {
            keys.push(key);
            containers.push(container);
        }
    };
    for step in merge_keys(left, right) {
        match step {
            Merged::Both(key, l, r) => push(key, op.apply(&l.cow(), &r.cow())),
            // a key on one side only meets the implicit empty container
            Merged::Left(key, l) => match op {
                BinaryOp::And => {}
                BinaryOp::Or | BinaryOp::Xor | BinaryOp::AndNot => push(key, l.to_container()),
            },
            Merged::Right(key, r) => match op {
                BinaryOp::And | BinaryOp::AndNot => {}
                BinaryOp::Or | BinaryOp::Xor => push(key, r.to_container()),
            },
        }
    }
    Bitmap::from_parts(keys, containers)
}

/// Cardinality of the intersection without materializing any result
/// containers.
pub(crate) fn and_cardinality<'a>(
    left: impl Iterator<Item = (u16, ChunkRef<'a>)>,
    right: impl Iterator<Item = (u16, ChunkRef<'a>)>,
) -> u64 {
    merge_keys(left, right)
        .map(|step| match step {
            Merged::Both(_, l, r) => l.cow().and_cardinality(&r.cow()) as u64,
            _ => 0,
        })
        .sum()
}

pub(crate) fn intersects<'a>(
    left: impl Iterator<Item = (u16, ChunkRef<'a>)>,
    right: impl Iterator<Item = (u16, ChunkRef<'a>)>,
) -> bool {
    merge_keys(left, right).any(|step| match step {
        Merged::Both(_, l, r) => l.cow().intersects(&r.cow()),
        _ => false,
    })
}

pub(crate) fn is_subset<'a>(
    left: impl Iterator<Item = (u16, ChunkRef<'a>)>,
    right: impl Iterator<Item = (u16, ChunkRef<'a>)>,
) -> bool {
    merge_keys(left, right).all(|step| match step {
        Merged::Both(_, l, r) => l.cow().subset_of(&r.cow()),
        Merged::Left(_, l) => l.cardinality() == 0,
        Merged::Right(..) => true,
    })
}

impl Bitmap {
    pub(crate) fn chunk_refs(&self) -> impl Iterator<Item = (u16, ChunkRef<'_>)> {
        self.keys()
            .iter()
            .copied()
            .zip(self.containers().iter().map(ChunkRef::Owned))
    }

    /// Intersection, as a new bitmap.
    pub fn and(&self, other: &Bitmap) -> Bitmap {
        binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::And)
    }

    /// Union, as a new bitmap.
    pub fn or(&self, other: &Bitmap) -> Bitmap {
        binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::Or)
    }

    /// Symmetric difference, as a new bitmap.
    pub fn xor(&self, other: &Bitmap) -> Bitmap {
        binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::Xor)
    }

    /// Difference (self minus other), as a new bitmap.
    pub fn and_not(&self, other: &Bitmap) -> Bitmap {
        binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::AndNot)
    }

    /// `and(self, other).cardinality()` without building the result.
    pub fn and_cardinality(&self, other: &Bitmap) -> u64 {
        and_cardinality(self.chunk_refs(), other.chunk_refs())
    }

    /// `or(self, other).cardinality()` without building the result.
    pub fn or_cardinality(&self, other: &Bitmap) -> u64 {
        self.cardinality() + other.cardinality() - self.and_cardinality(other)
    }

    /// `xor(self, other).cardinality()` without building the result.
    pub fn xor_cardinality(&self, other: &Bitmap) -> u64 {
        self.cardinality() + other.cardinality() - 2 * self.and_cardinality(other)
    }

    /// `and_not(self, other).cardinality()` without building the result.
    pub fn and_not_cardinality(&self, other: &Bitmap) -> u64 {
        self.cardinality() - self.and_cardinality(other)
    }

    /// Whether the two bitmaps share any value.
    pub fn intersects(&self, other: &Bitmap) -> bool {
        intersects(self.chunk_refs(), other.chunk_refs())
    }

    /// Whether every value of self is present in other.
    pub fn is_subset(&self, other: &Bitmap) -> bool {
        is_subset(self.chunk_refs(), other.chunk_refs())
    }

    pub fn is_superset(&self, other: &Bitmap) -> bool {
        other.is_subset(self)
    }

    /// Intersect in place, keeping only chunks whose keys appear in both
    /// operands and whose intersection is non-empty.
    pub fn and_inplace(&mut self, other: &Bitmap) {
        let (keys, containers) = self.take_parts();
        let mut out_keys = Vec::with_capacity(keys.len().min(other.keys().len()));
        let mut out_containers = Vec::with_capacity(out_keys.capacity());
        let mut j = 0;
        for (key, container) in keys.into_iter().zip(containers) {
            j += other.keys()[j..].partition_point(|&k| k < key);
            if other.keys().get(j) == Some(&key) {
                let merged = container.and(&other.containers()[j]);
                if !merged.is_empty() {
                    out_keys.push(key);
                    out_containers.push(merged);
                }
            }
        }
        *self = Bitmap::from_parts(out_keys, out_containers);
    }

    /// Union in place; matching bitset chunks are merged word-wise without
    /// reallocating, chunks only present in other are cloned in.
    pub fn or_inplace(&mut self, other: &Bitmap) {
        for (key, container) in other.keys().iter().zip(other.containers()) {
            match self.keys().binary_search(key) {
                Ok(i) => or_into(self.container_mut(i), container),
                Err(i) => self.insert_chunk(i, *key, container.clone()),
            }
        }
    }

    /// Symmetric difference in place.
    pub fn xor_inplace(&mut self, other: &Bitmap) {
        for (key, container) in other.keys().iter().zip(other.containers()) {
            match self.keys().binary_search(key) {
                Ok(i) => {
                    let merged = self.containers()[i].xor(container);
                    if merged.is_empty() {
                        self.remove_chunk(i);
                    } else {
                        self.replace_container(i, merged);
                    }
                }
                Err(i) => self.insert_chunk(i, *key, container.clone()),
            }
        }
    }

    /// Difference in place.
    pub fn and_not_inplace(&mut self, other: &Bitmap) {
        let (keys, containers) = self.take_parts();
        let mut out_keys = Vec::with_capacity(keys.len());
        let mut out_containers = Vec::with_capacity(keys.len());
        let mut j = 0;
        for (key, container) in keys.into_iter().zip(containers) {
            j += other.keys()[j..].partition_point(|&k| k < key);
            if other.keys().get(j) == Some(&key) {
                let merged = container.and_not(&other.containers()[j]);
                if !merged.is_empty() {
                    out_keys.push(key);
                    out_containers.push(merged);
                }
            } else {
                out_keys.push(key);
                out_containers.push(container);
            }
        }
        *self = Bitmap::from_parts(out_keys, out_containers);
    }
}

/// Union into an existing container; a pair of bitsets merges in place.
fn or_into(existing: &mut Container, incoming: &Container) {
    match (existing, incoming) {
        (Container::Bitset(mine), Container::Bitset(theirs)) => mine.or_assign(theirs),
        (mine, theirs) => *mine = mine.or(theirs),
    }
}

/// Intersection of any number of bitmaps by a left-to-right fold. The empty
/// sequence yields the empty bitmap.
pub fn and_many<'a>(bitmaps: impl IntoIterator<Item = &'a Bitmap>) -> Bitmap {
    let mut iter = bitmaps.into_iter();
    let Some(first) = iter.next() else {
        return Bitmap::new();
    };
    let mut acc = first.clone();
    for bitmap in iter {
        if acc.is_empty() {
            break;
        }
        acc.and_inplace(bitmap);
    }
    acc
}

/// Union of any number of bitmaps by a left-to-right fold.
pub fn or_many<'a>(bitmaps: impl IntoIterator<Item = &'a Bitmap>) -> Bitmap {
    let mut iter = bitmaps.into_iter();
    let Some(first) = iter.next() else {
        return Bitmap::new();
    };
    let mut acc = first.clone();
    for bitmap in iter {
        acc.or_inplace(bitmap);
    }
    acc
}

/// Intersection of any number of bitmaps, always combining the two smallest
/// remaining operands first to keep intermediate results small. Produces the
/// same bitmap as `and_many` for every input.
pub fn and_many_smallest_first<'a>(bitmaps: impl IntoIterator<Item = &'a Bitmap>) -> Bitmap {
    heap_aggregate(bitmaps, BinaryOp::And)
}

/// Union of any number of bitmaps, smallest operands first. Produces the
/// same bitmap as `or_many` for every input.
pub fn or_many_smallest_first<'a>(bitmaps: impl IntoIterator<Item = &'a Bitmap>) -> Bitmap {
    heap_aggregate(bitmaps, BinaryOp::Or)
}

enum Operand<'a> {
    Borrowed(&'a Bitmap),
    Owned(Bitmap),
}

impl Operand<'_> {
    fn get(&self) -> &Bitmap {
        match self {
            Operand::Borrowed(b) => b,
            Operand::Owned(b) => b,
        }
    }

    fn into_owned(self) -> Bitmap {
        match self {
            Operand::Borrowed(b) => b.clone(),
            Operand::Owned(b) => b,
        }
    }
}

/// A heap entry ordered by ascending cardinality; the sequence number makes
/// the order total and deterministic.
struct ByCost<'a> {
    cost: u64,
    seq: usize,
    operand: Operand<'a>,
}

impl PartialEq for ByCost<'_> {
    fn eq(&self, other: &Self) -> bool {
        (self.cost, self.seq) == (other.cost, other.seq)
    }
}

impl Eq for ByCost<'_> {}

impl PartialOrd for ByCost<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByCost<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap and we pop the cheapest first
        (other.cost, other.seq).cmp(&(self.cost, self.seq))
    }
}

fn heap_aggregate<'a>(bitmaps: impl IntoIterator<Item = &'a Bitmap>, op: BinaryOp) -> Bitmap {
    let mut seq = 0;
    let mut heap: BinaryHeap<ByCost<'a>> = bitmaps
        .into_iter()
        .map(|bitmap| {
            seq += 1;
            ByCost {
                cost: bitmap.cardinality(),
                seq,
                operand: Operand::Borrowed(bitmap),
            }
        })
        .collect();
    let Some(mut smallest) = heap.pop() else {
        return Bitmap::new();
    };
    while let Some(next) = heap.pop() {
        if op == BinaryOp::And && smallest.cost == 0 {
            // intersecting with the empty bitmap cannot grow
            return Bitmap::new();
        }
        let combined = binary_op(
            smallest.operand.get().chunk_refs(),
            next.operand.get().chunk_refs(),
            op,
        );
        seq += 1;
        smallest = ByCost {
            cost: combined.cardinality(),
            seq,
            operand: Operand::Owned(combined),
        };
        heap.push(smallest);
        smallest = heap.pop().expect("heap was just pushed to");
    }
    smallest.operand.into_owned()
}
