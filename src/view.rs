// Read-only bitmap over an externally-owned serialized buffer. Construction
// validates the layout once; queries then interpret payload bytes in place
// without copying them, so many threads may share one buffer. Operations
// that produce new bitmaps run through the same merge-join and pairwise
// container code as owned bitmaps, materializing a chunk only when an
// operator actually touches it.

use crate::array::ArrayContainer;
use crate::bitmap::Bitmap;
use crate::bitset::BitsetContainer;
use crate::codec::{parse_layout, ChunkDesc, ChunkKind, FormatError};
use crate::container::Container;
use crate::ops::{self, BinaryOp, ChunkRef};
use crate::run::{Run, RunContainer};
use crate::utils::{partition_point, select_in_word};

pub struct BitmapView<'a> {
    buf: &'a [u8],
    chunks: Vec<ChunkDesc>,
    byte_len: usize,
}

impl<'a> BitmapView<'a> {
    /// Validate a serialized bitmap and wrap it without copying payloads.
    /// Trailing bytes after the encoded bitmap are permitted and ignored.
    pub fn new(buf: &'a [u8]) -> Result<Self, FormatError> {
        let layout = parse_layout(buf)?;
        Ok(Self {
            buf,
            chunks: layout.chunks,
            byte_len: layout.len,
        })
    }

    /// Bytes of the buffer occupied by the bitmap.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn num_containers(&self) -> usize {
        self.chunks.len()
    }

    pub fn cardinality(&self) -> u64 {
        self.chunks.iter().map(|c| c.cardinality as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn container(&self, i: usize) -> ContainerView<'a> {
        ContainerView::new(self.buf, &self.chunks[i])
    }

    fn find_key(&self, key: u16) -> Result<usize, usize> {
        self.chunks.binary_search_by(|c| c.key.cmp(&key))
    }

    pub fn contains(&self, value: u32) -> bool {
        match self.find_key((value >> 16) as u16) {
            Ok(i) => self.container(i).contains((value & 0xFFFF) as u16),
            Err(_) => false,
        }
    }

    /// Count of stored values <= value.
    pub fn rank(&self, value: u32) -> u64 {
        let key = (value >> 16) as u16;
        let mut rank = 0u64;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.key > key {
                break;
            }
            if chunk.key < key {
                rank += chunk.cardinality as u64;
            } else {
                rank += self.container(i).rank((value & 0xFFFF) as u16) as u64;
            }
        }
        rank
    }

    /// The n-th smallest stored value (0-indexed), or None when
    /// n >= cardinality.
    pub fn select(&self, n: u64) -> Option<u32> {
        let mut remaining = n;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let cardinality = chunk.cardinality as u64;
            if remaining < cardinality {
                let low = self.container(i).select(remaining as u32)?;
                return Some((chunk.key as u32) << 16 | low as u32);
            }
            remaining -= cardinality;
        }
        None
    }

    pub fn first(&self) -> Option<u32> {
        let chunk = self.chunks.first()?;
        let low = self.container(0).min()?;
        Some((chunk.key as u32) << 16 | low as u32)
    }

    pub fn last(&self) -> Option<u32> {
        let chunk = self.chunks.last()?;
        let low = self.container(self.chunks.len() - 1).max()?;
        Some((chunk.key as u32) << 16 | low as u32)
    }

    /// Count of stored values in the half-open range.
    ///
    /// Panics if `range.start > range.end` or `range.end > 2^32`.
    pub fn range_cardinality(&self, range: std::ops::Range<u64>) -> u64 {
        assert!(
            range.start <= range.end && range.end <= 1 << 32,
            "invalid range {}..{}",
            range.start,
            range.end,
        );
        let below = |bound: u64| {
            if bound == 0 {
                0
            } else {
                self.rank((bound - 1) as u32)
            }
        };
        below(range.end) - below(range.start)
    }

    /// Ascending iterator over the stored values.
    pub fn iter(&self) -> ViewIter<'_, 'a> {
        ViewIter {
            view: self,
            chunk: 0,
            current: None,
        }
    }

    /// Materialize an owned bitmap with the same contents.
    pub fn to_bitmap(&self) -> Bitmap {
        let keys = self.chunks.iter().map(|c| c.key).collect();
        let containers = (0..self.chunks.len())
            .map(|i| self.container(i).to_container())
            .collect();
        Bitmap::from_parts(keys, containers)
    }

    pub(crate) fn chunk_refs(&self) -> impl Iterator<Item = (u16, ChunkRef<'_>)> {
        self.chunks
            .iter()
            .map(|c| (c.key, ChunkRef::View(ContainerView::new(self.buf, c))))
    }

    /// Intersection, as a new owned bitmap.
    pub fn and(&self, other: &BitmapView) -> Bitmap {
        ops::binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::And)
    }

    /// Union, as a new owned bitmap.
    pub fn or(&self, other: &BitmapView) -> Bitmap {
        ops::binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::Or)
    }

    /// Symmetric difference, as a new owned bitmap.
    pub fn xor(&self, other: &BitmapView) -> Bitmap {
        ops::binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::Xor)
    }

    /// Difference (self minus other), as a new owned bitmap.
    pub fn and_not(&self, other: &BitmapView) -> Bitmap {
        ops::binary_op(self.chunk_refs(), other.chunk_refs(), BinaryOp::AndNot)
    }

    /// `and(self, other).cardinality()` without building the result.
    pub fn and_cardinality(&self, other: &BitmapView) -> u64 {
        ops::and_cardinality(self.chunk_refs(), other.chunk_refs())
    }

    /// `or(self, other).cardinality()` without building the result.
    pub fn or_cardinality(&self, other: &BitmapView) -> u64 {
        self.cardinality() + other.cardinality() - self.and_cardinality(other)
    }

    /// `xor(self, other).cardinality()` without building the result.
    pub fn xor_cardinality(&self, other: &BitmapView) -> u64 {
        self.cardinality() + other.cardinality() - 2 * self.and_cardinality(other)
    }

    pub fn intersects(&self, other: &BitmapView) -> bool {
        ops::intersects(self.chunk_refs(), other.chunk_refs())
    }

    pub fn is_subset(&self, other: &BitmapView) -> bool {
        ops::is_subset(self.chunk_refs(), other.chunk_refs())
    }
}

impl PartialEq<Bitmap> for BitmapView<'_> {
    fn eq(&self, other: &Bitmap) -> bool {
        self.chunks.len() == other.keys().len()
            && self
                .chunks
                .iter()
                .map(|c| c.key)
                .eq(other.keys().iter().copied())
            && (0..self.chunks.len()).all(|i| {
                let view = self.container(i);
                let container = &other.containers()[i];
                view.cardinality() == container.cardinality() && view.iter().eq(container.iter())
            })
    }
}

impl PartialEq<BitmapView<'_>> for Bitmap {
    fn eq(&self, other: &BitmapView<'_>) -> bool {
        other == self
    }
}

/// One container still in its serialized form.
pub(crate) struct ContainerView<'a> {
    kind: ChunkKind,
    cardinality: u32,
    payload: &'a [u8],
}

impl<'a> ContainerView<'a> {
    pub(crate) fn new(buf: &'a [u8], desc: &ChunkDesc) -> Self {
        Self {
            kind: desc.kind,
            cardinality: desc.cardinality,
            payload: &buf[desc.payload.clone()],
        }
    }

    pub(crate) fn cardinality(&self) -> u32 {
        self.cardinality
    }

    fn value_at(&self, i: usize) -> u16 {
        u16::from_le_bytes([self.payload[2 * i], self.payload[2 * i + 1]])
    }

    fn word_at(&self, i: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.payload[8 * i..8 * i + 8]);
        u64::from_le_bytes(bytes)
    }

    fn run_at(&self, i: usize) -> Run {
        Run::new(
            u16::from_le_bytes([self.payload[4 * i], self.payload[4 * i + 1]]),
            u16::from_le_bytes([self.payload[4 * i + 2], self.payload[4 * i + 3]]),
        )
    }

    fn num_runs(&self) -> usize {
        self.payload.len() / 4
    }

    pub(crate) fn contains(&self, low: u16) -> bool {
        match self.kind {
            ChunkKind::Array => {
                let n = self.cardinality as usize;
                let i = partition_point(n, |i| self.value_at(i) < low);
                i < n && self.value_at(i) == low
            }
            ChunkKind::Bitset => self.word_at(low as usize >> 6) >> (low & 63) & 1 != 0,
            ChunkKind::Run => {
                let i = partition_point(self.num_runs(), |i| self.run_at(i).start <= low);
                i > 0 && low <= self.run_at(i - 1).end()
            }
        }
    }

    /// Count of stored values <= low.
    pub(crate) fn rank(&self, low: u16) -> u32 {
        match self.kind {
            ChunkKind::Array => {
                partition_point(self.cardinality as usize, |i| self.value_at(i) <= low) as u32
            }
            ChunkKind::Bitset => {
                let word_index = low as usize >> 6;
                let prefix: u32 = (0..word_index).map(|i| self.word_at(i).count_ones()).sum();
                let mask = u64::MAX >> (63 - (low & 63));
                prefix + (self.word_at(word_index) & mask).count_ones()
            }
            ChunkKind::Run => {
                let i = partition_point(self.num_runs(), |i| self.run_at(i).start <= low);
                let mut rank: u32 = (0..i).map(|j| self.run_at(j).count()).sum();
                if i > 0 {
                    let last = self.run_at(i - 1);
                    rank -= (last.end() as u32).saturating_sub(low as u32);
                }
                rank
            }
        }
    }

    /// The n-th smallest stored value (0-indexed).
    pub(crate) fn select(&self, n: u32) -> Option<u16> {
        if n >= self.cardinality {
            return None;
        }
        match self.kind {
            ChunkKind::Array => Some(self.value_at(n as usize)),
            ChunkKind::Bitset => {
                let mut remaining = n;
                for i in 0..crate::bitset::BITSET_WORDS {
                    let word = self.word_at(i);
                    let ones = word.count_ones();
                    if remaining < ones {
                        return Some(((i as u32) << 6 | select_in_word(word, remaining)) as u16);
                    }
                    remaining -= ones;
                }
                None
            }
            ChunkKind::Run => {
                let mut remaining = n;
                for i in 0..self.num_runs() {
                    let run = self.run_at(i);
                    if remaining < run.count() {
                        return Some(run.start + remaining as u16);
                    }
                    remaining -= run.count();
                }
                None
            }
        }
    }

    pub(crate) fn min(&self) -> Option<u16> {
        self.select(0)
    }

    pub(crate) fn max(&self) -> Option<u16> {
        match self.kind {
            ChunkKind::Array => Some(self.value_at(self.cardinality as usize - 1)),
            ChunkKind::Bitset => self.select(self.cardinality - 1),
            ChunkKind::Run => match self.num_runs() {
                0 => None,
                n => Some(self.run_at(n - 1).end()),
            },
        }
    }

    pub(crate) fn iter(&self) -> ContainerViewIter<'a> {
        match self.kind {
            ChunkKind::Array => ContainerViewIter::Array {
                payload: self.payload,
                index: 0,
            },
            ChunkKind::Bitset => ContainerViewIter::Bitset {
                payload: self.payload,
                word_index: 0,
                current: None,
            },
            ChunkKind::Run => ContainerViewIter::Run {
                payload: self.payload,
                index: 0,
                offset: 0,
            },
        }
    }

    /// Copy the payload out into an owned container.
    pub(crate) fn to_container(&self) -> Container {
        match self.kind {
            ChunkKind::Array => {
                let values = (0..self.cardinality as usize)
                    .map(|i| self.value_at(i))
                    .collect();
                Container::Array(ArrayContainer::from_sorted(values))
            }
            ChunkKind::Bitset => {
                let words = (0..crate::bitset::BITSET_WORDS)
                    .map(|i| self.word_at(i))
                    .collect();
                Container::Bitset(BitsetContainer::from_words(words))
            }
            ChunkKind::Run => {
                let runs = (0..self.num_runs()).map(|i| self.run_at(i)).collect();
                Container::Run(RunContainer::from_runs(runs))
            }
        }
    }
}

pub(crate) enum ContainerViewIter<'a> {
    Array {
        payload: &'a [u8],
        index: usize,
    },
    Bitset {
        payload: &'a [u8],
        word_index: usize,
        current: Option<u64>,
    },
    Run {
        payload: &'a [u8],
        index: usize,
        offset: u32,
    },
}

impl Iterator for ContainerViewIter<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        match self {
            ContainerViewIter::Array { payload, index } => {
                let bytes = payload.get(2 * *index..2 * *index + 2)?;
                *index += 1;
                Some(u16::from_le_bytes([bytes[0], bytes[1]]))
            }
            ContainerViewIter::Bitset {
                payload,
                word_index,
                current,
            } => loop {
                let word = match current {
                    Some(word) if *word != 0 => word,
                    _ => {
                        let base = 8 * *word_index;
                        let bytes = payload.get(base..base + 8)?;
                        *word_index += 1;
                        *current = Some(u64::from_le_bytes(bytes.try_into().ok()?));
                        continue;
                    }
                };
                let bit = word.trailing_zeros();
                *word &= *word - 1;
                return Some((((*word_index as u32 - 1) << 6) | bit) as u16);
            },
            ContainerViewIter::Run {
                payload,
                index,
                offset,
            } => {
                let bytes = payload.get(4 * *index..4 * *index + 4)?;
                let start = u16::from_le_bytes([bytes[0], bytes[1]]);
                let len = u16::from_le_bytes([bytes[2], bytes[3]]);
                let value = start + *offset as u16;
                if *offset == len as u32 {
                    *index += 1;
                    *offset = 0;
                } else {
                    *offset += 1;
                }
                Some(value)
            }
        }
    }
}

pub struct ViewIter<'v, 'a> {
    view: &'v BitmapView<'a>,
    chunk: usize,
    current: Option<(u32, ContainerViewIter<'a>)>,
}

impl Iterator for ViewIter<'_, '_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some((base, values)) = &mut self.current {
                if let Some(low) = values.next() {
                    return Some(*base | low as u32);
                }
            }
            let i = self.chunk;
            if i >= self.view.chunks.len() {
                return None;
            }
            self.chunk += 1;
            let base = (self.view.chunks[i].key as u32) << 16;
            self.current = Some((base, self.view.container(i).iter()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bitmap() -> Bitmap {
        let mut bitmap = Bitmap::new();
        bitmap.extend([3, 9, 100, 70_000]); // array chunks
        bitmap.extend((131_072..151_072).filter(|v| v % 2 == 0)); // bitset chunk
        bitmap.add_range((5 << 16)..(5 << 16 | 5_000)); // run chunk
        bitmap.optimize();
        bitmap
    }

    #[test]
    fn test_view_queries_match_owned() {
        let bitmap = sample_bitmap();
        let bytes = bitmap.serialize_to_vec();
        let view = BitmapView::new(&bytes).unwrap();

        assert_eq!(view.byte_len(), bytes.len());
        assert_eq!(view.cardinality(), bitmap.cardinality());
        assert_eq!(view.first(), bitmap.first());
        assert_eq!(view.last(), bitmap.last());
        assert_eq!(view.num_containers(), bitmap.num_containers());

        for value in [0, 3, 9, 100, 70_000, 131_072, 131_073, 151_070, u32::MAX] {
            assert_eq!(view.contains(value), bitmap.contains(value), "{value}");
            assert_eq!(view.rank(value), bitmap.rank(value), "{value}");
        }
        let cardinality = bitmap.cardinality();
        for n in [0, 1, 2, 3, 4, cardinality - 1, cardinality, cardinality + 5] {
            assert_eq!(view.select(n), bitmap.select(n), "{n}");
        }
        assert_eq!(
            view.range_cardinality(100..140_000),
            bitmap.range_cardinality(100..140_000)
        );

        assert!(view.iter().eq(bitmap.iter()));
        assert_eq!(view.to_bitmap(), bitmap);
        assert!(view == bitmap);
        assert!(bitmap == view);
    }

    #[test]
    fn test_view_detects_difference() {
        let bitmap = sample_bitmap();
        let bytes = bitmap.serialize_to_vec();
        let view = BitmapView::new(&bytes).unwrap();
        let mut other = bitmap.clone();
        other.remove(9);
        assert!(view != other);
    }

    #[test]
    fn test_view_ops_match_owned() {
        let a = sample_bitmap();
        let b = Bitmap::from_range(50..140_000);
        let (bytes_a, bytes_b) = (a.serialize_to_vec(), b.serialize_to_vec());
        let (va, vb) = (
            BitmapView::new(&bytes_a).unwrap(),
            BitmapView::new(&bytes_b).unwrap(),
        );

        assert_eq!(va.and(&vb), a.and(&b));
        assert_eq!(va.or(&vb), a.or(&b));
        assert_eq!(va.xor(&vb), a.xor(&b));
        assert_eq!(va.and_not(&vb), a.and_not(&b));
        assert_eq!(va.and_cardinality(&vb), a.and_cardinality(&b));
        assert_eq!(va.or_cardinality(&vb), a.or_cardinality(&b));
        assert_eq!(va.xor_cardinality(&vb), a.xor_cardinality(&b));
        assert_eq!(va.intersects(&vb), a.intersects(&b));
        assert_eq!(va.is_subset(&vb), a.is_subset(&b));
        assert!(va.and(&vb).is_subset(&a));
    }

    #[test]
    fn test_view_rejects_malformed() {
        let bytes = sample_bitmap().serialize_to_vec();
        assert!(BitmapView::new(&bytes[..bytes.len() - 3]).is_err());
        assert!(BitmapView::new(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_empty_view() {
        let bytes = Bitmap::new().serialize_to_vec();
        let view = BitmapView::new(&bytes).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.cardinality(), 0);
        assert_eq!(view.first(), None);
        assert_eq!(view.select(0), None);
        assert_eq!(view.iter().count(), 0);
        assert!(!view.contains(42));
    }
}
