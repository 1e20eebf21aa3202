// Portable byte layout for bitmaps, little-endian throughout. The format
// follows the interoperable serialization used by roaring bitmap
// implementations (https://github.com/RoaringBitmap/RoaringFormatSpec):
// a cookie identifying the layout variant, a descriptive header of keys and
// cardinalities, optional payload offsets, then one payload per container.
// Array and bitset payloads are distinguished by the stored cardinality;
// run containers are flagged in a marker bitset after the cookie.
//
// Parsing validates everything up front (bounds, key order, payload
// invariants) and hands back a `Layout` describing where each payload lives;
// deserialization and the zero-copy view are both built on it.

use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::ops::Range;

use crate::bitmap::Bitmap;
use crate::container::{Container, ARRAY_MAX_SIZE, BITSET_BYTES};
use crate::view::ContainerView;

/// Cookie of a layout that contains at least one run container. The high 16
/// bits carry the container count minus one.
const SERIAL_COOKIE: u32 = 12347;
/// Cookie of a layout without run containers, followed by an explicit u32
/// container count.
const SERIAL_COOKIE_NO_RUNS: u32 = 12346;
/// With run containers present and fewer containers than this, the offset
/// section is omitted.
const NO_OFFSET_THRESHOLD: usize = 4;

#[derive(Debug, PartialEq, Eq)]
pub enum FormatError {
    /// The leading magic number identifies neither layout variant.
    InvalidCookie { value: u32 },
    /// The container count exceeds the number of possible chunks.
    InvalidContainerCount { count: u32 },
    /// The buffer ends before the structure it should hold.
    Truncated { offset: usize, needed: usize },
    /// A key in the descriptive header is not strictly greater than its
    /// predecessor.
    KeysOutOfOrder { container: usize, offset: usize },
    /// A stored payload offset disagrees with the payload's actual position.
    BadOffset {
        container: usize,
        expected: u32,
        found: u32,
    },
    /// An array payload is not strictly ascending.
    UnsortedArray { container: usize, offset: usize },
    /// A run payload is out of order, overlapping, not maximally merged, or
    /// escapes the chunk.
    InvalidRuns { container: usize, offset: usize },
    /// A payload holds a different number of values than the descriptive
    /// header promised.
    CardinalityMismatch {
        container: usize,
        stored: u32,
        actual: u32,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidCookie { value } => write!(f, "invalid cookie {value}"),
            FormatError::InvalidContainerCount { count } => {
                write!(f, "invalid container count {count}")
            }
            FormatError::Truncated { offset, needed } => {
                write!(f, "buffer truncated at offset {offset}: {needed} bytes needed")
            }
            FormatError::KeysOutOfOrder { container, offset } => {
                write!(f, "key of container {container} out of order at offset {offset}")
            }
            FormatError::BadOffset {
                container,
                expected,
                found,
            } => write!(
                f,
                "container {container} payload offset {found} does not match position {expected}"
            ),
            FormatError::UnsortedArray { container, offset } => {
                write!(f, "unsorted array payload in container {container} at offset {offset}")
            }
            FormatError::InvalidRuns { container, offset } => {
                write!(f, "invalid run sequence in container {container} at offset {offset}")
            }
            FormatError::CardinalityMismatch {
                container,
                stored,
                actual,
            } => write!(
                f,
                "container {container} holds {actual} values but declares {stored}"
            ),
        }
    }
}

impl Error for FormatError {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChunkKind {
    Array,
    Bitset,
    Run,
}

/// Where one container's data lives inside a serialized buffer. For run
/// containers the payload range covers the run pairs, not the leading count.
#[derive(Clone, Debug)]
pub(crate) struct ChunkDesc {
    pub key: u16,
    pub cardinality: u32,
    pub kind: ChunkKind,
    pub payload: Range<usize>,
}

/// A fully validated serialized bitmap: every payload has been bounds-checked
/// and its sortedness/cardinality invariants verified.
pub(crate) struct Layout {
    pub chunks: Vec<ChunkDesc>,
    /// Bytes consumed; trailing bytes beyond this are ignored.
    pub len: usize,
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, FormatError> {
    match buf.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(FormatError::Truncated { offset, needed: 2 }),
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, FormatError> {
    match buf.get(offset..offset + 4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(FormatError::Truncated { offset, needed: 4 }),
    }
}

pub(crate) fn parse_layout(buf: &[u8]) -> Result<Layout, FormatError> {
    let cookie = read_u32(buf, 0)?;
    let mut offset = 4;
    let (has_run, count) = if cookie == SERIAL_COOKIE_NO_RUNS {
        let count = read_u32(buf, offset)?;
        offset += 4;
        (false, count)
    } else if cookie & 0xFFFF == SERIAL_COOKIE {
        (true, (cookie >> 16) + 1)
    } else {
        return Err(FormatError::InvalidCookie { value: cookie });
    };
    if count > 1 << 16 {
        return Err(FormatError::InvalidContainerCount { count });
    }
    let count = count as usize;

    let marker = if has_run {
        let bytes = (count + 7) / 8;
        let marker = buf
            .get(offset..offset + bytes)
            .ok_or(FormatError::Truncated {
                offset,
                needed: bytes,
            })?;
        offset += bytes;
        Some(marker)
    } else {
        None
    };
    let run_flagged =
        |i: usize| marker.map_or(false, |marker| marker[i / 8] & (1 << (i % 8)) != 0);

    let mut chunks: Vec<ChunkDesc> = Vec::with_capacity(count);
    for i in 0..count {
        let key = read_u16(buf, offset)?;
        if let Some(prev) = chunks.last() {
            if prev.key >= key {
                return Err(FormatError::KeysOutOfOrder {
                    container: i,
                    offset,
                });
            }
        }
        let cardinality = read_u16(buf, offset + 2)? as u32 + 1;
        offset += 4;
        let kind = if run_flagged(i) {
            ChunkKind::Run
        } else if cardinality as usize > ARRAY_MAX_SIZE {
            ChunkKind::Bitset
        } else {
            ChunkKind::Array
        };
        chunks.push(ChunkDesc {
            key,
            cardinality,
            kind,
            payload: 0..0, // filled in below
        });
    }

    let offsets = if !has_run || count >= NO_OFFSET_THRESHOLD {
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(read_u32(buf, offset)?);
            offset += 4;
        }
        Some(offsets)
    } else {
        None
    };

    for (i, chunk) in chunks.iter_mut().enumerate() {
        if let Some(offsets) = &offsets {
            if offsets[i] as usize != offset {
                return Err(FormatError::BadOffset {
                    container: i,
                    expected: offset as u32,
                    found: offsets[i],
                });
            }
        }
        match chunk.kind {
            ChunkKind::Array => {
                let bytes = 2 * chunk.cardinality as usize;
                let payload = buf
                    .get(offset..offset + bytes)
                    .ok_or(FormatError::Truncated {
                        offset,
                        needed: bytes,
                    })?;
                let mut prev: Option<u16> = None;
                for pair in payload.chunks_exact(2) {
                    let value = u16::from_le_bytes([pair[0], pair[1]]);
                    if prev.map_or(false, |p| p >= value) {
                        return Err(FormatError::UnsortedArray {
                            container: i,
                            offset,
                        });
                    }
                    prev = Some(value);
                }
                chunk.payload = offset..offset + bytes;
                offset += bytes;
            }
            ChunkKind::Bitset => {
                let payload =
                    buf.get(offset..offset + BITSET_BYTES)
                        .ok_or(FormatError::Truncated {
                            offset,
                            needed: BITSET_BYTES,
                        })?;
                let actual: u32 = payload
                    .chunks_exact(8)
                    .map(|word| {
                        u64::from_le_bytes([
                            word[0], word[1], word[2], word[3], word[4], word[5], word[6], word[7],
                        ])
                        .count_ones()
                    })
                    .sum();
                if actual != chunk.cardinality {
                    return Err(FormatError::CardinalityMismatch {
                        container: i,
                        stored: chunk.cardinality,
                        actual,
                    });
                }
                chunk.payload = offset..offset + BITSET_BYTES;
                offset += BITSET_BYTES;
            }
            ChunkKind::Run => {
                let num_runs = read_u16(buf, offset)? as usize;
                let bytes = 4 * num_runs;
                let payload = buf
                    .get(offset + 2..offset + 2 + bytes)
                    .ok_or(FormatError::Truncated {
                        offset: offset + 2,
                        needed: bytes,
                    })?;
                let mut actual = 0u32;
                let mut prev_end: Option<u32> = None;
                for quad in payload.chunks_exact(4) {
                    let start = u16::from_le_bytes([quad[0], quad[1]]) as u32;
                    let len = u16::from_le_bytes([quad[2], quad[3]]) as u32;
                    let merged_or_overlapping = prev_end.map_or(false, |end| start <= end + 1);
                    if start + len > u16::MAX as u32 || merged_or_overlapping {
                        return Err(FormatError::InvalidRuns {
                            container: i,
                            offset,
                        });
                    }
                    prev_end = Some(start + len);
                    actual += len + 1;
                }
                if actual != chunk.cardinality {
                    return Err(FormatError::CardinalityMismatch {
                        container: i,
                        stored: chunk.cardinality,
                        actual,
                    });
                }
                chunk.payload = offset + 2..offset + 2 + bytes;
                offset += 2 + bytes;
            }
        }
    }

    Ok(Layout {
        chunks,
        len: offset,
    })
}

fn container_bytes(container: &Container) -> usize {
    match container {
        Container::Array(a) => 2 * a.cardinality() as usize,
        Container::Bitset(_) => BITSET_BYTES,
        Container::Run(r) => 2 + 4 * r.num_runs() as usize,
    }
}

impl Bitmap {
    fn has_run(&self) -> bool {
        self.containers()
            .iter()
            .any(|c| matches!(c, Container::Run(_)))
    }

    fn header_bytes(&self) -> usize {
        let n = self.num_containers();
        if self.has_run() {
            let marker = (n + 7) / 8;
            if n < NO_OFFSET_THRESHOLD {
                4 + marker + 4 * n
            } else {
                4 + marker + 4 * n + 4 * n
            }
        } else {
            4 + 4 + 4 * n + 4 * n
        }
    }

    /// Exact number of bytes `serialize` will write.
    pub fn serialized_size_in_bytes(&self) -> usize {
        self.header_bytes() + self.containers().iter().map(container_bytes).sum::<usize>()
    }

    /// Write the portable byte layout to the sink.
    pub fn serialize<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        let n = self.num_containers();
        let has_run = self.has_run();
        if has_run {
            let cookie = SERIAL_COOKIE | ((n as u32 - 1) << 16);
            sink.write_all(&cookie.to_le_bytes())?;
            let mut marker = vec![0u8; (n + 7) / 8];
            for (i, container) in self.containers().iter().enumerate() {
                if matches!(container, Container::Run(_)) {
                    marker[i / 8] |= 1 << (i % 8);
                }
            }
            sink.write_all(&marker)?;
        } else {
            sink.write_all(&SERIAL_COOKIE_NO_RUNS.to_le_bytes())?;
            sink.write_all(&(n as u32).to_le_bytes())?;
        }

        for (key, container) in self.keys().iter().zip(self.containers()) {
            sink.write_all(&key.to_le_bytes())?;
            let cardinality = container.cardinality();
            debug_assert!(cardinality > 0);
            sink.write_all(&((cardinality - 1) as u16).to_le_bytes())?;
        }

        if !has_run || n >= NO_OFFSET_THRESHOLD {
            let mut offset = self.header_bytes();
            for container in self.containers() {
                sink.write_all(&(offset as u32).to_le_bytes())?;
                offset += container_bytes(container);
            }
        }

        for container in self.containers() {
            match container {
                Container::Array(a) => {
                    debug_assert!(a.cardinality() as usize <= ARRAY_MAX_SIZE);
                    for value in a.iter() {
                        sink.write_all(&value.to_le_bytes())?;
                    }
                }
                Container::Bitset(b) => {
                    debug_assert!(b.cardinality() as usize > ARRAY_MAX_SIZE);
                    for word in b.words() {
                        sink.write_all(&word.to_le_bytes())?;
                    }
                }
                Container::Run(r) => {
                    sink.write_all(&(r.num_runs() as u16).to_le_bytes())?;
                    for run in r.runs() {
                        sink.write_all(&run.start.to_le_bytes())?;
                        sink.write_all(&run.len.to_le_bytes())?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The portable byte layout as a fresh vector.
    pub fn serialize_to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.serialized_size_in_bytes());
        // writing into a Vec cannot fail
        let _ = self.serialize(&mut bytes);
        bytes
    }

    /// Rebuild a bitmap from its portable byte layout. Trailing bytes after
    /// the encoded bitmap are permitted and ignored.
    pub fn deserialize(buf: &[u8]) -> Result<Bitmap, FormatError> {
        let layout = parse_layout(buf)?;
        let mut keys = Vec::with_capacity(layout.chunks.len());
        let mut containers = Vec::with_capacity(layout.chunks.len());
        for desc in &layout.chunks {
            keys.push(desc.key);
            containers.push(ContainerView::new(buf, desc).to_container());
        }
        log::debug!(
            "decoded bitmap: {} containers in {} bytes",
            keys.len(),
            layout.len
        );
        Ok(Bitmap::from_parts(keys, containers))
    }
}

// Bitmaps embed in larger bincode-encoded structures by nesting the portable
// byte layout, so the on-disk bincode form stays interoperable with the
// plain serialized form.

impl bincode::Encode for Bitmap {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> core::result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.serialize_to_vec(), encoder)
    }
}

impl bincode::Decode for Bitmap {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> core::result::Result<Self, bincode::error::DecodeError> {
        let bytes: Vec<u8> = bincode::Decode::decode(decoder)?;
        Bitmap::deserialize(&bytes)
            .map_err(|e| bincode::error::DecodeError::OtherString(e.to_string()))
    }
}

impl<'de> bincode::BorrowDecode<'de> for Bitmap {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de>>(
        decoder: &mut D,
    ) -> core::result::Result<Self, bincode::error::DecodeError> {
        bincode::Decode::decode(decoder)
    }
}
