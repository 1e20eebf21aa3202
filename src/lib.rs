// Compressed bitmap index over the 32-bit integer universe. A value's upper
// 16 bits pick a chunk and its lower 16 bits live in that chunk's container,
// which adapts between three representations by density: a sorted array for
// sparse chunks, a 1024-word bitset for dense ones, and a run list for
// clustered ones. On top of the containers sit the set algebra (pairwise and
// wide and/or/xor/and-not with count-only variants), rank/select order
// statistics, a portable byte layout, and a zero-copy read-only view over
// serialized buffers.

mod array;
mod bitmap;
mod bitset;
mod codec;
mod container;
mod ops;
mod run;
mod utils;
mod view;

#[cfg(test)]
mod randomized;

pub use array::ArrayContainer;
pub use bitmap::{Bitmap, Iter};
pub use bitset::BitsetContainer;
pub use codec::FormatError;
pub use container::Container;
pub use ops::{and_many, and_many_smallest_first, or_many, or_many_smallest_first};
pub use run::{Run, RunContainer};
pub use view::{BitmapView, ViewIter};
