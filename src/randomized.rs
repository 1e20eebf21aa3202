// Randomized differential checks across the public surface. Every test
// drives an explicitly seeded generator, builds bitmaps whose chunks mix the
// three container flavors, and asserts an algebraic identity that must hold
// for every input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{and_many, and_many_smallest_first, or_many, or_many_smallest_first};
use crate::{Bitmap, BitmapView};

const ITERATIONS: usize = 48;

/// A bitmap with up to max_keys chunks, each randomly sparse, dense, or
/// clustered, optionally run-optimized.
fn random_bitmap(rng: &mut StdRng, max_keys: u16) -> Bitmap {
    let mut bitmap = Bitmap::new();
    for _ in 0..rng.gen_range(0..=max_keys) {
        let base = (rng.gen_range(0..max_keys) as u64) << 16;
        match rng.gen_range(0..3) {
            // sparse: a few scattered values
            0 => {
                for _ in 0..rng.gen_range(1..=512) {
                    bitmap.add(base as u32 | rng.gen::<u16>() as u32);
                }
            }
            // dense: enough values to cross the bitset threshold
            1 => {
                for _ in 0..rng.gen_range(4_097..=8_192) {
                    bitmap.add(base as u32 | rng.gen::<u16>() as u32);
                }
            }
            // clustered: runs separated by gaps
            _ => {
                let mut low = rng.gen_range(0..4_096u64);
                while low < 65_536 {
                    let end = (low + rng.gen_range(1..2_048)).min(65_536);
                    bitmap.add_range(base + low..base + end);
                    low = end + rng.gen_range(1..4_096);
                }
            }
        }
    }
    if rng.gen_bool(0.5) {
        bitmap.optimize();
    }
    bitmap
}

fn for_each_bitmap(seed: u64, mut check: impl FnMut(&mut StdRng, Bitmap)) {
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..ITERATIONS {
        let bitmap = random_bitmap(&mut rng, 8);
        check(&mut rng, bitmap);
    }
}

fn for_each_pair(seed: u64, mut check: impl FnMut(&Bitmap, &Bitmap)) {
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..ITERATIONS {
        let a = random_bitmap(&mut rng, 8);
        let b = random_bitmap(&mut rng, 8);
        check(&a, &b);
    }
}

/// Sampled order-statistic indices: the extremes plus a random interior set.
fn sample_indices(rng: &mut StdRng, cardinality: u64) -> Vec<u64> {
    let mut indices = vec![0, cardinality - 1];
    for _ in 0..64 {
        indices.push(rng.gen_range(0..cardinality));
    }
    indices
}

#[test]
fn rank_select_invariance() {
    for_each_bitmap(0xA001, |rng, bitmap| {
        let cardinality = bitmap.cardinality();
        if cardinality == 0 {
            return;
        }
        for i in sample_indices(rng, cardinality) {
            let value = bitmap.select(i).unwrap();
            assert_eq!(bitmap.rank(value), i + 1);
            assert!(bitmap.contains(value));
        }
        assert_eq!(bitmap.select(cardinality), None);
    });
}

#[test]
fn first_last_select_invariance() {
    for_each_bitmap(0xA002, |_, bitmap| {
        let cardinality = bitmap.cardinality();
        if cardinality == 0 {
            assert_eq!(bitmap.first(), None);
            assert_eq!(bitmap.last(), None);
            return;
        }
        assert_eq!(bitmap.first(), bitmap.select(0));
        assert_eq!(bitmap.last(), bitmap.select(cardinality - 1));
    });
}

#[test]
fn intersects_first_last_invariance() {
    for_each_bitmap(0xA003, |_, bitmap| {
        let (Some(first), Some(last)) = (bitmap.first(), bitmap.last()) else {
            return;
        };
        assert!(bitmap.intersects_range(first as u64..last as u64 + 1));
    });
}

#[test]
fn contains_range_after_filling_invariance() {
    for_each_bitmap(0xA004, |_, bitmap| {
        let (Some(first), Some(last)) = (bitmap.first(), bitmap.last()) else {
            return;
        };
        let range = first as u64..last as u64 + 1;
        let mut filled = bitmap.clone();
        filled.add_range(range.clone());
        assert!(filled.contains_range(range));
    });
}

#[test]
fn cardinality_laws() {
    for_each_pair(0xB001, |a, b| {
        assert_eq!(a.and_cardinality(b), a.and(b).cardinality());
        assert_eq!(a.or_cardinality(b), a.or(b).cardinality());
        assert_eq!(a.xor_cardinality(b), a.xor(b).cardinality());
        assert_eq!(a.and_not_cardinality(b), a.and_not(b).cardinality());
    });
}

#[test]
fn containment_laws() {
    for_each_pair(0xB002, |a, b| {
        let meet = a.and(b);
        // a superset's intersection with the subset is the subset
        assert!(meet.is_subset(a));
        assert!(a.is_superset(&meet));
        assert_eq!(a.and(&meet), meet);

        // strict containment is antisymmetric
        if a.is_superset(b) && a != b {
            assert!(!b.is_superset(a));
        }

        // disjoint non-empty bitmaps contain each other only when empty
        if a.and_cardinality(b) == 0 && !a.is_empty() && !b.is_empty() {
            assert!(!a.is_superset(b));
            assert!(!b.is_superset(a));
        }
    });
}

#[test]
fn disjoint_union_cardinality_laws() {
    for_each_pair(0xB003, |a, b| {
        let disjoint = b.and_not(a);
        assert_eq!(a.and_cardinality(&disjoint), 0);
        let sum = a.cardinality() + disjoint.cardinality();
        assert_eq!(a.or_cardinality(&disjoint), sum);
        assert_eq!(a.xor_cardinality(&disjoint), sum);
    });
}

#[test]
fn equality_symmetry() {
    for_each_pair(0xB004, |a, b| {
        assert_eq!(a == b, b == a);

        let mut reencoded = a.clone();
        reencoded.optimize();
        assert_eq!(*a, reencoded);
        assert_eq!(reencoded, *a);
    });
}

#[test]
fn absorption_laws() {
    for_each_pair(0xB005, |a, b| {
        assert_eq!(a.or(&a.and(b)), *a);
        assert_eq!(a.or(b), a.or(&a.xor(b)));
        assert_eq!(a.xor(b), a.or(b).and_not(&a.and(b)));
    });
}

#[test]
fn range_cardinality_vs_materialized_range() {
    let mut rng = StdRng::seed_from_u64(0xC001);
    for _ in 0..12 {
        let bitmap = random_bitmap(&mut rng, 8);
        let min = rng.gen_range(0..1u64 << 32);
        let max = rng.gen_range(min..=1u64 << 32);
        let range = Bitmap::from_range(min..max);
        assert_eq!(
            bitmap.range_cardinality(min..max),
            range.and_cardinality(&bitmap)
        );
    }
}

#[test]
fn serialization_roundtrip() {
    for_each_bitmap(0xD001, |_, bitmap| {
        let bytes = bitmap.serialize_to_vec();
        assert_eq!(bytes.len(), bitmap.serialized_size_in_bytes());
        assert_eq!(Bitmap::deserialize(&bytes).unwrap(), bitmap);

        let view = BitmapView::new(&bytes).unwrap();
        assert!(view == bitmap);
        assert_eq!(view.to_bitmap(), bitmap);
    });
}

#[test]
fn view_ops_match_owned_ops() {
    for_each_pair(0xD002, |a, b| {
        let (bytes_a, bytes_b) = (a.serialize_to_vec(), b.serialize_to_vec());
        let (va, vb) = (
            BitmapView::new(&bytes_a).unwrap(),
            BitmapView::new(&bytes_b).unwrap(),
        );
        assert_eq!(va.and(&vb), a.and(b));
        assert_eq!(va.or(&vb), a.or(b));
        assert_eq!(va.xor(&vb), a.xor(b));
        assert_eq!(va.and_not(&vb), a.and_not(b));
        assert_eq!(va.and_cardinality(&vb), a.and_cardinality(b));
        assert_eq!(va.intersects(&vb), a.intersects(b));
        assert_eq!(va.is_subset(&vb), a.is_subset(b));
    });
}

#[test]
fn inplace_ops_match_allocating_ops() {
    for_each_pair(0xD003, |a, b| {
        let mut c = a.clone();
        c.and_inplace(b);
        assert_eq!(c, a.and(b));
        let mut c = a.clone();
        c.or_inplace(b);
        assert_eq!(c, a.or(b));
        let mut c = a.clone();
        c.xor_inplace(b);
        assert_eq!(c, a.xor(b));
        let mut c = a.clone();
        c.and_not_inplace(b);
        assert_eq!(c, a.and_not(b));
    });
}

#[test]
fn aggregation_strategies_agree() {
    let mut rng = StdRng::seed_from_u64(0xE001);
    for _ in 0..ITERATIONS / 4 {
        let bitmaps: Vec<Bitmap> = (0..6).map(|_| random_bitmap(&mut rng, 6)).collect();
        let refs: Vec<&Bitmap> = bitmaps.iter().collect();

        let or_folded = refs[1..]
            .iter()
            .fold(refs[0].clone(), |acc, next| acc.or(next));
        assert_eq!(or_many(refs.iter().copied()), or_folded);
        assert_eq!(or_many_smallest_first(refs.iter().copied()), or_folded);

        let and_folded = refs[1..]
            .iter()
            .fold(refs[0].clone(), |acc, next| acc.and(next));
        assert_eq!(and_many(refs.iter().copied()), and_folded);
        assert_eq!(and_many_smallest_first(refs.iter().copied()), and_folded);
    }
}

#[test]
fn flip_range_involution() {
    let mut rng = StdRng::seed_from_u64(0xE002);
    for _ in 0..ITERATIONS {
        let bitmap = random_bitmap(&mut rng, 8);
        let min = rng.gen_range(0..1u64 << 32);
        let max = rng.gen_range(min..=1u64 << 32);

        let mut flipped = bitmap.clone();
        flipped.flip_range(min..max);
        assert_eq!(flipped, bitmap.xor(&Bitmap::from_range(min..max)));
        flipped.flip_range(min..max);
        assert_eq!(flipped, bitmap);
    }
}

#[test]
fn bincode_roundtrip() {
    let config = bincode::config::standard();
    for_each_bitmap(0xE003, |_, bitmap| {
        let encoded = bincode::encode_to_vec(&bitmap, config).unwrap();
        let (decoded, consumed): (Bitmap, usize) =
            bincode::decode_from_slice(&encoded, config).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, bitmap);
    });
}
