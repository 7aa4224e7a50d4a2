use super::{shuffle_and_chunk, Chunk, ChunkError};
use crate::arguments::ArgumentTuple;
use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use std::iter::once;

fn numbered(count: usize) -> Vec<ArgumentTuple> {
    (0..count).map(|i| once(i as i64).collect()).collect_vec()
}

fn numbers(chunks: &[Chunk]) -> Vec<i64> {
    chunks
        .iter()
        .flat_map(|chunk| chunk.tuples.iter())
        .map(|tuple| tuple.to_string().parse::<i64>().unwrap())
        .collect_vec()
}

fn chunked(count: usize, seed: u64) -> Vec<Chunk> {
    shuffle_and_chunk(numbered(count), 1000, &mut StdRng::seed_from_u64(seed)).unwrap()
}

#[test]
pub fn every_tuple_exactly_once() {
    let chunks = chunked(2537, 7);
    let mut seen = numbers(&chunks);
    seen.sort_unstable();

    assert_eq!(seen, (0..2537).collect_vec());
}

#[test]
pub fn chunks_never_hold_a_single_subjob() {
    for count in [2, 3, 999, 1000, 1001, 1002, 1999, 2000, 2001, 3500] {
        let chunks = chunked(count, count as u64);

        assert!(
            chunks.iter().all(|chunk| chunk.len() >= 2 && chunk.len() <= 1000),
            "bad chunk sizes for {count}: {:?}",
            chunks.iter().map(Chunk::len).collect_vec()
        );
        assert_eq!(chunks.iter().map(Chunk::len).sum::<usize>(), count);
    }
}

#[test]
pub fn boundary_chunk_borrows_from_predecessor() {
    let chunks = chunked(1001, 1);

    assert_eq!(chunks.iter().map(Chunk::len).collect_vec(), vec![999, 2]);
    assert_eq!(chunks[0].index_range(), (0, 998));
    assert_eq!(chunks[1].index_range(), (1000, 1001));
    assert_eq!(chunks[1].array_range(), "1000-1001");
}

#[test]
pub fn ranges_are_disjoint_and_increasing() {
    let chunks = chunked(4321, 3);

    for (index, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, index);
        assert_eq!(chunk.offset, index * 1000);
    }

    for (previous, next) in chunks.iter().tuple_windows() {
        assert!(previous.index_range().1 < next.index_range().0);
    }
}

#[test]
pub fn same_seed_same_chunks() {
    assert_eq!(chunked(1500, 42), chunked(1500, 42));
    assert_ne!(numbers(&chunked(1500, 42)), numbers(&chunked(1500, 43)));
}

#[test]
pub fn order_is_shuffled() {
    assert_ne!(numbers(&chunked(100, 5)), (0..100).collect_vec());
}

#[test]
pub fn too_few_tuples_rejected() {
    let mut rng = StdRng::seed_from_u64(0);

    assert_eq!(
        shuffle_and_chunk(numbered(1), 1000, &mut rng),
        Err(ChunkError::TooFewTuples(1))
    );
    assert_eq!(
        shuffle_and_chunk(numbered(0), 1000, &mut rng),
        Err(ChunkError::TooFewTuples(0))
    );
    assert_eq!(
        shuffle_and_chunk(numbered(10), 2, &mut rng),
        Err(ChunkError::ArraySizeTooSmall(2))
    );
}

#[test]
pub fn small_array_size_keeps_invariants() {
    let chunks = shuffle_and_chunk(numbered(7), 3, &mut StdRng::seed_from_u64(9)).unwrap();

    assert_eq!(chunks.iter().map(Chunk::len).collect_vec(), vec![3, 2, 2]);
    assert_eq!(
        chunks.iter().map(Chunk::array_range).collect_vec(),
        vec!["0-2", "3-4", "6-7"]
    );
}
