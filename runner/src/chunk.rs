#[cfg(test)]
mod chunk_test;

use crate::arguments::ArgumentTuple;
use itertools::Itertools;
use rand::{seq::SliceRandom, Rng};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("PBS array jobs need at least two subjobs, got {0}")]
    TooFewTuples(usize),
    #[error("max array size must be at least 3, got {0}")]
    ArraySizeTooSmall(usize),
}

/// Contiguous part of the shuffled subjobs, submitted as a single array job
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    /// array index of the first subjob in this chunk
    pub offset: usize,
    pub tuples: Vec<ArgumentTuple>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// first and last array index, both inclusive
    pub fn index_range(&self) -> (usize, usize) {
        (self.offset, self.offset + self.len().saturating_sub(1))
    }

    /// range as expected by `#PBS -J`
    pub fn array_range(&self) -> String {
        let (first, last) = self.index_range();

        format!("{first}-{last}")
    }
}

/// Shuffle all subjobs and split them into array jobs of at most `max_array_size` subjobs.
///
/// The shuffle spreads unevenly sized subjobs across chunks. Chunk `i` owns the array
/// indices starting at `i * max_array_size`. A trailing chunk with a single subjob takes
/// one subjob from its predecessor since PBS rejects arrays of length one.
pub fn shuffle_and_chunk<R: Rng + ?Sized>(
    mut tuples: Vec<ArgumentTuple>,
    max_array_size: usize,
    rng: &mut R,
) -> Result<Vec<Chunk>, ChunkError> {
    if tuples.len() < 2 {
        return Err(ChunkError::TooFewTuples(tuples.len()));
    }

    if max_array_size < 3 {
        return Err(ChunkError::ArraySizeTooSmall(max_array_size));
    }

    tuples.shuffle(rng);

    let chunked = tuples.into_iter().chunks(max_array_size);
    let mut groups = Vec::new();
    for group in &chunked {
        groups.push(group.collect_vec());
    }

    if let [.., previous, last] = groups.as_mut_slice() {
        if last.len() == 1 {
            if let Some(moved) = previous.pop() {
                last.insert(0, moved);
            }
        }
    }

    debug!(
        "Split subjobs into chunks of sizes {:?}",
        groups.iter().map(Vec::len).collect_vec()
    );

    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(index, tuples)| Chunk {
            index,
            offset: index * max_array_size,
            tuples,
        })
        .collect())
}
