//! Chunk shape planning for chunked dataset layouts.
//!
//! [`plan_chunks`] chooses a chunk shape whose byte size tracks a budget that grows logarithmically with the size of the dataset.

use std::num::NonZeroU64;

use derive_more::Deref;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The chunk byte budget of a 1 MiB dataset.
pub const CHUNK_BUDGET_BASE: u64 = 16 * 1024;

/// The minimum chunk byte budget.
pub const CHUNK_BUDGET_MIN: u64 = 8 * 1024;

/// The maximum chunk byte budget.
pub const CHUNK_BUDGET_MAX: u64 = 1024 * 1024;

const MIB: f64 = 1024.0 * 1024.0;

/// The shape of a chunk. All dimensions must be non-zero.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Deref)]
pub struct ChunkShape(Vec<NonZeroU64>);

/// A chunk shape with a zero extent.
#[derive(Debug, Error)]
#[error("chunk shape {0:?} has a zero extent")]
pub struct ZeroChunkExtentError(Vec<u64>);

impl ChunkShape {
    /// Return the number of elements.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements_u64(&self) -> u64 {
        self.0.iter().copied().map(NonZeroU64::get).product::<u64>()
    }

    /// Return the chunk shape as a vector of [`u64`].
    #[must_use]
    pub fn to_array_shape(&self) -> Vec<u64> {
        self.0.iter().copied().map(NonZeroU64::get).collect()
    }
}

impl TryFrom<&[u64]> for ChunkShape {
    type Error = ZeroChunkExtentError;

    fn try_from(value: &[u64]) -> Result<Self, Self::Error> {
        value
            .iter()
            .map(|&extent| NonZeroU64::new(extent))
            .collect::<Option<Vec<_>>>()
            .map(Self)
            .ok_or_else(|| ZeroChunkExtentError(value.to_vec()))
    }
}

impl<const N: usize> TryFrom<[u64; N]> for ChunkShape {
    type Error = ZeroChunkExtentError;

    fn try_from(value: [u64; N]) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

/// Returns the target chunk byte budget of a dataset of `total_bytes` bytes.
///
/// The budget is `CHUNK_BUDGET_BASE * 2^(log10(total_bytes / 1 MiB))` clamped to [`CHUNK_BUDGET_MIN`, `CHUNK_BUDGET_MAX`] and rounded down to a whole number of bytes.
#[must_use]
pub fn chunk_budget(total_bytes: u128) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let total_bytes = total_bytes as f64;
    #[allow(clippy::cast_precision_loss)]
    let (base, min, max) = (
        CHUNK_BUDGET_BASE as f64,
        CHUNK_BUDGET_MIN as f64,
        CHUNK_BUDGET_MAX as f64,
    );
    // log10(0) is -inf, so an empty dataset lands on the minimum
    (base * 2f64.powf((total_bytes / MIB).log10()))
        .clamp(min, max)
        .floor()
}

fn num_bytes(shape: &[u64], element_size: usize) -> u128 {
    shape
        .iter()
        .fold(element_size as u128, |bytes, &extent| {
            bytes.saturating_mul(u128::from(extent))
        })
}

/// Plan a chunk shape for a dataset with `shape` and elements of `element_size` bytes.
///
/// Starting from a single chunk spanning the whole dataset, the extent of one dimension at a time is halved (rounding up), cycling through the dimensions, until the chunk byte size:
///  - is below the [budget](chunk_budget), or
///  - is within 50% of the budget while below [`CHUNK_BUDGET_MAX`], or
///  - cannot be reduced because every extent is 1.
///
/// Every returned extent is at least 1 and at most the dataset extent, unless the dataset has a zero extent.
/// A dataset with a zero extent gets a chunk shape equal to its shape, chunked storage must not be requested for it.
#[must_use]
pub fn plan_chunks(shape: &[u64], element_size: usize) -> Vec<u64> {
    plan_chunks_counted(shape, element_size).0
}

/// As [`plan_chunks`], also returning the number of halving steps taken.
fn plan_chunks_counted(shape: &[u64], element_size: usize) -> (Vec<u64>, usize) {
    let mut chunk = shape.to_vec();
    let budget = chunk_budget(num_bytes(shape, element_size));
    #[allow(clippy::cast_precision_loss)]
    let max = CHUNK_BUDGET_MAX as f64;

    let mut dimension = 0;
    let mut steps = 0;
    loop {
        #[allow(clippy::cast_precision_loss)]
        let chunk_bytes = num_bytes(&chunk, element_size) as f64;
        if chunk_bytes < budget
            || ((chunk_bytes - budget).abs() / budget < 0.5 && chunk_bytes < max)
        {
            break;
        }

        // Round robin over the dimensions that can still be halved
        let Some(next) = (0..chunk.len())
            .map(|offset| (dimension + offset) % chunk.len())
            .find(|&i| chunk[i] > 1)
        else {
            break;
        };
        chunk[next] = chunk[next].div_ceil(2);
        dimension = next + 1;
        steps += 1;
    }
    (chunk, steps)
}
