//! Dense buffer helpers: hyperslab copies, chunk grids, and element conversion.

use std::borrow::Cow;

use itertools::Itertools;

use crate::datatype::TypeDescriptor;

use super::BackendError;

#[allow(clippy::cast_possible_truncation)]
pub(super) const fn to_usize(value: u64) -> usize {
    value as usize
}

/// Iterate over every index of `shape` in row-major order. A rank 0 shape has a single empty index.
pub(super) fn indices(shape: &[u64]) -> Box<dyn Iterator<Item = Vec<u64>> + '_> {
    if shape.is_empty() {
        Box::new(std::iter::once(vec![]))
    } else {
        Box::new(shape.iter().map(|&extent| 0..extent).multi_cartesian_product())
    }
}

/// The row-major linear index of `index` in an array of `shape`.
fn linear_index(index: impl Iterator<Item = u64>, shape: &[u64]) -> u64 {
    index
        .zip(shape)
        .fold(0, |linear, (index, &extent)| linear * extent + index)
}

/// Copy the `count` region at `src_offset` of a dense `src` array to `dst_offset` of a dense `dst` array.
///
/// Both regions must be in bounds and have the rank of `count`.
#[allow(clippy::too_many_arguments)]
pub(super) fn copy_region(
    src: &[u8],
    src_shape: &[u64],
    src_offset: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_offset: &[u64],
    count: &[u64],
    element_size: usize,
) {
    let Some((&run_length, outer)) = count.split_last() else {
        dst[..element_size].copy_from_slice(&src[..element_size]);
        return;
    };
    let run_bytes = to_usize(run_length) * element_size;
    if run_bytes == 0 {
        return;
    }
    for outer_index in indices(outer) {
        let src_index = outer_index
            .iter()
            .zip(src_offset)
            .map(|(i, offset)| i + offset)
            .chain(std::iter::once(src_offset[outer.len()]));
        let dst_index = outer_index
            .iter()
            .zip(dst_offset)
            .map(|(i, offset)| i + offset)
            .chain(std::iter::once(dst_offset[outer.len()]));
        let src_start = to_usize(linear_index(src_index, src_shape)) * element_size;
        let dst_start = to_usize(linear_index(dst_index, dst_shape)) * element_size;
        dst[dst_start..dst_start + run_bytes]
            .copy_from_slice(&src[src_start..src_start + run_bytes]);
    }
}

/// A chunk of a regular chunk grid.
pub(super) struct GridChunk {
    /// The chunk grid indices.
    pub indices: Vec<u64>,
    /// The origin of the chunk in the array.
    pub origin: Vec<u64>,
    /// The number of in-bounds elements per dimension.
    pub count: Vec<u64>,
}

/// Iterate over the chunks of an array of `shape` split into `chunk_shape` chunks.
pub(super) fn grid_chunks<'a>(
    shape: &'a [u64],
    chunk_shape: &'a [u64],
) -> impl Iterator<Item = GridChunk> + 'a {
    let grid_shape: Vec<u64> = shape
        .iter()
        .zip(chunk_shape)
        .map(|(&extent, &chunk)| extent.div_ceil(chunk))
        .collect();
    let empty = grid_shape.iter().any(|&extent| extent == 0);
    indices(&grid_shape)
        .collect::<Vec<_>>()
        .into_iter()
        .filter(move |_| !empty)
        .map(move |indices| {
            let origin: Vec<u64> = indices
                .iter()
                .zip(chunk_shape)
                .map(|(index, chunk)| index * chunk)
                .collect();
            let count = origin
                .iter()
                .zip(chunk_shape)
                .zip(shape)
                .map(|((origin, &chunk), extent)| chunk.min(extent - origin))
                .collect();
            GridChunk {
                indices,
                origin,
                count,
            }
        })
}

/// Convert elements from type `from` to type `to`.
///
/// Numeric types must match exactly.
/// Fixed-width strings of different sizes are truncated (keeping a null terminator) or padded with nulls.
pub(super) fn convert_elements<'a>(
    bytes: &'a [u8],
    from: &TypeDescriptor,
    to: &TypeDescriptor,
) -> Result<Cow<'a, [u8]>, BackendError> {
    match (from, to) {
        (TypeDescriptor::Numeric { tag: from_tag }, TypeDescriptor::Numeric { tag: to_tag })
            if from_tag == to_tag =>
        {
            Ok(Cow::Borrowed(bytes))
        }
        (
            TypeDescriptor::FixedString { size: from_size },
            TypeDescriptor::FixedString { size: to_size },
        ) => {
            if from_size == to_size {
                Ok(Cow::Borrowed(bytes))
            } else {
                let mut out = Vec::with_capacity(bytes.len() / from_size * to_size);
                for element in bytes.chunks(*from_size) {
                    let text_length = element
                        .iter()
                        .position(|&byte| byte == 0)
                        .unwrap_or(element.len());
                    let length = text_length.min(to_size - 1);
                    out.extend_from_slice(&element[..length]);
                    out.resize(out.len() + to_size - length, 0);
                }
                Ok(Cow::Owned(out))
            }
        }
        _ => Err(BackendError::TypeConversion {
            from: *from,
            to: *to,
        }),
    }
}
