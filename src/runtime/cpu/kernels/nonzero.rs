//! Counting, stable compaction and unravel kernels
//!
//! The serial kernels are the reference implementation. The parallel kernels
//! split the input into fixed-length chunks, keep one `u64` partial per chunk
//! in caller-provided scratch and produce bit-identical results.

use crate::dtype::{Element, IndexElement};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Number of `chunk_len`-sized chunks covering `numel` elements
#[inline]
pub fn chunk_count(numel: usize, chunk_len: usize) -> usize {
    numel.div_ceil(chunk_len.max(1))
}

/// Count elements satisfying the non-zero predicate.
///
/// # Safety
/// - `input` must point to `numel` elements (may dangle when `numel == 0`)
#[inline]
pub unsafe fn count_nonzero_kernel<T: Element>(input: *const T, numel: usize) -> usize {
    if numel == 0 {
        return 0;
    }
    let input = std::slice::from_raw_parts(input, numel);
    input.iter().filter(|x| x.is_nonzero()).count()
}

/// Write the flat indices of non-zero elements in ascending order.
///
/// At most `capacity` indices are written; the return value is the total
/// number of non-zero elements, which may exceed `capacity`.
///
/// # Safety
/// - `input` must point to `numel` elements
/// - `out` must point to `capacity` writable elements
#[inline]
pub unsafe fn select_flagged_kernel<T: Element, I: IndexElement>(
    input: *const T,
    numel: usize,
    out: *mut I,
    capacity: usize,
) -> usize {
    select_range(input, 0, numel, out, capacity, 0)
}

/// Compaction of `input[start..end]` starting at output position `pos`.
#[inline]
unsafe fn select_range<T: Element, I: IndexElement>(
    input: *const T,
    start: usize,
    end: usize,
    out: *mut I,
    capacity: usize,
    mut pos: usize,
) -> usize {
    for i in start..end {
        if (*input.add(i)).is_nonzero() {
            if pos < capacity {
                *out.add(pos) = I::from_index(i);
            }
            pos += 1;
        }
    }
    pos
}

/// Decompose selected flat indices into per-dimension coordinates.
///
/// Coordinate `d` of element `i` is written to `bases[d] + i * step` (in
/// elements of `I`). `bases[0]` may equal `selected`: each element reads its
/// flat index before writing its own slot.
///
/// # Safety
/// - `selected` must point to `nnz` indices, each less than `shape.iter().product()`
/// - `bases.len() == shape.len()` and each base must be valid for
///   `(nnz - 1) * step + 1` writes
#[inline]
pub unsafe fn unravel_kernel<I: IndexElement>(
    selected: *const I,
    nnz: usize,
    shape: &[usize],
    bases: &[usize],
    step: usize,
) {
    unravel_range(selected, 0, nnz, shape, bases, step);
}

#[inline]
unsafe fn unravel_range<I: IndexElement>(
    selected: *const I,
    start: usize,
    end: usize,
    shape: &[usize],
    bases: &[usize],
    step: usize,
) {
    let ndim = shape.len();
    if ndim == 0 {
        return;
    }
    for i in start..end {
        let mut x = (*selected.add(i)).to_index();
        for d in (1..ndim).rev() {
            let dim = shape[d];
            *(bases[d] as *mut I).add(i * step) = I::from_index(x % dim);
            x /= dim;
        }
        *(bases[0] as *mut I).add(i * step) = I::from_index(x);
    }
}

/// Chunked parallel count.
///
/// # Safety
/// - `input` must point to `numel` elements
/// - `partials` must point to `chunk_count(numel, chunk_len)` writable `u64`s
#[cfg(feature = "rayon")]
pub unsafe fn count_nonzero_parallel_kernel<T: Element>(
    input: *const T,
    numel: usize,
    partials: *mut u64,
    chunk_len: usize,
) -> usize {
    let chunks = chunk_count(numel, chunk_len);
    write_chunk_counts(input, numel, partials, chunk_len);
    let partials = std::slice::from_raw_parts(partials, chunks);
    partials.iter().sum::<u64>() as usize
}

#[cfg(feature = "rayon")]
unsafe fn write_chunk_counts<T: Element>(
    input: *const T,
    numel: usize,
    partials: *mut u64,
    chunk_len: usize,
) {
    let chunks = chunk_count(numel, chunk_len);
    let input_addr = input as usize;
    let partials_addr = partials as usize;
    (0..chunks).into_par_iter().for_each(|c| unsafe {
        let start = c * chunk_len;
        let len = chunk_len.min(numel - start);
        let input = (input_addr as *const T).add(start);
        let n = count_nonzero_kernel(input, len);
        *(partials_addr as *mut u64).add(c) = n as u64;
    });
}

/// Chunked parallel stable compaction.
///
/// Counts each chunk, converts the partials to exclusive offsets in place,
/// then scatters each chunk from its offset. Same contract as
/// [`select_flagged_kernel`].
///
/// # Safety
/// - Same as [`select_flagged_kernel`]
/// - `partials` must point to `chunk_count(numel, chunk_len)` writable `u64`s
#[cfg(feature = "rayon")]
pub unsafe fn select_flagged_parallel_kernel<T: Element, I: IndexElement>(
    input: *const T,
    numel: usize,
    out: *mut I,
    capacity: usize,
    partials: *mut u64,
    chunk_len: usize,
) -> usize {
    let chunks = chunk_count(numel, chunk_len);
    write_chunk_counts(input, numel, partials, chunk_len);

    let mut total = 0u64;
    for c in 0..chunks {
        let slot = partials.add(c);
        let n = *slot;
        *slot = total;
        total += n;
    }

    let input_addr = input as usize;
    let out_addr = out as usize;
    let partials_addr = partials as usize;
    (0..chunks).into_par_iter().for_each(|c| unsafe {
        let start = c * chunk_len;
        let end = (start + chunk_len).min(numel);
        let offset = *(partials_addr as *const u64).add(c) as usize;
        select_range(
            input_addr as *const T,
            start,
            end,
            out_addr as *mut I,
            capacity,
            offset,
        );
    });

    total as usize
}

/// Parallel unravel over groups of `group_size` selected elements.
///
/// # Safety
/// - Same as [`unravel_kernel`]
#[cfg(feature = "rayon")]
pub unsafe fn unravel_grouped_kernel<I: IndexElement>(
    selected: *const I,
    nnz: usize,
    shape: &[usize],
    bases: &[usize],
    step: usize,
    group_size: usize,
) {
    let group_size = group_size.max(1);
    let groups = chunk_count(nnz, group_size).max(1);
    let selected_addr = selected as usize;
    (0..groups).into_par_iter().for_each(|g| unsafe {
        let start = (g * group_size).min(nnz);
        let end = (start + group_size).min(nnz);
        unravel_range(selected_addr as *const I, start, end, shape, bases, step);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_select_serial() {
        let input = [0.0f32, 1.0, -0.0, f32::NAN, 0.0, 3.5];
        let n = unsafe { count_nonzero_kernel(input.as_ptr(), input.len()) };
        assert_eq!(n, 3);

        let mut out = [0i64; 3];
        let total =
            unsafe { select_flagged_kernel(input.as_ptr(), input.len(), out.as_mut_ptr(), 3) };
        assert_eq!(total, 3);
        assert_eq!(out, [1, 3, 5]);
    }

    #[test]
    fn test_select_respects_capacity() {
        let input = [1u8, 1, 1, 1];
        let mut out = [-1i32; 4];
        let total = unsafe { select_flagged_kernel(input.as_ptr(), 4, out.as_mut_ptr(), 2) };
        assert_eq!(total, 4);
        assert_eq!(out, [0, 1, -1, -1]);
    }

    #[test]
    fn test_unravel_in_place() {
        let shape = [2usize, 3, 4];
        let mut first = [0i64, 5, 23];
        let mut second = [0i64; 3];
        let mut third = [0i64; 3];
        let first_ptr = first.as_mut_ptr();
        let bases = [
            first_ptr as usize,
            second.as_mut_ptr() as usize,
            third.as_mut_ptr() as usize,
        ];
        unsafe { unravel_kernel(first_ptr as *const i64, 3, &shape, &bases, 1) };
        assert_eq!(first, [0, 0, 1]);
        assert_eq!(second, [0, 1, 2]);
        assert_eq!(third, [0, 1, 3]);
    }

    #[test]
    fn test_unravel_stacked() {
        let shape = [2usize, 3];
        let selected = [1u32, 4];
        let mut out = [0u32; 4];
        let base = out.as_mut_ptr() as usize;
        let bases = [base, base + std::mem::size_of::<u32>()];
        unsafe { unravel_kernel(selected.as_ptr(), 2, &shape, &bases, 2) };
        assert_eq!(out, [0, 1, 1, 1]);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_matches_serial() {
        let input: Vec<i16> = (0..10_007).map(|i| ((i * 7919) % 5) as i16 - 2).collect();
        let chunk_len = 97;
        let mut partials = vec![0u64; chunk_count(input.len(), chunk_len)];

        let serial = unsafe { count_nonzero_kernel(input.as_ptr(), input.len()) };
        let parallel = unsafe {
            count_nonzero_parallel_kernel(
                input.as_ptr(),
                input.len(),
                partials.as_mut_ptr(),
                chunk_len,
            )
        };
        assert_eq!(serial, parallel);

        let mut expected = vec![0u64; serial];
        let mut actual = vec![0u64; serial];
        unsafe {
            select_flagged_kernel(input.as_ptr(), input.len(), expected.as_mut_ptr(), serial);
            let total = select_flagged_parallel_kernel(
                input.as_ptr(),
                input.len(),
                actual.as_mut_ptr(),
                serial,
                partials.as_mut_ptr(),
                chunk_len,
            );
            assert_eq!(total, serial);
        }
        assert_eq!(expected, actual);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_grouped_unravel_matches_serial() {
        let shape = [7usize, 11, 13];
        let selected: Vec<i32> = (0..1001).step_by(3).collect();
        let nnz = selected.len();
        let mut serial = vec![0i32; nnz * 3];
        let mut grouped = vec![0i32; nnz * 3];
        let elem = std::mem::size_of::<i32>();
        let sb = serial.as_mut_ptr() as usize;
        let gb = grouped.as_mut_ptr() as usize;
        unsafe {
            unravel_kernel(selected.as_ptr(), nnz, &shape, &[sb, sb + elem, sb + 2 * elem], 3);
            unravel_grouped_kernel(
                selected.as_ptr(),
                nnz,
                &shape,
                &[gb, gb + elem, gb + 2 * elem],
                3,
                16,
            );
        }
        assert_eq!(serial, grouped);
    }
}
