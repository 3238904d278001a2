//! Backend-independent selection pipeline
//!
//! Composes the [`WherePrimitives`] of a client into the counting, selecting
//! and unravelling passes. Passes run strictly in sequence:
//!
//! ```text
//! count ──(host readback of K)──> select ──> unravel (D > 1 only)
//! ```
//!
//! Each pass draws its scratch from the client's allocator through a
//! [`ScratchBroker`] and releases it before the next pass starts. The count
//! cell shared by the count and select passes comes from the same allocator
//! and is released once selection finishes.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ops::{CoordLayout, WherePrimitives};
use crate::runtime::{Runtime, ScratchBroker, ScratchBuffer, ScratchSpace};
use crate::tensor::Tensor;

/// Reject index dtypes that cannot address every element of a `numel` input
pub fn validate_index_dtype(index_dtype: DType, numel: usize) -> Result<()> {
    let max = index_dtype
        .max_index()
        .ok_or_else(|| Error::unsupported_dtype(index_dtype, "nonzero"))?;
    if numel > 0 && (numel - 1) as u64 > max {
        return Err(Error::IndexOverflow {
            dtype: index_dtype,
            numel,
        });
    }
    Ok(())
}

fn validate<R, C>(client: &C, cond: &Tensor<R>, index_dtype: DType) -> Result<()>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    validate_index_dtype(index_dtype, cond.numel())?;
    client.check_input_dtype(cond.dtype())?;
    client.check_index_dtype(index_dtype)?;
    client.check_shape(cond.shape())
}

/// One `COUNT_DTYPE` element drawn from the client's allocator
fn count_cell<R, C>(client: &C) -> Result<ScratchBuffer<'_, R::Allocator>>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    ScratchBroker::new(client.allocator(), "count cell").acquire(C::COUNT_DTYPE.size_in_bytes())
}

/// Count pass: number of non-zero elements, read back to the host.
fn count_pass<R, C>(client: &C, cond: &Tensor<R>, count: ScratchSpace) -> Result<usize>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    let broker = ScratchBroker::new(client.allocator(), "count");
    let scratch_bytes = client.count_scratch_bytes(cond.dtype(), cond.numel());
    broker.run(scratch_bytes, |scratch| {
        client.count_nonzero_into(cond, count, scratch)
    })?;

    let nnz = client.read_count(count)?;
    log::debug!("{}: {} of {} elements non-zero", R::name(), nnz, cond.numel());
    if nnz > cond.numel() {
        return Err(Error::Internal(format!(
            "count pass reported {nnz} non-zero elements in a tensor of {}",
            cond.numel()
        )));
    }
    Ok(nnz)
}

/// Select pass: `[nnz]` ascending flat indices in `index_dtype`.
fn select_pass<R, C>(
    client: &C,
    cond: &Tensor<R>,
    count: ScratchSpace,
    nnz: usize,
    index_dtype: DType,
) -> Result<Tensor<R>>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    let selected = Tensor::try_empty(&[nnz], index_dtype, client.device())?;
    let broker = ScratchBroker::new(client.allocator(), "select");
    let scratch_bytes = client.select_scratch_bytes(cond.dtype(), cond.numel());
    broker.run(scratch_bytes, |scratch| {
        client.select_flagged_into(cond, &selected, count, scratch)
    })?;

    if client.where_config().verify_selected_count {
        let reported = client.read_count(count)?;
        if reported != nnz {
            return Err(Error::Internal(format!(
                "select pass found {reported} non-zero elements, count pass found {nnz}"
            )));
        }
    }
    Ok(selected)
}

fn unravel_pass<R, C>(
    client: &C,
    selected: &Tensor<R>,
    shape: &[usize],
    layout: CoordLayout<'_, R>,
) -> Result<()>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    let nnz = selected.numel();
    let broker = ScratchBroker::new(client.allocator(), "unravel");
    let scratch_bytes = client.unravel_scratch_bytes(nnz, shape.len(), layout.is_stacked());
    broker.run(scratch_bytes, |scratch| {
        client.unravel_into(selected, shape, layout, scratch)
    })
}

/// Count and select: the non-zero flat indices of `cond`.
fn select_nonzero<R, C>(client: &C, cond: &Tensor<R>, index_dtype: DType) -> Result<Tensor<R>>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    if cond.numel() == 0 {
        return Tensor::try_empty(&[0], index_dtype, client.device());
    }
    let count = count_cell(client)?;
    let nnz = count_pass(client, cond, count.space())?;
    if nnz == 0 {
        return Tensor::try_empty(&[0], index_dtype, client.device());
    }
    select_pass(client, cond, count.space(), nnz, index_dtype)
}

/// Number of non-zero elements of `cond`
pub fn count_nonzero_pipeline<R, C>(client: &C, cond: &Tensor<R>) -> Result<usize>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    client.check_input_dtype(cond.dtype())?;
    client.check_shape(cond.shape())?;
    if cond.numel() == 0 {
        return Ok(0);
    }
    let count = count_cell(client)?;
    count_pass(client, cond, count.space())
}

/// Ascending flat indices of the non-zero elements of `cond` as `[K]`
pub fn flat_nonzero_pipeline<R, C>(
    client: &C,
    cond: &Tensor<R>,
    index_dtype: DType,
) -> Result<Tensor<R>>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    validate(client, cond, index_dtype)?;
    select_nonzero(client, cond, index_dtype)
}

/// `D` coordinate streams of length `K`, one per dimension of `cond`
///
/// The dimension-0 stream reuses the selected-index buffer.
pub fn nonzero_pipeline<R, C>(
    client: &C,
    cond: &Tensor<R>,
    index_dtype: DType,
) -> Result<Vec<Tensor<R>>>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    validate(client, cond, index_dtype)?;
    let shape = cond.shape();
    let ndim = shape.len();
    if ndim == 0 {
        return Ok(Vec::new());
    }

    let selected = select_nonzero(client, cond, index_dtype)?;
    let nnz = selected.numel();
    if ndim == 1 {
        return Ok(vec![selected]);
    }
    if nnz == 0 {
        let mut outputs = Vec::with_capacity(ndim);
        outputs.push(selected);
        for _ in 1..ndim {
            outputs.push(Tensor::try_empty(&[0], index_dtype, client.device())?);
        }
        return Ok(outputs);
    }

    let mut outputs = Vec::with_capacity(ndim);
    outputs.push(selected.clone());
    for _ in 1..ndim {
        outputs.push(Tensor::try_empty(&[nnz], index_dtype, client.device())?);
    }
    unravel_pass(
        client,
        &selected,
        shape,
        CoordLayout::InPlace {
            rest: &outputs[1..],
        },
    )?;
    Ok(outputs)
}

/// Coordinates of the non-zero elements of `cond` stacked as `[K, D]`
pub fn argwhere_pipeline<R, C>(
    client: &C,
    cond: &Tensor<R>,
    index_dtype: DType,
) -> Result<Tensor<R>>
where
    R: Runtime,
    C: WherePrimitives<R>,
{
    validate(client, cond, index_dtype)?;
    let shape = cond.shape();
    let ndim = shape.len();

    let selected = select_nonzero(client, cond, index_dtype)?;
    let nnz = selected.numel();
    if ndim == 0 {
        return Tensor::try_empty(&[nnz, 0], index_dtype, client.device());
    }
    if ndim == 1 || nnz == 0 {
        return selected.with_shape(&[nnz, ndim]);
    }

    let out = Tensor::try_empty(&[nnz, ndim], index_dtype, client.device())?;
    unravel_pass(client, &selected, shape, CoordLayout::Stacked { out: &out })?;
    Ok(out)
}
