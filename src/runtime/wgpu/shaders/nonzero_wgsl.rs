//! WGSL sources for the count, select and unravel passes
//!
//! Inputs are processed in tiles of `TILE_SIZE` elements, one workgroup per
//! tile. Selection is a stable three-dispatch compaction:
//!
//! ```text
//! count_tiles    partials[t] = non-zero elements in tile t
//! scan_partials  partials[t] = exclusive prefix of partials, count[0] = total
//! scatter        tile t writes its indices starting at partials[t]
//! ```

use super::pipeline::WORKGROUP_SIZE;
use crate::dtype::DType;
use crate::error::{Error, Result};

/// Elements handled by one thread of a tile
pub const ITEMS_PER_THREAD: u32 = 4;

/// Elements handled by one workgroup
pub const TILE_SIZE: u32 = WORKGROUP_SIZE * ITEMS_PER_THREAD;

/// Largest rank the unravel shader accepts
pub const MAX_DIMS: usize = 8;

/// WGSL type name for an input or index dtype
pub fn wgsl_type(dtype: DType) -> Result<&'static str> {
    match dtype {
        DType::F32 => Ok("f32"),
        DType::I32 => Ok("i32"),
        DType::U32 => Ok("u32"),
        _ => Err(Error::unsupported_dtype(dtype, "wgpu nonzero")),
    }
}

/// Body of `is_nonzero(v)` for an input dtype.
///
/// Floats compare their magnitude bits, so NaN is non-zero and -0.0 is zero
/// regardless of how the driver treats NaN comparisons.
fn predicate(dtype: DType) -> Result<&'static str> {
    match dtype {
        DType::F32 => Ok("(bitcast<u32>(v) & 0x7fffffffu) != 0u"),
        DType::I32 => Ok("v != 0i"),
        DType::U32 => Ok("v != 0u"),
        _ => Err(Error::unsupported_dtype(dtype, "wgpu nonzero")),
    }
}

fn tile_header(t: &str, pred: &str) -> String {
    format!(
        r#"const WORKGROUP_SIZE: u32 = {WORKGROUP_SIZE}u;
const ITEMS_PER_THREAD: u32 = {ITEMS_PER_THREAD}u;
const TILE_SIZE: u32 = {TILE_SIZE}u;

struct TileParams {{
    numel: u32,
    num_tiles: u32,
    capacity: u32,
    _pad: u32,
}}

fn is_nonzero(v: {t}) -> bool {{
    return {pred};
}}
"#
    )
}

/// Per-tile non-zero counts into `partials`
pub fn generate_count_tiles_shader(dtype: DType) -> Result<String> {
    let t = wgsl_type(dtype)?;
    let header = tile_header(t, predicate(dtype)?);
    Ok(format!(
        r#"// count_tiles for {t}
{header}
@group(0) @binding(0) var<storage, read_write> input: array<{t}>;
@group(0) @binding(1) var<storage, read_write> partials: array<u32>;
@group(0) @binding(2) var<uniform> params: TileParams;

var<workgroup> tile_sums: array<u32, {WORKGROUP_SIZE}>;

@compute @workgroup_size({WORKGROUP_SIZE})
fn count_tiles(@builtin(local_invocation_id) lid: vec3<u32>,
               @builtin(workgroup_id) wid: vec3<u32>) {{
    let tid = lid.x;
    let base = wid.x * TILE_SIZE + tid * ITEMS_PER_THREAD;

    var local_count = 0u;
    for (var k = 0u; k < ITEMS_PER_THREAD; k = k + 1u) {{
        let i = base + k;
        if (i < params.numel && is_nonzero(input[i])) {{
            local_count = local_count + 1u;
        }}
    }}
    tile_sums[tid] = local_count;
    workgroupBarrier();

    for (var s = WORKGROUP_SIZE / 2u; s > 0u; s = s >> 1u) {{
        if (tid < s) {{
            tile_sums[tid] = tile_sums[tid] + tile_sums[tid + s];
        }}
        workgroupBarrier();
    }}

    if (tid == 0u) {{
        partials[wid.x] = tile_sums[0];
    }}
}}
"#
    ))
}

/// Single-workgroup reduction and exclusive scan of the tile partials
pub fn generate_partials_shader() -> String {
    format!(
        r#"// sum_partials / scan_partials
const WORKGROUP_SIZE: u32 = {WORKGROUP_SIZE}u;

struct TileParams {{
    numel: u32,
    num_tiles: u32,
    capacity: u32,
    _pad: u32,
}}

@group(0) @binding(0) var<storage, read_write> partials: array<u32>;
@group(0) @binding(1) var<storage, read_write> count: array<u32>;
@group(0) @binding(2) var<uniform> params: TileParams;

var<workgroup> thread_sums: array<u32, {WORKGROUP_SIZE}>;

// Each thread owns a contiguous run of partials.
fn run_bounds(tid: u32) -> vec2<u32> {{
    let n = params.num_tiles;
    let per = (n + WORKGROUP_SIZE - 1u) / WORKGROUP_SIZE;
    let start = min(tid * per, n);
    return vec2<u32>(start, min(start + per, n));
}}

fn run_sum(bounds: vec2<u32>) -> u32 {{
    var sum = 0u;
    for (var i = bounds.x; i < bounds.y; i = i + 1u) {{
        sum = sum + partials[i];
    }}
    return sum;
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn sum_partials(@builtin(local_invocation_id) lid: vec3<u32>) {{
    let tid = lid.x;
    thread_sums[tid] = run_sum(run_bounds(tid));
    workgroupBarrier();

    for (var s = WORKGROUP_SIZE / 2u; s > 0u; s = s >> 1u) {{
        if (tid < s) {{
            thread_sums[tid] = thread_sums[tid] + thread_sums[tid + s];
        }}
        workgroupBarrier();
    }}

    if (tid == 0u) {{
        count[0] = thread_sums[0];
    }}
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn scan_partials(@builtin(local_invocation_id) lid: vec3<u32>) {{
    let tid = lid.x;
    let bounds = run_bounds(tid);
    thread_sums[tid] = run_sum(bounds);
    workgroupBarrier();

    if (tid == 0u) {{
        var running = 0u;
        for (var t = 0u; t < WORKGROUP_SIZE; t = t + 1u) {{
            let v = thread_sums[t];
            thread_sums[t] = running;
            running = running + v;
        }}
        count[0] = running;
    }}
    workgroupBarrier();

    var offset = thread_sums[tid];
    for (var i = bounds.x; i < bounds.y; i = i + 1u) {{
        let v = partials[i];
        partials[i] = offset;
        offset = offset + v;
    }}
}}
"#
    )
}

/// Ordered scatter of flat indices using the scanned tile offsets.
///
/// Writes at positions `>= params.capacity` are dropped.
pub fn generate_scatter_shader(dtype: DType, index_dtype: DType) -> Result<String> {
    let t = wgsl_type(dtype)?;
    let idx = wgsl_type(index_dtype)?;
    let header = tile_header(t, predicate(dtype)?);
    Ok(format!(
        r#"// scatter {t} -> {idx}
{header}
@group(0) @binding(0) var<storage, read_write> input: array<{t}>;
@group(0) @binding(1) var<storage, read_write> partials: array<u32>;
@group(0) @binding(2) var<storage, read_write> selected: array<{idx}>;
@group(0) @binding(3) var<uniform> params: TileParams;

var<workgroup> thread_scan: array<u32, {WORKGROUP_SIZE}>;

@compute @workgroup_size({WORKGROUP_SIZE})
fn scatter(@builtin(local_invocation_id) lid: vec3<u32>,
           @builtin(workgroup_id) wid: vec3<u32>) {{
    let tid = lid.x;
    let base = wid.x * TILE_SIZE + tid * ITEMS_PER_THREAD;

    var local_count = 0u;
    for (var k = 0u; k < ITEMS_PER_THREAD; k = k + 1u) {{
        let i = base + k;
        if (i < params.numel && is_nonzero(input[i])) {{
            local_count = local_count + 1u;
        }}
    }}
    thread_scan[tid] = local_count;
    workgroupBarrier();

    // Inclusive Hillis-Steele scan over the thread counts
    for (var stride = 1u; stride < WORKGROUP_SIZE; stride = stride << 1u) {{
        var addend = 0u;
        if (tid >= stride) {{
            addend = thread_scan[tid - stride];
        }}
        workgroupBarrier();
        thread_scan[tid] = thread_scan[tid] + addend;
        workgroupBarrier();
    }}

    var pos = partials[wid.x] + thread_scan[tid] - local_count;
    for (var k = 0u; k < ITEMS_PER_THREAD; k = k + 1u) {{
        let i = base + k;
        if (i < params.numel && is_nonzero(input[i])) {{
            if (pos < params.capacity) {{
                selected[pos] = {idx}(i);
            }}
            pos = pos + 1u;
        }}
    }}
}}
"#
    ))
}

/// Decomposition of selected flat indices into coordinates.
///
/// Stacked mode writes `coords[i * ndim + d]`. Otherwise dimension 0
/// overwrites `selected[i]` and dimension `d > 0` goes to
/// `coords[(d - 1) * nnz + i]`.
pub fn generate_unravel_shader(index_dtype: DType) -> Result<String> {
    let idx = wgsl_type(index_dtype)?;
    Ok(format!(
        r#"// unravel {idx}
const WORKGROUP_SIZE: u32 = {WORKGROUP_SIZE}u;

struct UnravelParams {{
    nnz: u32,
    ndim: u32,
    stacked: u32,
    _pad: u32,
    shape: array<vec4<u32>, 2>,
}}

@group(0) @binding(0) var<storage, read_write> selected: array<{idx}>;
@group(0) @binding(1) var<storage, read_write> coords: array<{idx}>;
@group(0) @binding(2) var<uniform> params: UnravelParams;

fn dim_size(d: u32) -> u32 {{
    return params.shape[d / 4u][d % 4u];
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn unravel(@builtin(global_invocation_id) gid: vec3<u32>,
           @builtin(num_workgroups) nwg: vec3<u32>) {{
    let ndim = params.ndim;
    let nnz = params.nnz;
    let grid = nwg.x * WORKGROUP_SIZE;

    for (var i = gid.x; i < nnz; i = i + grid) {{
        var rem = u32(selected[i]);
        for (var d = ndim - 1u; d > 0u; d = d - 1u) {{
            let size = dim_size(d);
            let c = rem % size;
            rem = rem / size;
            if (params.stacked != 0u) {{
                coords[i * ndim + d] = {idx}(c);
            }} else {{
                coords[(d - 1u) * nnz + i] = {idx}(c);
            }}
        }}
        if (params.stacked != 0u) {{
            coords[i * ndim] = {idx}(rem);
        }} else {{
            selected[i] = {idx}(rem);
        }}
    }}
}}
"#
    ))
}
