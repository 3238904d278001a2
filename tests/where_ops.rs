//! Integration tests for the selection operations on the CPU backend

mod common;

use argwhere::dtype::{DType, Element};
use argwhere::error::Error;
use argwhere::ops::pipeline::validate_index_dtype;
use argwhere::ops::{WhereConfig, WhereOps};
use argwhere::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime, ParallelismConfig};
use argwhere::runtime::{Allocator, RuntimeClient};
use argwhere::tensor::Tensor;
use common::{
    create_cpu_client, create_parallel_cpu_client, create_serial_cpu_client, reference_flat,
    unravel,
};

fn clients() -> Vec<(&'static str, CpuClient, CpuDevice)> {
    let (default, device) = create_cpu_client();
    let (serial, _) = create_serial_cpu_client();
    let (parallel, _) = create_parallel_cpu_client();
    vec![
        ("default", default, device),
        ("serial", serial, device),
        ("parallel", parallel, device),
    ]
}

fn streams_i64(coords: &[Tensor<CpuRuntime>]) -> Vec<Vec<i64>> {
    coords.iter().map(|t| t.to_vec::<i64>()).collect()
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn test_two_by_three_scenario() {
    for (name, client, device) in clients() {
        let cond = Tensor::<CpuRuntime>::from_slice(
            &[0.0f32, 1.0, 0.0, 0.0, 1.0, 0.0],
            &[2, 3],
            &device,
        );
        assert_eq!(client.count_nonzero(&cond).unwrap(), 2, "{name}");

        let coords = client.nonzero_coords(&cond, DType::I64).unwrap();
        assert_eq!(coords.len(), 2, "{name}");
        assert_eq!(coords[0].shape(), &[2]);
        assert_eq!(coords[0].to_vec::<i64>(), vec![0, 1], "{name}");
        assert_eq!(coords[1].to_vec::<i64>(), vec![1, 1], "{name}");

        let flat = client.flat_nonzero(&cond, DType::I64).unwrap();
        assert_eq!(flat.to_vec::<i64>(), vec![1, 4], "{name}");

        let rows = client.argwhere(&cond, DType::I64).unwrap();
        assert_eq!(rows.shape(), &[2, 2]);
        assert_eq!(rows.to_vec::<i64>(), vec![0, 1, 1, 1], "{name}");
    }
}

#[test]
fn test_all_false() {
    for (name, client, device) in clients() {
        let cond = Tensor::<CpuRuntime>::from_slice(&[0i32; 12], &[3, 4], &device);
        assert_eq!(client.count_nonzero(&cond).unwrap(), 0);

        let coords = client.nonzero_coords(&cond, DType::I64).unwrap();
        assert_eq!(coords.len(), 2, "{name}");
        for stream in &coords {
            assert_eq!(stream.shape(), &[0], "{name}");
            assert_eq!(stream.dtype(), DType::I64);
        }

        let rows = client.argwhere(&cond, DType::I32).unwrap();
        assert_eq!(rows.shape(), &[0, 2], "{name}");
    }
}

#[test]
fn test_all_true_enumerates_every_coordinate() {
    let shape = [2usize, 3, 2];
    for (name, client, device) in clients() {
        let cond = Tensor::<CpuRuntime>::from_slice(&[1u8; 12], &shape, &device);
        let streams = streams_i64(&client.nonzero_coords(&cond, DType::I64).unwrap());
        assert_eq!(streams.len(), 3);

        for flat in 0..12 {
            let expected = unravel(flat, &shape);
            let got: Vec<usize> = streams.iter().map(|s| s[flat] as usize).collect();
            assert_eq!(got, expected, "{name}: element {flat}");
        }
    }
}

#[test]
fn test_rank_one_is_identity() {
    for (name, client, device) in clients() {
        let cond = Tensor::<CpuRuntime>::from_slice(&[0u16, 5, 0, 6, 7], &[5], &device);
        let coords = client.nonzero_coords(&cond, DType::I32).unwrap();
        assert_eq!(coords.len(), 1);
        assert_eq!(coords[0].to_vec::<i32>(), vec![1, 3, 4], "{name}");

        let rows = client.argwhere(&cond, DType::I32).unwrap();
        assert_eq!(rows.shape(), &[3, 1]);
        assert_eq!(rows.to_vec::<i32>(), vec![1, 3, 4], "{name}");
    }
}

#[test]
fn test_idempotent() {
    let (client, device) = create_parallel_cpu_client();
    let data = common::sparse_pattern(4096, 0.3, 7);
    let cond = Tensor::<CpuRuntime>::from_slice(&data, &[16, 16, 16], &device);

    let first = streams_i64(&client.nonzero_coords(&cond, DType::I64).unwrap());
    let second = streams_i64(&client.nonzero_coords(&cond, DType::I64).unwrap());
    assert_eq!(first, second);
}

// ============================================================================
// DType coverage
// ============================================================================

fn check_dtype<T: Element>(values: &[T]) {
    let (client, device) = create_cpu_client();
    let expected: Vec<i64> = reference_flat(values, T::is_nonzero)
        .into_iter()
        .map(|i| i as i64)
        .collect();
    let cond = Tensor::<CpuRuntime>::from_slice(values, &[values.len()], &device);
    let got = client.flat_nonzero(&cond, DType::I64).unwrap();
    assert_eq!(got.to_vec::<i64>(), expected, "{:?}", T::DTYPE);
}

#[test]
fn test_every_input_dtype() {
    check_dtype(&[0u8, 3, 0, 255]);
    check_dtype(&[0i8, -1, 0, 1]);
    check_dtype(&[0i16, 0, i16::MIN, 0]);
    check_dtype(&[7u16, 0, 0, 1]);
    check_dtype(&[0i32, -5, 0, 0]);
    check_dtype(&[0u32, 0, u32::MAX, 1]);
    check_dtype(&[i64::MAX, 0, 0, -1]);
    check_dtype(&[0u64, 1, 0, 0]);
    check_dtype(&[0.0f32, 0.5, 0.0, -2.0]);
    check_dtype(&[1e-300f64, 0.0, 0.0, 3.0]);
}

#[test]
fn test_bool_input() {
    let (client, device) = create_cpu_client();
    let cond =
        Tensor::<CpuRuntime>::try_from_bools(&[false, true, true, false, false, true], &[3, 2], &device)
            .unwrap();
    assert_eq!(cond.dtype(), DType::Bool);
    let rows = client.argwhere(&cond, DType::U64).unwrap();
    assert_eq!(rows.shape(), &[3, 2]);
    assert_eq!(rows.to_vec::<u64>(), vec![0, 1, 1, 0, 2, 1]);
}

#[test]
fn test_float_nan_is_nonzero_and_negative_zero_is_zero() {
    let (client, device) = create_cpu_client();
    let cond = Tensor::<CpuRuntime>::from_slice(
        &[-0.0f32, f32::NAN, 0.0, 1e-30, -1.0, f32::INFINITY],
        &[6],
        &device,
    );
    let flat = client.flat_nonzero(&cond, DType::I64).unwrap();
    assert_eq!(flat.to_vec::<i64>(), vec![1, 3, 4, 5]);
}

#[test]
fn test_every_index_dtype_agrees() {
    let (client, device) = create_cpu_client();
    let data = common::sparse_pattern(60, 0.4, 3);
    let cond = Tensor::<CpuRuntime>::from_slice(&data, &[3, 4, 5], &device);

    let reference = client.argwhere(&cond, DType::I64).unwrap().to_vec::<i64>();
    let as_i32: Vec<i64> = client
        .argwhere(&cond, DType::I32)
        .unwrap()
        .to_vec::<i32>()
        .into_iter()
        .map(i64::from)
        .collect();
    let as_u32: Vec<i64> = client
        .argwhere(&cond, DType::U32)
        .unwrap()
        .to_vec::<u32>()
        .into_iter()
        .map(i64::from)
        .collect();
    let as_u64: Vec<i64> = client
        .argwhere(&cond, DType::U64)
        .unwrap()
        .to_vec::<u64>()
        .into_iter()
        .map(|v| v as i64)
        .collect();
    assert_eq!(as_i32, reference);
    assert_eq!(as_u32, reference);
    assert_eq!(as_u64, reference);
}

// ============================================================================
// Degenerate shapes
// ============================================================================

#[test]
fn test_scalar_input() {
    let (client, device) = create_cpu_client();
    let one = Tensor::<CpuRuntime>::from_slice(&[3.0f32], &[], &device);
    let zero = Tensor::<CpuRuntime>::from_slice(&[0.0f32], &[], &device);

    assert!(client.nonzero_coords(&one, DType::I64).unwrap().is_empty());
    assert_eq!(client.count_nonzero(&one).unwrap(), 1);
    assert_eq!(client.argwhere(&one, DType::I64).unwrap().shape(), &[1, 0]);
    assert_eq!(client.argwhere(&zero, DType::I64).unwrap().shape(), &[0, 0]);
    assert_eq!(client.flat_nonzero(&one, DType::I64).unwrap().to_vec::<i64>(), vec![0]);
}

#[test]
fn test_empty_input() {
    let (client, device) = create_cpu_client();
    let cond = Tensor::<CpuRuntime>::empty(&[0, 3], DType::F32, &device);
    assert_eq!(client.count_nonzero(&cond).unwrap(), 0);

    let coords = client.nonzero_coords(&cond, DType::I64).unwrap();
    assert_eq!(coords.len(), 2);
    assert!(coords.iter().all(|c| c.numel() == 0));
    assert_eq!(client.argwhere(&cond, DType::I64).unwrap().shape(), &[0, 2]);
}

#[test]
fn test_high_rank() {
    let (client, device) = create_cpu_client();
    let shape = [2usize, 1, 3, 1, 2, 2];
    let mut data = vec![0u8; 24];
    data[0] = 1;
    data[13] = 1;
    data[23] = 1;
    let cond = Tensor::<CpuRuntime>::from_slice(&data, &shape, &device);

    let streams = streams_i64(&client.nonzero_coords(&cond, DType::I64).unwrap());
    assert_eq!(streams.len(), 6);
    assert_eq!(common::ravel_streams(&streams, &shape), vec![0, 13, 23]);
}

// ============================================================================
// Errors and resources
// ============================================================================

#[test]
fn test_rejects_non_index_dtypes() {
    let (client, device) = create_cpu_client();
    let cond = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 0.0], &[2], &device);
    for dtype in [DType::F32, DType::I8, DType::U16, DType::Bool] {
        assert!(
            matches!(
                client.nonzero_coords(&cond, dtype),
                Err(Error::UnsupportedDType { .. })
            ),
            "{dtype:?}"
        );
        assert!(client.argwhere(&cond, dtype).is_err());
    }
}

#[test]
fn test_index_overflow_is_detected() {
    assert!(validate_index_dtype(DType::I32, i32::MAX as usize + 1).is_ok());
    assert!(matches!(
        validate_index_dtype(DType::I32, i32::MAX as usize + 2),
        Err(Error::IndexOverflow {
            dtype: DType::I32,
            ..
        })
    ));
    assert!(validate_index_dtype(DType::I64, 1 << 40).is_ok());
}

#[test]
fn test_scratch_is_released() {
    let (client, device) = create_parallel_cpu_client();
    let data = common::sparse_pattern(10_000, 0.5, 11);
    let cond = Tensor::<CpuRuntime>::from_slice(&data, &[100, 100], &device);

    client.nonzero_coords(&cond, DType::I64).unwrap();
    client.argwhere(&cond, DType::I32).unwrap();
    client.count_nonzero(&cond).unwrap();
    assert_eq!(client.allocator().allocated_bytes(), 0);
    assert_eq!(client.allocator().live_allocations(), 0);
}

#[test]
fn test_count_cell_comes_from_allocator() {
    let device = CpuDevice::new();
    let client = CpuClient::new(device).with_parallelism(ParallelismConfig::serial());
    let cond = Tensor::<CpuRuntime>::from_slice(&[0u8, 3, 0, 1, 1, 0], &[2, 3], &device);

    // Serial passes need no scratch, so the count cell is the only draw.
    assert_eq!(client.count_nonzero(&cond).unwrap(), 3);
    assert_eq!(client.allocator().total_allocations(), 1);

    client.flat_nonzero(&cond, DType::I64).unwrap();
    assert_eq!(client.allocator().total_allocations(), 2);
    assert_eq!(client.allocator().live_allocations(), 0);

    // No device work for empty inputs.
    let empty = Tensor::<CpuRuntime>::from_slice::<u8>(&[], &[0, 3], &device);
    assert_eq!(client.count_nonzero(&empty).unwrap(), 0);
    assert_eq!(client.allocator().total_allocations(), 2);
}

#[test]
fn test_verified_selection() {
    let (client, device) = create_parallel_cpu_client();
    let client = client.with_where_config(
        WhereConfig::default()
            .with_verify_selected_count(true)
            .with_unravel_group_size(7),
    );
    let data = common::sparse_pattern(3000, 0.2, 5);
    let cond = Tensor::<CpuRuntime>::from_slice(&data, &[30, 100], &device);

    let streams = streams_i64(&client.nonzero_coords(&cond, DType::I64).unwrap());
    let expected = reference_flat(&data, |v| v != 0);
    assert_eq!(common::ravel_streams(&streams, &[30, 100]), expected);
}
