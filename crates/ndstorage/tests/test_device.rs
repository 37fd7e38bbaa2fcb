//! Integration tests for device placement and transfer.
//!
//! Accelerators are simulated with `SimulatedDevice`, whose memory is only
//! reachable through the `DeviceBackend` copy primitives.

use std::sync::Arc;

use ndstorage::{
    Complex64, DType, Device, Scalar, SimulatedDevice, Storage, StorageError, register_device,
};

fn accelerator(name: &str) -> (Arc<SimulatedDevice>, Device) {
    let sim = Arc::new(SimulatedDevice::new(name));
    let dev = register_device(sim.clone());
    (sim, dev)
}

/// to(d2) then to(d1) returns the original content.
#[test]
fn test_transfer_round_trip() {
    let (_, d1) = accelerator("round-a");
    let (_, d2) = accelerator("round-b");
    let host = Storage::from_vec(vec![1.5f64, -2.0, 3.25]).unwrap();

    for (from, to) in [(Device::CPU, d1), (d1, d2), (d2, Device::CPU)] {
        let start = host.to(from).unwrap();
        let there = start.to(to).unwrap();
        assert_eq!(there.device().unwrap(), to);
        let back = there.to(from).unwrap();
        assert_eq!(back, start);
    }
}

/// Transferring to the current device shares the buffer.
#[test]
fn test_to_same_device_shares() {
    let s = Storage::from_vec(vec![1i32, 2]).unwrap();
    let t = s.to(Device::CPU).unwrap();
    assert!(t.is_same(&s));
}

/// to_ moves the shared buffer; every handle follows.
#[test]
fn test_to_in_place_moves_all_sharers() {
    let (sim, dev) = accelerator("inplace");
    let mut s = Storage::from_vec(vec![7u32, 8, 9]).unwrap();
    let alias = s.share();

    s.to_(dev).unwrap();
    assert_eq!(alias.device().unwrap(), dev);
    assert!(sim.live_bytes() > 0);
    assert_eq!(alias.vector::<u32>().unwrap(), vec![7, 8, 9]);

    s.to_(Device::CPU).unwrap();
    assert_eq!(sim.live_bytes(), 0);
    assert_eq!(alias.device_str().unwrap(), "cpu");
}

/// Element operations on accelerator storage stay on the accelerator.
#[test]
fn test_operations_on_accelerator() {
    let (_, dev) = accelerator("ops");
    let mut s = Storage::zeros(3, DType::Int64, dev).unwrap();
    s.set_item(1, 5).unwrap();
    s.append(6).unwrap();
    assert_eq!(s.get_item(1).unwrap(), Scalar::Int64(5));
    assert_eq!(s.vector::<i64>().unwrap(), vec![0, 5, 0, 6]);

    s.fill(2).unwrap();
    assert_eq!(s.vector::<i64>().unwrap(), vec![2; 4]);

    let f = s.astype(DType::Double).unwrap();
    assert_eq!(f.device().unwrap(), dev);
    assert_eq!(f.vector::<f64>().unwrap(), vec![2.0; 4]);

    let t = s.move_memory(&[2, 2], &[1, 0], &[1, 0]).unwrap();
    assert_eq!(t.device().unwrap(), dev);
}

/// real()/imag() results live on the input's device.
#[test]
fn test_complex_parts_on_accelerator() {
    let (_, dev) = accelerator("parts");
    let z = Storage::from_vector(&[Complex64::new(1.0, 2.0)], dev).unwrap();
    let re = z.real().unwrap();
    assert_eq!(re.device().unwrap(), dev);
    assert_eq!(re.vector::<f64>().unwrap(), vec![1.0]);
    assert_eq!(z.imag().unwrap().vector::<f64>().unwrap(), vec![2.0]);
}

/// data() needs host memory; vector() works anywhere.
#[test]
fn test_data_requires_host() {
    let (_, dev) = accelerator("data");
    let s = Storage::from_vector(&[1.0f32], dev).unwrap();
    assert!(matches!(
        s.data::<f32>(),
        Err(StorageError::InvalidArgument { .. })
    ));
    assert_eq!(s.vector::<f32>().unwrap(), vec![1.0]);
}

/// Equal content on different devices is not equal storage.
#[test]
fn test_equality_includes_device() {
    let (_, dev) = accelerator("eq");
    let host = Storage::from_vec(vec![1i16, 2]).unwrap();
    let remote = host.to(dev).unwrap();
    assert_ne!(host, remote);
    assert_eq!(remote, remote.clone().unwrap());
}

/// Allocator exhaustion is reported, not retried.
#[test]
fn test_allocation_failure() {
    let dev = register_device(Arc::new(SimulatedDevice::with_limit("small", 64)));
    let err = Storage::zeros(100, DType::Double, dev).unwrap_err();
    assert!(matches!(err, StorageError::AllocationFailure { bytes: 800, .. }));

    let mut s = Storage::zeros(4, DType::Double, dev).unwrap();
    assert!(matches!(
        s.resize(100),
        Err(StorageError::AllocationFailure { .. })
    ));
}

/// Unregistered accelerator ids are rejected.
#[test]
fn test_unknown_device() {
    let err = Storage::zeros(1, DType::Bool, Device::accelerator(u16::MAX)).unwrap_err();
    assert!(matches!(err, StorageError::UnknownDevice { .. }));
}

/// Dropping the last handle frees device memory.
#[test]
fn test_drop_frees_device_memory() {
    let (sim, dev) = accelerator("drop");
    let s = Storage::zeros(16, DType::Uint16, dev).unwrap();
    let alias = s.share();
    drop(s);
    assert!(sim.live_allocations() > 0);
    drop(alias);
    assert_eq!(sim.live_allocations(), 0);
    assert_eq!(sim.live_bytes(), 0);
}
