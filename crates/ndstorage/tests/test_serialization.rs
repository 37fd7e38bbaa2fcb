//! Integration tests for the `.cyst` and raw file formats.

use std::fs;
use std::sync::Arc;

use ndstorage::{
    Complex64, DType, Device, Scalar, SimulatedDevice, Storage, StorageError, register_device,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn random_storage(dtype: DType, len: usize, rng: &mut StdRng) -> Storage {
    let mut s = Storage::zeros(len, dtype, Device::CPU).unwrap();
    for i in 0..len {
        let value = if dtype.is_complex() {
            Scalar::from(Complex64::new(rng.random(), rng.random()))
        } else if dtype.is_float() {
            Scalar::Double(rng.random_range(-1e3..1e3))
        } else {
            Scalar::Int32(rng.random_range(0..1000))
        };
        s.set_item(i, value).unwrap();
    }
    s
}

/// Save/Load round-trips every kind.
#[test]
fn test_save_load_round_trip_all_kinds() {
    let dir = tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    for dtype in DType::ALL {
        for len in [0, 1, 17] {
            let s = random_storage(dtype, len, &mut rng);
            let path = s
                .save(dir.path().join(format!("{}_{len}", dtype.name())))
                .unwrap();
            let loaded = Storage::load(&path).unwrap();
            assert_eq!(loaded, s, "{dtype} x {len}");
            assert!(!loaded.is_same(&s));
        }
    }
}

/// The extension is appended once.
#[test]
fn test_save_extension() {
    let dir = tempdir().unwrap();
    let s = Storage::from_vec(vec![1u64]).unwrap();

    let path = s.save(dir.path().join("plain")).unwrap();
    assert_eq!(path, dir.path().join("plain.cyst"));
    assert!(path.exists());

    let path = s.save(dir.path().join("given.cyst")).unwrap();
    assert_eq!(path, dir.path().join("given.cyst"));
}

/// Accelerator content is saved from the host and loads onto the host.
#[test]
fn test_save_from_accelerator() {
    let dir = tempdir().unwrap();
    let dev = register_device(Arc::new(SimulatedDevice::new("save")));
    let s = Storage::from_vector(&[3i32, 1, 4, 1, 5], dev).unwrap();

    let path = s.save(dir.path().join("remote")).unwrap();
    let loaded = Storage::load(&path).unwrap();
    assert_eq!(loaded.device().unwrap(), Device::CPU);
    assert_eq!(loaded, s.to(Device::CPU).unwrap());
}

/// An unknown dtype id in the header is a format error.
#[test]
fn test_load_unknown_kind() {
    let dir = tempdir().unwrap();
    let s = Storage::from_vec(vec![1.0f64]).unwrap();
    let path = s.save(dir.path().join("bad")).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[..4].copy_from_slice(&42u32.to_ne_bytes());
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        Storage::load(&path),
        Err(StorageError::FormatError { .. })
    ));
}

/// A payload shorter than the header length is a format error.
#[test]
fn test_load_truncated_payload() {
    let dir = tempdir().unwrap();
    let s = Storage::from_vec(vec![1.0f64, 2.0, 3.0]).unwrap();
    let path = s.save(dir.path().join("short")).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    assert!(matches!(
        Storage::load(&path),
        Err(StorageError::FormatError { .. })
    ));
}

/// Missing files surface as I/O errors.
#[test]
fn test_load_missing_file() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Storage::load(dir.path().join("nothing.cyst")),
        Err(StorageError::Io(_))
    ));
}

/// Tofile writes exactly the payload; Fromfile reads it back.
#[test]
fn test_tofile_fromfile() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.bin");
    let s = Storage::from_vec(vec![1.5f32, -2.5, 8.0, 0.25]).unwrap();
    s.tofile(&path).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 16);

    let all = Storage::fromfile(&path, DType::Float, -1).unwrap();
    assert_eq!(all, s);

    let head = Storage::fromfile(&path, DType::Float, 2).unwrap();
    assert_eq!(head.vector::<f32>().unwrap(), vec![1.5, -2.5]);
}

/// Reading with another kind reinterprets the bytes.
#[test]
fn test_fromfile_reinterprets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("u16.bin");
    Storage::from_vec(vec![1u16, 2, 3, 4])
        .unwrap()
        .tofile(&path)
        .unwrap();

    let wide = Storage::fromfile(&path, DType::Uint64, -1).unwrap();
    assert_eq!(wide.size().unwrap(), 1);
    let expected = u64::from_ne_bytes(
        [1u16, 2, 3, 4]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect::<Vec<u8>>()
            .try_into()
            .unwrap(),
    );
    assert_eq!(wide.at::<u64>(0).unwrap(), expected);
}

/// Bool payload bytes decode as nonzero.
#[test]
fn test_fromfile_bool_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flags.bin");
    fs::write(&path, [0u8, 1, 2, 255]).unwrap();

    let flags = Storage::fromfile(&path, DType::Bool, -1).unwrap();
    assert_eq!(flags.vector::<bool>().unwrap(), vec![false, true, true, true]);
}

/// Counts are validated against the request and the file.
#[test]
fn test_fromfile_count_checks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("three.bin");
    Storage::from_vec(vec![1i32, 2, 3])
        .unwrap()
        .tofile(&path)
        .unwrap();

    for count in [0, -2, -100] {
        assert!(matches!(
            Storage::fromfile(&path, DType::Int32, count),
            Err(StorageError::InvalidArgument { .. })
        ));
    }
    assert!(matches!(
        Storage::fromfile(&path, DType::Int32, 4),
        Err(StorageError::FormatError { .. })
    ));
    assert!(matches!(
        Storage::fromfile(&path, DType::Int64, -1),
        Err(StorageError::FormatError { .. })
    ));
}

/// In-memory writers and readers use the same format as files.
#[test]
fn test_writer_reader() {
    let s = Storage::from_vec(vec![Complex64::new(1.0, -1.0)]).unwrap();
    let mut buf = Vec::new();
    s.save_to_writer(&mut buf).unwrap();
    assert_eq!(buf.len(), 16 + 16);
    let loaded = Storage::load_from_reader(&mut buf.as_slice()).unwrap();
    assert_eq!(loaded, s);

    let mut raw = Vec::new();
    s.tofile_writer(&mut raw).unwrap();
    assert_eq!(raw, buf[16..]);
}
