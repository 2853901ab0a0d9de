//! Adversarial edge-case integration tests.
//!
//! Degenerate, boundary and malformed inputs across the crate stack: no
//! panics, the right error kind, and no output file left behind.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use voxdown::{run, Args};
use voxdown_core::{Error, PointCloud};
use voxdown_filters::voxel_downsample;
use voxdown_io::{read_pcd, write_pcd, DataFormat};

fn args(input: &Path, output: &Path, voxel_size: f32) -> Args {
    Args {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        voxel_size,
        ascii: false,
    }
}

/// Unwraps the library error underneath the CLI's context chain.
fn root_error(err: &anyhow::Error) -> &Error {
    err.chain()
        .find_map(|e| e.downcast_ref::<Error>())
        .expect("library error in chain")
}

// ────────────────── PointCloud core ──────────────────

#[test]
fn empty_cloud_operations() {
    let cloud = PointCloud::new();
    assert!(cloud.is_empty());
    assert!(cloud.iter_points().next().is_none());
    assert!(cloud.aabb().is_empty());
    assert!(cloud.validate().is_ok());
}

// ────────────────── Filters ──────────────────

#[test]
fn all_non_finite_cloud_downsamples_to_empty() {
    let cloud = PointCloud::from_xyz(
        vec![f32::NAN, f32::INFINITY],
        vec![0.0, 0.0],
        vec![0.0, f32::NEG_INFINITY],
    );
    let out = voxel_downsample(&cloud, 1.0).unwrap();
    assert!(out.is_empty());
}

#[test]
fn huge_voxel_collapses_everything() {
    let cloud = PointCloud::from_xyz(vec![0.0, 100.0], vec![0.0, 100.0], vec![0.0, 100.0]);
    let out = voxel_downsample(&cloud, f32::MAX).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out.point(0), [50.0, 50.0, 50.0]);
}

#[test]
fn extreme_coordinates_do_not_overflow_sums() {
    let big = f32::MAX;
    let cloud = PointCloud::from_xyz(vec![big, big], vec![0.0; 2], vec![0.0; 2]);
    let out = voxel_downsample(&cloud, f32::MAX).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out.x[0], big);
}

// ────────────────── IO ──────────────────

#[test]
fn read_pcd_corrupted_header() {
    let mut tmp = NamedTempFile::new().unwrap();
    write!(tmp, "# this is not a valid PCD\ngarbage\n").unwrap();
    tmp.flush().unwrap();

    let result = read_pcd(tmp.path());
    assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn read_pcd_truncated_binary() {
    let mut tmp = NamedTempFile::new().unwrap();
    // Valid header claiming 100 points, but no binary data
    write!(
        tmp,
        "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nWIDTH 100\nHEIGHT 1\nPOINTS 100\nDATA binary\n"
    )
    .unwrap();
    tmp.flush().unwrap();

    let result = read_pcd(tmp.path());
    assert!(matches!(result, Err(Error::Format(_))), "truncated binary PCD should fail");
}

#[test]
fn read_pcd_huge_point_count_fails_without_allocating() {
    let text = format!(
        "FIELDS x y z\nSIZE 8 8 8\nTYPE F F F\nWIDTH {}\nDATA binary\n",
        usize::MAX / 2
    );
    assert!(matches!(voxdown_io::decode(text.as_bytes()), Err(Error::Format(_))));
}

#[test]
fn write_pcd_to_directory_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = write_pcd(dir.path(), &PointCloud::new(), DataFormat::Ascii);
    assert!(matches!(result, Err(Error::Io { .. })));
}

// ────────────────── CLI ──────────────────

#[test]
fn invalid_voxel_size_is_reported_before_io() {
    let dir = tempfile::tempdir().unwrap();
    // neither path exists; the parameter check must win
    let input = dir.path().join("missing.pcd");
    let output = dir.path().join("out.pcd");
    for size in [0.0, -1.0, f32::NAN] {
        let err = run(&args(&input, &output, size)).unwrap_err();
        assert!(matches!(root_error(&err), Error::InvalidParameter(_)), "{err:#}");
        assert!(!output.exists());
    }
}

#[test]
fn missing_input_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("missing.pcd");
    let output = dir.path().join("out.pcd");
    let err = run(&args(&input, &output, 1.0)).unwrap_err();
    match root_error(&err) {
        Error::Io { path, .. } => assert_eq!(path, &input),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(format!("{err:#}").contains("missing.pcd"));
    assert!(!output.exists());
}

#[test]
fn malformed_input_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.pcd");
    let output = dir.path().join("out.pcd");
    std::fs::write(&input, "FIELDS x y\nSIZE 4 4\nTYPE F F\nWIDTH 1\nDATA ascii\n1 2\n").unwrap();
    let err = run(&args(&input, &output, 1.0)).unwrap_err();
    assert!(matches!(root_error(&err), Error::Format(_)));
    assert!(!output.exists());
}

#[test]
fn unwritable_output_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pcd");
    write_pcd(&input, &PointCloud::from_xyz(vec![0.0], vec![0.0], vec![0.0]), DataFormat::Binary).unwrap();
    let output = dir.path().join("no_such_dir").join("out.pcd");
    let err = run(&args(&input, &output, 1.0)).unwrap_err();
    match root_error(&err) {
        Error::Io { path, .. } => assert_eq!(path, &output),
        other => panic!("unexpected error {other:?}"),
    }
}
