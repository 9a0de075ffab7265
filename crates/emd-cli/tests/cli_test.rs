//! End-to-end tests for the `emd` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::{GrayImage, Luma};

fn emd(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emd"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("EMD_TILE_SIZE")
        .output()
        .expect("failed to run emd")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Noisy 40x30 gradient.
fn write_slice(dir: &Path, name: &str, seed: u32) -> PathBuf {
    let path = dir.join(name);
    let img = GrayImage::from_fn(40, 30, |x, y| {
        let jitter = (x * 31 + y * 17 + seed * 7) % 23;
        Luma([(x * 4 + y + jitter) as u8])
    });
    img.save(&path).unwrap();
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_algorithms_lists_catalogue() {
    let out = emd(&["algorithms", "--long"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("gaussian"));
    assert!(text.contains("tikhonov"));
    assert!(text.contains("emd.gaussian.sigma"));
}

#[test]
fn test_denoise_writes_selected_range() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_slice(dir.path(), "a.png", 1);
    let b = write_slice(dir.path(), "b.png", 2);
    let c = write_slice(dir.path(), "c.png", 3);
    let out_dir = dir.path().join("out");

    let out = emd(&[
        "denoise",
        path_str(&a),
        path_str(&b),
        path_str(&c),
        "-o",
        path_str(&out_dir),
        "--range",
        "2-3",
        "--tile",
        "16",
        "-m",
        "4",
        "-a",
        "gaussian",
        "-p",
        "sigma=1",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    assert!(!out_dir.join("a_gaussian.png").exists());
    for name in ["b_gaussian.png", "c_gaussian.png"] {
        let written = image::open(out_dir.join(name)).unwrap();
        assert_eq!((written.width(), written.height()), (40, 30));
        assert_eq!(written.color(), image::ColorType::L8);
    }

    let sidecar = fs::read_to_string(out_dir.join("a_gaussian.txt")).unwrap();
    assert!(sidecar.contains("title=a [Gaussian]"));
    assert!(sidecar.contains("emd.algorithm=gaussian"));
    assert!(sidecar.contains("emd.gaussian.sigma=1"));
}

#[test]
fn test_denoise_unavailable_kernel_fails() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_slice(dir.path(), "a.png", 1);
    let out_dir = dir.path().join("out");

    let out = emd(&["denoise", path_str(&a), "-o", path_str(&out_dir), "-a", "blsgsm"]);
    assert!(!out.status.success());
    assert!(!out_dir.join("a_blsgsm.png").exists());
}

#[test]
fn test_denoise_rejects_bad_range() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_slice(dir.path(), "a.png", 1);
    let out_dir = dir.path().join("out");

    let out = emd(&["denoise", path_str(&a), "-o", path_str(&out_dir), "--range", "1-4"]);
    assert!(!out.status.success());
}

#[test]
fn test_preview_writes_roi() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_slice(dir.path(), "a.png", 1);
    let roi = dir.path().join("roi.png");

    let out = emd(&[
        "preview",
        path_str(&a),
        "--roi",
        "4,2,20,16",
        "-o",
        path_str(&roi),
        "-a",
        "tv",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let written = image::open(&roi).unwrap();
    assert_eq!((written.width(), written.height()), (20, 16));
    assert!(stdout(&out).contains("noise"));
}

#[test]
fn test_estimate_with_suggestions() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_slice(dir.path(), "a.png", 1);

    let out = emd(&["estimate", path_str(&a), "--suggest"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("noise"));
    assert!(text.contains("blur"));
    assert!(text.contains("waveletthresholding"));
}
