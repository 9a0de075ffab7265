//! Batch engine tests: tiling scenarios, cancellation, failure propagation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use emd_compute::{
    AlgorithmId, AlgorithmParams, CancelToken, ComputeChannel, CpuKernel, DenoiseEngine, DenoiseError,
    DenoiseJob, DenoiseOutcome, KernelError, KernelPort, NoProgress, Normalizer, ProgressState,
};
use emd_core::{Image, Rect, SliceRange, SliceSource, SliceStack};

/// Returns its input and counts calls.
#[derive(Default)]
struct Identity {
    calls: AtomicUsize,
}

impl KernelPort for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn invoke(&self, tile: &Image, _: &AlgorithmParams, _: &Normalizer) -> Result<Image, KernelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(tile.clone())
    }
}

/// Fails on the n-th call (0-based).
struct FailOn(usize, AtomicUsize);

impl KernelPort for FailOn {
    fn name(&self) -> &str {
        "fail-on"
    }

    fn invoke(&self, tile: &Image, _: &AlgorithmParams, _: &Normalizer) -> Result<Image, KernelError> {
        if self.1.fetch_add(1, Ordering::SeqCst) == self.0 {
            return Err(KernelError::MissingResource("libdenoise".into()));
        }
        Ok(tile.clone())
    }
}

/// Returns a result one pixel narrower than its input.
struct Shrink;

impl KernelPort for Shrink {
    fn name(&self) -> &str {
        "shrink"
    }

    fn invoke(&self, tile: &Image, _: &AlgorithmParams, _: &Normalizer) -> Result<Image, KernelError> {
        tile.crop(Rect::new(0, 0, tile.width() - 1, tile.height()))
            .map_err(|e| KernelError::Failed(e.to_string()))
    }
}

fn gaussian() -> AlgorithmParams {
    AlgorithmId::Gaussian.default_params()
}

fn pattern_u8(w: u32, h: u32, seed: u32) -> Image {
    let data = (0..w * h).map(|i| (i.wrapping_mul(2_654_435_761).wrapping_add(seed) >> 7) as u8).collect();
    Image::from_u8(w, h, data).unwrap()
}

fn pattern_u16(w: u32, h: u32) -> Image {
    let data = (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            (1000 + x * 37 + y * 11 + (i.wrapping_mul(2_654_435_761) >> 22)) as u16
        })
        .collect();
    Image::from_u16(w, h, data).unwrap()
}

fn stack_of(n: usize, w: u32, h: u32) -> SliceStack {
    SliceStack::new("stack", (0..n as u32).map(|s| pattern_u8(w, h, s)).collect()).unwrap()
}

fn job(range: SliceRange, tile: u32, margin: u32) -> DenoiseJob {
    DenoiseJob { range, tile_width: tile, tile_height: tile, margin, params: gaussian() }
}

#[test]
fn test_512_identity_scenario() {
    let channel = ComputeChannel::new().unwrap();
    let kernel = Arc::new(Identity::default());
    let engine = DenoiseEngine::new(channel.submitter(), kernel.clone());
    let src = SliceStack::single("cells", pattern_u8(512, 512, 3));

    let out = engine
        .denoise(&src, &job(SliceRange::current(&src).unwrap(), 256, 8), &NoProgress, &CancelToken::new())
        .unwrap()
        .into_stack()
        .unwrap();

    assert_eq!(kernel.calls.load(Ordering::SeqCst), 4);
    assert_eq!(out.slices()[0].as_u8(), src.slices()[0].as_u8());
}

#[test]
fn test_explicit_range_cancel_after_first_unit() {
    let channel = ComputeChannel::new().unwrap();
    let kernel = Arc::new(Identity::default());
    let engine = DenoiseEngine::new(channel.submitter(), kernel.clone());
    let src = stack_of(10, 64, 64);
    let range = SliceRange::explicit(&src, 2, 4).unwrap();
    let job = job(range, 128, 8);
    assert_eq!(job.total_units(64, 64).unwrap(), 3);

    let cancel = CancelToken::new();
    let sink_cancel = cancel.clone();
    let sink = move |p: ProgressState| {
        assert_eq!(p.total_units, 3);
        if p.completed_units == 1 {
            sink_cancel.request_cancel();
        }
    };

    let outcome = engine.denoise(&src, &job, &sink, &cancel).unwrap();
    match outcome {
        DenoiseOutcome::Cancelled(state) => {
            assert_eq!(state, ProgressState { completed_units: 1, total_units: 3 });
        }
        DenoiseOutcome::Completed(_) => panic!("expected cancellation"),
    }
    assert_eq!(kernel.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancelled_before_start() {
    let channel = ComputeChannel::new().unwrap();
    let kernel = Arc::new(Identity::default());
    let engine = DenoiseEngine::new(channel.submitter(), kernel.clone());
    let src = stack_of(2, 40, 40);
    let cancel = CancelToken::new();
    cancel.request_cancel();

    let outcome = engine.denoise(&src, &job(SliceRange::all(&src).unwrap(), 16, 2), &NoProgress, &cancel).unwrap();
    assert!(matches!(outcome, DenoiseOutcome::Cancelled(ProgressState { completed_units: 0, total_units: 18 })));
    assert_eq!(kernel.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_kernel_failure_names_slice_and_tile() {
    let channel = ComputeChannel::new().unwrap();
    // 2x2 tiles per slice; call 5 is slice 2, tile 1
    let engine = DenoiseEngine::new(channel.submitter(), Arc::new(FailOn(5, AtomicUsize::new(0))));
    let src = stack_of(3, 32, 32);

    let err = engine
        .denoise(&src, &job(SliceRange::all(&src).unwrap(), 16, 4), &NoProgress, &CancelToken::new())
        .unwrap_err();
    match err {
        DenoiseError::Kernel { slice, tile, grid_x, grid_y, source } => {
            assert_eq!((slice, tile, grid_x, grid_y), (2, 1, 16, 0));
            assert!(matches!(source, KernelError::MissingResource(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The channel is still usable afterwards.
    assert_eq!(channel.submit(|| Ok(5)).wait(), Ok(5));
}

#[test]
fn test_geometry_violation_aborts_job() {
    let channel = ComputeChannel::new().unwrap();
    let engine = DenoiseEngine::new(channel.submitter(), Arc::new(Shrink));
    let src = stack_of(1, 32, 32);
    let err = engine
        .denoise(&src, &job(SliceRange::all(&src).unwrap(), 16, 4), &NoProgress, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        DenoiseError::TileGeometryViolation { grid_x: 0, grid_y: 0, expected_width: 20, actual_width: 19, .. }
    ));
}

#[test]
fn test_range_beyond_source_rejected() {
    let channel = ComputeChannel::new().unwrap();
    let engine = DenoiseEngine::new(channel.submitter(), Arc::new(Identity::default()));
    let big = stack_of(5, 8, 8);
    let small = stack_of(2, 8, 8);
    let range = SliceRange::explicit(&big, 2, 5).unwrap();
    let err = engine.denoise(&small, &job(range, 8, 0), &NoProgress, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, DenoiseError::Core(emd_core::Error::InvalidSliceRange { .. })));
}

#[test]
fn test_tiled_cpu_gaussian_matches_untiled() {
    let channel = ComputeChannel::new().unwrap();
    let engine = DenoiseEngine::new(channel.submitter(), Arc::new(CpuKernel::new()));
    let src = SliceStack::single("ramp", pattern_u16(97, 61));
    let range = SliceRange::current(&src).unwrap();

    let whole = DenoiseJob { range, tile_width: 1024, tile_height: 1024, margin: 0, params: gaussian() };
    let tiled = DenoiseJob { tile_width: 24, tile_height: 20, ..whole.clone() }.with_recommended_margin();
    assert_eq!(tiled.margin, 5);

    let a = engine.denoise(&src, &whole, &NoProgress, &CancelToken::new()).unwrap().into_stack().unwrap();
    let b = engine.denoise(&src, &tiled, &NoProgress, &CancelToken::new()).unwrap().into_stack().unwrap();
    assert_eq!(a.slices(), b.slices());
    assert_ne!(a.slices()[0], src.slices()[0]);
    assert_eq!(b.title(), "ramp [Gaussian]");
}

#[test]
fn test_tiled_cpu_iterative_filters_match_untiled() {
    let channel = ComputeChannel::new().unwrap();
    let engine = DenoiseEngine::new(channel.submitter(), Arc::new(CpuKernel::new()));
    let src = SliceStack::single("ramp", pattern_u16(70, 52));
    let range = SliceRange::current(&src).unwrap();

    let mut tikhonov = AlgorithmId::Tikhonov.default_params();
    tikhonov.set("lambda1", "8").unwrap();
    tikhonov.set("iterations", "12").unwrap();
    let mut tv = AlgorithmId::TotalVariation.default_params();
    tv.set("iterations", "9").unwrap();

    for (params, margin) in [(tikhonov, 12), (tv, 9)] {
        let whole = DenoiseJob { range, tile_width: 1024, tile_height: 1024, margin: 0, params };
        let tiled = DenoiseJob { tile_width: 32, tile_height: 16, margin: 1, ..whole.clone() }
            .with_recommended_margin();
        assert_eq!(tiled.margin, margin, "{params}");

        let a = engine.denoise(&src, &whole, &NoProgress, &CancelToken::new()).unwrap().into_stack().unwrap();
        let b = engine.denoise(&src, &tiled, &NoProgress, &CancelToken::new()).unwrap().into_stack().unwrap();
        assert_eq!(a.slices(), b.slices(), "{params}");
    }
}
