use approx::assert_relative_eq;
use ndarray::{s, Array2};
use starstack::image_proc::measure_centroid;
use starstack::test_util::{SyntheticField, SyntheticStar};
use starstack::{PipelineState, StackConfig, StackPipeline};

const SKY: f64 = 100.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scenario_field() -> SyntheticField {
    let stars = [(10.0, 10.0), (50.0, 50.0), (80.0, 20.0)]
        .iter()
        .map(|&(x, y)| SyntheticStar { x, y, peak: 1000.0 })
        .collect();
    SyntheticField::new((100, 100), stars).with_noise(5.0).with_fwhm(3.0)
}

const SHIFTS: [(f64, f64); 5] = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (1.0, 1.0), (0.0, 2.0)];

fn scenario_config() -> StackConfig {
    StackConfig {
        nframes: 5,
        fwhm: 3.0,
        dmax: 10.0,
        bin_size: 0.5,
        ..Default::default()
    }
}

/// Peak height and second-moment spread of the source near `(cx, cy)`.
fn profile(image: &Array2<f64>, cx: usize, cy: usize) -> (f64, f64) {
    let r = 5;
    let window = image.slice(s![cy - r..=cy + r, cx - r..=cx + r]).mapv(|v| v - SKY);
    let mask = Array2::from_shape_fn(window.dim(), |(row, col)| {
        let dr = row as f64 - r as f64;
        let dc = col as f64 - r as f64;
        (dr * dr + dc * dc).sqrt() <= r as f64
    });
    let centroid = measure_centroid(&window.view(), &mask.view()).unwrap();
    let peak = window.iter().copied().fold(f64::MIN, f64::max);
    (peak, centroid.spread())
}

#[test]
fn test_recovers_scenario_offsets() {
    init_logging();
    let frames = scenario_field().sequence(&SHIFTS, 2024);
    let mut pipeline = StackPipeline::new(scenario_config()).unwrap();

    let output = pipeline.run(&frames).unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(output.report.requested, 5);
    assert_eq!(output.report.succeeded, 5);
    assert!(output.report.exclusions.is_empty());
    assert!(!output.report.cancelled);
    assert_eq!(output.report.reference, "frame_000.fits");
    assert_eq!(output.report.reference_sources, 3);

    assert_eq!(output.report.offsets.len(), 4);
    for (entry, &(dx, dy)) in output.report.offsets.iter().zip(&SHIFTS[1..]) {
        assert_relative_eq!(entry.dx, dx, epsilon = 0.2);
        assert_relative_eq!(entry.dy, dy, epsilon = 0.2);
        assert!(entry.votes >= 1);
    }
    let indices: Vec<usize> = output.report.offsets.iter().map(|e| e.frame_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
}

#[test]
fn test_aligned_stack_is_sharper_than_unaligned_mean() {
    init_logging();
    let frames = scenario_field().sequence(&SHIFTS, 7);
    let mut pipeline = StackPipeline::new(scenario_config()).unwrap();
    let output = pipeline.run(&frames).unwrap();

    let unaligned = StackPipeline::new(StackConfig {
        align: false,
        ..scenario_config()
    })
    .unwrap()
    .run(&frames)
    .unwrap();
    assert!(unaligned.report.offsets.is_empty());
    assert_eq!(unaligned.report.succeeded, 5);
    let unaligned = unaligned.mean;

    for &(x, y) in &[(10usize, 10usize), (50, 50), (80, 20)] {
        let (aligned_peak, aligned_spread) = profile(&output.mean, x, y);
        let (blurred_peak, blurred_spread) = profile(&unaligned, x, y);

        assert!(
            aligned_peak > 1.2 * blurred_peak,
            "({x}, {y}): aligned peak {aligned_peak:.1} vs unaligned {blurred_peak:.1}"
        );
        assert!(
            aligned_spread + 0.5 < blurred_spread,
            "({x}, {y}): aligned spread {aligned_spread:.3} vs unaligned {blurred_spread:.3}"
        );
    }
}

#[test]
fn test_median_stack_keeps_sources_and_sky() {
    init_logging();
    let frames = scenario_field().sequence(&SHIFTS, 99);
    let output = StackPipeline::new(scenario_config()).unwrap().run(&frames).unwrap();

    let (peak, _) = profile(&output.median, 50, 50);
    assert!(peak > 900.0, "median peak {peak:.1}");

    let sky = output.median.slice(s![30..45, 60..95]);
    let sky_level = sky.mean().unwrap();
    assert!((sky_level - SKY).abs() < 1.0, "median sky {sky_level:.2}");
}

#[test]
fn test_thread_cap_gives_identical_results() {
    init_logging();
    let frames = scenario_field().sequence(&SHIFTS, 5);

    let global = StackPipeline::new(scenario_config()).unwrap().run(&frames).unwrap();
    let capped = StackPipeline::new(StackConfig {
        max_threads: Some(1),
        ..scenario_config()
    })
    .unwrap()
    .run(&frames)
    .unwrap();

    assert_eq!(global.report, capped.report);
    assert_eq!(global.mean, capped.mean);
    assert_eq!(global.median, capped.median);
}
